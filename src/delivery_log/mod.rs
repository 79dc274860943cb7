//! Append-only delivery log.
//!
//! Every lifecycle event of a notification job (enqueue, attempt failure,
//! success, give-up, template fallback) is written as one timestamped line to
//! a plain text file and mirrored to `tracing` and to an in-process broadcast
//! feed. The dispatcher never reads the file back.
//!
//! Recording never blocks: lines are handed to a background writer task over
//! a channel. Writing is best-effort, a missing directory, a permission problem
//! or a full disk is swallowed so that logging can never interrupt delivery.

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::{broadcast, mpsc, oneshot};

use crate::notification::JobId;

/// Capacity of the live broadcast feed
const FEED_CAPACITY: usize = 1024;

/// A lifecycle event recorded by the delivery log
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LogEvent {
    Enqueued {
        job_id: JobId,
        destination: String,
        template: String,
        max_attempts: u32,
    },
    Sent {
        job_id: JobId,
        destination: String,
        subject: String,
        attempt: u32,
        reference: Option<String>,
    },
    Error {
        job_id: JobId,
        destination: String,
        attempt: u32,
        max_attempts: u32,
        detail: String,
    },
    GaveUp {
        job_id: JobId,
        destination: String,
        attempts: u32,
    },
    /// Discarded undelivered because the dispatcher stopped
    Dropped {
        job_id: JobId,
        destination: String,
        attempts: u32,
    },
    TemplateFallback {
        template: String,
        used: String,
    },
    DirectSend {
        destination: String,
        template: String,
        outcome: String,
    },
}

impl LogEvent {
    /// Short event name, stable for grepping
    pub fn kind(&self) -> &'static str {
        match self {
            LogEvent::Enqueued { .. } => "enqueued",
            LogEvent::Sent { .. } => "sent",
            LogEvent::Error { .. } => "error",
            LogEvent::GaveUp { .. } => "gave up",
            LogEvent::Dropped { .. } => "dropped",
            LogEvent::TemplateFallback { .. } => "template fallback",
            LogEvent::DirectSend { .. } => "direct send",
        }
    }
}

impl fmt::Display for LogEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogEvent::Enqueued {
                job_id,
                destination,
                template,
                max_attempts,
            } => write!(
                f,
                "enqueued job={} to={} template={} max_attempts={}",
                job_id, destination, template, max_attempts
            ),
            LogEvent::Sent {
                job_id,
                destination,
                subject,
                attempt,
                reference,
            } => write!(
                f,
                "sent job={} to={} subject={:?} attempt={} reference={}",
                job_id,
                destination,
                subject,
                attempt,
                reference.as_deref().unwrap_or("-")
            ),
            LogEvent::Error {
                job_id,
                destination,
                attempt,
                max_attempts,
                detail,
            } => write!(
                f,
                "error job={} to={} attempt={}/{} detail={:?}",
                job_id, destination, attempt, max_attempts, detail
            ),
            LogEvent::GaveUp {
                job_id,
                destination,
                attempts,
            } => write!(
                f,
                "gave up job={} to={} after {} attempts",
                job_id, destination, attempts
            ),
            LogEvent::Dropped {
                job_id,
                destination,
                attempts,
            } => write!(
                f,
                "dropped job={} to={} after {} attempts, dispatcher stopped",
                job_id, destination, attempts
            ),
            LogEvent::TemplateFallback { template, used } => {
                write!(f, "template fallback requested={} used={}", template, used)
            }
            LogEvent::DirectSend {
                destination,
                template,
                outcome,
            } => write!(
                f,
                "direct send to={} template={} outcome={}",
                destination, template, outcome
            ),
        }
    }
}

/// A recorded event together with the time it was written
#[derive(Debug, Clone, Serialize)]
pub struct LogRecord {
    pub timestamp: DateTime<Utc>,
    pub event: LogEvent,
}

impl LogRecord {
    /// The exact line appended to the log file (without newline)
    pub fn line(&self) -> String {
        format!(
            "[{}] {}",
            self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
            self.event
        )
    }
}

enum WriterCommand {
    Append(String),
    Flush(oneshot::Sender<()>),
}

/// Durable, append-only sink for notification lifecycle events
pub struct DeliveryLog {
    path: Option<PathBuf>,
    writer: Option<mpsc::UnboundedSender<WriterCommand>>,
    feed: broadcast::Sender<LogRecord>,
}

impl DeliveryLog {
    /// Open (or create) the log file at `path` and spawn its writer task.
    ///
    /// Must be called inside a tokio runtime. Never fails: if the file cannot
    /// be opened, the writer retries on every line and silently gives up on
    /// error.
    pub fn open(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let (writer, commands) = mpsc::unbounded_channel();
        tokio::spawn(write_lines(path.clone(), commands));

        let (feed, _) = broadcast::channel(FEED_CAPACITY);
        Self {
            path: Some(path),
            writer: Some(writer),
            feed,
        }
    }

    /// A sink without a backing file (tracing and broadcast only)
    pub fn disabled() -> Self {
        let (feed, _) = broadcast::channel(FEED_CAPACITY);
        Self {
            path: None,
            writer: None,
            feed,
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Subscribe to the live feed of records written from now on
    pub fn subscribe(&self) -> broadcast::Receiver<LogRecord> {
        self.feed.subscribe()
    }

    /// Append one event. Never fails and never panics.
    pub fn record(&self, event: LogEvent) {
        let record = LogRecord {
            timestamp: Utc::now(),
            event,
        };
        let line = record.line();

        tracing::info!(target: "delivery_log", event = record.event.kind(), "{}", line);

        if let Some(writer) = &self.writer {
            // The writer only goes away with the runtime
            let _ = writer.send(WriterCommand::Append(line));
        }

        // No subscribers is not an error
        let _ = self.feed.send(record);
    }

    /// Wait until every line recorded so far has been written out
    pub async fn flush(&self) {
        let Some(writer) = &self.writer else {
            return;
        };

        let (done, written) = oneshot::channel();
        if writer.send(WriterCommand::Flush(done)).is_ok() {
            let _ = written.await;
        }
    }
}

async fn write_lines(path: PathBuf, mut commands: mpsc::UnboundedReceiver<WriterCommand>) {
    let mut file = open_append(&path).await;
    if file.is_none() {
        tracing::warn!(path = %path.display(), "Delivery log is not writable, lines will only reach tracing");
    }

    while let Some(command) = commands.recv().await {
        match command {
            WriterCommand::Append(line) => {
                if file.is_none() {
                    file = open_append(&path).await;
                }
                let Some(handle) = file.as_mut() else {
                    continue;
                };
                if let Err(e) = append_line(handle, &line).await {
                    tracing::debug!(error = %e, path = %path.display(), "Failed to append to delivery log");
                    // Reopen on the next line
                    file = None;
                }
            }
            WriterCommand::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
}

async fn append_line(file: &mut File, line: &str) -> std::io::Result<()> {
    file.write_all(line.as_bytes()).await?;
    file.write_all(b"\n").await?;
    file.flush().await
}

async fn open_append(path: &Path) -> Option<File> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            let _ = fs::create_dir_all(parent).await;
        }
    }

    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .ok()
}
