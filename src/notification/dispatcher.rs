use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{broadcast, Notify};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::config::DispatcherSettings;
use crate::delivery_log::{DeliveryLog, LogEvent};
use crate::metrics::{
    JOBS_ENQUEUED_TOTAL, JOBS_GAVE_UP_TOTAL, JOBS_SENT_TOTAL, QUEUE_DEPTH, SEND_DURATION_SECONDS,
    SEND_FAILURES_TOTAL, TEMPLATE_FALLBACKS_TOTAL,
};
use crate::queue::{FailOutcome, HeadState, JobQueue};
use crate::template::{RenderedMessage, ResolutionKind, TemplateRegistry};
use crate::transport::{SendReceipt, Transport, TransportError};

use super::backoff::backoff_delay;
use super::{EnqueueError, JobId, NotificationJob, NotificationRequest};

/// Runtime configuration of the dispatcher
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Attempt ceiling for requests that do not set one
    pub default_max_attempts: u32,
    /// Longest single sleep while the head job is backing off
    pub poll_interval: Duration,
    /// Backoff base in seconds; the delay after `n` failures is `base^n` seconds
    pub backoff_base_secs: u64,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self::from(&DispatcherSettings::default())
    }
}

impl From<&DispatcherSettings> for DispatcherConfig {
    fn from(settings: &DispatcherSettings) -> Self {
        Self {
            default_max_attempts: settings.default_max_attempts.max(1),
            poll_interval: Duration::from_millis(settings.poll_interval_ms.max(1)),
            backoff_base_secs: settings.backoff_base_secs,
        }
    }
}

/// Whether the drain loop is currently working through the queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatcherState {
    Idle,
    Running,
}

/// Failure of a direct (queue-bypassing) send
#[derive(Debug, Error)]
pub enum DirectSendError {
    #[error(transparent)]
    Invalid(#[from] EnqueueError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Statistics for the notification dispatcher
#[derive(Debug, Default)]
pub struct DispatcherStats {
    pub enqueued: AtomicU64,
    pub sent: AtomicU64,
    pub failed_attempts: AtomicU64,
    pub gave_up: AtomicU64,
    pub template_fallbacks: AtomicU64,
}

impl DispatcherStats {
    pub fn snapshot(&self) -> DispatcherStatsSnapshot {
        DispatcherStatsSnapshot {
            enqueued: self.enqueued.load(Ordering::Relaxed),
            sent: self.sent.load(Ordering::Relaxed),
            failed_attempts: self.failed_attempts.load(Ordering::Relaxed),
            gave_up: self.gave_up.load(Ordering::Relaxed),
            template_fallbacks: self.template_fallbacks.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of dispatcher statistics
#[derive(Debug, Clone, Serialize)]
pub struct DispatcherStatsSnapshot {
    pub enqueued: u64,
    pub sent: u64,
    pub failed_attempts: u64,
    pub gave_up: u64,
    pub template_fallbacks: u64,
}

/// Background notification dispatcher.
///
/// Owns the job queue and a single drain task. Request handlers hand jobs
/// over with [`enqueue`](Self::enqueue), which returns immediately; the drain
/// task delivers them strictly in enqueue order, retrying failures with
/// exponential backoff. A job that is backing off blocks every job behind it.
///
/// Construct one per process, wrap it in an `Arc`, call [`start`](Self::start)
/// once and [`stop`](Self::stop) on shutdown.
pub struct NotificationDispatcher {
    queue: JobQueue,
    templates: Arc<TemplateRegistry>,
    transport: Arc<dyn Transport>,
    log: Arc<DeliveryLog>,
    config: DispatcherConfig,
    wake: Notify,
    running: AtomicBool,
    started: AtomicBool,
    stopped: AtomicBool,
    shutdown_tx: broadcast::Sender<()>,
    stats: DispatcherStats,
}

impl NotificationDispatcher {
    pub fn new(
        templates: Arc<TemplateRegistry>,
        transport: Arc<dyn Transport>,
        log: Arc<DeliveryLog>,
        config: DispatcherConfig,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            queue: JobQueue::new(),
            templates,
            transport,
            log,
            config,
            wake: Notify::new(),
            running: AtomicBool::new(false),
            started: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            shutdown_tx,
            stats: DispatcherStats::default(),
        }
    }

    /// Spawn the drain task. Returns `None` if it was already started or the
    /// dispatcher has been stopped.
    pub fn start(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        // Subscribe first so a concurrent stop() cannot be missed
        let shutdown = self.shutdown_tx.subscribe();
        if self.stopped.load(Ordering::SeqCst) || self.started.swap(true, Ordering::SeqCst) {
            return None;
        }

        let dispatcher = Arc::clone(self);
        Some(tokio::spawn(async move {
            dispatcher.run(shutdown).await;
        }))
    }

    /// Ask the drain task to exit at its next suspension point.
    ///
    /// Later enqueues are refused. Jobs still queued are dropped, each with a
    /// `dropped` line in the delivery log.
    pub fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        if self.started.load(Ordering::SeqCst) {
            let _ = self.shutdown_tx.send(());
        } else {
            // No drain task to close the queue on its way out
            for job in self.queue.close() {
                self.record_dropped(job);
            }
            QUEUE_DEPTH.set(0);
        }
    }

    pub fn state(&self) -> DispatcherState {
        if self.running.load(Ordering::SeqCst) {
            DispatcherState::Running
        } else {
            DispatcherState::Idle
        }
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn stats(&self) -> DispatcherStatsSnapshot {
        self.stats.snapshot()
    }

    pub fn templates(&self) -> &TemplateRegistry {
        &self.templates
    }

    pub fn delivery_log(&self) -> &Arc<DeliveryLog> {
        &self.log
    }

    /// Queue a notification for background delivery.
    ///
    /// Never waits on delivery. Fails only for an invalid request or after
    /// [`stop`](Self::stop); transport problems are handled (and logged) by the
    /// drain task.
    #[tracing::instrument(
        name = "dispatcher.enqueue",
        skip(self, request),
        fields(template = %request.template)
    )]
    pub fn enqueue(&self, request: NotificationRequest) -> Result<JobId, EnqueueError> {
        let max_attempts = request.validate(self.config.default_max_attempts)?;
        if self.stopped.load(Ordering::SeqCst) || self.queue.is_closed() {
            return Err(EnqueueError::Stopped);
        }

        let job = NotificationJob::new(request, max_attempts);
        let job_id = job.id.clone();

        self.log.record(LogEvent::Enqueued {
            job_id: job_id.clone(),
            destination: job.destination.clone(),
            template: job.template.clone(),
            max_attempts,
        });

        // Lost the race with stop()
        let depth = match self.queue.push_back(job) {
            Ok(depth) => depth,
            Err(job) => {
                tracing::warn!(job_id = %job_id, "Dispatcher stopped, job refused");
                self.record_dropped(job);
                return Err(EnqueueError::Stopped);
            }
        };
        QUEUE_DEPTH.set(depth as i64);
        JOBS_ENQUEUED_TOTAL.inc();
        self.stats.enqueued.fetch_add(1, Ordering::Relaxed);

        self.wake.notify_one();

        Ok(job_id)
    }

    /// Render and send one message right now, bypassing the queue.
    ///
    /// Single attempt, no retry. Meant for health checks.
    #[tracing::instrument(
        name = "dispatcher.send_now",
        skip(self, request),
        fields(template = %request.template)
    )]
    pub async fn send_now(
        &self,
        request: NotificationRequest,
    ) -> Result<SendReceipt, DirectSendError> {
        request.validate(1)?;

        let resolution = self
            .templates
            .render(&request.template, &request.subject, &request.context);
        self.note_resolution(&request.template, &resolution.kind);

        let result = self
            .guarded_send(&request.destination, &request.subject, &resolution.message)
            .await;

        let outcome = match &result {
            Ok(receipt) => format!("sent reference={}", receipt.reference.as_deref().unwrap_or("-")),
            Err(e) => format!("failed: {}", e),
        };
        self.log.record(LogEvent::DirectSend {
            destination: request.destination,
            template: request.template,
            outcome,
        });

        Ok(result?)
    }

    async fn run(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(
            transport = self.transport.name(),
            templates = self.templates.len(),
            "Notification dispatcher started"
        );

        let _running = RunningFlag(&self.running);

        loop {
            if self.queue.is_empty() {
                // Idle: park until the next enqueue
                tokio::select! {
                    _ = shutdown.recv() => break,
                    _ = self.wake.notified() => continue,
                }
            }

            self.running.store(true, Ordering::SeqCst);
            tracing::debug!(queued = self.queue.len(), "Dispatcher draining queue");

            tokio::select! {
                _ = shutdown.recv() => break,
                _ = self.drain() => {}
            }

            self.running.store(false, Ordering::SeqCst);
            tracing::debug!("Dispatcher idle");
        }

        let dropped = self.queue.close();
        QUEUE_DEPTH.set(0);
        if !dropped.is_empty() {
            tracing::warn!(
                dropped = dropped.len(),
                "Dispatcher stopped with undelivered jobs, they are discarded"
            );
        }
        for job in dropped {
            self.record_dropped(job);
        }

        tracing::info!("Notification dispatcher stopped");
    }

    /// Work through the queue until it is empty
    async fn drain(&self) {
        loop {
            let now = Instant::now();
            match self.queue.begin_attempt(now) {
                HeadState::Empty => return,
                HeadState::Waiting(until) => {
                    let wait = until.saturating_duration_since(now).min(self.config.poll_interval);
                    tokio::time::sleep(wait).await;
                }
                HeadState::Ready(job) => self.attempt(job).await,
            }
        }
    }

    #[tracing::instrument(
        name = "dispatcher.attempt",
        skip(self, job),
        fields(job_id = %job.id, attempt = job.attempts, max_attempts = job.max_attempts)
    )]
    async fn attempt(&self, job: NotificationJob) {
        let resolution = self.templates.render(&job.template, &job.subject, &job.context);
        self.note_resolution(&job.template, &resolution.kind);

        let timer = SEND_DURATION_SECONDS.start_timer();
        let result = self
            .guarded_send(&job.destination, &job.subject, &resolution.message)
            .await;
        timer.observe_duration();

        match result {
            Ok(receipt) => {
                let depth = self.queue.complete_head().map(|_| self.queue.len()).unwrap_or(0);
                QUEUE_DEPTH.set(depth as i64);
                JOBS_SENT_TOTAL.inc();
                self.stats.sent.fetch_add(1, Ordering::Relaxed);

                self.log.record(LogEvent::Sent {
                    job_id: job.id,
                    destination: job.destination,
                    subject: job.subject,
                    attempt: job.attempts,
                    reference: receipt.reference,
                });
            }
            Err(e) => {
                SEND_FAILURES_TOTAL.inc();
                self.stats.failed_attempts.fetch_add(1, Ordering::Relaxed);

                self.log.record(LogEvent::Error {
                    job_id: job.id.clone(),
                    destination: job.destination.clone(),
                    attempt: job.attempts,
                    max_attempts: job.max_attempts,
                    detail: e.to_string(),
                });

                let retry_at =
                    Instant::now() + backoff_delay(self.config.backoff_base_secs, job.attempts);

                match self.queue.fail_head(retry_at) {
                    Some(FailOutcome::Exhausted(exhausted)) => {
                        QUEUE_DEPTH.set(self.queue.len() as i64);
                        JOBS_GAVE_UP_TOTAL.inc();
                        self.stats.gave_up.fetch_add(1, Ordering::Relaxed);

                        self.log.record(LogEvent::GaveUp {
                            job_id: exhausted.id,
                            destination: exhausted.destination,
                            attempts: exhausted.attempts,
                        });
                    }
                    Some(FailOutcome::Retry { next_attempt_at }) => {
                        tracing::debug!(
                            retry_in_secs = next_attempt_at.saturating_duration_since(Instant::now()).as_secs(),
                            "Delivery failed, will retry"
                        );
                    }
                    None => {}
                }
            }
        }
    }

    /// Transport send with panics turned into an ordinary failure
    async fn guarded_send(
        &self,
        destination: &str,
        subject: &str,
        message: &RenderedMessage,
    ) -> Result<SendReceipt, TransportError> {
        AssertUnwindSafe(self.transport.send(destination, subject, message))
            .catch_unwind()
            .await
            .unwrap_or_else(|_| {
                tracing::error!(transport = self.transport.name(), "Transport panicked during send");
                Err(TransportError::Unavailable("transport panicked".to_string()))
            })
    }

    fn record_dropped(&self, job: NotificationJob) {
        self.log.record(LogEvent::Dropped {
            job_id: job.id,
            destination: job.destination,
            attempts: job.attempts,
        });
    }

    fn note_resolution(&self, requested: &str, kind: &ResolutionKind) {
        if !kind.is_fallback() {
            return;
        }

        TEMPLATE_FALLBACKS_TOTAL.with_label_values(&[kind.label()]).inc();
        self.stats.template_fallbacks.fetch_add(1, Ordering::Relaxed);

        let used = match kind {
            ResolutionKind::Alias { to, .. } => to.clone(),
            _ => "generic".to_string(),
        };
        self.log.record(LogEvent::TemplateFallback {
            template: requested.to_string(),
            used,
        });
    }
}

/// Clears the running flag however the drain loop ends
struct RunningFlag<'a>(&'a AtomicBool);

impl Drop for RunningFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::{BodyFormat, RenderedMessage, Template};
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingTransport {
        sent: Mutex<Vec<(String, RenderedMessage)>>,
    }

    #[async_trait]
    impl Transport for RecordingTransport {
        fn name(&self) -> &'static str {
            "recording"
        }

        async fn send(
            &self,
            destination: &str,
            _subject: &str,
            message: &RenderedMessage,
        ) -> Result<SendReceipt, TransportError> {
            self.sent
                .lock()
                .unwrap()
                .push((destination.to_string(), message.clone()));
            Ok(SendReceipt::with_reference("ref-1"))
        }
    }

    struct RefusingTransport;

    #[async_trait]
    impl Transport for RefusingTransport {
        fn name(&self) -> &'static str {
            "refusing"
        }

        async fn send(
            &self,
            _destination: &str,
            _subject: &str,
            _message: &RenderedMessage,
        ) -> Result<SendReceipt, TransportError> {
            Err(TransportError::Unavailable("connection refused".to_string()))
        }
    }

    fn dispatcher(transport: Arc<dyn Transport>) -> Arc<NotificationDispatcher> {
        let templates = TemplateRegistry::from_templates([Template::new(
            "welcome",
            BodyFormat::Text,
            "Hello {{name}}",
        )]);
        Arc::new(NotificationDispatcher::new(
            Arc::new(templates),
            transport,
            Arc::new(DeliveryLog::disabled()),
            DispatcherConfig::default(),
        ))
    }

    #[tokio::test]
    async fn test_enqueue_rejects_invalid_request() {
        let dispatcher = dispatcher(Arc::new(RecordingTransport::default()));
        let result = dispatcher.enqueue(NotificationRequest::new("", "Hi", "welcome"));
        assert_eq!(result, Err(EnqueueError::EmptyField("destination")));
        assert_eq!(dispatcher.queue_len(), 0);
    }

    #[tokio::test]
    async fn test_enqueue_without_start_only_queues() {
        let dispatcher = dispatcher(Arc::new(RecordingTransport::default()));
        dispatcher
            .enqueue(NotificationRequest::new("a@example.com", "Hi", "welcome"))
            .unwrap();
        assert_eq!(dispatcher.queue_len(), 1);
        assert_eq!(dispatcher.state(), DispatcherState::Idle);
        assert_eq!(dispatcher.stats().enqueued, 1);
    }

    #[tokio::test]
    async fn test_start_is_not_reentrant() {
        let dispatcher = dispatcher(Arc::new(RecordingTransport::default()));
        let handle = dispatcher.start();
        assert!(handle.is_some());
        assert!(dispatcher.start().is_none());

        dispatcher.stop();
        handle.unwrap().await.unwrap();
        assert!(dispatcher.start().is_none());
    }

    #[tokio::test]
    async fn test_send_now_renders_and_sends_once() {
        let transport = Arc::new(RecordingTransport::default());
        let dispatcher = dispatcher(transport.clone());

        let receipt = dispatcher
            .send_now(NotificationRequest::new("a@example.com", "Hi", "welcome").with("name", "Ada"))
            .await
            .unwrap();

        assert_eq!(receipt.reference.as_deref(), Some("ref-1"));
        let sent = transport.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].1.body, "Hello Ada");
        assert_eq!(dispatcher.queue_len(), 0);
    }

    #[tokio::test]
    async fn test_send_now_surfaces_transport_error() {
        let dispatcher = dispatcher(Arc::new(RefusingTransport));
        let err = dispatcher
            .send_now(NotificationRequest::new("a@example.com", "Hi", "welcome"))
            .await
            .unwrap_err();
        assert!(matches!(err, DirectSendError::Transport(TransportError::Unavailable(_))));
    }

    #[tokio::test]
    async fn test_stop_drops_queued_jobs_and_refuses_new_ones() {
        let dispatcher = dispatcher(Arc::new(RecordingTransport::default()));
        let mut feed = dispatcher.delivery_log().subscribe();
        let queued = dispatcher
            .enqueue(NotificationRequest::new("a@example.com", "Hi", "welcome"))
            .unwrap();

        dispatcher.stop();

        assert_eq!(dispatcher.queue_len(), 0);
        let result = dispatcher.enqueue(NotificationRequest::new("b@example.com", "Hi", "welcome"));
        assert_eq!(result, Err(EnqueueError::Stopped));
        assert_eq!(dispatcher.queue_len(), 0);

        assert_eq!(feed.try_recv().unwrap().event.kind(), "enqueued");
        match feed.try_recv().unwrap().event {
            LogEvent::Dropped { job_id, attempts, .. } => {
                assert_eq!(job_id, queued);
                assert_eq!(attempts, 0);
            }
            other => panic!("expected dropped, got {:?}", other),
        }
        assert!(feed.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_stop_while_running_logs_each_dropped_job() {
        let dispatcher = dispatcher(Arc::new(RefusingTransport));
        let mut feed = dispatcher.delivery_log().subscribe();
        for destination in ["a@example.com", "b@example.com"] {
            dispatcher
                .enqueue(NotificationRequest::new(destination, "Hi", "welcome"))
                .unwrap();
        }
        let handle = dispatcher.start().unwrap();

        // First attempt fails, the head then backs off for 2s
        loop {
            if feed.recv().await.unwrap().event.kind() == "error" {
                break;
            }
        }
        dispatcher.stop();
        handle.await.unwrap();

        let mut dropped = Vec::new();
        while let Ok(record) = feed.try_recv() {
            if let LogEvent::Dropped { destination, .. } = record.event {
                dropped.push(destination);
            }
        }
        assert_eq!(dropped, vec!["a@example.com", "b@example.com"]);
        assert_eq!(dispatcher.state(), DispatcherState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_job_is_attempted_max_times() {
        let dispatcher = dispatcher(Arc::new(RefusingTransport));
        let mut feed = dispatcher.delivery_log().subscribe();
        let handle = dispatcher.start().unwrap();

        dispatcher
            .enqueue(NotificationRequest::new("a@example.com", "Hi", "welcome").max_attempts(2))
            .unwrap();

        let mut kinds = Vec::new();
        while let Ok(record) = feed.recv().await {
            kinds.push(record.event.kind());
            if record.event.kind() == "gave up" {
                break;
            }
        }

        assert_eq!(kinds, vec!["enqueued", "error", "error", "gave up"]);
        assert_eq!(dispatcher.stats().failed_attempts, 2);
        assert_eq!(dispatcher.queue_len(), 0);

        dispatcher.stop();
        handle.await.unwrap();
    }
}
