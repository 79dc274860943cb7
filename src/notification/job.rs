use std::fmt;

use chrono::{DateTime, Utc};
use rand::distr::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::time::Instant;

/// Ordered key/value data handed verbatim to the template resolver
pub type Context = Map<String, Value>;

/// Length of the random suffix of a job id
const ID_SUFFIX_LEN: usize = 8;

/// Rejection of an enqueue request. This is the only error callers ever see.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EnqueueError {
    #[error("{0} must not be empty")]
    EmptyField(&'static str),

    #[error("max_attempts must be at least 1, got {0}")]
    InvalidMaxAttempts(u32),

    #[error("dispatcher is stopped")]
    Stopped,
}

/// Process-unique job identifier: `<unix millis>-<random suffix>`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    pub fn generate() -> Self {
        let suffix: String = rand::rng()
            .sample_iter(&Alphanumeric)
            .take(ID_SUFFIX_LEN)
            .map(char::from)
            .collect();
        Self(format!("{}-{}", Utc::now().timestamp_millis(), suffix))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for JobId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// A caller's request to send one templated message
#[derive(Debug, Clone, Deserialize)]
pub struct NotificationRequest {
    pub destination: String,
    pub subject: String,
    pub template: String,
    #[serde(default)]
    pub context: Context,
    #[serde(default)]
    pub max_attempts: Option<u32>,
}

impl NotificationRequest {
    pub fn new(
        destination: impl Into<String>,
        subject: impl Into<String>,
        template: impl Into<String>,
    ) -> Self {
        Self {
            destination: destination.into(),
            subject: subject.into(),
            template: template.into(),
            context: Context::new(),
            max_attempts: None,
        }
    }

    /// Replace the whole context
    pub fn context(mut self, context: Context) -> Self {
        self.context = context;
        self
    }

    /// Set the context from a serializable value.
    ///
    /// Non-object values are stored under the `data` key.
    pub fn context_from<T: Serialize>(mut self, value: &T) -> Result<Self, serde_json::Error> {
        self.context = match serde_json::to_value(value)? {
            Value::Object(map) => map,
            other => {
                let mut map = Context::new();
                map.insert("data".to_string(), other);
                map
            }
        };
        Ok(self)
    }

    /// Add a single context entry, keeping insertion order
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    pub fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    /// Check the request and return the effective attempt ceiling
    pub fn validate(&self, default_max_attempts: u32) -> Result<u32, EnqueueError> {
        if self.destination.trim().is_empty() {
            return Err(EnqueueError::EmptyField("destination"));
        }
        if self.subject.trim().is_empty() {
            return Err(EnqueueError::EmptyField("subject"));
        }
        if self.template.trim().is_empty() {
            return Err(EnqueueError::EmptyField("template"));
        }

        match self.max_attempts {
            Some(0) => Err(EnqueueError::InvalidMaxAttempts(0)),
            Some(n) => Ok(n),
            None => Ok(default_max_attempts.max(1)),
        }
    }
}

/// A pending notification owned by the job queue
#[derive(Debug, Clone)]
pub struct NotificationJob {
    pub id: JobId,
    pub destination: String,
    pub subject: String,
    pub template: String,
    pub context: Context,
    /// Delivery attempts made so far
    pub attempts: u32,
    pub max_attempts: u32,
    /// The job must not be tried before this instant
    pub next_attempt_at: Instant,
    pub enqueued_at: DateTime<Utc>,
}

impl NotificationJob {
    /// Build a fresh job from an already validated request
    pub fn new(request: NotificationRequest, max_attempts: u32) -> Self {
        Self {
            id: JobId::generate(),
            destination: request.destination,
            subject: request.subject,
            template: request.template,
            context: request.context,
            attempts: 0,
            max_attempts,
            next_attempt_at: Instant::now(),
            enqueued_at: Utc::now(),
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.attempts >= self.max_attempts
    }
}
