use axum::{extract::State, http::StatusCode, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::notification::events::{
    ApplicationCreated, ApplicationJobs, ApplicationStatusChanged, PasswordResetRequested,
    UserRegistered,
};
use crate::notification::{Context, DirectSendError, JobId, NotificationRequest};
use crate::server::AppState;

/// Accepted job
#[derive(Debug, Serialize)]
pub struct EnqueueResponse {
    pub job_id: JobId,
    pub timestamp: DateTime<Utc>,
}

impl EnqueueResponse {
    fn new(job_id: JobId) -> Self {
        Self {
            job_id,
            timestamp: Utc::now(),
        }
    }
}

/// Request for an immediate, unqueued send
#[derive(Debug, Deserialize)]
pub struct SendTestRequest {
    pub destination: String,
    #[serde(default = "default_test_subject")]
    pub subject: String,
    #[serde(default = "default_test_template")]
    pub template: String,
    #[serde(default)]
    pub context: Context,
}

fn default_test_subject() -> String {
    "Job board mail test".to_string()
}

fn default_test_template() -> String {
    "mailTest".to_string()
}

#[derive(Debug, Serialize)]
pub struct SendTestResponse {
    pub success: bool,
    pub reference: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// A single item or a batch
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

impl<T> OneOrMany<T> {
    fn into_vec(self) -> Vec<T> {
        match self {
            OneOrMany::Many(items) => items,
            OneOrMany::One(item) => vec![item],
        }
    }
}

#[derive(Debug, Serialize)]
pub struct StatusChangeResponse {
    pub results: Vec<StatusChangeResult>,
    pub enqueued: usize,
    pub rejected: usize,
}

#[derive(Debug, Serialize)]
pub struct StatusChangeResult {
    pub application_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<JobId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// POST /api/v1/notifications/enqueue
pub async fn enqueue_notification(
    State(state): State<AppState>,
    Json(request): Json<NotificationRequest>,
) -> Result<(StatusCode, Json<EnqueueResponse>)> {
    let job_id = state.dispatcher.enqueue(request)?;
    Ok((StatusCode::ACCEPTED, Json(EnqueueResponse::new(job_id))))
}

/// POST /api/v1/notifications/send-test
pub async fn send_test_notification(
    State(state): State<AppState>,
    Json(request): Json<SendTestRequest>,
) -> Result<Json<SendTestResponse>> {
    let notification = NotificationRequest::new(request.destination, request.subject, request.template)
        .context(request.context);

    match state.dispatcher.send_now(notification).await {
        Ok(receipt) => Ok(Json(SendTestResponse {
            success: true,
            reference: receipt.reference,
            timestamp: Utc::now(),
        })),
        Err(DirectSendError::Invalid(e)) => Err(e.into()),
        Err(DirectSendError::Transport(e)) => Err(AppError::Delivery(e.to_string())),
    }
}

/// POST /api/v1/events/user-registered
pub async fn user_registered(
    State(state): State<AppState>,
    Json(event): Json<UserRegistered>,
) -> Result<(StatusCode, Json<EnqueueResponse>)> {
    let job_id = state.events.user_registered(&event)?;
    Ok((StatusCode::ACCEPTED, Json(EnqueueResponse::new(job_id))))
}

/// POST /api/v1/events/password-reset
pub async fn password_reset(
    State(state): State<AppState>,
    Json(event): Json<PasswordResetRequested>,
) -> Result<(StatusCode, Json<EnqueueResponse>)> {
    let job_id = state.events.password_reset_requested(&event)?;
    Ok((StatusCode::ACCEPTED, Json(EnqueueResponse::new(job_id))))
}

/// POST /api/v1/events/application-created
pub async fn application_created(
    State(state): State<AppState>,
    Json(event): Json<ApplicationCreated>,
) -> (StatusCode, Json<ApplicationJobs>) {
    let jobs = state.events.application_created(&event);
    (StatusCode::ACCEPTED, Json(jobs))
}

/// POST /api/v1/events/application-status-changed
pub async fn application_status_changed(
    State(state): State<AppState>,
    Json(events): Json<OneOrMany<ApplicationStatusChanged>>,
) -> (StatusCode, Json<StatusChangeResponse>) {
    let events = events.into_vec();
    let results: Vec<StatusChangeResult> = state
        .events
        .application_status_changed_batch(&events)
        .into_iter()
        .zip(&events)
        .map(|(result, event)| match result {
            Ok(job_id) => StatusChangeResult {
                application_id: event.application_id.clone(),
                job_id: Some(job_id),
                error: None,
            },
            Err(e) => StatusChangeResult {
                application_id: event.application_id.clone(),
                job_id: None,
                error: Some(e.to_string()),
            },
        })
        .collect();

    let enqueued = results.iter().filter(|r| r.job_id.is_some()).count();
    let rejected = results.len() - enqueued;

    (
        StatusCode::ACCEPTED,
        Json(StatusChangeResponse {
            results,
            enqueued,
            rejected,
        }),
    )
}
