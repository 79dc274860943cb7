//! HTTP trigger surface tests, driven through the router without a socket.

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use jobboard_notification_service::config::Settings;
use jobboard_notification_service::delivery_log::DeliveryLog;
use jobboard_notification_service::server::{create_app, AppState};
use jobboard_notification_service::template::{RenderedMessage, TemplateRegistry};
use jobboard_notification_service::transport::{
    LogTransport, SendReceipt, Transport, TransportError,
};

struct DownTransport;

#[async_trait]
impl Transport for DownTransport {
    fn name(&self) -> &'static str {
        "down"
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

fn state_with(settings: Settings, transport: Arc<dyn Transport>) -> AppState {
    AppState::with_components(
        settings,
        Arc::new(TemplateRegistry::new()),
        transport,
        Arc::new(DeliveryLog::disabled()),
    )
}

fn app(state: AppState) -> Router {
    create_app(state)
}

async fn call(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn post(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_health() {
    let state = state_with(Settings::default(), Arc::new(LogTransport));
    let (status, body) = call(app(state), get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_enqueue_accepts_valid_request() {
    let state = state_with(Settings::default(), Arc::new(LogTransport));
    let dispatcher = state.dispatcher.clone();

    let (status, body) = call(
        app(state),
        post(
            "/api/v1/notifications/enqueue",
            json!({
                "destination": "ada@example.com",
                "subject": "Welcome",
                "template": "welcome",
                "context": {"name": "Ada"},
                "max_attempts": 5
            }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::ACCEPTED);
    assert!(body["job_id"].as_str().unwrap().contains('-'));
    assert_eq!(dispatcher.queue_len(), 1);
}

#[tokio::test]
async fn test_enqueue_rejects_empty_destination() {
    let state = state_with(Settings::default(), Arc::new(LogTransport));
    let (status, body) = call(
        app(state),
        post(
            "/api/v1/notifications/enqueue",
            json!({"destination": "", "subject": "Welcome", "template": "welcome"}),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_api_key_is_enforced_when_configured() {
    let mut settings = Settings::default();
    settings.api.key = Some("secret".to_string());
    let state = state_with(settings, Arc::new(LogTransport));
    let body = json!({"name": "Ada", "email": "ada@example.com"});

    let (status, _) = call(
        app(state.clone()),
        post("/api/v1/events/user-registered", body.clone()),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let mut request = post("/api/v1/events/user-registered", body);
    request
        .headers_mut()
        .insert("X-API-Key", "secret".parse().unwrap());
    let (status, _) = call(app(state.clone()), request).await;
    assert_eq!(status, StatusCode::ACCEPTED);

    // Operational endpoints stay public
    let (status, _) = call(app(state), get("/stats")).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_send_test_delivers_immediately() {
    let state = state_with(Settings::default(), Arc::new(LogTransport));
    let dispatcher = state.dispatcher.clone();

    let (status, body) = call(
        app(state),
        post(
            "/api/v1/notifications/send-test",
            json!({"destination": "ops@example.com"}),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert!(body["reference"].as_str().unwrap().starts_with("log-"));
    assert_eq!(dispatcher.queue_len(), 0);
}

#[tokio::test]
async fn test_send_test_reports_transport_failure() {
    let state = state_with(Settings::default(), Arc::new(DownTransport));
    let (status, body) = call(
        app(state),
        post(
            "/api/v1/notifications/send-test",
            json!({"destination": "ops@example.com"}),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"]["code"], "DELIVERY_FAILED");
}

#[tokio::test]
async fn test_application_created_enqueues_applicant_and_owner_jobs() {
    let state = state_with(Settings::default(), Arc::new(LogTransport));
    let dispatcher = state.dispatcher.clone();

    let (status, body) = call(
        app(state),
        post(
            "/api/v1/events/application-created",
            json!({
                "applicationId": "app-42",
                "applicantName": "Ada",
                "applicantEmail": "ada@example.com",
                "jobTitle": "Rust Engineer",
                "company": "Ferris Inc",
                "ownerEmail": "owner@example.com"
            }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::ACCEPTED);
    assert!(body["applicant"].is_string());
    assert!(body["owner"].is_string());
    assert_eq!(dispatcher.queue_len(), 2);
}

#[tokio::test]
async fn test_status_change_accepts_single_and_batch() {
    let state = state_with(Settings::default(), Arc::new(LogTransport));
    let dispatcher = state.dispatcher.clone();
    let change = |email: &str| {
        json!({
            "applicationId": "app-1",
            "applicantName": "Ada",
            "applicantEmail": email,
            "jobTitle": "Rust Engineer",
            "company": "Ferris Inc",
            "status": "interview"
        })
    };

    let (status, body) = call(
        app(state.clone()),
        post("/api/v1/events/application-status-changed", change("a@example.com")),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["enqueued"], 1);

    let (status, body) = call(
        app(state),
        post(
            "/api/v1/events/application-status-changed",
            json!([change("b@example.com"), change(""), change("c@example.com")]),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["enqueued"], 2);
    assert_eq!(body["rejected"], 1);
    assert!(body["results"][1]["error"].as_str().unwrap().contains("destination"));
    assert_eq!(dispatcher.queue_len(), 3);
}

#[tokio::test]
async fn test_stats_report_queue_and_state() {
    let state = state_with(Settings::default(), Arc::new(LogTransport));
    state
        .events
        .user_registered(&jobboard_notification_service::notification::events::UserRegistered {
            name: "Ada".to_string(),
            email: "ada@example.com".to_string(),
        })
        .unwrap();

    let (status, body) = call(app(state), get("/stats")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["dispatcher"]["state"], "idle");
    assert_eq!(body["dispatcher"]["queued"], 1);
    assert_eq!(body["notifications"]["enqueued"], 1);
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let state = state_with(Settings::default(), Arc::new(LogTransport));
    let response = app(state).oneshot(get("/metrics")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("jobboard_notify_queue_depth"));
}

#[tokio::test]
async fn test_template_listing() {
    let state = state_with(Settings::default(), Arc::new(LogTransport));
    let (status, body) = call(app(state), get("/api/v1/templates")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 0);
    assert_eq!(body["aliases"][0]["from"], "recruiterNewApplication");
    assert_eq!(body["aliases"][0]["active"], false);
}
