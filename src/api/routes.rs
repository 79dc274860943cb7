use axum::{
    routing::{get, post},
    Router,
};

use crate::server::AppState;
use crate::triggers::{
    application_created, application_status_changed, enqueue_notification, password_reset,
    send_test_notification, user_registered,
};

use super::health::{health, stats};
use super::metrics::prometheus_metrics;
use super::template::list_templates;

/// Unauthenticated operational endpoints
pub fn public_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/stats", get(stats))
        .route("/metrics", get(prometheus_metrics))
}

/// Trigger endpoints, guarded by the API key middleware
pub fn api_routes() -> Router<AppState> {
    Router::new().nest(
        "/api/v1",
        Router::new()
            // Generic
            .route("/notifications/enqueue", post(enqueue_notification))
            .route("/notifications/send-test", post(send_test_notification))
            .route("/templates", get(list_templates))
            // Job board events
            .route("/events/user-registered", post(user_registered))
            .route("/events/password-reset", post(password_reset))
            .route("/events/application-created", post(application_created))
            .route(
                "/events/application-status-changed",
                post(application_status_changed),
            ),
    )
}
