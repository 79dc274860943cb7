mod http;

pub use http::{
    application_created, application_status_changed, enqueue_notification, password_reset,
    send_test_notification, user_registered, EnqueueResponse, OneOrMany, SendTestRequest,
    SendTestResponse, StatusChangeResponse,
};
