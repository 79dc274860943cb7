//! Job-board business events that trigger notifications.
//!
//! Request handlers call these after the originating operation has
//! succeeded. They only enqueue; a rejected request is logged and returned,
//! and callers must not fail the business operation because of it.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::{EnqueueError, JobId, NotificationDispatcher, NotificationRequest};

pub const TEMPLATE_WELCOME: &str = "welcome";
pub const TEMPLATE_PASSWORD_RESET: &str = "passwordReset";
pub const TEMPLATE_APPLICATION_CONFIRMATION: &str = "applicationConfirmation";
/// Legacy name, resolved to `applicationReceived` by the template registry
pub const TEMPLATE_RECRUITER_NEW_APPLICATION: &str = "recruiterNewApplication";
pub const TEMPLATE_STATUS_UPDATE: &str = "applicationStatusUpdate";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRegistered {
    pub name: String,
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PasswordResetRequested {
    pub email: String,
    pub reset_link: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationCreated {
    pub application_id: String,
    pub applicant_name: String,
    pub applicant_email: String,
    pub job_title: String,
    pub company: String,
    pub owner_email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationStatusChanged {
    pub application_id: String,
    pub applicant_name: String,
    pub applicant_email: String,
    pub job_title: String,
    pub company: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Jobs enqueued for a new application
#[derive(Debug, Clone, Serialize)]
pub struct ApplicationJobs {
    pub applicant: Option<JobId>,
    pub owner: Option<JobId>,
}

/// Notification triggers for the job board's business operations
#[derive(Clone)]
pub struct JobBoardEvents {
    dispatcher: Arc<NotificationDispatcher>,
}

impl JobBoardEvents {
    pub fn new(dispatcher: Arc<NotificationDispatcher>) -> Self {
        Self { dispatcher }
    }

    /// Welcome message after registration
    pub fn user_registered(&self, event: &UserRegistered) -> Result<JobId, EnqueueError> {
        let request = NotificationRequest::new(
            &event.email,
            "Welcome to the job board",
            TEMPLATE_WELCOME,
        )
        .with("name", event.name.as_str())
        .with("email", event.email.as_str());

        self.submit("user_registered", request)
    }

    /// Reset-link message after a password reset request
    pub fn password_reset_requested(
        &self,
        event: &PasswordResetRequested,
    ) -> Result<JobId, EnqueueError> {
        let request = NotificationRequest::new(
            &event.email,
            "Reset your password",
            TEMPLATE_PASSWORD_RESET,
        )
        .with("name", event.name.clone().unwrap_or_default())
        .with("resetLink", event.reset_link.as_str());

        self.submit("password_reset_requested", request)
    }

    /// Confirmation to the applicant and a heads-up to the job owner.
    ///
    /// The two jobs are independent: a rejected one does not prevent the other.
    pub fn application_created(&self, event: &ApplicationCreated) -> ApplicationJobs {
        let applicant = NotificationRequest::new(
            &event.applicant_email,
            format!("Application received: {}", event.job_title),
            TEMPLATE_APPLICATION_CONFIRMATION,
        )
        .with("applicantName", event.applicant_name.as_str())
        .with("jobTitle", event.job_title.as_str())
        .with("company", event.company.as_str())
        .with("applicationId", event.application_id.as_str());

        let owner = NotificationRequest::new(
            &event.owner_email,
            format!("New application for {}", event.job_title),
            TEMPLATE_RECRUITER_NEW_APPLICATION,
        )
        .with("applicantName", event.applicant_name.as_str())
        .with("applicantEmail", event.applicant_email.as_str())
        .with("jobTitle", event.job_title.as_str())
        .with("company", event.company.as_str())
        .with("applicationId", event.application_id.as_str());

        ApplicationJobs {
            applicant: self.submit("application_created", applicant).ok(),
            owner: self.submit("application_created", owner).ok(),
        }
    }

    /// Status-update message to the applicant
    pub fn application_status_changed(
        &self,
        event: &ApplicationStatusChanged,
    ) -> Result<JobId, EnqueueError> {
        let request = NotificationRequest::new(
            &event.applicant_email,
            format!("Update on your application for {}", event.job_title),
            TEMPLATE_STATUS_UPDATE,
        )
        .with("applicantName", event.applicant_name.as_str())
        .with("jobTitle", event.job_title.as_str())
        .with("company", event.company.as_str())
        .with("status", event.status.as_str())
        .with("note", event.note.clone().unwrap_or_default())
        .with("applicationId", event.application_id.as_str());

        self.submit("application_status_changed", request)
    }

    /// One status-update job per change, enqueued in the given order
    pub fn application_status_changed_batch(
        &self,
        events: &[ApplicationStatusChanged],
    ) -> Vec<Result<JobId, EnqueueError>> {
        events
            .iter()
            .map(|event| self.application_status_changed(event))
            .collect()
    }

    fn submit(
        &self,
        trigger: &'static str,
        request: NotificationRequest,
    ) -> Result<JobId, EnqueueError> {
        let template = request.template.clone();
        self.dispatcher.enqueue(request).inspect_err(|e| {
            tracing::warn!(
                trigger = trigger,
                template = %template,
                error = %e,
                "Notification not enqueued"
            );
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delivery_log::DeliveryLog;
    use crate::notification::DispatcherConfig;
    use crate::template::TemplateRegistry;
    use crate::transport::LogTransport;

    fn events() -> (JobBoardEvents, Arc<NotificationDispatcher>) {
        let dispatcher = Arc::new(NotificationDispatcher::new(
            Arc::new(TemplateRegistry::new()),
            Arc::new(LogTransport),
            Arc::new(DeliveryLog::disabled()),
            DispatcherConfig::default(),
        ));
        (JobBoardEvents::new(dispatcher.clone()), dispatcher)
    }

    fn status_change(email: &str) -> ApplicationStatusChanged {
        ApplicationStatusChanged {
            application_id: "app-1".to_string(),
            applicant_name: "Ada".to_string(),
            applicant_email: email.to_string(),
            job_title: "Rust Engineer".to_string(),
            company: "Ferris Inc".to_string(),
            status: "shortlisted".to_string(),
            note: None,
        }
    }

    #[tokio::test]
    async fn test_application_created_enqueues_two_jobs() {
        let (events, dispatcher) = events();
        let jobs = events.application_created(&ApplicationCreated {
            application_id: "app-1".to_string(),
            applicant_name: "Ada".to_string(),
            applicant_email: "ada@example.com".to_string(),
            job_title: "Rust Engineer".to_string(),
            company: "Ferris Inc".to_string(),
            owner_email: "owner@example.com".to_string(),
        });

        assert!(jobs.applicant.is_some());
        assert!(jobs.owner.is_some());
        assert_eq!(dispatcher.queue_len(), 2);
    }

    #[tokio::test]
    async fn test_missing_owner_email_still_confirms_applicant() {
        let (events, dispatcher) = events();
        let jobs = events.application_created(&ApplicationCreated {
            application_id: "app-1".to_string(),
            applicant_name: "Ada".to_string(),
            applicant_email: "ada@example.com".to_string(),
            job_title: "Rust Engineer".to_string(),
            company: "Ferris Inc".to_string(),
            owner_email: String::new(),
        });

        assert!(jobs.applicant.is_some());
        assert!(jobs.owner.is_none());
        assert_eq!(dispatcher.queue_len(), 1);
    }

    #[tokio::test]
    async fn test_status_batch_reports_each_change() {
        let (events, dispatcher) = events();
        let results = events.application_status_changed_batch(&[
            status_change("a@example.com"),
            status_change(""),
            status_change("c@example.com"),
        ]);

        assert!(results[0].is_ok());
        assert_eq!(results[1], Err(EnqueueError::EmptyField("destination")));
        assert!(results[2].is_ok());
        assert_eq!(dispatcher.queue_len(), 2);
    }

    #[tokio::test]
    async fn test_user_registered_uses_welcome_template() {
        let (events, dispatcher) = events();
        events
            .user_registered(&UserRegistered {
                name: "Ada".to_string(),
                email: "ada@example.com".to_string(),
            })
            .unwrap();
        assert_eq!(dispatcher.stats().enqueued, 1);
    }
}
