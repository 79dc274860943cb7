//! Outbound mail transports.
//!
//! The dispatcher only sees the [`Transport`] trait. Two implementations ship
//! with the service:
//!
//! - [`SmtpTransport`]: real delivery through an SMTP relay (lettre)
//! - [`LogTransport`]: development transport that only logs the message
//!
//! Use [`create_transport`] to pick one from configuration.

mod smtp;

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::config::MailConfig;
use crate::template::RenderedMessage;

pub use smtp::SmtpTransport;

/// Failure reported by a transport. Every variant is retried identically.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("transport unavailable: {0}")]
    Unavailable(String),

    #[error("message rejected: {0}")]
    Rejected(String),

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("failed to build message: {0}")]
    Build(String),
}

/// Outcome of a successful send
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SendReceipt {
    /// Transport-provided message reference, if any
    pub reference: Option<String>,
}

impl SendReceipt {
    pub fn with_reference(reference: impl Into<String>) -> Self {
        Self {
            reference: Some(reference.into()),
        }
    }
}

/// Something that can deliver a rendered message to an address
#[async_trait]
pub trait Transport: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    async fn send(
        &self,
        destination: &str,
        subject: &str,
        message: &RenderedMessage,
    ) -> Result<SendReceipt, TransportError>;
}

/// Transport that writes messages to `tracing` instead of sending them
#[derive(Debug, Default)]
pub struct LogTransport;

#[async_trait]
impl Transport for LogTransport {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn send(
        &self,
        destination: &str,
        subject: &str,
        message: &RenderedMessage,
    ) -> Result<SendReceipt, TransportError> {
        let reference = format!("log-{}", chrono::Utc::now().timestamp_micros());
        tracing::info!(
            to = %destination,
            subject = %subject,
            format = ?message.format,
            body_len = message.body.len(),
            reference = %reference,
            "Mail captured by log transport"
        );
        tracing::debug!(body = %message.body, "Captured mail body");
        Ok(SendReceipt::with_reference(reference))
    }
}

/// Create a transport based on configuration.
///
/// - `"smtp"`: an [`SmtpTransport`] when `smtp_host` is set
/// - anything else: a [`LogTransport`]
pub fn create_transport(config: &MailConfig) -> Arc<dyn Transport> {
    match config.transport.as_str() {
        "smtp" => match SmtpTransport::from_config(config) {
            Ok(transport) => {
                tracing::info!(
                    transport = "smtp",
                    host = ?config.smtp_host,
                    port = config.smtp_port,
                    "Creating SMTP mail transport"
                );
                Arc::new(transport)
            }
            Err(e) => {
                tracing::warn!(error = %e, "SMTP transport requested but not usable, falling back to log transport");
                Arc::new(LogTransport)
            }
        },
        _ => {
            tracing::info!(transport = "log", "Creating log mail transport");
            Arc::new(LogTransport)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::BodyFormat;

    #[tokio::test]
    async fn test_log_transport_returns_reference() {
        let message = RenderedMessage {
            body: "hello".to_string(),
            format: BodyFormat::Text,
        };
        let receipt = LogTransport
            .send("ada@example.com", "Hi", &message)
            .await
            .unwrap();
        assert!(receipt.reference.unwrap().starts_with("log-"));
    }

    #[test]
    fn test_factory_falls_back_without_host() {
        let config = MailConfig {
            transport: "smtp".to_string(),
            smtp_host: None,
            ..Default::default()
        };
        assert_eq!(create_transport(&config).name(), "log");
    }

    #[test]
    fn test_factory_defaults_to_log() {
        assert_eq!(create_transport(&MailConfig::default()).name(), "log");
    }
}
