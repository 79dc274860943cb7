use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use crate::config::MailConfig;
use crate::template::{BodyFormat, RenderedMessage};

use super::{SendReceipt, Transport, TransportError};

/// SMTP relay transport
pub struct SmtpTransport {
    inner: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpTransport {
    pub fn from_config(config: &MailConfig) -> Result<Self, TransportError> {
        let host = config
            .smtp_host
            .as_deref()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| TransportError::Build("mail.smtp_host is not set".to_string()))?;

        let from: Mailbox = config
            .from
            .parse()
            .map_err(|e| TransportError::InvalidAddress(format!("{}: {}", config.from, e)))?;

        let mut builder = if config.starttls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
                .map_err(|e| TransportError::Build(e.to_string()))?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host)
        };
        builder = builder.port(config.smtp_port);

        if let (Some(username), Some(password)) = (&config.smtp_username, &config.smtp_password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        Ok(Self {
            inner: builder.build(),
            from,
        })
    }

    fn build_message(
        &self,
        destination: &str,
        subject: &str,
        message: &RenderedMessage,
    ) -> Result<Message, TransportError> {
        let to: Mailbox = destination
            .parse()
            .map_err(|e| TransportError::InvalidAddress(format!("{}: {}", destination, e)))?;

        let content_type = match message.format {
            BodyFormat::Html => ContentType::TEXT_HTML,
            BodyFormat::Text => ContentType::TEXT_PLAIN,
        };

        Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(subject)
            .header(content_type)
            .body(message.body.clone())
            .map_err(|e| TransportError::Build(e.to_string()))
    }
}

#[async_trait]
impl Transport for SmtpTransport {
    fn name(&self) -> &'static str {
        "smtp"
    }

    async fn send(
        &self,
        destination: &str,
        subject: &str,
        message: &RenderedMessage,
    ) -> Result<SendReceipt, TransportError> {
        let email = self.build_message(destination, subject, message)?;

        match self.inner.send(email).await {
            Ok(response) => Ok(SendReceipt {
                reference: response.first_line().map(str::to_string),
            }),
            Err(e) if e.is_permanent() => Err(TransportError::Rejected(e.to_string())),
            Err(e) => Err(TransportError::Unavailable(e.to_string())),
        }
    }
}
