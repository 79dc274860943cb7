use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub dispatcher: DispatcherSettings,
    #[serde(default)]
    pub templates: TemplateConfig,
    #[serde(default)]
    pub delivery_log: DeliveryLogConfig,
    #[serde(default)]
    pub mail: MailConfig,
    #[serde(default)]
    pub otel: OtelConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiConfig {
    pub key: Option<String>,
}

/// Retry and scheduling knobs for the notification dispatcher
#[derive(Debug, Clone, Deserialize)]
pub struct DispatcherSettings {
    /// Attempts allowed when a caller does not specify its own ceiling
    #[serde(default = "default_max_attempts")]
    pub default_max_attempts: u32,
    /// Upper bound on a single sleep while the head job waits out its backoff
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Base of the exponential backoff, in seconds
    #[serde(default = "default_backoff_base_secs")]
    pub backoff_base_secs: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_backoff_base_secs() -> u64 {
    2
}

#[derive(Debug, Clone, Deserialize)]
pub struct TemplateConfig {
    #[serde(default = "default_template_dir")]
    pub dir: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeliveryLogConfig {
    #[serde(default = "default_delivery_log_path")]
    pub path: String,
}

/// Outbound mail settings
#[derive(Debug, Clone, Deserialize)]
pub struct MailConfig {
    /// "smtp" or "log"
    #[serde(default = "default_mail_transport")]
    pub transport: String,
    #[serde(default = "default_mail_from")]
    pub from: String,
    pub smtp_host: Option<String>,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    pub smtp_username: Option<String>,
    pub smtp_password: Option<String>,
    #[serde(default = "default_starttls")]
    pub starttls: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OtelConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_otel_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_otel_service_name")]
    pub service_name: String,
    #[serde(default = "default_sampling_ratio")]
    pub sampling_ratio: f64,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8082
}

fn default_template_dir() -> String {
    "templates/emails".to_string()
}

fn default_delivery_log_path() -> String {
    "logs/notifications.log".to_string()
}

fn default_mail_transport() -> String {
    "log".to_string()
}

fn default_mail_from() -> String {
    "Job Board <no-reply@jobboard.local>".to_string()
}

fn default_smtp_port() -> u16 {
    587
}

fn default_starttls() -> bool {
    true
}

fn default_otel_endpoint() -> String {
    "http://localhost:4317".to_string()
}

fn default_otel_service_name() -> String {
    "jobboard-notification-service".to_string()
}

fn default_sampling_ratio() -> f64 {
    1.0
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        // Load .env file if exists
        let _ = dotenvy::dotenv();

        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let builder = Config::builder()
            .set_default("server.host", default_host())?
            .set_default("server.port", default_port() as i64)?
            .set_default("dispatcher.default_max_attempts", default_max_attempts() as i64)?
            .set_default("dispatcher.poll_interval_ms", default_poll_interval_ms() as i64)?
            .set_default("dispatcher.backoff_base_secs", default_backoff_base_secs() as i64)?
            .set_default("templates.dir", default_template_dir())?
            .set_default("delivery_log.path", default_delivery_log_path())?
            .set_default("mail.transport", default_mail_transport())?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // SERVER__PORT, MAIL__SMTP_HOST, DISPATCHER__POLL_INTERVAL_MS, ...
            .add_source(
                Environment::default()
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for DispatcherSettings {
    fn default() -> Self {
        Self {
            default_max_attempts: default_max_attempts(),
            poll_interval_ms: default_poll_interval_ms(),
            backoff_base_secs: default_backoff_base_secs(),
        }
    }
}

impl Default for TemplateConfig {
    fn default() -> Self {
        Self {
            dir: default_template_dir(),
        }
    }
}

impl Default for DeliveryLogConfig {
    fn default() -> Self {
        Self {
            path: default_delivery_log_path(),
        }
    }
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            transport: default_mail_transport(),
            from: default_mail_from(),
            smtp_host: None,
            smtp_port: default_smtp_port(),
            smtp_username: None,
            smtp_password: None,
            starttls: default_starttls(),
        }
    }
}

impl Default for OtelConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: default_otel_endpoint(),
            service_name: default_otel_service_name(),
            sampling_ratio: default_sampling_ratio(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let server = ServerConfig::default();
        assert_eq!(server.host, "0.0.0.0");
        assert_eq!(server.port, 8082);
    }

    #[test]
    fn test_dispatcher_defaults() {
        let dispatcher = DispatcherSettings::default();
        assert_eq!(dispatcher.default_max_attempts, 3);
        assert_eq!(dispatcher.backoff_base_secs, 2);
        assert_eq!(dispatcher.poll_interval_ms, 1000);
    }

    #[test]
    fn test_mail_defaults_to_log_transport() {
        let mail = MailConfig::default();
        assert_eq!(mail.transport, "log");
        assert!(mail.smtp_host.is_none());
        assert_eq!(mail.smtp_port, 587);
    }

    #[test]
    fn test_deserialize_partial_settings() {
        let settings: Settings = Config::builder()
            .set_override("mail.transport", "smtp")
            .unwrap()
            .set_override("mail.smtp_host", "smtp.example.com")
            .unwrap()
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(settings.mail.transport, "smtp");
        assert_eq!(settings.mail.smtp_host.as_deref(), Some("smtp.example.com"));
        assert_eq!(settings.templates.dir, "templates/emails");
        assert!(!settings.otel.enabled);
    }
}
