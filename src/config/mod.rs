mod settings;

pub use settings::{
    ApiConfig, DeliveryLogConfig, DispatcherSettings, MailConfig, OtelConfig, ServerConfig,
    Settings, TemplateConfig,
};
