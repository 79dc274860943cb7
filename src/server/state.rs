use std::sync::Arc;

use crate::config::Settings;
use crate::delivery_log::DeliveryLog;
use crate::notification::{DispatcherConfig, JobBoardEvents, NotificationDispatcher};
use crate::template::TemplateRegistry;
use crate::transport::{create_transport, Transport};

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub dispatcher: Arc<NotificationDispatcher>,
    pub events: JobBoardEvents,
}

impl AppState {
    /// Build every component from settings. The dispatcher is not started.
    pub fn new(settings: Settings) -> Self {
        let templates = Arc::new(TemplateRegistry::load_dir(&settings.templates.dir));
        let transport = create_transport(&settings.mail);
        let log = Arc::new(DeliveryLog::open(&settings.delivery_log.path));

        Self::with_components(settings, templates, transport, log)
    }

    /// Build state around explicitly provided components
    pub fn with_components(
        settings: Settings,
        templates: Arc<TemplateRegistry>,
        transport: Arc<dyn Transport>,
        log: Arc<DeliveryLog>,
    ) -> Self {
        let dispatcher = Arc::new(NotificationDispatcher::new(
            templates,
            transport,
            log,
            DispatcherConfig::from(&settings.dispatcher),
        ));

        Self {
            settings: Arc::new(settings),
            events: JobBoardEvents::new(dispatcher.clone()),
            dispatcher,
        }
    }
}
