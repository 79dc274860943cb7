// Shared infrastructure
pub mod config;
pub mod error;
pub mod metrics;
pub mod telemetry;

// Notification core
pub mod delivery_log;
pub mod notification;
pub mod queue;
pub mod template;
pub mod transport;

// HTTP surface
pub mod api;
pub mod server;
pub mod triggers;
