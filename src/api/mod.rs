//! API layer - HTTP endpoint handlers.

mod health;
mod metrics;
mod routes;
mod template;

pub use health::{health, stats};
pub use metrics::prometheus_metrics;
pub use routes::{api_routes, public_routes};
pub use template::list_templates;
