//! API layer - HTTP endpoint handlers.

mod conversations;
mod health;
mod metrics;
mod routes;

pub use conversations::{create_conversation, get_conversation, list_conversations};
pub use health::{health, stats};
pub use metrics::prometheus_metrics;
pub use routes::api_routes;
