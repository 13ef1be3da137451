//! API layer
//!
//! HTTP handlers for:
//! - Actor documents and collections (ActivityPub + HTML)
//! - Shared inbox (federation)
//! - WebFinger
//! - Metrics (Prometheus)

mod actors;
mod inbox;
pub mod metrics;
mod wellknown;

pub use actors::actors_router;
pub use inbox::inbox_router;
pub use metrics::metrics_router;
pub use wellknown::wellknown_router;
