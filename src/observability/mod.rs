//! Observability: structured logging and operational metrics
//!
//! Logging is tracing-based with JSON output by default; metrics are a
//! lightweight atomic collector served on the `/metrics` route.

pub mod logging;
pub mod metrics;

// Re-export for convenience
pub use logging::{init_default_logging, init_logging, LogFormat};
pub use metrics::{metrics, MetricsCollector, MetricsSnapshot};
