//! Prometheus metrics and structured logging for alpha-mirror.
//!
//! - Structured logging with tracing (JSON in production, pretty otherwise)
//! - Prometheus metrics for the price poller, providers, store and commands
//! - Text exposition for the dashboard `/metrics` route

pub mod error;
pub mod logging;
pub mod metrics;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::{init_logging, DEFAULT_FILTER};
pub use metrics::{render_metrics, Metrics};
