//! alpha-mirror application.
//!
//! Wires the store watcher, price poller and dashboard around one root
//! cancellation token:
//! - Store watcher: positions and indicator rows into latest-value caches
//! - Price poller: live prices while any position is open
//! - Dashboard: derivation, tally and view model over the caches

pub mod app;
pub mod config;
pub mod error;

pub use app::{track_open_instruments, Application};
pub use config::{AppConfig, TelemetryConfig};
pub use error::{AppError, AppResult};
