//! Persistence surface access for alpha-mirror.
//!
//! - [`StoreClient`]: reads open positions and indicator rows, writes
//!   operator commands
//! - [`StoreWatcher`]: polls the store into latest-value caches

pub mod client;
pub mod config;
pub mod error;
pub mod watcher;

pub use client::{CommandRecord, CommandSink, SnapshotSource, StoreClient};
pub use config::StoreConfig;
pub use error::{StoreError, StoreResult};
pub use watcher::{open_instruments, PositionsCache, StoreCaches, StoreWatcher};
