//! mirror-dashboard - operator view of the agent's derived state.
//!
//! - REST API for the current view model and operator close requests
//! - WebSocket for updates on every input change and refresh tick
//! - `/metrics` and `/health` for scraping and liveness
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      alpha-mirror process                      │
//! │                                                                │
//! │  ┌──────────────┐  ┌────────────────┐  ┌──────────────────┐    │
//! │  │ positions    │  │ indicator book │  │ live prices      │    │
//! │  │ (watch)      │  │ (watch)        │  │ (watch, poller)  │    │
//! │  └──────┬───────┘  └───────┬────────┘  └────────┬─────────┘    │
//! │         └──────────────────┼────────────────────┘              │
//! │                            ▼                                   │
//! │  ┌──────────────────────────────────────────────────────────┐  │
//! │  │  DashboardState::collect_snapshot (derive + tally + view) │  │
//! │  └─────────────────────────┬────────────────────────────────┘  │
//! │                            ▼                                   │
//! │  ┌──────────────────────────────────────────────────────────┐  │
//! │  │  axum HTTP Server                                        │  │
//! │  │  GET  /api/snapshot              → JSON view model       │  │
//! │  │  GET  /ws                        → WebSocket updates     │  │
//! │  │  POST /api/positions/{id}/close  → close command         │  │
//! │  │  GET  /metrics, /health                                  │  │
//! │  └──────────────────────────────────────────────────────────┘  │
//! └────────────────────────────────────────────────────────────────┘
//! ```

mod broadcast;
mod commands;
mod config;
mod error;
mod server;
mod state;
mod types;
pub mod view;

pub use broadcast::run_broadcaster;
pub use commands::{CloseMarker, CloseTracker};
pub use config::DashboardConfig;
pub use error::{DashboardError, DashboardResult};
pub use server::{create_router, run_server, AppState, ConnectionGuard, ConnectionLimiter};
pub use state::{DashboardInputs, DashboardState, ViewSettings};
pub use types::{
    CloseAccepted, DashboardMessage, DashboardSnapshot, FeedStatus, PairView, PortfolioTotals,
    PositionView, RangeBar,
};
