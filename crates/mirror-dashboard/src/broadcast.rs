//! WebSocket broadcast functionality.
//!
//! Recomputes the view whenever one of the input caches changes and on a
//! fixed refresh tick, and fans the result out to every connected client.

use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::state::DashboardState;
use crate::types::DashboardMessage;

/// Run the broadcaster task until cancelled.
pub async fn run_broadcaster(
    state: DashboardState,
    tx: broadcast::Sender<String>,
    refresh: Duration,
    cancel: CancellationToken,
) {
    let mut inputs = state.inputs();
    let mut interval = tokio::time::interval(refresh);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {}
            Ok(()) = inputs.positions.changed() => trace!("positions changed"),
            Ok(()) = inputs.indicators.changed() => trace!("indicators changed"),
            Ok(()) = inputs.prices.changed() => trace!("prices changed"),
        }

        let msg = DashboardMessage::Update(state.collect_snapshot());
        match serde_json::to_string(&msg) {
            Ok(json) => {
                // Ignore errors (no receivers connected)
                match tx.send(json) {
                    Ok(n) => trace!(receivers = n, "Broadcast update sent"),
                    Err(_) => trace!("No WebSocket receivers connected"),
                }
            }
            Err(e) => {
                debug!(error = %e, "Failed to serialize dashboard update");
            }
        }
    }

    debug!("Dashboard broadcaster stopped");
}
