//! Latest-value caches fed from the persistence surface.
//!
//! Positions and indicator rows are polled on independent cadences. A
//! failed fetch is logged and the previous value stays published.

use std::sync::Arc;
use std::time::Duration;

use mirror_core::{IndicatorBook, Instrument, Position};
use mirror_telemetry::Metrics;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::SnapshotSource;

/// Published open-position list.
///
/// `None` until the first successful fetch.
pub type PositionsCache = Option<Arc<Vec<Position>>>;

/// Receivers for the store-fed caches.
#[derive(Clone)]
pub struct StoreCaches {
    pub positions: watch::Receiver<PositionsCache>,
    pub indicators: watch::Receiver<Arc<IndicatorBook>>,
}

/// Polls a [`SnapshotSource`] and publishes the results.
pub struct StoreWatcher {
    source: Arc<dyn SnapshotSource>,
    positions_interval: Duration,
    indicators_interval: Duration,
    indicator_max_age: Option<Duration>,
    positions_tx: watch::Sender<PositionsCache>,
    indicators_tx: watch::Sender<Arc<IndicatorBook>>,
}

impl StoreWatcher {
    pub fn new(
        source: Arc<dyn SnapshotSource>,
        positions_interval: Duration,
        indicators_interval: Duration,
    ) -> (Self, StoreCaches) {
        let (positions_tx, positions_rx) = watch::channel(None);
        let (indicators_tx, indicators_rx) = watch::channel(Arc::new(IndicatorBook::new()));
        let watcher = Self {
            source,
            positions_interval,
            indicators_interval,
            indicator_max_age: None,
            positions_tx,
            indicators_tx,
        };
        let caches = StoreCaches {
            positions: positions_rx,
            indicators: indicators_rx,
        };
        (watcher, caches)
    }

    /// Drop indicator rows older than `max_age` relative to the newest row
    /// in the book, so a pair the analyzer stopped scanning ages out.
    #[must_use]
    pub fn with_indicator_max_age(mut self, max_age: Option<Duration>) -> Self {
        self.indicator_max_age = max_age;
        self
    }

    /// Run until cancelled. Both fetches fire immediately on start.
    pub async fn run(self, cancel: CancellationToken) {
        info!(
            positions_ms = self.positions_interval.as_millis() as u64,
            indicators_ms = self.indicators_interval.as_millis() as u64,
            "Store watcher started"
        );

        let mut positions_tick = tokio::time::interval(self.positions_interval);
        positions_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut indicators_tick = tokio::time::interval(self.indicators_interval);
        indicators_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = positions_tick.tick() => {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        result = self.source.open_positions() => self.publish_positions(result),
                    }
                }
                _ = indicators_tick.tick() => {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        result = self.source.recent_indicators() => self.publish_indicators(result),
                    }
                }
            }
        }

        info!("Store watcher stopped");
    }

    fn publish_positions(&self, result: crate::StoreResult<Vec<Position>>) {
        match result {
            Ok(positions) => {
                Metrics::store_fetch("positions", true);
                Metrics::open_positions(positions.len());
                let changed = self
                    .positions_tx
                    .borrow()
                    .as_deref()
                    .map(|prev| prev != &positions)
                    .unwrap_or(true);
                if changed {
                    debug!(count = positions.len(), "Open positions changed");
                    self.positions_tx.send_replace(Some(Arc::new(positions)));
                }
            }
            Err(e) => {
                Metrics::store_fetch("positions", false);
                warn!(error = %e, "Position fetch failed, keeping previous snapshot");
            }
        }
    }

    fn publish_indicators(&self, result: crate::StoreResult<Vec<mirror_core::IndicatorSnapshot>>) {
        match result {
            Ok(mut rows) => {
                Metrics::store_fetch("indicators", true);
                // Rows arrive newest first; offer oldest first so first-seen
                // order follows the analyzer's own order.
                rows.reverse();
                let mut book = IndicatorBook::clone(&self.indicators_tx.borrow());
                let accepted = book.extend(rows);
                let evicted = self.evict_stale(&mut book);
                if accepted > 0 || evicted > 0 {
                    debug!(accepted, evicted, pairs = book.len(), "Indicator book updated");
                    self.indicators_tx.send_replace(Arc::new(book));
                }
            }
            Err(e) => {
                Metrics::store_fetch("indicators", false);
                warn!(error = %e, "Indicator fetch failed, keeping previous book");
            }
        }
    }

    fn evict_stale(&self, book: &mut IndicatorBook) -> usize {
        let Some(max_age) = self.indicator_max_age else {
            return 0;
        };
        let Some(newest) = book.iter().map(|snap| snap.timestamp).max() else {
            return 0;
        };
        let Ok(max_age) = chrono::Duration::from_std(max_age) else {
            return 0;
        };
        book.evict_older_than(newest - max_age)
    }
}

/// Distinct instruments across open positions, in first-seen order.
pub fn open_instruments(positions: &[Position]) -> Vec<Instrument> {
    let mut out: Vec<Instrument> = Vec::new();
    for position in positions {
        if !out.contains(&position.pair) {
            out.push(position.pair.clone());
        }
    }
    out
}
