//! Price Poller.
//!
//! Two phases driven by the set of instruments with open positions:
//! - **Idle**: the set is empty; no timer, no network calls.
//! - **Polling**: one poll fires immediately, then one per interval.
//!
//! A failed poll records the error and keeps the last good snapshot
//! visible. Cancellation drops any in-flight request unpublished.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use mirror_core::{FreshnessTier, Instrument, PriceSnapshot};
use mirror_telemetry::Metrics;
use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::source::{PriceQuote, PriceSource};

/// Poller phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PollerPhase {
    Idle,
    Polling,
}

/// Observable poller state.
#[derive(Debug, Clone, Serialize)]
pub struct PollerState {
    pub phase: PollerPhase,
    /// Last successful snapshot.
    #[serde(skip)]
    pub snapshot: Option<Arc<PriceSnapshot>>,
    pub last_error: Option<String>,
    pub last_success_at: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
    pub polls_ok: u64,
    pub polls_failed: u64,
    /// Providers that answered the last successful poll.
    pub last_providers: Vec<String>,
}

impl Default for PollerState {
    fn default() -> Self {
        Self {
            phase: PollerPhase::Idle,
            snapshot: None,
            last_error: None,
            last_success_at: None,
            consecutive_failures: 0,
            polls_ok: 0,
            polls_failed: 0,
            last_providers: Vec::new(),
        }
    }
}

/// Cloneable view of the poller's state.
#[derive(Clone)]
pub struct PollerHandle {
    state: Arc<RwLock<PollerState>>,
    snapshot_tx: Arc<watch::Sender<Option<Arc<PriceSnapshot>>>>,
}

impl Default for PollerHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl PollerHandle {
    pub fn new() -> Self {
        let (snapshot_tx, _) = watch::channel(None);
        Self {
            state: Arc::new(RwLock::new(PollerState::default())),
            snapshot_tx: Arc::new(snapshot_tx),
        }
    }

    pub fn state(&self) -> PollerState {
        self.state.read().clone()
    }

    pub fn phase(&self) -> PollerPhase {
        self.state.read().phase
    }

    /// Last successful snapshot, if any.
    pub fn snapshot(&self) -> Option<Arc<PriceSnapshot>> {
        self.state.read().snapshot.clone()
    }

    /// Receiver notified whenever a new snapshot is published.
    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<PriceSnapshot>>> {
        self.snapshot_tx.subscribe()
    }

    fn set_phase(&self, phase: PollerPhase) {
        let mut state = self.state.write();
        if state.phase != phase {
            info!(from = ?state.phase, to = ?phase, "Price poller phase change");
            state.phase = phase;
            Metrics::poller_polling(phase == PollerPhase::Polling);
        }
    }

    /// Fold a quote into the state.
    pub(crate) fn apply_quote(&self, quote: PriceQuote) {
        let published = {
            let mut state = self.state.write();
            if quote.stale {
                state.polls_failed += 1;
                state.consecutive_failures = state.consecutive_failures.saturating_add(1);
                state.last_error = Some(
                    quote
                        .failure_summary()
                        .unwrap_or_else(|| "no provider answered".to_string()),
                );
                warn!(
                    consecutive_failures = state.consecutive_failures,
                    error = state.last_error.as_deref().unwrap_or_default(),
                    "Price poll failed, keeping last snapshot"
                );
                Metrics::price_poll("stale");
                None
            } else {
                // as_of never moves backwards
                let as_of = match &state.snapshot {
                    Some(prev) if prev.as_of > quote.fetched_at => prev.as_of,
                    _ => quote.fetched_at,
                };
                let snapshot = Arc::new(PriceSnapshot::new(quote.prices, as_of, FreshnessTier::Live));
                state.snapshot = Some(snapshot.clone());
                state.polls_ok += 1;
                state.consecutive_failures = 0;
                state.last_error = None;
                state.last_success_at = Some(as_of);
                state.last_providers = quote.answered;
                debug!(priced = snapshot.len(), "Price poll succeeded");
                Metrics::price_poll("ok");
                Some(snapshot)
            }
        };

        if let Some(snapshot) = published {
            self.snapshot_tx.send_replace(Some(snapshot));
        }
    }
}

/// Timer-driven caller of the [`PriceSource`], gated on open positions.
pub struct PricePoller {
    source: Arc<PriceSource>,
    interval: Duration,
    handle: PollerHandle,
}

impl PricePoller {
    pub fn new(source: Arc<PriceSource>, interval: Duration) -> Self {
        Self {
            source,
            interval,
            handle: PollerHandle::new(),
        }
    }

    pub fn handle(&self) -> PollerHandle {
        self.handle.clone()
    }

    /// Run until cancelled or until the instrument sender is dropped.
    pub async fn run(self, mut open_rx: watch::Receiver<Vec<Instrument>>, cancel: CancellationToken) {
        info!(interval_ms = self.interval.as_millis() as u64, "Price poller started");

        'phases: loop {
            let mut current = open_rx.borrow_and_update().clone();

            if current.is_empty() {
                self.handle.set_phase(PollerPhase::Idle);
                tokio::select! {
                    _ = cancel.cancelled() => break 'phases,
                    changed = open_rx.changed() => {
                        if changed.is_err() {
                            break 'phases;
                        }
                        continue 'phases;
                    }
                }
            }

            self.handle.set_phase(PollerPhase::Polling);
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break 'phases,
                    _ = ticker.tick() => {
                        tokio::select! {
                            _ = cancel.cancelled() => {
                                Metrics::price_poll("cancelled");
                                break 'phases;
                            }
                            quote = self.source.quote(&current) => self.handle.apply_quote(quote),
                        }
                    }
                    changed = open_rx.changed() => {
                        if changed.is_err() {
                            break 'phases;
                        }
                        let next = open_rx.borrow_and_update().clone();
                        if next.is_empty() {
                            continue 'phases;
                        }
                        let known: HashSet<&Instrument> = current.iter().collect();
                        let gained = next.iter().any(|i| !known.contains(i));
                        current = next;
                        if gained {
                            debug!(instruments = current.len(), "New instrument opened, polling now");
                            ticker.reset_immediately();
                        }
                    }
                }
            }
        }

        self.handle.set_phase(PollerPhase::Idle);
        info!("Price poller stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{FeedError, FeedResult};
    use crate::provider::{PriceProvider, ProviderPrices};
    use futures_util::future::BoxFuture;
    use futures_util::FutureExt;
    use mirror_core::Price;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingProvider {
        calls: AtomicUsize,
        fail: AtomicBool,
    }

    impl PriceProvider for CountingProvider {
        fn name(&self) -> &str {
            "counting"
        }

        fn fetch<'a>(&'a self, instruments: &'a [Instrument]) -> BoxFuture<'a, FeedResult<ProviderPrices>> {
            async move {
                self.calls.fetch_add(1, Ordering::SeqCst);
                if self.fail.load(Ordering::SeqCst) {
                    return Err(FeedError::Status {
                        provider: "counting".to_string(),
                        status: 503,
                    });
                }
                Ok(instruments
                    .iter()
                    .map(|i| (i.clone(), Price::new(dec!(100))))
                    .collect())
            }
            .boxed()
        }
    }

    struct Harness {
        provider: Arc<CountingProvider>,
        handle: PollerHandle,
        open_tx: watch::Sender<Vec<Instrument>>,
        cancel: CancellationToken,
        task: tokio::task::JoinHandle<()>,
    }

    fn start() -> Harness {
        let provider = Arc::new(CountingProvider::default());
        let source = PriceSource::new(vec![provider.clone() as Arc<dyn PriceProvider>], Duration::from_secs(4));
        let poller = PricePoller::new(Arc::new(source), Duration::from_secs(5));
        let handle = poller.handle();
        let (open_tx, open_rx) = watch::channel(Vec::new());
        let cancel = CancellationToken::new();
        let task = tokio::spawn(poller.run(open_rx, cancel.clone()));
        Harness {
            provider,
            handle,
            open_tx,
            cancel,
            task,
        }
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    impl Harness {
        fn calls(&self) -> usize {
            self.provider.calls.load(Ordering::SeqCst)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_makes_no_calls() {
        let h = start();
        tokio::time::sleep(Duration::from_secs(60)).await;

        assert_eq!(h.calls(), 0);
        assert_eq!(h.handle.phase(), PollerPhase::Idle);
        assert!(h.handle.snapshot().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_polls_immediately_then_periodically() {
        let h = start();
        h.open_tx.send_replace(vec!["BTCUSD".into()]);
        settle().await;

        assert_eq!(h.calls(), 1);
        assert_eq!(h.handle.phase(), PollerPhase::Polling);
        let snap = h.handle.snapshot().unwrap();
        assert_eq!(snap.tier, FreshnessTier::Live);
        assert_eq!(snap.get(&"BTCUSD".into()), Some(Price::new(dec!(100))));

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(h.calls(), 2);
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(h.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_closing_all_positions_stops_polling() {
        let h = start();
        h.open_tx.send_replace(vec!["BTCUSD".into()]);
        settle().await;
        assert_eq!(h.calls(), 1);

        h.open_tx.send_replace(Vec::new());
        settle().await;
        assert_eq!(h.handle.phase(), PollerPhase::Idle);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(h.calls(), 1);
        // last snapshot stays visible
        assert!(h.handle.snapshot().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_poll_keeps_previous_snapshot() {
        let h = start();
        h.open_tx.send_replace(vec!["BTCUSD".into()]);
        settle().await;
        let first = h.handle.snapshot().unwrap();

        h.provider.fail.store(true, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(5)).await;

        let state = h.handle.state();
        assert_eq!(state.consecutive_failures, 1);
        assert_eq!(state.polls_failed, 1);
        assert!(state.last_error.unwrap().contains("503"));
        assert_eq!(h.handle.snapshot().unwrap().as_of, first.as_of);

        h.provider.fail.store(false, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(5)).await;

        let state = h.handle.state();
        assert_eq!(state.consecutive_failures, 0);
        assert!(state.last_error.is_none());
        assert!(h.handle.snapshot().unwrap().as_of >= first.as_of);
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_instrument_triggers_immediate_poll() {
        let h = start();
        h.open_tx.send_replace(vec!["BTCUSD".into()]);
        settle().await;
        assert_eq!(h.calls(), 1);

        h.open_tx.send_replace(vec!["BTCUSD".into(), "ETHUSD".into()]);
        settle().await;
        assert_eq!(h.calls(), 2);
        assert!(h.handle.snapshot().unwrap().get(&"ETHUSD".into()).is_some());

        // dropping an instrument does not force a poll
        h.open_tx.send_replace(vec!["ETHUSD".into()]);
        settle().await;
        assert_eq!(h.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_poller() {
        let mut h = start();
        h.open_tx.send_replace(vec!["BTCUSD".into()]);
        settle().await;

        h.cancel.cancel();
        (&mut h.task).await.unwrap();

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(h.calls(), 1);
        assert_eq!(h.handle.phase(), PollerPhase::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_subscribers_see_new_snapshots() {
        let h = start();
        let mut rx = h.handle.subscribe();
        h.open_tx.send_replace(vec!["BTCUSD".into()]);

        rx.changed().await.unwrap();
        assert!(rx.borrow_and_update().is_some());
    }
}
