//! Dashboard state management.
//!
//! DashboardState holds receivers for the latest-value caches and the
//! settings the recompute needs. `collect_snapshot` is the single recompute:
//! it reads whatever each cache currently holds and derives the full view.

use std::sync::Arc;

use chrono::Utc;
use mirror_core::{ContractSizeTable, IndicatorBook, Instrument, Position, PriceSnapshot};
use mirror_feed::PollerHandle;
use mirror_position::{derive_all, DerivationRules, PriceChain};
use mirror_signal::TallyRules;
use mirror_store::{CommandSink, PositionsCache};
use mirror_telemetry::Metrics;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::commands::CloseTracker;
use crate::error::{DashboardError, DashboardResult};
use crate::types::{CloseAccepted, DashboardSnapshot, FeedStatus};
use crate::view::{pair_rows, portfolio_totals, position_view};

/// Receivers for the three independent inputs.
#[derive(Clone)]
pub struct DashboardInputs {
    pub positions: watch::Receiver<PositionsCache>,
    pub indicators: watch::Receiver<Arc<IndicatorBook>>,
    pub prices: watch::Receiver<Option<Arc<PriceSnapshot>>>,
}

/// Static settings for the recompute.
#[derive(Debug, Clone)]
pub struct ViewSettings {
    pub rules: DerivationRules,
    pub tally_rules: TallyRules,
    pub contracts: ContractSizeTable,
    /// Configured pairs, shown first.
    pub pairs: Vec<Instrument>,
    pub leveraged_exchanges: Vec<String>,
}

impl Default for ViewSettings {
    fn default() -> Self {
        Self {
            rules: DerivationRules::default(),
            tally_rules: TallyRules::default(),
            contracts: ContractSizeTable::with_defaults(),
            pairs: Vec::new(),
            leveraged_exchanges: vec!["delta".to_string()],
        }
    }
}

#[derive(Clone)]
pub struct DashboardState {
    inputs: DashboardInputs,
    poller: PollerHandle,
    settings: Arc<ViewSettings>,
    commands: Arc<dyn CommandSink>,
    closes: Arc<CloseTracker>,
}

impl DashboardState {
    pub fn new(
        inputs: DashboardInputs,
        poller: PollerHandle,
        settings: ViewSettings,
        commands: Arc<dyn CommandSink>,
    ) -> Self {
        Self {
            inputs,
            poller,
            settings: Arc::new(settings),
            commands,
            closes: Arc::new(CloseTracker::new()),
        }
    }

    /// Fresh receivers for change notification.
    pub fn inputs(&self) -> DashboardInputs {
        self.inputs.clone()
    }

    pub fn settings(&self) -> &ViewSettings {
        &self.settings
    }

    pub fn closes(&self) -> &CloseTracker {
        &self.closes
    }

    /// Collect a full snapshot of the current state.
    pub fn collect_snapshot(&self) -> DashboardSnapshot {
        let now = Utc::now();
        let positions: PositionsCache = self.inputs.positions.borrow().clone();
        let book: Arc<IndicatorBook> = self.inputs.indicators.borrow().clone();
        let live: Option<Arc<PriceSnapshot>> = self.inputs.prices.borrow().clone();

        let open: &[Position] = positions.as_deref().map(Vec::as_slice).unwrap_or_default();
        if positions.is_some() {
            self.closes.prune(open.iter().map(|p| p.id.as_str()));
        }

        let settings = &self.settings;
        let chain = PriceChain::new(live.as_deref(), &book);
        let mut derived = derive_all(open, &chain, &settings.contracts, &settings.rules);
        derived.sort_by(|a, b| {
            a.position
                .opened_at
                .cmp(&b.position.opened_at)
                .then_with(|| a.position.id.cmp(&b.position.id))
        });

        let totals = portfolio_totals(&derived);
        let position_views = derived
            .iter()
            .map(|d| position_view(d, &settings.rules, now, self.closes.is_pending(&d.position.id)))
            .collect();
        let pairs = pair_rows(
            &settings.pairs,
            &book,
            &settings.leveraged_exchanges,
            &settings.tally_rules,
        );

        DashboardSnapshot {
            timestamp_ms: now.timestamp_millis(),
            positions_loaded: positions.is_some(),
            positions: position_views,
            totals,
            pairs,
            feed: FeedStatus::new(self.poller.state(), live.as_deref()),
        }
    }

    /// Ask the agent to close an open position.
    ///
    /// 404 if the trade is not open, 409 while a close for it is pending,
    /// 502 if the command could not be written (the marker is cleared).
    pub async fn request_close(&self, trade_id: &str) -> DashboardResult<CloseAccepted> {
        let pair = {
            let positions = self.inputs.positions.borrow();
            positions
                .as_deref()
                .and_then(|open| open.iter().find(|p| p.id == trade_id))
                .map(|p| p.pair.clone())
        };
        let Some(pair) = pair else {
            Metrics::close_command("unknown_position");
            return Err(DashboardError::PositionNotFound(trade_id.to_string()));
        };

        let request_id = match self.closes.begin(trade_id, &pair) {
            Ok(id) => id,
            Err(e) => {
                Metrics::close_command("conflict");
                return Err(e);
            }
        };

        match self.commands.request_close(trade_id, &pair).await {
            Ok(command_id) => {
                self.closes.record_sent(trade_id, command_id.clone());
                Metrics::close_command("sent");
                info!(
                    trade_id = %trade_id,
                    pair = %pair,
                    request_id = %request_id,
                    command_id = ?command_id,
                    "Close command sent"
                );
                Ok(CloseAccepted {
                    request_id: request_id.to_string(),
                    trade_id: trade_id.to_string(),
                    pair: pair.to_string(),
                    command_id,
                    status: "pending",
                })
            }
            Err(e) => {
                self.closes.clear(trade_id);
                Metrics::close_command("failed");
                warn!(trade_id = %trade_id, error = %e, "Close command failed, marker cleared");
                Err(DashboardError::CommandFailed(e.to_string()))
            }
        }
    }
}

impl std::fmt::Debug for DashboardState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let position_count = self
            .inputs
            .positions
            .borrow()
            .as_ref()
            .map(|p| p.len())
            .unwrap_or(0);

        f.debug_struct("DashboardState")
            .field("position_count", &position_count)
            .field("pending_closes", &self.closes.len())
            .field("poller_phase", &self.poller.phase())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use futures_util::future::BoxFuture;
    use futures_util::FutureExt;
    use mirror_core::{FreshnessTier, PositionSide, Price, Size};
    use mirror_position::RiskState;
    use mirror_store::{StoreError, StoreResult};
    use parking_lot::Mutex;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;

    #[derive(Default)]
    struct RecordingSink {
        fail: bool,
        sent: Mutex<Vec<String>>,
    }

    impl CommandSink for RecordingSink {
        fn request_close<'a>(
            &'a self,
            trade_id: &'a str,
            _pair: &'a Instrument,
        ) -> BoxFuture<'a, StoreResult<Option<String>>> {
            self.sent.lock().push(trade_id.to_string());
            let result = if self.fail {
                Err(StoreError::Status {
                    status: 503,
                    body: "unavailable".to_string(),
                })
            } else {
                Ok(Some("42".to_string()))
            };
            async move { result }.boxed()
        }
    }

    struct Fixture {
        state: DashboardState,
        positions_tx: watch::Sender<PositionsCache>,
        prices_tx: watch::Sender<Option<Arc<PriceSnapshot>>>,
        sink: Arc<RecordingSink>,
    }

    fn fixture(fail: bool) -> Fixture {
        let (positions_tx, positions) = watch::channel(None);
        let (_indicators_tx, indicators) = watch::channel(Arc::new(IndicatorBook::new()));
        let (prices_tx, prices) = watch::channel(None);
        let sink = Arc::new(RecordingSink {
            fail,
            ..Default::default()
        });
        let state = DashboardState::new(
            DashboardInputs {
                positions,
                indicators,
                prices,
            },
            PollerHandle::new(),
            ViewSettings::default(),
            sink.clone(),
        );
        Fixture {
            state,
            positions_tx,
            prices_tx,
            sink,
        }
    }

    fn position(id: &str, minute: u32) -> Position {
        Position::new(
            id,
            "BTC/USD:USD",
            PositionSide::Long,
            Price::new(dec!(69700)),
            Size::new(dec!(3)),
            dec!(20),
            "delta",
            Utc.with_ymd_and_hms(2026, 10, 16, 8, minute, 0).unwrap(),
        )
    }

    #[test]
    fn test_snapshot_before_first_fetch() {
        let f = fixture(false);
        let snap = f.state.collect_snapshot();
        assert!(!snap.positions_loaded);
        assert!(snap.positions.is_empty());
        assert_eq!(snap.totals.open_count, 0);
    }

    #[test]
    fn test_snapshot_orders_by_open_time_and_uses_live_price() {
        let f = fixture(false);
        f.positions_tx
            .send_replace(Some(Arc::new(vec![position("b", 30), position("a", 10)])));
        let mut prices = HashMap::new();
        prices.insert(Instrument::from("BTCUSD"), Price::new(dec!(70750)));
        f.prices_tx.send_replace(Some(Arc::new(PriceSnapshot::new(
            prices,
            Utc::now(),
            FreshnessTier::Live,
        ))));

        let snap = f.state.collect_snapshot();
        let ids: Vec<&str> = snap.positions.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(snap.positions[0].gross_pnl, Some(dec!(3.15)));
        assert_eq!(snap.positions[0].risk_state, RiskState::HoldingGain);
        assert_eq!(snap.feed.priced_instruments, 1);
        assert_eq!(snap.totals.total_gross_pnl, dec!(6.30));
    }

    #[tokio::test]
    async fn test_close_conflict_then_prune() {
        let f = fixture(false);
        f.positions_tx.send_replace(Some(Arc::new(vec![position("1", 0)])));

        let accepted = f.state.request_close("1").await.unwrap();
        assert_eq!(accepted.command_id.as_deref(), Some("42"));
        assert!(matches!(
            f.state.request_close("1").await,
            Err(DashboardError::CloseInFlight(_))
        ));
        assert!(f.state.collect_snapshot().positions[0].close_pending);

        // the agent closed it
        f.positions_tx.send_replace(Some(Arc::new(vec![])));
        f.state.collect_snapshot();
        assert!(f.state.closes().is_empty());
        assert_eq!(f.sink.sent.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_close_clears_marker() {
        let f = fixture(true);
        f.positions_tx.send_replace(Some(Arc::new(vec![position("1", 0)])));

        let err = f.state.request_close("1").await.unwrap_err();
        assert!(matches!(err, DashboardError::CommandFailed(_)));
        assert!(!f.state.closes().is_pending("1"));

        // retry reaches the sink again
        let _ = f.state.request_close("1").await;
        assert_eq!(f.sink.sent.lock().len(), 2);
    }

    #[tokio::test]
    async fn test_close_unknown_position() {
        let f = fixture(false);
        f.positions_tx.send_replace(Some(Arc::new(vec![position("1", 0)])));
        assert!(matches!(
            f.state.request_close("nope").await,
            Err(DashboardError::PositionNotFound(_))
        ));
        assert!(f.sink.sent.lock().is_empty());
    }
}
