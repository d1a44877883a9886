//! Dashboard API types.
//!
//! These types are used for JSON serialization in REST and WebSocket APIs.

use chrono::{DateTime, Utc};
use mirror_core::{FreshnessTier, PositionSide, Price, PriceSnapshot};
use mirror_feed::{PollerPhase, PollerState};
use mirror_position::{RiskState, TrailStop};
use mirror_signal::ConfirmationTally;
use rust_decimal::Decimal;
use serde::Serialize;

/// Full dashboard state snapshot (sent on initial connection and via REST).
#[derive(Debug, Clone, Serialize)]
pub struct DashboardSnapshot {
    /// Timestamp when snapshot was taken (Unix milliseconds).
    pub timestamp_ms: i64,
    /// False until the first position fetch succeeds.
    pub positions_loaded: bool,
    /// Open positions, oldest first.
    pub positions: Vec<PositionView>,
    /// Portfolio totals over the open positions.
    pub totals: PortfolioTotals,
    /// Scanned pairs, known pairs first.
    pub pairs: Vec<PairView>,
    /// Price feed status.
    pub feed: FeedStatus,
}

/// One open position as shown to the operator.
#[derive(Debug, Clone, Serialize)]
pub struct PositionView {
    pub id: String,
    pub pair: String,
    pub exchange: String,
    pub side: PositionSide,
    pub leverage: Decimal,
    pub entry_price: Price,
    /// Size as recorded (contracts or coins).
    pub amount: Decimal,
    pub coin_amount: Decimal,
    pub current_price: Option<Price>,
    /// Where the current price came from.
    pub price_tier: Option<FreshnessTier>,
    pub price_move_pct: Option<Decimal>,
    pub capital_return_pct: Option<Decimal>,
    pub gross_pnl: Option<Decimal>,
    pub notional: Option<Decimal>,
    pub collateral: Option<Decimal>,
    pub peak_pnl_pct: Option<Decimal>,
    pub trailing_active: bool,
    pub trail_stop: Option<TrailStop>,
    pub risk_state: RiskState,
    pub stop_loss: Option<Price>,
    pub take_profit: Option<Price>,
    pub liquidation_price: Option<Price>,
    pub liquidation_distance_pct: Option<Decimal>,
    pub opened_at: DateTime<Utc>,
    /// Human-readable hold time ("12m 05s").
    pub held_for: String,
    pub range_bar: Option<RangeBar>,
    /// A close command was sent and the position is still open.
    pub close_pending: bool,
}

/// Stop-to-peak bar geometry. Every offset is a 0–100 position along the bar.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RangeBar {
    /// Bar width in price-move percent.
    pub span_pct: Decimal,
    /// Stop-loss sits at the left edge.
    pub stop_loss: Decimal,
    pub entry: Decimal,
    pub current: Decimal,
    /// Where the trailing stop arms.
    pub trail_activation: Decimal,
    pub trail_stop: Option<Decimal>,
}

/// One scanned (pair, exchange) row.
#[derive(Debug, Clone, Serialize)]
pub struct PairView {
    pub pair: String,
    /// `None` for a configured pair with no indicator data yet.
    pub exchange: Option<String>,
    /// Pair is in the configured list.
    pub known: bool,
    pub rsi: Option<Decimal>,
    pub volume_ratio: Option<Decimal>,
    pub price_change_15m: Option<Decimal>,
    pub current_price: Option<Price>,
    pub updated_at: Option<DateTime<Utc>>,
    pub tally: ConfirmationTally,
}

/// Portfolio-level totals.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PortfolioTotals {
    pub open_count: usize,
    /// Positions with no resolved price.
    pub calculating_count: usize,
    /// Collateral over priced positions.
    pub total_collateral: Decimal,
    /// Gross P&L over priced positions.
    pub total_gross_pnl: Decimal,
    /// Notional of spot holdings.
    pub spot_exposure: Decimal,
    pub futures_collateral: Decimal,
    pub futures_notional: Decimal,
}

/// Price feed status.
#[derive(Debug, Clone, Serialize)]
pub struct FeedStatus {
    pub phase: PollerPhase,
    pub last_error: Option<String>,
    pub last_success_at: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
    pub providers: Vec<String>,
    /// `as_of` of the snapshot in use.
    pub prices_as_of: Option<DateTime<Utc>>,
    pub priced_instruments: usize,
}

impl FeedStatus {
    pub fn new(state: PollerState, live: Option<&PriceSnapshot>) -> Self {
        Self {
            phase: state.phase,
            last_error: state.last_error,
            last_success_at: state.last_success_at,
            consecutive_failures: state.consecutive_failures,
            providers: state.last_providers,
            prices_as_of: live.map(|s| s.as_of),
            priced_instruments: live.map(PriceSnapshot::len).unwrap_or(0),
        }
    }
}

/// Accepted close request.
#[derive(Debug, Clone, Serialize)]
pub struct CloseAccepted {
    /// Local id for this request.
    pub request_id: String,
    pub trade_id: String,
    pub pair: String,
    /// Command row id, if the store echoed one.
    pub command_id: Option<String>,
    pub status: &'static str,
}

/// WebSocket message types (tagged enum for type safety).
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DashboardMessage {
    /// Full snapshot (sent on connect).
    Snapshot(DashboardSnapshot),
    /// Recomputed view after an input change or refresh tick.
    Update(DashboardSnapshot),
}
