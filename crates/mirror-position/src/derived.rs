//! Derived view of an open position.

use std::fmt;

use mirror_core::{Position, Price, ResolvedPrice};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Trailing-stop price with its provenance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", content = "price", rename_all = "lowercase")]
pub enum TrailStop {
    /// Published by the agent.
    Authoritative(Price),
    /// Estimated locally until the agent publishes its own.
    Estimated(Price),
}

impl TrailStop {
    pub fn price(&self) -> Price {
        match self {
            Self::Authoritative(p) | Self::Estimated(p) => *p,
        }
    }

    pub fn is_authoritative(&self) -> bool {
        matches!(self, Self::Authoritative(_))
    }
}

/// Risk label. Exactly one applies per position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskState {
    Trailing,
    NearSl,
    AtRisk,
    HoldingLoss,
    HoldingGain,
    /// No price resolved yet.
    Calculating,
}

impl RiskState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trailing => "trailing",
            Self::NearSl => "near_sl",
            Self::AtRisk => "at_risk",
            Self::HoldingLoss => "holding_loss",
            Self::HoldingGain => "holding_gain",
            Self::Calculating => "calculating",
        }
    }
}

impl fmt::Display for RiskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A position together with everything derived from it.
///
/// Percent and dollar fields are `None` whenever the price is unresolved or
/// the entry price is not positive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivedPosition {
    pub position: Position,
    /// Price used for the derivation.
    pub price: Option<ResolvedPrice>,
    /// Coin units per unit of position size.
    pub contract_size: Decimal,
    /// Position size in coin units.
    pub coin_amount: Decimal,
    /// Price move in the position's favour, percent.
    pub price_move_pct: Option<Decimal>,
    /// Price move × leverage, percent.
    pub capital_return_pct: Option<Decimal>,
    /// Unrealized P&L in quote currency, before fees.
    pub gross_pnl: Option<Decimal>,
    pub notional: Option<Decimal>,
    pub collateral: Option<Decimal>,
    /// Peak P&L percent (agent's value when published).
    pub peak_pnl_pct: Option<Decimal>,
    pub trailing_active: bool,
    pub trail_stop: Option<TrailStop>,
    pub risk_state: RiskState,
    /// Isolated-margin liquidation price (leveraged positions only).
    pub liquidation_price: Option<Price>,
    /// Distance from current price to liquidation, percent.
    pub liquidation_distance_pct: Option<Decimal>,
}

impl DerivedPosition {
    /// Whether a price resolved for this position.
    pub fn is_priced(&self) -> bool {
        self.price_move_pct.is_some()
    }

    pub fn current_price(&self) -> Option<Price> {
        self.price.map(|p| p.price)
    }
}
