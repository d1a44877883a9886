//! Open-position rows as persisted by the agent.
//!
//! Rows are read-only here. A position appears when the agent opens a trade
//! and disappears when the agent closes it; nothing in this workspace
//! mutates or closes one locally.

use std::fmt;

use chrono::{DateTime, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};

use crate::{Instrument, Price, Size};

/// Engine-reported risk state meaning the trailing stop is armed.
pub const TRAILING_STATE: &str = "trailing";

/// Direction of an open position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionSide {
    #[serde(alias = "buy", alias = "LONG", alias = "BUY")]
    Long,
    #[serde(alias = "sell", alias = "SHORT", alias = "SELL")]
    Short,
}

impl PositionSide {
    /// Returns 1 for long, -1 for short.
    pub fn sign(&self) -> Decimal {
        match self {
            Self::Long => Decimal::ONE,
            Self::Short => Decimal::NEGATIVE_ONE,
        }
    }
}

impl fmt::Display for PositionSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Long => write!(f, "long"),
            Self::Short => write!(f, "short"),
        }
    }
}

/// Agent-side classification of the trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionType {
    Spot,
    Long,
    Short,
}

/// An open position row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// Trade identifier (numeric ids are rendered as strings).
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
    /// Instrument pair.
    pub pair: Instrument,
    /// Side as recorded by the agent.
    pub side: PositionSide,
    /// Average entry price.
    pub entry_price: Price,
    /// Size in contracts (futures) or coin units (spot).
    #[serde(alias = "size")]
    pub amount: Size,
    /// Leverage multiplier (1 = unleveraged).
    #[serde(default = "default_leverage")]
    pub leverage: Decimal,
    /// Exchange identifier (e.g. "binance", "delta").
    #[serde(alias = "exchange_id")]
    pub exchange: String,
    /// When the agent opened the trade.
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub opened_at: DateTime<Utc>,
    /// Stop-loss price, if the agent set one.
    #[serde(default)]
    pub stop_loss: Option<Price>,
    /// Take-profit price, if the agent set one.
    #[serde(default)]
    pub take_profit: Option<Price>,
    /// Engine-reported risk state ("trailing" or other).
    #[serde(default)]
    pub position_state: Option<String>,
    /// Engine-reported trailing-stop price.
    #[serde(default, alias = "trail_stop_price")]
    pub current_trail_stop: Option<Price>,
    /// Engine-reported peak P&L percent.
    #[serde(default)]
    pub peak_pnl: Option<Decimal>,
    /// Exchange price written by the engine alongside the row.
    #[serde(default)]
    pub current_price: Option<Price>,
    /// Spot / long / short classification.
    #[serde(default)]
    pub position_type: Option<PositionType>,
}

fn default_leverage() -> Decimal {
    Decimal::ONE
}

impl Position {
    /// Create a position with the required fields; optional engine fields start empty.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: impl Into<String>,
        pair: impl Into<Instrument>,
        side: PositionSide,
        entry_price: Price,
        amount: Size,
        leverage: Decimal,
        exchange: impl Into<String>,
        opened_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            pair: pair.into(),
            side,
            entry_price,
            amount,
            leverage,
            exchange: exchange.into(),
            opened_at,
            stop_loss: None,
            take_profit: None,
            position_state: None,
            current_trail_stop: None,
            peak_pnl: None,
            current_price: None,
            position_type: None,
        }
    }

    #[must_use]
    pub fn with_stop_loss(mut self, stop_loss: Price) -> Self {
        self.stop_loss = Some(stop_loss);
        self
    }

    #[must_use]
    pub fn with_state(mut self, state: impl Into<String>) -> Self {
        self.position_state = Some(state.into());
        self
    }

    #[must_use]
    pub fn with_trail_stop(mut self, trail: Price) -> Self {
        self.current_trail_stop = Some(trail);
        self
    }

    #[must_use]
    pub fn with_peak_pnl(mut self, peak_pct: Decimal) -> Self {
        self.peak_pnl = Some(peak_pct);
        self
    }

    #[must_use]
    pub fn with_current_price(mut self, price: Price) -> Self {
        self.current_price = Some(price);
        self
    }

    #[must_use]
    pub fn with_position_type(mut self, position_type: PositionType) -> Self {
        self.position_type = Some(position_type);
        self
    }

    /// Effective direction.
    ///
    /// Futures rows record the order side (`sell`) and the position type
    /// (`short`) separately; the position type wins when it names a direction.
    pub fn direction(&self) -> PositionSide {
        match self.position_type {
            Some(PositionType::Long) => PositionSide::Long,
            Some(PositionType::Short) => PositionSide::Short,
            _ => self.side,
        }
    }

    /// Leverage floored at 1.
    pub fn effective_leverage(&self) -> Decimal {
        self.leverage.max(Decimal::ONE)
    }

    /// Whether the position is margined (leverage above 1).
    pub fn is_leveraged(&self) -> bool {
        self.leverage > Decimal::ONE
    }

    /// Whether the row is a futures position, sized in contracts.
    ///
    /// An explicit position type decides; untyped rows count as futures when
    /// leveraged or quoted on a derivative instrument.
    pub fn is_futures(&self) -> bool {
        match self.position_type {
            Some(PositionType::Spot) => false,
            Some(PositionType::Long | PositionType::Short) => true,
            None => self.is_leveraged() || self.pair.is_derivative(),
        }
    }

    /// Whether the engine reports the trailing stop as armed.
    pub fn is_trailing_state(&self) -> bool {
        self.position_state
            .as_deref()
            .map(|s| s.trim().eq_ignore_ascii_case(TRAILING_STATE))
            .unwrap_or(false)
    }
}

/// Accept string or numeric ids.
fn deserialize_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Int(i64),
        Uint(u64),
    }

    Ok(match RawId::deserialize(deserializer)? {
        RawId::Text(s) => s,
        RawId::Int(n) => n.to_string(),
        RawId::Uint(n) => n.to_string(),
    })
}

/// Accept RFC 3339 timestamps and naive timestamps (assumed UTC).
pub(crate) fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw).ok_or_else(|| serde::de::Error::custom(format!("bad timestamp: {raw}")))
}

/// Parse a persisted timestamp. Naive values are treated as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    // Postgres renders "+00" offsets without minutes
    if let Ok(ts) = DateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f%#z") {
        return Some(ts.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}
