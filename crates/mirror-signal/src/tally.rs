//! Per-pair confirmation tally.

use std::fmt;

use mirror_core::{IndicatorSnapshot, Instrument, PositionSide};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::rules::TallyRules;

/// Indicator flags for one side.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SideFlags {
    pub momentum: bool,
    pub volume_spike: bool,
    pub rsi_extreme: bool,
    pub band_breakout: bool,
}

impl SideFlags {
    pub fn count(&self) -> u8 {
        [self.momentum, self.volume_spike, self.rsi_extreme, self.band_breakout]
            .into_iter()
            .filter(|f| *f)
            .count() as u8
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TallyStatus {
    Ready,
    NeedsOneMore,
    Scanning,
    NoData,
}

impl TallyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ready => "ready",
            Self::NeedsOneMore => "needs-one-more",
            Self::Scanning => "scanning",
            Self::NoData => "no-data",
        }
    }
}

impl fmt::Display for TallyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tally for one (pair, exchange).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmationTally {
    pub long: SideFlags,
    pub short: SideFlags,
    pub long_count: u8,
    pub short_count: u8,
    /// Count the status is judged on.
    pub readiness: u8,
    /// Side the readiness count comes from, when any indicator agrees.
    pub leading_side: Option<PositionSide>,
    pub leveraged: bool,
    pub status: TallyStatus,
}

impl ConfirmationTally {
    /// Tally for a pair with no indicator row yet.
    pub fn no_data(leveraged: bool) -> Self {
        Self {
            long: SideFlags::default(),
            short: SideFlags::default(),
            long_count: 0,
            short_count: 0,
            readiness: 0,
            leading_side: None,
            leveraged,
            status: TallyStatus::NoData,
        }
    }
}

/// Whether a pair trades with leverage: derivative notation, or listed on a
/// leveraged exchange.
pub fn is_leveraged_market(pair: &Instrument, exchange: &str, leveraged_exchanges: &[String]) -> bool {
    pair.is_derivative()
        || leveraged_exchanges
            .iter()
            .any(|ex| ex.trim().eq_ignore_ascii_case(exchange.trim()))
}

/// Count confirmations for one snapshot.
///
/// Spot pairs are judged on the long side only; leveraged pairs on
/// whichever side agrees more. A missing RSI means the analyzer has not
/// warmed up, so the status is `no-data` whatever else is present.
pub fn tally(snapshot: &IndicatorSnapshot, leveraged: bool, rules: &TallyRules) -> ConfirmationTally {
    let change = snapshot.price_change_15m;
    let spike = snapshot
        .volume_ratio
        .is_some_and(|ratio| ratio >= rules.volume_spike_ratio);
    let price = snapshot.usable_price();

    let long = SideFlags {
        momentum: change.is_some_and(|c| c >= rules.momentum_pct),
        volume_spike: spike && change.map_or(true, |c| c >= Decimal::ZERO),
        rsi_extreme: snapshot.rsi.is_some_and(|rsi| rsi < rules.rsi_oversold),
        band_breakout: matches!((price, snapshot.bb_upper), (Some(p), Some(upper)) if p > upper),
    };
    let short = SideFlags {
        momentum: change.is_some_and(|c| c <= -rules.momentum_pct),
        volume_spike: spike && change.map_or(true, |c| c <= Decimal::ZERO),
        rsi_extreme: snapshot.rsi.is_some_and(|rsi| rsi > rules.rsi_overbought),
        band_breakout: matches!((price, snapshot.bb_lower), (Some(p), Some(lower)) if p < lower),
    };

    let long_count = long.count();
    let short_count = short.count();

    let (readiness, leading_side) = if leveraged {
        match long_count.cmp(&short_count) {
            std::cmp::Ordering::Greater => (long_count, Some(PositionSide::Long)),
            std::cmp::Ordering::Less => (short_count, Some(PositionSide::Short)),
            // a tie leaves the direction open
            std::cmp::Ordering::Equal => (long_count, None),
        }
    } else {
        (long_count, (long_count > 0).then_some(PositionSide::Long))
    };

    let status = if snapshot.rsi.is_none() {
        TallyStatus::NoData
    } else if readiness >= rules.ready_count {
        TallyStatus::Ready
    } else if readiness + 1 == rules.ready_count {
        TallyStatus::NeedsOneMore
    } else {
        TallyStatus::Scanning
    };

    ConfirmationTally {
        long,
        short,
        long_count,
        short_count,
        readiness,
        leading_side,
        leveraged,
        status,
    }
}
