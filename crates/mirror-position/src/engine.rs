//! Position Derivation Engine.
//!
//! A pure function of (position, price chain, contract table, rules). It
//! holds no state between calls, so identical inputs always yield identical
//! output and it is safe to re-run on every upstream change.

use mirror_core::{
    ContractSizeTable, FreshnessTier, IndicatorBook, Position, PositionSide, Price, PriceSnapshot,
    ResolvedPrice, HUNDRED,
};
use rust_decimal::Decimal;

use crate::derived::{DerivedPosition, RiskState, TrailStop};
use crate::rules::DerivationRules;

/// Price sources in precedence order, minus the position's own field.
#[derive(Debug, Clone, Copy)]
pub struct PriceChain<'a> {
    /// Latest successful poll, if any.
    pub live: Option<&'a PriceSnapshot>,
    pub indicators: &'a IndicatorBook,
}

impl<'a> PriceChain<'a> {
    pub fn new(live: Option<&'a PriceSnapshot>, indicators: &'a IndicatorBook) -> Self {
        Self { live, indicators }
    }

    /// First strictly positive price: live poll, then the price the agent
    /// wrote on the position, then the base asset's latest indicator price
    /// (same exchange preferred).
    pub fn resolve(&self, position: &Position) -> Option<ResolvedPrice> {
        if let Some(price) = self.live.and_then(|snap| snap.get(&position.pair)) {
            return Some(ResolvedPrice::new(price, FreshnessTier::Live));
        }
        if let Some(price) = position.current_price.filter(Price::is_positive) {
            return Some(ResolvedPrice::new(price, FreshnessTier::Persisted));
        }
        self.indicators
            .price_for_base(&position.pair.base_asset(), Some(position.exchange.as_str()))
            .map(|price| ResolvedPrice::new(price, FreshnessTier::Derived))
    }
}

/// Derive the full view of one position.
pub fn derive_position(
    position: &Position,
    chain: &PriceChain<'_>,
    contracts: &ContractSizeTable,
    rules: &DerivationRules,
) -> DerivedPosition {
    let side = position.direction();
    let sign = side.sign();
    let leverage = position.effective_leverage();
    let entry = position.entry_price;

    // Spot rows are already in coin units.
    let contract_size = if position.is_futures() {
        contracts.contract_size(&position.pair)
    } else {
        Decimal::ONE
    };
    let coin_amount = position.amount.inner() * contract_size;

    let resolved = chain.resolve(position);
    // Every percent and dollar figure needs both a price and a usable entry.
    let priced = resolved.filter(|_| entry.is_positive());
    let current = priced.map(|r| r.price);

    let price_move_pct = current.and_then(|cur| cur.pct_from(entry)).map(|pct| pct * sign);
    let capital_return_pct = price_move_pct.map(|pct| pct * leverage);
    let gross_pnl = current.map(|cur| (cur.inner() - entry.inner()) * coin_amount * sign);
    let notional = current.map(|_| entry.inner() * coin_amount);
    let collateral = notional.map(|n| if position.is_leveraged() { n / leverage } else { n });

    let peak_pnl_pct = position.peak_pnl.or_else(|| {
        price_move_pct.map(|pct| if pct > Decimal::ZERO { pct } else { Decimal::ZERO })
    });

    let trailing_active = position.is_trailing_state()
        && peak_pnl_pct.is_some_and(|peak| peak >= rules.trail_activation_pct);

    let trail_stop = if trailing_active {
        match position.current_trail_stop.filter(Price::is_positive) {
            Some(trail) => Some(TrailStop::Authoritative(trail)),
            None => peak_pnl_pct
                .and_then(|peak| estimate_trail(side, entry, current, peak, rules))
                .map(TrailStop::Estimated),
        }
    } else {
        None
    };

    let risk_state = classify(position, side, current, price_move_pct, trailing_active, rules);

    let liquidation_price = liquidation_price(side, entry, leverage, position.is_leveraged());
    let liquidation_distance_pct = match (liquidation_price, current) {
        (Some(liq), Some(cur)) => Some((cur.inner() - liq.inner()) / cur.inner() * HUNDRED * sign),
        _ => None,
    };

    DerivedPosition {
        position: position.clone(),
        price: priced,
        contract_size,
        coin_amount,
        price_move_pct,
        capital_return_pct,
        gross_pnl,
        notional,
        collateral,
        peak_pnl_pct,
        trailing_active,
        trail_stop,
        risk_state,
        liquidation_price,
        liquidation_distance_pct,
    }
}

/// Derive every position, preserving input order.
pub fn derive_all(
    positions: &[Position],
    chain: &PriceChain<'_>,
    contracts: &ContractSizeTable,
    rules: &DerivationRules,
) -> Vec<DerivedPosition> {
    positions
        .iter()
        .map(|position| derive_position(position, chain, contracts, rules))
        .collect()
}

/// Local trailing-stop estimate.
///
/// Anchored at the better of the current price and the price implied by the
/// peak. At each tier boundary already crossed, the stop the narrower
/// distance gave at that boundary stays as a floor, so widening the
/// distance never pulls the stop back.
pub fn estimate_trail(
    side: PositionSide,
    entry: Price,
    current: Option<Price>,
    peak_pct: Decimal,
    rules: &DerivationRules,
) -> Option<Price> {
    if !entry.is_positive() {
        return None;
    }
    let offset = |anchor: Price, distance: Decimal| match side {
        PositionSide::Long => anchor.offset_pct(-distance),
        PositionSide::Short => anchor.offset_pct(distance),
    };
    let tighter = |a: Price, b: Price| match side {
        PositionSide::Long => a.max(b),
        PositionSide::Short => a.min(b),
    };

    let peak_price = entry.offset_pct(peak_pct * side.sign());
    let anchor = current.map_or(peak_price, |cur| tighter(cur, peak_price));
    let mut trail = offset(anchor, rules.trail_distance_pct(peak_pct));

    for (boundary, narrower) in rules.crossed_boundaries(peak_pct) {
        let locked = offset(entry.offset_pct(boundary * side.sign()), narrower);
        trail = tighter(trail, locked);
    }
    trail.is_positive().then_some(trail)
}

fn classify(
    position: &Position,
    side: PositionSide,
    current: Option<Price>,
    price_move_pct: Option<Decimal>,
    trailing_active: bool,
    rules: &DerivationRules,
) -> RiskState {
    if trailing_active {
        return RiskState::Trailing;
    }
    let (Some(cur), Some(move_pct)) = (current, price_move_pct) else {
        return RiskState::Calculating;
    };

    let entry = position.entry_price;
    let stop = position
        .stop_loss
        .filter(Price::is_positive)
        .unwrap_or_else(|| entry.offset_pct(-side.sign() * rules.default_stop_distance_pct));
    if is_near_stop(side, entry, stop, cur, rules.near_sl_fraction) {
        return RiskState::NearSl;
    }

    if move_pct <= rules.at_risk_pct {
        RiskState::AtRisk
    } else if move_pct < Decimal::ZERO {
        RiskState::HoldingLoss
    } else {
        RiskState::HoldingGain
    }
}

/// Price on the stop side within `fraction` of the entry-to-stop distance,
/// or already through the stop.
fn is_near_stop(side: PositionSide, entry: Price, stop: Price, current: Price, fraction: Decimal) -> bool {
    let distance = (entry.inner() - stop.inner()).abs();
    let remaining = (current.inner() - stop.inner()) * side.sign();
    remaining <= distance * fraction
}

fn liquidation_price(side: PositionSide, entry: Price, leverage: Decimal, leveraged: bool) -> Option<Price> {
    if !leveraged || !entry.is_positive() {
        return None;
    }
    let margin = Decimal::ONE / leverage;
    let liq = match side {
        PositionSide::Long => entry * (Decimal::ONE - margin),
        PositionSide::Short => entry * (Decimal::ONE + margin),
    };
    Some(liq)
}
