//! View-Model Assembler.
//!
//! Pure mapping from derived positions and indicator rows to what the
//! operator sees. No business rules live here; anything that decides a
//! number belongs in the derivation engine or the tally.

use chrono::{DateTime, Utc};
use mirror_core::{IndicatorBook, IndicatorSnapshot, Instrument, HUNDRED};
use mirror_position::{DerivationRules, DerivedPosition};
use mirror_signal::{is_leveraged_market, tally, ConfirmationTally, TallyRules};
use rust_decimal::Decimal;

use crate::types::{PairView, PortfolioTotals, PositionView, RangeBar};

/// Hold time as `45s`, `12m 05s`, `3h 07m` or `2d 04h`.
///
/// Timestamps in the future clamp to `0s`.
pub fn format_duration(opened_at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let secs = (now - opened_at).num_seconds().max(0);
    let (days, hours, mins, rem) = (secs / 86_400, secs % 86_400 / 3_600, secs % 3_600 / 60, secs % 60);
    if secs < 60 {
        format!("{rem}s")
    } else if secs < 3_600 {
        format!("{mins}m {rem:02}s")
    } else if secs < 86_400 {
        format!("{hours}h {mins:02}m")
    } else {
        format!("{days}d {hours:02}h")
    }
}

/// Geometry of the stop-to-peak bar.
///
/// The bar runs from the stop-loss (left edge) to the larger of the peak
/// and the trail activation threshold, measured in price-move percent.
/// `None` while the price move is unknown.
pub fn range_bar(derived: &DerivedPosition, rules: &DerivationRules) -> Option<RangeBar> {
    let move_pct = derived.price_move_pct?;
    let position = &derived.position;
    let entry = position.entry_price;

    let stop_distance = position
        .stop_loss
        .and_then(|sl| sl.pct_from(entry))
        .map(|pct| pct.abs())
        .filter(|pct| !pct.is_zero())
        .unwrap_or(rules.default_stop_distance_pct);
    let peak = derived.peak_pnl_pct.unwrap_or(Decimal::ZERO);
    let span = stop_distance + peak.max(rules.trail_activation_pct);
    if span <= Decimal::ZERO {
        return None;
    }

    let offset = |pct: Decimal| ((pct + stop_distance) / span * HUNDRED).clamp(Decimal::ZERO, HUNDRED);
    let sign = position.direction().sign();
    let trail_stop = derived
        .trail_stop
        .and_then(|trail| trail.price().pct_from(entry))
        .map(|pct| offset(pct * sign));

    Some(RangeBar {
        span_pct: span,
        stop_loss: Decimal::ZERO,
        entry: offset(Decimal::ZERO),
        current: offset(move_pct),
        trail_activation: offset(rules.trail_activation_pct),
        trail_stop,
    })
}

/// Map one derived position to its display row.
pub fn position_view(
    derived: &DerivedPosition,
    rules: &DerivationRules,
    now: DateTime<Utc>,
    close_pending: bool,
) -> PositionView {
    let position = &derived.position;
    PositionView {
        id: position.id.clone(),
        pair: position.pair.to_string(),
        exchange: position.exchange.clone(),
        side: position.direction(),
        leverage: position.effective_leverage(),
        entry_price: position.entry_price,
        amount: position.amount.inner(),
        coin_amount: derived.coin_amount,
        current_price: derived.current_price(),
        price_tier: derived.price.map(|p| p.tier),
        price_move_pct: derived.price_move_pct,
        capital_return_pct: derived.capital_return_pct,
        gross_pnl: derived.gross_pnl,
        notional: derived.notional,
        collateral: derived.collateral,
        peak_pnl_pct: derived.peak_pnl_pct,
        trailing_active: derived.trailing_active,
        trail_stop: derived.trail_stop,
        risk_state: derived.risk_state,
        stop_loss: position.stop_loss,
        take_profit: position.take_profit,
        liquidation_price: derived.liquidation_price,
        liquidation_distance_pct: derived.liquidation_distance_pct,
        opened_at: position.opened_at,
        held_for: format_duration(position.opened_at, now),
        range_bar: range_bar(derived, rules),
        close_pending,
    }
}

/// Totals over the open positions. Unpriced positions only count toward
/// `open_count` and `calculating_count`.
pub fn portfolio_totals(positions: &[DerivedPosition]) -> PortfolioTotals {
    let mut totals = PortfolioTotals {
        open_count: positions.len(),
        ..Default::default()
    };

    for derived in positions {
        if !derived.is_priced() {
            totals.calculating_count += 1;
        }
        let collateral = derived.collateral.unwrap_or_default();
        let notional = derived.notional.unwrap_or_default();
        totals.total_collateral += collateral;
        totals.total_gross_pnl += derived.gross_pnl.unwrap_or_default();
        if derived.position.is_futures() {
            totals.futures_collateral += collateral;
            totals.futures_notional += notional;
        } else {
            totals.spot_exposure += notional;
        }
    }
    totals
}

/// Scanner rows: configured pairs first in configured order, then pairs
/// the analyzer reports that are not configured, in first-seen order.
/// One row per (pair, exchange); a configured pair with no data gets a
/// single `no-data` row.
pub fn pair_rows(
    known: &[Instrument],
    book: &IndicatorBook,
    leveraged_exchanges: &[String],
    rules: &TallyRules,
) -> Vec<PairView> {
    let matches_known = |snap: &IndicatorSnapshot, pair: &Instrument| {
        snap.pair == *pair || snap.pair.compact_symbol() == pair.compact_symbol()
    };

    let mut rows = Vec::with_capacity(known.len().max(book.len()));
    for pair in known {
        let mut any = false;
        for snap in book.iter().filter(|snap| matches_known(snap, pair)) {
            any = true;
            rows.push(pair_view(snap, true, leveraged_exchanges, rules));
        }
        if !any {
            // No exchange of its own: leveraged if any venue the analyzer scans is.
            let leveraged = pair.is_derivative()
                || book
                    .iter()
                    .any(|snap| is_leveraged_market(pair, &snap.exchange, leveraged_exchanges));
            rows.push(PairView {
                pair: pair.to_string(),
                exchange: None,
                known: true,
                rsi: None,
                volume_ratio: None,
                price_change_15m: None,
                current_price: None,
                updated_at: None,
                tally: ConfirmationTally::no_data(leveraged),
            });
        }
    }

    for snap in book.iter() {
        if !known.iter().any(|pair| matches_known(snap, pair)) {
            rows.push(pair_view(snap, false, leveraged_exchanges, rules));
        }
    }
    rows
}

fn pair_view(
    snap: &IndicatorSnapshot,
    known: bool,
    leveraged_exchanges: &[String],
    rules: &TallyRules,
) -> PairView {
    let leveraged = is_leveraged_market(&snap.pair, &snap.exchange, leveraged_exchanges);
    PairView {
        pair: snap.pair.to_string(),
        exchange: Some(snap.exchange.clone()),
        known,
        rsi: snap.rsi,
        volume_ratio: snap.volume_ratio,
        price_change_15m: snap.price_change_15m,
        current_price: snap.usable_price(),
        updated_at: Some(snap.timestamp),
        tally: tally(snap, leveraged, rules),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use mirror_core::{ContractSizeTable, Position, PositionSide, Price, PriceSnapshot, Size};
    use mirror_position::{derive_position, PriceChain};
    use mirror_signal::TallyStatus;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 16, 8, 0, 0).unwrap()
    }

    fn derive_at(position: Position, price: Option<Decimal>) -> DerivedPosition {
        let mut prices = HashMap::new();
        if let Some(p) = price {
            prices.insert(position.pair.clone(), Price::new(p));
        }
        let snap = PriceSnapshot::new(prices, t0(), mirror_core::FreshnessTier::Live);
        let book = IndicatorBook::new();
        derive_position(
            &position,
            &PriceChain::new(Some(&snap), &book),
            &ContractSizeTable::with_defaults(),
            &DerivationRules::default(),
        )
    }

    fn spot(id: &str, entry: Decimal) -> Position {
        Position::new(id, "ETH/USDT", PositionSide::Long, Price::new(entry), Size::new(dec!(2)), dec!(1), "binance", t0())
    }

    #[test]
    fn test_format_duration_units() {
        let at = |secs: i64| format_duration(t0(), t0() + Duration::seconds(secs));
        assert_eq!(at(45), "45s");
        assert_eq!(at(12 * 60 + 5), "12m 05s");
        assert_eq!(at(3 * 3600 + 7 * 60 + 59), "3h 07m");
        assert_eq!(at(2 * 86_400 + 4 * 3600 + 30), "2d 04h");
        assert_eq!(at(-30), "0s");
    }

    #[test]
    fn test_range_bar_default_stop_distance() {
        // no stop-loss: default 0.50 % stop distance, span 0.50 + 0.30
        let d = derive_at(spot("1", dec!(100)), Some(dec!(100.1)));
        let bar = range_bar(&d, &DerivationRules::default()).unwrap();
        assert_eq!(bar.span_pct, dec!(0.80));
        assert_eq!(bar.stop_loss, dec!(0));
        assert_eq!(bar.entry, dec!(62.5));
        assert_eq!(bar.current, dec!(75));
        assert_eq!(bar.trail_activation, dec!(100));
        assert!(bar.trail_stop.is_none());
    }

    #[test]
    fn test_range_bar_clamps_and_uses_stop_loss() {
        let position = spot("1", dec!(100)).with_stop_loss(Price::new(dec!(99)));
        let d = derive_at(position, Some(dec!(97)));
        let bar = range_bar(&d, &DerivationRules::default()).unwrap();
        assert_eq!(bar.span_pct, dec!(1.30));
        assert_eq!(bar.current, dec!(0));
    }

    #[test]
    fn test_range_bar_none_without_price() {
        let d = derive_at(spot("1", dec!(100)), None);
        assert!(range_bar(&d, &DerivationRules::default()).is_none());
    }

    #[test]
    fn test_portfolio_totals_split() {
        let futures = Position::new(
            "2",
            "BTC/USD:USD",
            PositionSide::Short,
            Price::new(dec!(70000)),
            Size::new(dec!(10)),
            dec!(10),
            "delta",
            t0(),
        );
        let positions = vec![
            derive_at(spot("1", dec!(100)), Some(dec!(101))),
            derive_at(futures, Some(dec!(69000))),
            derive_at(spot("3", dec!(50)), None),
        ];
        let totals = portfolio_totals(&positions);

        assert_eq!(totals.open_count, 3);
        assert_eq!(totals.calculating_count, 1);
        assert_eq!(totals.spot_exposure, dec!(200));
        assert_eq!(totals.futures_notional, dec!(700));
        assert_eq!(totals.futures_collateral, dec!(70));
        assert_eq!(totals.total_collateral, dec!(270));
        assert_eq!(totals.total_gross_pnl, dec!(12));
    }

    #[test]
    fn test_pair_rows_known_first_then_first_seen() {
        let mut book = IndicatorBook::new();
        for (pair, exchange, secs) in [
            ("DOGE/USDT", "binance", 0),
            ("BTC/USDT", "binance", 1),
            ("BTCUSD", "delta", 2),
        ] {
            let mut snap = IndicatorSnapshot::empty(pair, exchange, t0() + Duration::seconds(secs));
            snap.rsi = Some(dec!(50));
            book.upsert(snap);
        }
        let known: Vec<Instrument> = vec!["ETH/USDT".into(), "BTC/USDT".into()];

        let rows = pair_rows(&known, &book, &["delta".to_string()], &TallyRules::default());
        let keys: Vec<(String, Option<String>)> = rows.iter().map(|r| (r.pair.clone(), r.exchange.clone())).collect();

        assert_eq!(
            keys,
            vec![
                ("ETH/USDT".to_string(), None),
                ("BTC/USDT".to_string(), Some("binance".to_string())),
                ("DOGE/USDT".to_string(), Some("binance".to_string())),
                ("BTCUSD".to_string(), Some("delta".to_string())),
            ]
        );
        assert_eq!(rows[0].tally.status, TallyStatus::NoData);
        assert!(!rows[3].known);
        assert!(rows[3].tally.leveraged);
    }

    #[test]
    fn test_no_data_row_follows_leveraged_exchanges() {
        let mut book = IndicatorBook::new();
        book.upsert(IndicatorSnapshot::empty("ETH/USD:USD", "delta", t0()));
        let known: Vec<Instrument> = vec!["SOL/USDT".into()];
        let rules = TallyRules::default();

        let rows = pair_rows(&known, &book, &["delta".to_string()], &rules);
        assert_eq!(rows[0].exchange, None);
        assert!(rows[0].tally.leveraged);

        let rows = pair_rows(&known, &book, &["bybit".to_string()], &rules);
        assert!(!rows[0].tally.leveraged);

        let rows = pair_rows(&known, &IndicatorBook::new(), &["delta".to_string()], &rules);
        assert!(!rows[0].tally.leveraged);
    }

    #[test]
    fn test_position_view_carries_close_marker() {
        let d = derive_at(spot("7", dec!(100)), Some(dec!(100)));
        let view = position_view(&d, &DerivationRules::default(), t0() + Duration::seconds(65), true);
        assert_eq!(view.held_for, "1m 05s");
        assert!(view.close_pending);
        assert_eq!(view.price_tier, Some(mirror_core::FreshnessTier::Live));
    }
}
