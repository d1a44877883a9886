//! Per-pair analytics snapshots and the newest-wins book holding them.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{Instrument, Price};

/// Indicator values for one pair on one exchange at one point in time.
///
/// Any field may be missing while the analyzer is warming up.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorSnapshot {
    pub pair: Instrument,
    #[serde(alias = "exchange_id")]
    pub exchange: String,
    /// RSI(14).
    #[serde(default)]
    pub rsi: Option<Decimal>,
    /// Current volume over trailing average volume.
    #[serde(default)]
    pub volume_ratio: Option<Decimal>,
    /// Price change over the last 15 minutes, in percent.
    #[serde(default, alias = "change_15m")]
    pub price_change_15m: Option<Decimal>,
    #[serde(default, alias = "price")]
    pub current_price: Option<Price>,
    /// Upper Bollinger band.
    #[serde(default)]
    pub bb_upper: Option<Price>,
    /// Lower Bollinger band.
    #[serde(default)]
    pub bb_lower: Option<Price>,
    #[serde(alias = "created_at", deserialize_with = "crate::position::deserialize_timestamp")]
    pub timestamp: DateTime<Utc>,
}

impl IndicatorSnapshot {
    /// Snapshot with only identity and time set.
    pub fn empty(pair: impl Into<Instrument>, exchange: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            pair: pair.into(),
            exchange: exchange.into(),
            rsi: None,
            volume_ratio: None,
            price_change_15m: None,
            current_price: None,
            bb_upper: None,
            bb_lower: None,
            timestamp,
        }
    }

    pub fn key(&self) -> IndicatorKey {
        IndicatorKey::new(self.pair.clone(), self.exchange.clone())
    }

    /// Current price if strictly positive.
    pub fn usable_price(&self) -> Option<Price> {
        self.current_price.filter(|p| p.is_positive())
    }
}

/// (pair, exchange) identity of an indicator row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IndicatorKey {
    pub pair: Instrument,
    pub exchange: String,
}

impl IndicatorKey {
    pub fn new(pair: impl Into<Instrument>, exchange: impl Into<String>) -> Self {
        Self {
            pair: pair.into(),
            exchange: exchange.into(),
        }
    }
}

/// Latest indicator snapshot per (pair, exchange).
///
/// An incoming row replaces the held one only when strictly newer; rows are
/// never merged field by field. Keys keep first-seen order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndicatorBook {
    order: Vec<IndicatorKey>,
    latest: HashMap<IndicatorKey, IndicatorSnapshot>,
}

impl IndicatorBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a book from rows in arrival order.
    pub fn from_rows(rows: impl IntoIterator<Item = IndicatorSnapshot>) -> Self {
        let mut book = Self::new();
        book.extend(rows);
        book
    }

    /// Offer a row. Returns `true` if it became the held snapshot.
    pub fn upsert(&mut self, snapshot: IndicatorSnapshot) -> bool {
        let key = snapshot.key();
        match self.latest.get(&key) {
            Some(held) if held.timestamp >= snapshot.timestamp => false,
            Some(_) => {
                self.latest.insert(key, snapshot);
                true
            }
            None => {
                self.order.push(key.clone());
                self.latest.insert(key, snapshot);
                true
            }
        }
    }

    /// Offer many rows; returns how many were accepted.
    pub fn extend(&mut self, rows: impl IntoIterator<Item = IndicatorSnapshot>) -> usize {
        let mut accepted = 0;
        for row in rows {
            if self.upsert(row) {
                accepted += 1;
            }
        }
        accepted
    }

    pub fn get(&self, pair: &Instrument, exchange: &str) -> Option<&IndicatorSnapshot> {
        self.latest.get(&IndicatorKey::new(pair.clone(), exchange))
    }

    /// Snapshots in first-seen order.
    pub fn iter(&self) -> impl Iterator<Item = &IndicatorSnapshot> {
        self.order.iter().filter_map(|key| self.latest.get(key))
    }

    /// Drop rows stamped before `cutoff`. Survivors keep their order.
    /// Returns how many were dropped.
    pub fn evict_older_than(&mut self, cutoff: DateTime<Utc>) -> usize {
        let before = self.order.len();
        self.latest.retain(|_, snap| snap.timestamp >= cutoff);
        let latest = &self.latest;
        self.order.retain(|key| latest.contains_key(key));
        before - self.order.len()
    }

    /// Latest usable price for a base asset.
    ///
    /// A snapshot from `preferred_exchange` wins; otherwise the newest
    /// snapshot across exchanges.
    pub fn price_for_base(&self, base: &str, preferred_exchange: Option<&str>) -> Option<Price> {
        let candidates = || {
            self.iter()
                .filter(|snap| snap.pair.base_asset().eq_ignore_ascii_case(base))
                .filter_map(|snap| snap.usable_price().map(|p| (snap, p)))
        };

        if let Some(exchange) = preferred_exchange {
            let preferred = candidates()
                .filter(|(snap, _)| snap.exchange.eq_ignore_ascii_case(exchange))
                .max_by_key(|(snap, _)| snap.timestamp);
            if let Some((_, price)) = preferred {
                return Some(price);
            }
        }

        candidates()
            .max_by_key(|(snap, _)| snap.timestamp)
            .map(|(_, price)| price)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use rust_decimal_macros::dec;

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 16, 8, 0, 0).unwrap() + Duration::seconds(secs)
    }

    fn snap(pair: &str, exchange: &str, secs: i64, price: Option<Decimal>) -> IndicatorSnapshot {
        let mut s = IndicatorSnapshot::empty(pair, exchange, t(secs));
        s.current_price = price.map(Price::new);
        s
    }

    #[test]
    fn test_newer_row_replaces_older() {
        let mut book = IndicatorBook::new();
        assert!(book.upsert(snap("BTC/USDT", "binance", 0, Some(dec!(100)))));
        assert!(book.upsert(snap("BTC/USDT", "binance", 10, Some(dec!(101)))));

        let held = book.get(&"BTC/USDT".into(), "binance").unwrap();
        assert_eq!(held.current_price, Some(Price::new(dec!(101))));
        assert_eq!(book.len(), 1);
    }

    #[test]
    fn test_older_or_equal_row_never_replaces() {
        let mut book = IndicatorBook::new();
        let mut newest = snap("BTC/USDT", "binance", 10, Some(dec!(101)));
        newest.rsi = Some(dec!(55));
        book.upsert(newest);

        assert!(!book.upsert(snap("BTC/USDT", "binance", 5, Some(dec!(99)))));
        assert!(!book.upsert(snap("BTC/USDT", "binance", 10, Some(dec!(98)))));

        let held = book.get(&"BTC/USDT".into(), "binance").unwrap();
        assert_eq!(held.current_price, Some(Price::new(dec!(101))));
        assert_eq!(held.rsi, Some(dec!(55)));
    }

    #[test]
    fn test_rows_not_merged_field_by_field() {
        let mut book = IndicatorBook::new();
        let mut first = snap("ETH/USDT", "binance", 0, Some(dec!(3000)));
        first.rsi = Some(dec!(40));
        book.upsert(first);
        book.upsert(snap("ETH/USDT", "binance", 1, None));

        let held = book.get(&"ETH/USDT".into(), "binance").unwrap();
        assert!(held.rsi.is_none());
        assert!(held.current_price.is_none());
    }

    #[test]
    fn test_first_seen_order_kept() {
        let book = IndicatorBook::from_rows([
            snap("SOL/USDT", "binance", 0, None),
            snap("BTC/USDT", "binance", 0, None),
            snap("SOL/USDT", "binance", 5, None),
            snap("BTC/USD:USD", "delta", 0, None),
        ]);

        let pairs: Vec<_> = book.iter().map(|s| s.pair.as_str()).collect();
        assert_eq!(pairs, vec!["SOL/USDT", "BTC/USDT", "BTC/USD:USD"]);
    }

    #[test]
    fn test_evict_older_than_keeps_order_of_survivors() {
        let mut book = IndicatorBook::from_rows([
            snap("SOL/USDT", "binance", 0, None),
            snap("BTC/USDT", "binance", 50, None),
            snap("ETH/USDT", "binance", 10, None),
            snap("XRP/USDT", "binance", 60, None),
        ]);

        assert_eq!(book.evict_older_than(t(30)), 2);
        let pairs: Vec<_> = book.iter().map(|s| s.pair.as_str()).collect();
        assert_eq!(pairs, vec!["BTC/USDT", "XRP/USDT"]);
        assert!(book.get(&"SOL/USDT".into(), "binance").is_none());

        // an evicted key comes back at the end when it reappears
        assert!(book.upsert(snap("SOL/USDT", "binance", 70, None)));
        let pairs: Vec<_> = book.iter().map(|s| s.pair.as_str()).collect();
        assert_eq!(pairs, vec!["BTC/USDT", "XRP/USDT", "SOL/USDT"]);
        assert_eq!(book.evict_older_than(t(0)), 0);
    }

    #[test]
    fn test_price_for_base_prefers_exchange_then_newest() {
        let book = IndicatorBook::from_rows([
            snap("BTC/USDT", "binance", 20, Some(dec!(70100))),
            snap("BTC/USD:USD", "delta", 10, Some(dec!(70000))),
            snap("ETH/USDT", "binance", 30, Some(dec!(3000))),
        ]);

        assert_eq!(book.price_for_base("BTC", Some("delta")), Some(Price::new(dec!(70000))));
        assert_eq!(book.price_for_base("BTC", Some("kraken")), Some(Price::new(dec!(70100))));
        assert_eq!(book.price_for_base("BTC", None), Some(Price::new(dec!(70100))));
        assert!(book.price_for_base("XRP", None).is_none());
    }

    #[test]
    fn test_price_for_base_skips_unusable_prices() {
        let book = IndicatorBook::from_rows([
            snap("BTC/USD:USD", "delta", 30, Some(dec!(0))),
            snap("BTC/USDT", "binance", 20, None),
            snap("BTCUSDT", "bybit", 10, Some(dec!(69000))),
        ]);

        assert_eq!(book.price_for_base("BTC", Some("delta")), Some(Price::new(dec!(69000))));
    }
}
