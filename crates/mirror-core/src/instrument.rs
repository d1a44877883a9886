//! Instrument identifiers and contract-size conversion.
//!
//! The agent writes pairs in whatever notation its exchange client uses
//! (`BTC/USD:USD`, `ETH/USDT`, `BTCUSD`). Price feeds and the contract-size
//! table are keyed differently, so every lookup goes through the derived
//! forms exposed here rather than raw string equality.

use std::collections::HashMap;
use std::fmt;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Quote currencies stripped when a pair carries no separator (`BTCUSDT`).
/// Longer suffixes first so `USDT` wins over `USD`.
const QUOTE_SUFFIXES: [&str; 5] = ["USDT", "USDC", "BUSD", "USD", "INR"];

/// Instrument (trading pair) as written by the agent.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Instrument(String);

impl Instrument {
    pub fn new(pair: impl Into<String>) -> Self {
        Self(pair.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Base asset, uppercased (`BTC/USD:USD` → `BTC`, `ETHUSDT` → `ETH`).
    pub fn base_asset(&self) -> String {
        let upper = self.0.trim().to_ascii_uppercase();
        if let Some(idx) = upper.find(['/', ':', '-', '_']) {
            return upper[..idx].to_string();
        }
        for suffix in QUOTE_SUFFIXES {
            if let Some(base) = upper.strip_suffix(suffix) {
                if !base.is_empty() {
                    return base.to_string();
                }
            }
        }
        upper
    }

    /// Exchange-style compact symbol: settlement suffix dropped and
    /// separators removed (`BTC/USD:USD` → `BTCUSD`).
    pub fn compact_symbol(&self) -> String {
        let upper = self.0.trim().to_ascii_uppercase();
        let without_settle = upper.split(':').next().unwrap_or_default();
        without_settle
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect()
    }

    /// Keys to try, in order, when matching this instrument against a price map.
    pub fn lookup_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = Vec::with_capacity(3);
        for key in [self.0.clone(), self.compact_symbol(), self.base_asset()] {
            if !key.is_empty() && !keys.contains(&key) {
                keys.push(key);
            }
        }
        keys
    }

    /// Whether the notation itself marks a derivative contract.
    ///
    /// Unified futures symbols carry a settlement currency after `:`.
    pub fn is_derivative(&self) -> bool {
        self.0.contains(':') || self.compact_symbol().ends_with("PERP")
    }
}

impl fmt::Display for Instrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Instrument {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Instrument {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl AsRef<str> for Instrument {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Coin amount represented by one unit of position size, per instrument.
///
/// Keys are normalized to compact symbols, so `BTC/USD:USD` and `BTCUSD`
/// share an entry. Unlisted instruments convert 1:1.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ContractSizeTable {
    sizes: HashMap<String, Decimal>,
}

impl ContractSizeTable {
    /// Empty table (every instrument converts 1:1).
    pub fn new() -> Self {
        Self::default()
    }

    /// Table pre-filled with the futures contracts the agent trades.
    pub fn with_defaults() -> Self {
        let mut table = Self::new();
        table.insert("BTCUSD", dec!(0.001));
        table.insert("ETHUSD", dec!(0.01));
        table.insert("SOLUSD", dec!(1));
        table.insert("XRPUSD", dec!(1));
        table
    }

    /// Add or replace a contract size.
    pub fn insert(&mut self, instrument: impl Into<Instrument>, coin_per_contract: Decimal) {
        let key = instrument.into().compact_symbol();
        self.sizes.insert(key, coin_per_contract);
    }

    /// Merge overrides (e.g. from configuration) into the table.
    pub fn extend<I, K>(&mut self, entries: I)
    where
        I: IntoIterator<Item = (K, Decimal)>,
        K: Into<Instrument>,
    {
        for (instrument, size) in entries {
            self.insert(instrument, size);
        }
    }

    /// Coin amount per unit of size; 1.0 when unlisted or non-positive.
    pub fn contract_size(&self, instrument: &Instrument) -> Decimal {
        match self.sizes.get(&instrument.compact_symbol()) {
            Some(size) if *size > Decimal::ZERO => *size,
            _ => Decimal::ONE,
        }
    }

    /// Whether the instrument has an explicit entry.
    pub fn is_listed(&self, instrument: &Instrument) -> bool {
        self.sizes.contains_key(&instrument.compact_symbol())
    }

    pub fn len(&self) -> usize {
        self.sizes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sizes.is_empty()
    }
}
