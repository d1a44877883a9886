//! Price snapshots and freshness tiers.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Instrument, Price};

/// Where a price came from, freshest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FreshnessTier {
    /// Polled from a price feed during the current poll cycle.
    Live,
    /// Written by the agent alongside the position row.
    Persisted,
    /// Taken from the latest analytics snapshot for the base asset.
    Derived,
}

impl fmt::Display for FreshnessTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Live => write!(f, "live"),
            Self::Persisted => write!(f, "persisted"),
            Self::Derived => write!(f, "derived"),
        }
    }
}

/// A price together with its freshness tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedPrice {
    pub price: Price,
    pub tier: FreshnessTier,
}

impl ResolvedPrice {
    pub fn new(price: Price, tier: FreshnessTier) -> Self {
        Self { price, tier }
    }
}

/// Instrument → price map captured at a single point in time.
///
/// Keys are the instrument strings exactly as requested by the poller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSnapshot {
    pub prices: HashMap<Instrument, Price>,
    pub as_of: DateTime<Utc>,
    pub tier: FreshnessTier,
}

impl PriceSnapshot {
    pub fn new(prices: HashMap<Instrument, Price>, as_of: DateTime<Utc>, tier: FreshnessTier) -> Self {
        Self { prices, as_of, tier }
    }

    /// Empty live snapshot.
    pub fn empty(as_of: DateTime<Utc>) -> Self {
        Self::new(HashMap::new(), as_of, FreshnessTier::Live)
    }

    pub fn len(&self) -> usize {
        self.prices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }

    /// Look up a strictly positive price for the instrument.
    ///
    /// Exact key first, then any key with the same compact symbol, then a
    /// bare base-asset key, so a snapshot keyed `BTCUSD` still serves a
    /// position on `BTC/USD:USD`. When several keys match, the smallest key
    /// wins.
    pub fn get(&self, instrument: &Instrument) -> Option<Price> {
        if let Some(price) = self.prices.get(instrument).filter(|p| p.is_positive()) {
            return Some(*price);
        }
        let compact = instrument.compact_symbol();
        let base = instrument.base_asset();
        let positive = || self.prices.iter().filter(|(_, p)| p.is_positive());

        positive()
            .filter(|(k, _)| k.compact_symbol() == compact)
            .min_by_key(|(k, _)| *k)
            .or_else(|| {
                positive()
                    .filter(|(k, _)| k.as_str().eq_ignore_ascii_case(&base))
                    .min_by_key(|(k, _)| *k)
            })
            .map(|(_, p)| *p)
    }
}
