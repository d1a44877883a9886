//! Price Source Adapter.
//!
//! Fans a request out to every provider concurrently, each under its own
//! timeout, and folds the answers into one instrument → price map:
//!
//! - a provider failure only removes that provider's quotes
//! - the configured primary provider for an instrument wins, otherwise the
//!   earliest provider in configured order
//! - no averaging, no synthetic prices; when every provider fails the quote
//!   is empty and marked stale

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use mirror_core::{Instrument, Price};
use mirror_telemetry::Metrics;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{FeedError, FeedResult};
use crate::provider::{PriceProvider, ProviderPrices};

/// A provider that did not answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderFailure {
    pub provider: String,
    pub error: String,
}

/// Best-effort result of one adapter call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceQuote {
    /// Prices keyed by the requested instrument.
    pub prices: HashMap<Instrument, Price>,
    /// Providers that answered, in configured order.
    pub answered: Vec<String>,
    /// Providers that failed.
    pub failures: Vec<ProviderFailure>,
    /// Instrument → provider whose quote was kept.
    pub provenance: HashMap<Instrument, String>,
    /// Set when no provider answered.
    pub stale: bool,
    pub fetched_at: DateTime<Utc>,
}

impl PriceQuote {
    fn empty(fetched_at: DateTime<Utc>) -> Self {
        Self {
            prices: HashMap::new(),
            answered: Vec::new(),
            failures: Vec::new(),
            provenance: HashMap::new(),
            stale: false,
            fetched_at,
        }
    }

    /// Joined failure messages, if any.
    pub fn failure_summary(&self) -> Option<String> {
        if self.failures.is_empty() {
            return None;
        }
        Some(
            self.failures
                .iter()
                .map(|f| f.error.as_str())
                .collect::<Vec<_>>()
                .join("; "),
        )
    }
}

/// Price Source Adapter over an ordered set of providers.
pub struct PriceSource {
    providers: Vec<Arc<dyn PriceProvider>>,
    /// Compact symbol → provider name.
    primaries: HashMap<String, String>,
    timeout: Duration,
}

impl PriceSource {
    pub fn new(providers: Vec<Arc<dyn PriceProvider>>, timeout: Duration) -> Self {
        Self {
            providers,
            primaries: HashMap::new(),
            timeout,
        }
    }

    /// Designate primary providers. Keys may use any instrument notation.
    #[must_use]
    pub fn with_primaries(mut self, primaries: HashMap<String, String>) -> Self {
        self.primaries = primaries
            .into_iter()
            .map(|(inst, provider)| (Instrument::new(inst).compact_symbol(), provider))
            .collect();
        self
    }

    pub fn provider_names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Query every provider and merge the answers.
    pub async fn quote(&self, instruments: &[Instrument]) -> PriceQuote {
        let fetched_at = Utc::now();
        if instruments.is_empty() {
            return PriceQuote::empty(fetched_at);
        }

        let results = join_all(
            self.providers
                .iter()
                .map(|provider| self.fetch_one(provider.as_ref(), instruments)),
        )
        .await;

        let mut quote = PriceQuote::empty(fetched_at);
        let mut answers: Vec<(&str, ProviderPrices)> = Vec::with_capacity(results.len());

        for (provider, result) in self.providers.iter().zip(results) {
            match result {
                Ok(prices) => {
                    quote.answered.push(provider.name().to_string());
                    answers.push((provider.name(), prices));
                }
                Err(e) => {
                    warn!(provider = provider.name(), error = %e, "Price provider failed");
                    Metrics::provider_failure(provider.name(), e.reason());
                    quote.failures.push(ProviderFailure {
                        provider: provider.name().to_string(),
                        error: e.to_string(),
                    });
                }
            }
        }

        quote.stale = answers.is_empty();

        for instrument in instruments {
            if let Some((name, price)) = self.pick(instrument, &answers) {
                quote.prices.insert(instrument.clone(), price);
                quote.provenance.insert(instrument.clone(), name.to_string());
            }
        }

        debug!(
            requested = instruments.len(),
            priced = quote.prices.len(),
            answered = ?quote.answered,
            stale = quote.stale,
            "Price quote merged"
        );

        quote
    }

    async fn fetch_one(
        &self,
        provider: &dyn PriceProvider,
        instruments: &[Instrument],
    ) -> FeedResult<ProviderPrices> {
        let started = Instant::now();
        let result = tokio::time::timeout(self.timeout, provider.fetch(instruments)).await;
        Metrics::provider_latency(provider.name(), started.elapsed().as_secs_f64() * 1000.0);

        match result {
            Ok(inner) => inner.map(|prices| {
                prices
                    .into_iter()
                    .filter(|(_, p)| p.is_positive())
                    .collect()
            }),
            Err(_) => Err(FeedError::Timeout {
                provider: provider.name().to_string(),
                timeout_ms: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
            }),
        }
    }

    /// Primary provider's quote if it answered one, else first in order.
    fn pick<'a>(
        &self,
        instrument: &Instrument,
        answers: &'a [(&'a str, ProviderPrices)],
    ) -> Option<(&'a str, Price)> {
        if let Some(primary) = self.primaries.get(&instrument.compact_symbol()) {
            let primary_quote = answers
                .iter()
                .find(|(name, _)| *name == primary.as_str())
                .and_then(|(name, prices)| prices.get(instrument).map(|p| (*name, *p)));
            if primary_quote.is_some() {
                return primary_quote;
            }
        }
        answers
            .iter()
            .find_map(|(name, prices)| prices.get(instrument).map(|p| (*name, *p)))
    }
}
