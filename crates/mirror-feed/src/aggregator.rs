//! Price aggregation endpoint provider.
//!
//! `GET {url}?symbols=A,B` answers
//! `{ "prices": { "<INSTRUMENT>": <number|string> }, "source": "...", "timestamp": <ms> }`.
//! The endpoint may key prices by a different notation than requested
//! (`BTCUSD` for `BTC/USD:USD`), so keys are matched through the
//! instrument's derived forms. An empty `prices` object is no data, not an error.

use std::collections::HashMap;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use mirror_core::{FreshnessTier, Instrument, Price, PriceSnapshot};
use reqwest::{Client, Url};
use tracing::debug;

use crate::error::{FeedError, FeedResult};
use crate::provider::{get_json, parse_price, PriceProvider, ProviderPrices};

pub struct AggregatorProvider {
    name: String,
    client: Client,
    url: String,
}

impl AggregatorProvider {
    pub fn new(name: impl Into<String>, client: Client, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            client,
            url: url.into(),
        }
    }

    async fn fetch_inner(&self, instruments: &[Instrument]) -> FeedResult<ProviderPrices> {
        let symbols = instruments
            .iter()
            .map(Instrument::as_str)
            .collect::<Vec<_>>()
            .join(",");
        let url = Url::parse_with_params(&self.url, &[("symbols", symbols.as_str())])
            .map_err(|e| FeedError::Config(format!("{}: bad url {}: {e}", self.name, self.url)))?;

        let body = get_json(&self.name, self.client.get(url)).await?;
        let prices = match body.get("prices") {
            Some(serde_json::Value::Object(map)) => map,
            Some(serde_json::Value::Null) | None => {
                return Err(FeedError::Body {
                    provider: self.name.clone(),
                    reason: "missing prices object".to_string(),
                })
            }
            Some(other) => {
                return Err(FeedError::Body {
                    provider: self.name.clone(),
                    reason: format!("prices is not an object: {other}"),
                })
            }
        };

        let quoted: HashMap<Instrument, Price> = prices
            .iter()
            .filter_map(|(key, value)| parse_price(value).map(|p| (Instrument::new(key.as_str()), p)))
            .collect();

        debug!(
            provider = %self.name,
            source = body.get("source").and_then(|s| s.as_str()).unwrap_or("-"),
            quoted = quoted.len(),
            "Aggregator response"
        );

        Ok(match_requested(instruments, quoted))
    }
}

impl PriceProvider for AggregatorProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn fetch<'a>(&'a self, instruments: &'a [Instrument]) -> BoxFuture<'a, FeedResult<ProviderPrices>> {
        self.fetch_inner(instruments).boxed()
    }
}

/// Re-key a quoted map onto the instruments that were asked for.
fn match_requested(instruments: &[Instrument], quoted: HashMap<Instrument, Price>) -> ProviderPrices {
    let lookup = PriceSnapshot::new(quoted, chrono::Utc::now(), FreshnessTier::Live);
    instruments
        .iter()
        .filter_map(|inst| lookup.get(inst).map(|p| (inst.clone(), p)))
        .collect()
}
