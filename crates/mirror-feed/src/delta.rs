//! Delta Exchange ticker provider.
//!
//! `GET /v2/tickers` answers `{ "success": true, "result": [ { "symbol", "mark_price", "close" } ] }`.
//! Instruments map to their compact symbol (`BTC/USD:USD` → `BTCUSD`);
//! the mark price is preferred over the last close.

use std::collections::HashMap;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use mirror_core::{Instrument, Price};
use reqwest::Client;

use crate::error::{FeedError, FeedResult};
use crate::provider::{get_json, parse_price, PriceProvider, ProviderPrices};

/// Public REST base URL (India region).
pub const DELTA_BASE_URL: &str = "https://api.india.delta.exchange";

pub struct DeltaProvider {
    name: String,
    client: Client,
    base_url: String,
}

impl DeltaProvider {
    pub fn new(name: impl Into<String>, client: Client, base_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            client,
            base_url: base_url.into(),
        }
    }

    async fn fetch_inner(&self, instruments: &[Instrument]) -> FeedResult<ProviderPrices> {
        let url = format!("{}/v2/tickers", self.base_url.trim_end_matches('/'));
        let body = get_json(&self.name, self.client.get(url)).await?;

        if body.get("success").and_then(|s| s.as_bool()) == Some(false) {
            return Err(FeedError::Body {
                provider: self.name.clone(),
                reason: format!("success=false: {}", body.get("error").cloned().unwrap_or_default()),
            });
        }

        let tickers = body
            .get("result")
            .and_then(|r| r.as_array())
            .ok_or_else(|| FeedError::Body {
                provider: self.name.clone(),
                reason: "missing result array".to_string(),
            })?;

        let by_symbol: HashMap<String, Price> = tickers
            .iter()
            .filter_map(|t| {
                let symbol = t.get("symbol")?.as_str()?.to_ascii_uppercase();
                let price = t
                    .get("mark_price")
                    .and_then(parse_price)
                    .or_else(|| t.get("close").and_then(parse_price))?;
                Some((symbol, price))
            })
            .collect();

        Ok(instruments
            .iter()
            .filter_map(|inst| by_symbol.get(&inst.compact_symbol()).map(|p| (inst.clone(), *p)))
            .collect())
    }
}

impl PriceProvider for DeltaProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn fetch<'a>(&'a self, instruments: &'a [Instrument]) -> BoxFuture<'a, FeedResult<ProviderPrices>> {
        self.fetch_inner(instruments).boxed()
    }
}
