//! Binance spot ticker provider.
//!
//! Reads the full `GET /api/v3/ticker/price` list and maps each requested
//! instrument to `<BASE>USDT`.

use std::collections::HashMap;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use mirror_core::{Instrument, Price};
use reqwest::Client;

use crate::error::{FeedError, FeedResult};
use crate::provider::{get_json, parse_price, PriceProvider, ProviderPrices};

/// Public REST base URL.
pub const BINANCE_BASE_URL: &str = "https://api.binance.com";

pub struct BinanceProvider {
    name: String,
    client: Client,
    base_url: String,
}

impl BinanceProvider {
    pub fn new(name: impl Into<String>, client: Client, base_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            client,
            base_url: base_url.into(),
        }
    }

    /// Ticker symbol quoted for an instrument.
    pub fn symbol_for(instrument: &Instrument) -> String {
        format!("{}USDT", instrument.base_asset())
    }

    async fn fetch_inner(&self, instruments: &[Instrument]) -> FeedResult<ProviderPrices> {
        let url = format!("{}/api/v3/ticker/price", self.base_url.trim_end_matches('/'));
        let body = get_json(&self.name, self.client.get(url)).await?;

        let tickers = body.as_array().ok_or_else(|| FeedError::Body {
            provider: self.name.clone(),
            reason: "ticker response is not an array".to_string(),
        })?;

        let by_symbol: HashMap<&str, Price> = tickers
            .iter()
            .filter_map(|t| {
                let symbol = t.get("symbol")?.as_str()?;
                let price = parse_price(t.get("price")?)?;
                Some((symbol, price))
            })
            .collect();

        Ok(instruments
            .iter()
            .filter_map(|inst| {
                by_symbol
                    .get(Self::symbol_for(inst).as_str())
                    .map(|p| (inst.clone(), *p))
            })
            .collect())
    }
}

impl PriceProvider for BinanceProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn fetch<'a>(&'a self, instruments: &'a [Instrument]) -> BoxFuture<'a, FeedResult<ProviderPrices>> {
        self.fetch_inner(instruments).boxed()
    }
}
