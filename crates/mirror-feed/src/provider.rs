//! Price provider abstraction and shared parsing helpers.

use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use futures_util::future::BoxFuture;
use mirror_core::{Instrument, Price};
use reqwest::{Client, Response};
use rust_decimal::Decimal;

use crate::error::{FeedError, FeedResult};

/// Prices returned by one provider, keyed by the requested instrument.
pub type ProviderPrices = HashMap<Instrument, Price>;

/// One upstream market-data source.
///
/// Implementations return only instruments they could price; an instrument
/// they do not list is simply absent. Timeouts are applied by the caller.
pub trait PriceProvider: Send + Sync {
    /// Stable name used for precedence, logs and metrics.
    fn name(&self) -> &str;

    /// Fetch prices for the requested instruments.
    fn fetch<'a>(&'a self, instruments: &'a [Instrument]) -> BoxFuture<'a, FeedResult<ProviderPrices>>;
}

/// Build the shared HTTP client used by the shipped providers.
pub fn build_http_client(timeout: Duration) -> FeedResult<Client> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| FeedError::HttpClient(format!("Failed to create HTTP client: {e}")))
}

/// Send a prepared GET and turn non-2xx statuses into errors.
pub(crate) async fn get_json(
    provider: &str,
    request: reqwest::RequestBuilder,
) -> FeedResult<serde_json::Value> {
    let response: Response = request
        .send()
        .await
        .map_err(|e| FeedError::HttpClient(format!("{provider}: request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        return Err(FeedError::Status {
            provider: provider.to_string(),
            status: status.as_u16(),
        });
    }

    response.json().await.map_err(|e| FeedError::Body {
        provider: provider.to_string(),
        reason: e.to_string(),
    })
}

/// Parse a quoted price from a JSON number or numeric string.
///
/// Returns `None` unless the value is strictly positive.
pub fn parse_price(value: &serde_json::Value) -> Option<Price> {
    let decimal = match value {
        serde_json::Value::Number(n) => Decimal::from_str(&n.to_string())
            .or_else(|_| Decimal::from_scientific(&n.to_string()))
            .ok()?,
        serde_json::Value::String(s) => {
            let s = s.trim();
            Decimal::from_str(s)
                .or_else(|_| Decimal::from_scientific(s))
                .ok()?
        }
        _ => return None,
    };
    let price = Price::new(decimal);
    price.is_positive().then_some(price)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn test_parse_price_number_and_string() {
        assert_eq!(parse_price(&json!(70750.5)), Some(Price::new(dec!(70750.5))));
        assert_eq!(parse_price(&json!("3000.25")), Some(Price::new(dec!(3000.25))));
        assert_eq!(parse_price(&json!(" 1.5 ")), Some(Price::new(dec!(1.5))));
    }

    #[test]
    fn test_parse_price_rejects_non_positive_and_garbage() {
        assert!(parse_price(&json!(0)).is_none());
        assert!(parse_price(&json!(-1.0)).is_none());
        assert!(parse_price(&json!("n/a")).is_none());
        assert!(parse_price(&json!(null)).is_none());
        assert!(parse_price(&json!({"p": 1})).is_none());
    }
}
