//! REST client for the agent's persistence surface.
//!
//! Reads open positions and indicator snapshots, and writes operator
//! commands. The surface is PostgREST-shaped: `GET {base}/rest/v1/{table}`
//! with filter query parameters, `POST` with a JSON row to insert.

use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use mirror_core::{IndicatorSnapshot, Instrument, Position};
use reqwest::{Client, RequestBuilder, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};

/// Source of the agent's persisted snapshots.
pub trait SnapshotSource: Send + Sync {
    /// All currently open positions.
    fn open_positions(&self) -> BoxFuture<'_, StoreResult<Vec<Position>>>;

    /// Most recent indicator rows, newest first.
    fn recent_indicators(&self) -> BoxFuture<'_, StoreResult<Vec<IndicatorSnapshot>>>;
}

/// Operator command channel back to the agent.
///
/// A sent command is not an acknowledgement: the agent acts on it
/// asynchronously, and the position disappearing is the only confirmation.
pub trait CommandSink: Send + Sync {
    /// Ask the agent to close a trade. Returns the command id if the store echoed one.
    fn request_close<'a>(&'a self, trade_id: &'a str, pair: &'a Instrument) -> BoxFuture<'a, StoreResult<Option<String>>>;
}

/// Command row as the agent expects it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommandRecord {
    pub command: String,
    pub params: serde_json::Value,
    pub status: String,
}

impl CommandRecord {
    pub fn close_trade(trade_id: &str, pair: &Instrument) -> Self {
        Self {
            command: "close_trade".to_string(),
            params: serde_json::json!({ "trade_id": trade_id, "pair": pair.as_str() }),
            status: "pending".to_string(),
        }
    }
}

/// HTTP client for the persistence surface.
pub struct StoreClient {
    client: Client,
    config: StoreConfig,
}

impl StoreClient {
    pub fn new(config: StoreConfig) -> StoreResult<Self> {
        if config.timeout_ms == 0 {
            return Err(StoreError::Config("timeout_ms must be positive".to_string()));
        }
        Url::parse(&config.base_url)
            .map_err(|e| StoreError::Config(format!("bad base_url {}: {e}", config.base_url)))?;

        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| StoreError::HttpClient(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    fn table_url(&self, table: &str, params: &[(&str, String)]) -> StoreResult<Url> {
        let raw = format!("{}/rest/v1/{table}", self.config.base_url.trim_end_matches('/'));
        Url::parse_with_params(&raw, params.iter().map(|(k, v)| (*k, v.as_str())))
            .map_err(|e| StoreError::Config(format!("bad table url {raw}: {e}")))
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.config.api_key {
            Some(key) if !key.is_empty() => request.header("apikey", key).bearer_auth(key),
            _ => request,
        }
    }

    async fn get_rows(&self, url: Url) -> StoreResult<Vec<serde_json::Value>> {
        let response = self
            .authorize(self.client.get(url))
            .send()
            .await
            .map_err(|e| StoreError::HttpClient(format!("HTTP request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| StoreError::Parse(format!("Failed to parse response: {e}")))?;

        match body {
            serde_json::Value::Array(rows) => Ok(rows),
            other => Err(StoreError::Parse(format!("expected an array of rows, got {other}"))),
        }
    }

    /// Fetch open positions.
    pub async fn fetch_open_positions(&self) -> StoreResult<Vec<Position>> {
        let url = self.table_url(
            &self.config.positions_table,
            &[("select", "*".to_string()), ("status", "eq.open".to_string())],
        )?;
        let rows = self.get_rows(url).await?;
        let positions = parse_rows::<Position>("position", rows);
        debug!(count = positions.len(), "Fetched open positions");
        Ok(positions)
    }

    /// Fetch the most recent indicator rows.
    pub async fn fetch_recent_indicators(&self) -> StoreResult<Vec<IndicatorSnapshot>> {
        let url = self.table_url(
            &self.config.indicators_table,
            &[
                ("select", "*".to_string()),
                ("order", "timestamp.desc".to_string()),
                ("limit", self.config.indicator_limit.to_string()),
            ],
        )?;
        let rows = self.get_rows(url).await?;
        let snapshots = parse_rows::<IndicatorSnapshot>("indicator", rows);
        debug!(count = snapshots.len(), "Fetched indicator snapshots");
        Ok(snapshots)
    }

    /// Insert a `close_trade` command for the agent.
    pub async fn send_close(&self, trade_id: &str, pair: &Instrument) -> StoreResult<Option<String>> {
        let url = self.table_url(&self.config.commands_table, &[])?;
        let record = CommandRecord::close_trade(trade_id, pair);

        info!(trade_id = %trade_id, pair = %pair, "Sending close command");

        let response = self
            .authorize(self.client.post(url))
            .header("Prefer", "return=representation")
            .json(&record)
            .send()
            .await
            .map_err(|e| StoreError::HttpClient(format!("HTTP request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Status {
                status: status.as_u16(),
                body,
            });
        }

        // Representation is optional; an empty 201 is still success.
        let text = response.text().await.unwrap_or_default();
        Ok(command_id(&text))
    }
}

impl SnapshotSource for StoreClient {
    fn open_positions(&self) -> BoxFuture<'_, StoreResult<Vec<Position>>> {
        self.fetch_open_positions().boxed()
    }

    fn recent_indicators(&self) -> BoxFuture<'_, StoreResult<Vec<IndicatorSnapshot>>> {
        self.fetch_recent_indicators().boxed()
    }
}

impl CommandSink for StoreClient {
    fn request_close<'a>(&'a self, trade_id: &'a str, pair: &'a Instrument) -> BoxFuture<'a, StoreResult<Option<String>>> {
        self.send_close(trade_id, pair).boxed()
    }
}

/// Parse rows one by one, skipping the ones that do not fit.
fn parse_rows<T: DeserializeOwned>(kind: &str, rows: Vec<serde_json::Value>) -> Vec<T> {
    let total = rows.len();
    let parsed: Vec<T> = rows
        .into_iter()
        .enumerate()
        .filter_map(|(idx, row)| match serde_json::from_value::<T>(row) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(kind, idx, error = %e, "Skipping malformed row");
                None
            }
        })
        .collect();
    if parsed.len() < total {
        warn!(kind, skipped = total - parsed.len(), total, "Some rows were skipped");
    }
    parsed
}

/// Extract `id` from a PostgREST representation (array of rows or a single row).
fn command_id(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    let row = match &value {
        serde_json::Value::Array(rows) => rows.first()?,
        other => other,
    };
    match row.get("id")? {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_close_command_record_shape() {
        let record = CommandRecord::close_trade("42", &"BTC/USD:USD".into());
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(
            value,
            json!({
                "command": "close_trade",
                "params": { "trade_id": "42", "pair": "BTC/USD:USD" },
                "status": "pending"
            })
        );
    }

    #[test]
    fn test_command_id_extraction() {
        assert_eq!(command_id(r#"[{"id": 7, "command": "close_trade"}]"#), Some("7".to_string()));
        assert_eq!(command_id(r#"{"id": "abc"}"#), Some("abc".to_string()));
        assert_eq!(command_id(""), None);
        assert_eq!(command_id("[]"), None);
    }

    #[test]
    fn test_parse_rows_skips_bad_rows() {
        let rows = vec![
            json!({
                "id": 1, "pair": "BTC/USD:USD", "side": "buy", "entry_price": 100,
                "amount": 1, "exchange": "delta", "opened_at": "2026-10-16T08:00:00Z"
            }),
            json!({ "id": 2, "pair": "ETH/USDT" }),
        ];
        let parsed: Vec<Position> = parse_rows("position", rows);
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].id, "1");
    }

    #[test]
    fn test_table_url_building() {
        let client = StoreClient::new(StoreConfig {
            base_url: "http://localhost:54321/".to_string(),
            ..Default::default()
        })
        .unwrap();
        let url = client
            .table_url("trades", &[("status", "eq.open".to_string())])
            .unwrap();
        assert_eq!(url.as_str(), "http://localhost:54321/rest/v1/trades?status=eq.open");
    }

    #[test]
    fn test_rejects_bad_base_url() {
        let result = StoreClient::new(StoreConfig {
            base_url: "not a url".to_string(),
            ..Default::default()
        });
        assert!(matches!(result, Err(StoreError::Config(_))));
    }
}
