//! Persistence surface configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Where and how often to read the agent's persisted state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Project base URL (`{base}/rest/v1/...`).
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// API key sent as `apikey` and bearer token when set.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Table holding trades; open rows have `status = open`.
    #[serde(default = "default_positions_table")]
    pub positions_table: String,

    /// Table holding indicator snapshots.
    #[serde(default = "default_indicators_table")]
    pub indicators_table: String,

    /// Table the agent polls for operator commands.
    #[serde(default = "default_commands_table")]
    pub commands_table: String,

    /// Open-position refresh interval in milliseconds.
    #[serde(default = "default_positions_interval_ms")]
    pub positions_interval_ms: u64,

    /// Indicator refresh interval in milliseconds.
    #[serde(default = "default_indicators_interval_ms")]
    pub indicators_interval_ms: u64,

    /// Most recent indicator rows fetched per refresh.
    #[serde(default = "default_indicator_limit")]
    pub indicator_limit: u32,

    /// Indicator rows this far behind the newest row are dropped from the
    /// book, in milliseconds. 0 keeps every row.
    #[serde(default = "default_indicator_max_age_ms")]
    pub indicator_max_age_ms: u64,

    /// Per-request timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_base_url() -> String {
    "http://127.0.0.1:54321".to_string()
}

fn default_positions_table() -> String {
    "trades".to_string()
}

fn default_indicators_table() -> String {
    "indicator_snapshots".to_string()
}

fn default_commands_table() -> String {
    "bot_commands".to_string()
}

fn default_positions_interval_ms() -> u64 {
    3_000
}

fn default_indicators_interval_ms() -> u64 {
    15_000
}

fn default_indicator_limit() -> u32 {
    200
}

fn default_indicator_max_age_ms() -> u64 {
    3_600_000
}

fn default_timeout_ms() -> u64 {
    5_000
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: None,
            positions_table: default_positions_table(),
            indicators_table: default_indicators_table(),
            commands_table: default_commands_table(),
            positions_interval_ms: default_positions_interval_ms(),
            indicators_interval_ms: default_indicators_interval_ms(),
            indicator_limit: default_indicator_limit(),
            indicator_max_age_ms: default_indicator_max_age_ms(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl StoreConfig {
    pub fn positions_interval(&self) -> Duration {
        Duration::from_millis(self.positions_interval_ms)
    }

    pub fn indicators_interval(&self) -> Duration {
        Duration::from_millis(self.indicators_interval_ms)
    }

    /// `None` when eviction is off.
    pub fn indicator_max_age(&self) -> Option<Duration> {
        (self.indicator_max_age_ms > 0).then(|| Duration::from_millis(self.indicator_max_age_ms))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}
