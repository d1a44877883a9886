//! Application configuration.
//!
//! A TOML file overlaid by `MIRROR__SECTION__KEY` environment variables.
//! Every section has serde defaults, so an empty file is a valid config.

use std::collections::HashMap;

use mirror_core::{ContractSizeTable, Instrument};
use mirror_dashboard::{DashboardConfig, ViewSettings};
use mirror_feed::FeedConfig;
use mirror_position::DerivationRules;
use mirror_signal::TallyRules;
use mirror_store::StoreConfig;
use mirror_telemetry::DEFAULT_FILTER;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

/// Environment variable prefix (`MIRROR__FEED__TIMEOUT_MS`).
pub const ENV_PREFIX: &str = "MIRROR";

/// Default config path when neither `--config` nor `MIRROR_CONFIG` is set.
pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Filter used when `RUST_LOG` is unset.
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

fn default_log_filter() -> String {
    DEFAULT_FILTER.to_string()
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_filter: default_log_filter(),
        }
    }
}

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Price providers and poll cadence.
    #[serde(default)]
    pub feed: FeedConfig,
    /// Persistence REST surface.
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub dashboard: DashboardConfig,
    /// Trailing and risk thresholds.
    #[serde(default)]
    pub rules: DerivationRules,
    /// Confirmation tally thresholds.
    #[serde(default)]
    pub tally: TallyRules,
    /// Extra contract sizes (instrument → coin per contract), merged over
    /// the built-in table.
    #[serde(default)]
    pub contracts: HashMap<String, Decimal>,
    /// Pairs shown first in the scanner, in this order.
    #[serde(default)]
    pub pairs: Vec<String>,
    /// Exchanges whose pairs are traded with leverage.
    #[serde(default = "default_leveraged_exchanges")]
    pub leveraged_exchanges: Vec<String>,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

fn default_leveraged_exchanges() -> Vec<String> {
    vec!["delta".to_string()]
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            feed: FeedConfig::default(),
            store: StoreConfig::default(),
            dashboard: DashboardConfig::default(),
            rules: DerivationRules::default(),
            tally: TallyRules::default(),
            contracts: HashMap::new(),
            pairs: Vec::new(),
            leveraged_exchanges: default_leveraged_exchanges(),
            telemetry: TelemetryConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load from a TOML file plus process environment.
    ///
    /// A missing file is an error only when `required` is set (the path was
    /// given explicitly).
    pub fn load(path: &str, required: bool) -> AppResult<Self> {
        let file = ::config::File::with_name(path)
            .format(::config::FileFormat::Toml)
            .required(required);
        Self::from_sources(file, None)
    }

    /// Build from one file source and an environment overlay. `env` replaces
    /// the process environment when given.
    pub fn from_sources<S>(file: S, env: Option<::config::Map<String, String>>) -> AppResult<Self>
    where
        S: ::config::Source + Send + Sync + 'static,
    {
        let settings = ::config::Config::builder()
            .add_source(file)
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("pairs")
                    .with_list_parse_key("leveraged_exchanges")
                    .source(env),
            )
            .build()?;
        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate cross-field constraints not covered by the section builders.
    pub fn validate(&self) -> AppResult<()> {
        self.tally.validate().map_err(AppError::Config)?;

        if self.rules.trail_tiers.is_empty() {
            return Err(AppError::Config("rules.trail_tiers must not be empty".to_string()));
        }
        if self.rules.trail_activation_pct < Decimal::ZERO {
            return Err(AppError::Config(format!(
                "rules.trail_activation_pct ({}) must be non-negative",
                self.rules.trail_activation_pct
            )));
        }
        if self.rules.near_sl_fraction <= Decimal::ZERO || self.rules.near_sl_fraction > Decimal::ONE {
            return Err(AppError::Config(format!(
                "rules.near_sl_fraction ({}) must be in (0, 1]",
                self.rules.near_sl_fraction
            )));
        }
        if self.rules.default_stop_distance_pct <= Decimal::ZERO {
            return Err(AppError::Config(format!(
                "rules.default_stop_distance_pct ({}) must be positive",
                self.rules.default_stop_distance_pct
            )));
        }
        if let Some((pair, size)) = self.contracts.iter().find(|(_, size)| **size <= Decimal::ZERO) {
            return Err(AppError::Config(format!("contracts.{pair} ({size}) must be positive")));
        }
        if self.store.positions_interval_ms == 0 || self.store.indicators_interval_ms == 0 {
            return Err(AppError::Config("store intervals must be positive".to_string()));
        }
        if self.dashboard.refresh_interval_ms == 0 {
            return Err(AppError::Config("dashboard.refresh_interval_ms must be positive".to_string()));
        }
        Ok(())
    }

    /// Built-in contract sizes with configured overrides applied.
    pub fn contract_table(&self) -> ContractSizeTable {
        let mut table = ContractSizeTable::with_defaults();
        table.extend(self.contracts.iter().map(|(pair, size)| (pair.as_str(), *size)));
        table
    }

    pub fn known_pairs(&self) -> Vec<Instrument> {
        self.pairs.iter().map(|p| Instrument::from(p.as_str())).collect()
    }

    pub fn view_settings(&self) -> ViewSettings {
        ViewSettings {
            rules: self.rules.clone(),
            tally_rules: self.tally.clone(),
            contracts: self.contract_table(),
            pairs: self.known_pairs(),
            leveraged_exchanges: self.leveraged_exchanges.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ::config::{File, FileFormat};
    use rust_decimal_macros::dec;

    const SAMPLE: &str = r#"
        pairs = ["BTC/USDT", "ETH/USDT"]

        [feed]
        poll_interval_ms = 3000

        [[feed.providers]]
        kind = "delta"

        [store]
        base_url = "https://store.example"
        api_key = "anon"

        [rules]
        trail_activation_pct = 0.4

        [contracts]
        DOGEUSD = 100
    "#;

    fn load(toml: &str, env: &[(&str, &str)]) -> AppResult<AppConfig> {
        let vars = env.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        AppConfig::from_sources(File::from_str(toml, FileFormat::Toml), Some(vars))
    }

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.leveraged_exchanges, vec!["delta".to_string()]);
        assert_eq!(config.telemetry.log_filter, DEFAULT_FILTER);
    }

    #[test]
    fn test_empty_file_is_valid() {
        let config = load("", &[]).unwrap();
        assert_eq!(config.dashboard.port, 8080);
        assert_eq!(config.feed.providers.len(), 2);
    }

    #[test]
    fn test_sample_file() {
        let config = load(SAMPLE, &[]).unwrap();
        assert_eq!(config.feed.poll_interval_ms, 3000);
        assert_eq!(config.feed.providers.len(), 1);
        assert_eq!(config.store.api_key.as_deref(), Some("anon"));
        assert_eq!(config.rules.trail_activation_pct, dec!(0.4));
        assert_eq!(config.known_pairs()[1], Instrument::from("ETH/USDT"));

        let table = config.contract_table();
        assert_eq!(table.contract_size(&"DOGE/USD:USD".into()), dec!(100));
        assert_eq!(table.contract_size(&"BTCUSD".into()), dec!(0.001));
    }

    #[test]
    fn test_env_overlays_file() {
        let config = load(
            SAMPLE,
            &[
                ("MIRROR__DASHBOARD__PORT", "9100"),
                ("MIRROR__STORE__BASE_URL", "http://10.0.0.5:8000"),
                ("MIRROR__LEVERAGED_EXCHANGES", "delta,bybit"),
            ],
        )
        .unwrap();
        assert_eq!(config.dashboard.port, 9100);
        assert_eq!(config.store.base_url, "http://10.0.0.5:8000");
        assert_eq!(config.leveraged_exchanges, vec!["delta".to_string(), "bybit".to_string()]);
        assert_eq!(config.feed.poll_interval_ms, 3000);
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(matches!(
            load("[contracts]\nBTCUSD = 0", &[]),
            Err(AppError::Config(_))
        ));
        assert!(matches!(
            load("[tally]\nrsi_oversold = 80", &[]),
            Err(AppError::Config(_))
        ));
        assert!(matches!(
            load("[dashboard]\nrefresh_interval_ms = 0", &[]),
            Err(AppError::Config(_))
        ));
    }

    #[test]
    fn test_missing_optional_file_uses_defaults() {
        let config = AppConfig::load("config/does-not-exist.toml", false).unwrap();
        assert_eq!(config.store.positions_table, "trades");
        assert!(AppConfig::load("config/does-not-exist.toml", true).is_err());
    }

    #[test]
    fn test_shipped_default_config_loads() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/../../config/default.toml");
        let config = AppConfig::load(path, true).unwrap();
        assert_eq!(config.rules, DerivationRules::default());
        assert_eq!(config.tally, TallyRules::default());
        assert_eq!(config.feed.primary.len(), 2);
        assert_eq!(config.known_pairs().len(), 4);
        assert_eq!(config.store.indicator_max_age(), Some(std::time::Duration::from_secs(3600)));
    }

    #[test]
    fn test_zero_indicator_age_disables_eviction() {
        let config = load(SAMPLE, &[("MIRROR__STORE__INDICATOR_MAX_AGE_MS", "0")]).unwrap();
        assert!(config.store.indicator_max_age().is_none());
    }

    #[test]
    fn test_config_serialization() {
        let toml_str = toml::to_string(&AppConfig::default()).unwrap();
        assert!(toml_str.contains("leveraged_exchanges"));
        assert!(toml_str.contains("[dashboard]"));
    }
}
