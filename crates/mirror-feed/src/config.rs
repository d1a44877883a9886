//! Price feed configuration.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::aggregator::AggregatorProvider;
use crate::binance::{BinanceProvider, BINANCE_BASE_URL};
use crate::delta::{DeltaProvider, DELTA_BASE_URL};
use crate::error::{FeedError, FeedResult};
use crate::provider::{build_http_client, PriceProvider};
use crate::source::PriceSource;

/// Which wire format a provider speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Generic `{ prices: {...} }` aggregation endpoint.
    Aggregator,
    /// Binance spot tickers.
    Binance,
    /// Delta Exchange futures tickers.
    Delta,
}

impl ProviderKind {
    fn default_url(&self) -> Option<&'static str> {
        match self {
            Self::Aggregator => None,
            Self::Binance => Some(BINANCE_BASE_URL),
            Self::Delta => Some(DELTA_BASE_URL),
        }
    }

    fn default_name(&self) -> &'static str {
        match self {
            Self::Aggregator => "aggregator",
            Self::Binance => "binance",
            Self::Delta => "delta",
        }
    }
}

/// One configured provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    /// Name used for precedence and metrics. Defaults to the kind.
    #[serde(default)]
    pub name: Option<String>,
    /// Endpoint or base URL. Required for `aggregator`.
    #[serde(default)]
    pub url: Option<String>,
}

impl ProviderConfig {
    pub fn resolved_name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| self.kind.default_name().to_string())
    }
}

/// Price feed configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedConfig {
    /// Providers in precedence order.
    #[serde(default = "default_providers")]
    pub providers: Vec<ProviderConfig>,

    /// Instrument → provider name that wins when several quote it.
    /// Keys are matched by compact symbol.
    #[serde(default)]
    pub primary: HashMap<String, String>,

    /// Per-provider call timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Poll interval while positions are open, in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_providers() -> Vec<ProviderConfig> {
    vec![
        ProviderConfig {
            kind: ProviderKind::Delta,
            name: None,
            url: None,
        },
        ProviderConfig {
            kind: ProviderKind::Binance,
            name: None,
            url: None,
        },
    ]
}

fn default_timeout_ms() -> u64 {
    4_000
}

fn default_poll_interval_ms() -> u64 {
    5_000
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            providers: default_providers(),
            primary: HashMap::new(),
            timeout_ms: default_timeout_ms(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl FeedConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Validate and build the adapter.
    pub fn build_source(&self) -> FeedResult<PriceSource> {
        if self.timeout_ms == 0 {
            return Err(FeedError::Config("timeout_ms must be positive".to_string()));
        }
        if self.poll_interval_ms == 0 {
            return Err(FeedError::Config("poll_interval_ms must be positive".to_string()));
        }

        // Client-level timeout sits just above the per-call one.
        let client = build_http_client(self.timeout() + Duration::from_millis(500))?;

        let mut providers: Vec<Arc<dyn PriceProvider>> = Vec::with_capacity(self.providers.len());
        for cfg in &self.providers {
            let name = cfg.resolved_name();
            if providers.iter().any(|p| p.name() == name) {
                return Err(FeedError::Config(format!("duplicate provider name: {name}")));
            }
            let url = cfg
                .url
                .clone()
                .or_else(|| cfg.kind.default_url().map(str::to_string))
                .ok_or_else(|| FeedError::Config(format!("provider {name} needs a url")))?;

            let provider: Arc<dyn PriceProvider> = match cfg.kind {
                ProviderKind::Aggregator => Arc::new(AggregatorProvider::new(name, client.clone(), url)),
                ProviderKind::Binance => Arc::new(BinanceProvider::new(name, client.clone(), url)),
                ProviderKind::Delta => Arc::new(DeltaProvider::new(name, client.clone(), url)),
            };
            providers.push(provider);
        }

        for (instrument, provider) in &self.primary {
            if !providers.iter().any(|p| p.name() == provider) {
                return Err(FeedError::Config(format!(
                    "primary provider {provider} for {instrument} is not configured"
                )));
            }
        }

        Ok(PriceSource::new(providers, self.timeout()).with_primaries(self.primary.clone()))
    }
}
