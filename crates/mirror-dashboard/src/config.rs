//! Dashboard configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Dashboard server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardConfig {
    /// Enable dashboard server.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Address to bind.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Fixed recompute tick for WebSocket updates, in milliseconds.
    /// Cache changes also trigger an update between ticks.
    #[serde(default = "default_refresh_interval_ms")]
    pub refresh_interval_ms: u64,
    /// Maximum concurrent WebSocket connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// Basic auth username (empty = disabled).
    #[serde(default)]
    pub username: String,
    /// Basic auth password (empty = disabled).
    #[serde(default)]
    pub password: String,
}

fn default_enabled() -> bool {
    true
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_refresh_interval_ms() -> u64 {
    1000
}

fn default_max_connections() -> usize {
    10
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            bind_address: default_bind_address(),
            port: default_port(),
            refresh_interval_ms: default_refresh_interval_ms(),
            max_connections: default_max_connections(),
            username: String::new(),
            password: String::new(),
        }
    }
}

impl DashboardConfig {
    /// Check if basic auth is enabled.
    pub fn auth_enabled(&self) -> bool {
        !self.username.is_empty() && !self.password.is_empty()
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_needs_both_fields() {
        let mut config = DashboardConfig::default();
        assert!(!config.auth_enabled());
        config.username = "ops".to_string();
        assert!(!config.auth_enabled());
        config.password = "secret".to_string();
        assert!(config.auth_enabled());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: DashboardConfig = toml::from_str("port = 9090").unwrap();
        assert_eq!(config.port, 9090);
        assert!(config.enabled);
        assert_eq!(config.refresh_interval(), Duration::from_secs(1));
        assert_eq!(config.max_connections, 10);
    }
}
