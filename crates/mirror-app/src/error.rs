//! Application error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Feed error: {0}")]
    Feed(#[from] mirror_feed::FeedError),

    #[error("Store error: {0}")]
    Store(#[from] mirror_store::StoreError),

    #[error("Dashboard error: {0}")]
    Dashboard(#[from] mirror_dashboard::DashboardError),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] mirror_telemetry::TelemetryError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type AppResult<T> = Result<T, AppError>;

impl From<::config::ConfigError> for AppError {
    fn from(e: ::config::ConfigError) -> Self {
        Self::Config(e.to_string())
    }
}
