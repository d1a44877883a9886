//! Application orchestration.
//!
//! Every task hangs off one root [`CancellationToken`]; ctrl-c or an
//! external cancel stops them all.

use std::sync::Arc;

use mirror_core::Instrument;
use mirror_dashboard::{run_server, DashboardInputs, DashboardState};
use mirror_feed::PricePoller;
use mirror_store::{open_instruments, PositionsCache, StoreClient, StoreWatcher};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::AppConfig;
use crate::error::AppResult;

/// Main application.
pub struct Application {
    config: AppConfig,
    cancel: CancellationToken,
}

impl Application {
    /// Create a new application instance.
    pub fn new(config: AppConfig) -> AppResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            cancel: CancellationToken::new(),
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Token that stops the application when cancelled.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run until ctrl-c or cancellation.
    pub async fn run(self) -> AppResult<()> {
        let config = self.config;
        let cancel = self.cancel;

        let source = config.feed.build_source()?;
        info!(providers = ?source.provider_names(), "Price providers configured");

        let store = Arc::new(StoreClient::new(config.store.clone())?);
        info!(base_url = %config.store.base_url, "Store client configured");

        let (watcher, caches) = StoreWatcher::new(
            store.clone(),
            config.store.positions_interval(),
            config.store.indicators_interval(),
        );
        let watcher = watcher.with_indicator_max_age(config.store.indicator_max_age());
        let poller = PricePoller::new(Arc::new(source), config.feed.poll_interval());
        let poller_handle = poller.handle();
        let (open_tx, open_rx) = watch::channel(Vec::new());

        let mut tasks: Vec<(&'static str, JoinHandle<()>)> = Vec::new();
        tasks.push(("store-watcher", tokio::spawn(watcher.run(cancel.clone()))));
        tasks.push(("open-instruments", tokio::spawn(track_open_instruments(
            caches.positions.clone(),
            open_tx,
            cancel.clone(),
        ))));
        tasks.push(("price-poller", tokio::spawn(poller.run(open_rx, cancel.clone()))));

        let mut server = None;
        if config.dashboard.enabled {
            let state = DashboardState::new(
                DashboardInputs {
                    positions: caches.positions.clone(),
                    indicators: caches.indicators.clone(),
                    prices: poller_handle.subscribe(),
                },
                poller_handle.clone(),
                config.view_settings(),
                store,
            );
            server = Some(tokio::spawn(run_server(
                state,
                config.dashboard.clone(),
                cancel.clone(),
            )));
        } else {
            info!("Dashboard disabled");
        }

        let server_result = match server {
            Some(mut handle) => {
                let early = tokio::select! {
                    _ = tokio::signal::ctrl_c() => {
                        info!("Shutdown signal received");
                        None
                    }
                    _ = cancel.cancelled() => None,
                    joined = &mut handle => Some(joined),
                };
                cancel.cancel();
                match early {
                    Some(joined) => Some(joined),
                    None => Some(handle.await),
                }
            }
            None => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => info!("Shutdown signal received"),
                    _ = cancel.cancelled() => {}
                }
                None
            }
        };
        cancel.cancel();

        for (name, handle) in tasks {
            if let Err(e) = handle.await {
                warn!(task = name, error = %e, "Task ended abnormally");
            }
        }

        match server_result {
            Some(Ok(Err(e))) => {
                error!(error = %e, "Dashboard server failed");
                Err(e.into())
            }
            Some(Err(e)) => {
                warn!(error = %e, "Dashboard task ended abnormally");
                Ok(())
            }
            _ => {
                info!("Shutdown complete");
                Ok(())
            }
        }
    }
}

/// Republish the distinct instruments of the open positions whenever the
/// positions cache changes, notifying only on an actual change.
///
/// Runs until cancelled or until the positions sender is dropped.
pub async fn track_open_instruments(
    mut positions: watch::Receiver<PositionsCache>,
    open_tx: watch::Sender<Vec<Instrument>>,
    cancel: CancellationToken,
) {
    loop {
        let next: Vec<Instrument> = positions
            .borrow_and_update()
            .as_deref()
            .map(|open| open_instruments(open))
            .unwrap_or_default();
        let changed = open_tx.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
        if changed {
            debug!(instruments = open_tx.borrow().len(), "Open instruments changed");
        }

        tokio::select! {
            _ = cancel.cancelled() => break,
            result = positions.changed() => {
                if result.is_err() {
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use mirror_core::{Position, PositionSide, Price, Size};
    use rust_decimal_macros::dec;
    use std::time::Duration;

    fn position(id: &str, pair: &str) -> Position {
        Position::new(
            id,
            pair,
            PositionSide::Long,
            Price::new(dec!(100)),
            Size::ONE,
            dec!(1),
            "binance",
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn test_track_open_instruments_dedupes_and_skips_no_op() {
        let (positions_tx, positions_rx) = watch::channel(None);
        let (open_tx, mut open_rx) = watch::channel(Vec::new());
        let cancel = CancellationToken::new();
        let task = tokio::spawn(track_open_instruments(positions_rx, open_tx, cancel.clone()));

        positions_tx.send_replace(Some(Arc::new(vec![
            position("1", "SOL/USDT"),
            position("2", "SOL/USDT"),
            position("3", "ETH/USDT"),
        ])));
        tokio::time::timeout(Duration::from_secs(1), open_rx.changed())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            *open_rx.borrow_and_update(),
            vec![Instrument::from("SOL/USDT"), Instrument::from("ETH/USDT")]
        );

        // same instrument set under a new position id: no notification
        positions_tx.send_replace(Some(Arc::new(vec![
            position("4", "SOL/USDT"),
            position("3", "ETH/USDT"),
        ])));
        assert!(
            tokio::time::timeout(Duration::from_millis(50), open_rx.changed())
                .await
                .is_err()
        );

        positions_tx.send_replace(Some(Arc::new(vec![])));
        tokio::time::timeout(Duration::from_secs(1), open_rx.changed())
            .await
            .unwrap()
            .unwrap();
        assert!(open_rx.borrow().is_empty());

        cancel.cancel();
        task.await.unwrap();
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let mut config = AppConfig::default();
        config.rules.trail_tiers.clear();
        assert!(Application::new(config).is_err());
        assert!(Application::new(AppConfig::default()).is_ok());
    }

    #[tokio::test]
    async fn test_run_stops_on_cancel() {
        let mut config = AppConfig::default();
        config.dashboard.enabled = false;
        config.store.base_url = "http://127.0.0.1:9".to_string();
        let app = Application::new(config).unwrap();
        let cancel = app.cancel_token();
        let run = tokio::spawn(app.run());
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
        let result = tokio::time::timeout(Duration::from_secs(5), run)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
    }
}
