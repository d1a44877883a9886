//! Price feed for alpha-mirror.
//!
//! - [`PriceSource`]: concurrent, failure-isolated fetch across providers
//!   with primary-wins precedence
//! - [`PricePoller`]: idle/polling state machine gated on open positions
//! - Shipped providers: aggregation endpoint, Binance spot, Delta Exchange

pub mod aggregator;
pub mod binance;
pub mod config;
pub mod delta;
pub mod error;
pub mod poller;
pub mod provider;
pub mod source;

pub use aggregator::AggregatorProvider;
pub use binance::BinanceProvider;
pub use config::{FeedConfig, ProviderConfig, ProviderKind};
pub use delta::DeltaProvider;
pub use error::{FeedError, FeedResult};
pub use poller::{PollerHandle, PollerPhase, PollerState, PricePoller};
pub use provider::{build_http_client, parse_price, PriceProvider, ProviderPrices};
pub use source::{PriceQuote, PriceSource, ProviderFailure};
