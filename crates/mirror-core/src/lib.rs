//! Core domain types for alpha-mirror.
//!
//! This crate provides the fundamental types shared across the workspace:
//! - Precision-safe decimal types (Price, Size)
//! - Instrument identifiers and contract-size conversion
//! - Open-position rows persisted by the agent
//! - Price snapshots with freshness tiers
//! - Indicator snapshots and the newest-wins indicator book

pub mod decimal;
pub mod indicator;
pub mod instrument;
pub mod position;
pub mod price;

pub use decimal::{Price, Size, HUNDRED};
pub use indicator::{IndicatorBook, IndicatorKey, IndicatorSnapshot};
pub use instrument::{ContractSizeTable, Instrument};
pub use position::{parse_timestamp, Position, PositionSide, PositionType, TRAILING_STATE};
pub use price::{FreshnessTier, PriceSnapshot, ResolvedPrice};
