//! Position derivation for alpha-mirror.
//!
//! Rebuilds the agent's per-position view (P&L, trailing stop, risk label,
//! liquidation distance) from a persisted position and whichever price is
//! freshest.
//!
//! # Key Components
//!
//! - [`derive_position`]: pure derivation of one position
//! - [`PriceChain`]: live snapshot → persisted price → indicator price
//! - [`DerivationRules`]: trailing tiers and risk thresholds
//! - [`DerivedPosition`], [`TrailStop`], [`RiskState`]: derivation output

pub mod derived;
pub mod engine;
pub mod rules;

pub use derived::{DerivedPosition, RiskState, TrailStop};
pub use engine::{derive_all, derive_position, estimate_trail, PriceChain};
pub use rules::{DerivationRules, TrailTier};
