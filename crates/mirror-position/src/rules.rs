//! Thresholds the agent uses for trailing stops and risk labels.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// One step of the trailing-distance table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrailTier {
    /// Peak P&L percent at which this distance starts to apply.
    pub min_peak_pct: Decimal,
    /// Trailing distance from the anchor price, in percent.
    pub distance_pct: Decimal,
}

impl TrailTier {
    pub const fn new(min_peak_pct: Decimal, distance_pct: Decimal) -> Self {
        Self {
            min_peak_pct,
            distance_pct,
        }
    }
}

/// Derivation rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivationRules {
    /// Peak P&L percent required before the trailing stop arms.
    #[serde(default = "default_trail_activation_pct")]
    pub trail_activation_pct: Decimal,

    /// Distance table, widened as the peak grows.
    #[serde(default = "default_trail_tiers")]
    pub trail_tiers: Vec<TrailTier>,

    /// Fraction of the entry-to-stop distance counted as "near the stop".
    #[serde(default = "default_near_sl_fraction")]
    pub near_sl_fraction: Decimal,

    /// Price-move percent at or below which a position is at risk.
    #[serde(default = "default_at_risk_pct")]
    pub at_risk_pct: Decimal,

    /// Stop distance assumed when a position has no stop-loss.
    #[serde(default = "default_stop_distance_pct")]
    pub default_stop_distance_pct: Decimal,
}

fn default_trail_activation_pct() -> Decimal {
    dec!(0.30)
}

fn default_trail_tiers() -> Vec<TrailTier> {
    vec![
        TrailTier::new(dec!(0), dec!(0.15)),
        TrailTier::new(dec!(0.50), dec!(0.20)),
        TrailTier::new(dec!(1.00), dec!(0.30)),
        TrailTier::new(dec!(2.00), dec!(0.50)),
        TrailTier::new(dec!(3.00), dec!(0.75)),
    ]
}

fn default_near_sl_fraction() -> Decimal {
    dec!(0.30)
}

fn default_at_risk_pct() -> Decimal {
    dec!(-0.15)
}

fn default_stop_distance_pct() -> Decimal {
    dec!(0.50)
}

impl Default for DerivationRules {
    fn default() -> Self {
        Self {
            trail_activation_pct: default_trail_activation_pct(),
            trail_tiers: default_trail_tiers(),
            near_sl_fraction: default_near_sl_fraction(),
            at_risk_pct: default_at_risk_pct(),
            default_stop_distance_pct: default_stop_distance_pct(),
        }
    }
}

impl DerivationRules {
    /// Trailing distance for a peak: the widest tier whose threshold the
    /// peak has reached. Falls back to the lowest tier.
    pub fn trail_distance_pct(&self, peak_pct: Decimal) -> Decimal {
        let mut best: Option<&TrailTier> = None;
        for tier in &self.trail_tiers {
            if peak_pct >= tier.min_peak_pct && best.map_or(true, |b| tier.min_peak_pct >= b.min_peak_pct) {
                best = Some(tier);
            }
        }
        best.or_else(|| self.trail_tiers.iter().min_by_key(|t| t.min_peak_pct))
            .map(|t| t.distance_pct)
            .unwrap_or(Decimal::ZERO)
    }

    /// Tier boundaries at or below the peak, each with the distance that
    /// applied just below it.
    pub fn crossed_boundaries(&self, peak_pct: Decimal) -> Vec<(Decimal, Decimal)> {
        let mut tiers: Vec<&TrailTier> = self.trail_tiers.iter().collect();
        tiers.sort_by_key(|t| t.min_peak_pct);
        tiers
            .windows(2)
            .filter(|pair| pair[1].min_peak_pct <= peak_pct && pair[1].min_peak_pct > pair[0].min_peak_pct)
            .map(|pair| (pair[1].min_peak_pct, pair[0].distance_pct))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_tiers() {
        let rules = DerivationRules::default();
        assert_eq!(rules.trail_distance_pct(dec!(0.30)), dec!(0.15));
        assert_eq!(rules.trail_distance_pct(dec!(0.49)), dec!(0.15));
        assert_eq!(rules.trail_distance_pct(dec!(0.50)), dec!(0.20));
        assert_eq!(rules.trail_distance_pct(dec!(0.99)), dec!(0.20));
        assert_eq!(rules.trail_distance_pct(dec!(1.00)), dec!(0.30));
        assert_eq!(rules.trail_distance_pct(dec!(2.50)), dec!(0.50));
        assert_eq!(rules.trail_distance_pct(dec!(3.00)), dec!(0.75));
        assert_eq!(rules.trail_distance_pct(dec!(12)), dec!(0.75));
    }

    #[test]
    fn test_crossed_boundaries() {
        let rules = DerivationRules::default();
        assert!(rules.crossed_boundaries(dec!(0.49)).is_empty());
        assert_eq!(
            rules.crossed_boundaries(dec!(1.20)),
            vec![(dec!(0.50), dec!(0.15)), (dec!(1.00), dec!(0.20))]
        );
        assert_eq!(rules.crossed_boundaries(dec!(9)).len(), 4);
    }

    #[test]
    fn test_negative_peak_uses_lowest_tier() {
        let rules = DerivationRules::default();
        assert_eq!(rules.trail_distance_pct(dec!(-1)), dec!(0.15));
    }

    #[test]
    fn test_unordered_tiers_still_pick_widest_reached() {
        let rules = DerivationRules {
            trail_tiers: vec![
                TrailTier::new(dec!(2), dec!(0.5)),
                TrailTier::new(dec!(0), dec!(0.1)),
                TrailTier::new(dec!(1), dec!(0.3)),
            ],
            ..Default::default()
        };
        assert_eq!(rules.trail_distance_pct(dec!(1.5)), dec!(0.3));
        assert_eq!(rules.trail_distance_pct(dec!(0.2)), dec!(0.1));
    }

    #[test]
    fn test_rules_from_toml_with_defaults() {
        let rules: DerivationRules = toml::from_str(
            r#"
            trail_activation_pct = "0.40"
            default_stop_distance_pct = 1.0
            "#,
        )
        .unwrap();
        assert_eq!(rules.trail_activation_pct, dec!(0.40));
        assert_eq!(rules.default_stop_distance_pct, dec!(1.0));
        assert_eq!(rules.trail_tiers.len(), 5);
        assert_eq!(rules.near_sl_fraction, dec!(0.30));
    }
}
