//! Tally thresholds.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Thresholds for the four confirmation indicators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TallyRules {
    /// Absolute 15-minute change (percent) counted as momentum.
    #[serde(default = "default_momentum_pct")]
    pub momentum_pct: Decimal,
    /// Volume over trailing average counted as a spike.
    #[serde(default = "default_volume_spike_ratio")]
    pub volume_spike_ratio: Decimal,
    /// RSI below this confirms a long.
    #[serde(default = "default_rsi_oversold")]
    pub rsi_oversold: Decimal,
    /// RSI above this confirms a short.
    #[serde(default = "default_rsi_overbought")]
    pub rsi_overbought: Decimal,
    /// Confirmations needed for `ready`.
    #[serde(default = "default_ready_count")]
    pub ready_count: u8,
}

fn default_momentum_pct() -> Decimal {
    dec!(0.30)
}

fn default_volume_spike_ratio() -> Decimal {
    dec!(2.0)
}

fn default_rsi_oversold() -> Decimal {
    dec!(30)
}

fn default_rsi_overbought() -> Decimal {
    dec!(70)
}

fn default_ready_count() -> u8 {
    2
}

impl Default for TallyRules {
    fn default() -> Self {
        Self {
            momentum_pct: default_momentum_pct(),
            volume_spike_ratio: default_volume_spike_ratio(),
            rsi_oversold: default_rsi_oversold(),
            rsi_overbought: default_rsi_overbought(),
            ready_count: default_ready_count(),
        }
    }
}

impl TallyRules {
    /// Validate threshold values.
    ///
    /// Returns Err if:
    /// - momentum_pct or volume_spike_ratio is not positive
    /// - rsi_oversold >= rsi_overbought
    /// - ready_count is 0 or above 4
    pub fn validate(&self) -> Result<(), String> {
        if self.momentum_pct <= Decimal::ZERO {
            return Err(format!("momentum_pct ({}) must be positive", self.momentum_pct));
        }
        if self.volume_spike_ratio <= Decimal::ZERO {
            return Err(format!(
                "volume_spike_ratio ({}) must be positive",
                self.volume_spike_ratio
            ));
        }
        if self.rsi_oversold >= self.rsi_overbought {
            return Err(format!(
                "rsi_oversold ({}) must be less than rsi_overbought ({})",
                self.rsi_oversold, self.rsi_overbought
            ));
        }
        if !(1..=4).contains(&self.ready_count) {
            return Err(format!("ready_count ({}) must be between 1 and 4", self.ready_count));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_rules_validate() {
        let rules = TallyRules::default();
        assert!(rules.validate().is_ok());
        assert_eq!(rules.momentum_pct, dec!(0.30));
        assert_eq!(rules.ready_count, 2);
    }

    #[test]
    fn test_inverted_rsi_rejected() {
        let rules = TallyRules {
            rsi_oversold: dec!(75),
            ..Default::default()
        };
        assert!(rules.validate().unwrap_err().contains("rsi_oversold"));
    }

    #[test]
    fn test_ready_count_bounds() {
        let rules = TallyRules {
            ready_count: 5,
            ..Default::default()
        };
        assert!(rules.validate().is_err());
    }

    #[test]
    fn test_partial_toml() {
        let rules: TallyRules = toml::from_str("volume_spike_ratio = 3.0").unwrap();
        assert_eq!(rules.volume_spike_ratio, dec!(3));
        assert_eq!(rules.rsi_overbought, dec!(70));
    }
}
