//! Execution simulator configuration.

use crate::error::{ExecutorError, ExecutorResult};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// How entry slippage is estimated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlippageMode {
    /// Constant `fixed_slippage_bps`.
    Fixed,
    /// Sum of edge, confidence and expiry components.
    Dynamic,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    #[serde(default = "default_base_notional_usd")]
    pub base_notional_usd: Decimal,
    #[serde(default = "default_kelly_fraction")]
    pub kelly_fraction: Decimal,
    #[serde(default = "default_min_trade_usd")]
    pub min_trade_usd: Decimal,
    #[serde(default = "default_max_trade_usd")]
    pub max_trade_usd: Decimal,

    #[serde(default = "default_slippage_mode")]
    pub slippage_mode: SlippageMode,
    #[serde(default = "default_fixed_slippage_bps")]
    pub fixed_slippage_bps: Decimal,
    #[serde(default = "default_edge_factor_bps")]
    pub edge_factor_bps: Decimal,
    #[serde(default = "default_confidence_factor_bps")]
    pub confidence_factor_bps: Decimal,
    #[serde(default = "default_expiry_factor_bps")]
    pub expiry_factor_bps: Decimal,
    #[serde(default = "default_max_slippage_bps")]
    pub max_slippage_bps: Decimal,

    #[serde(default = "default_gas_fee_usd_per_side")]
    pub gas_fee_usd_per_side: Decimal,
    #[serde(default = "default_adverse_selection_bps")]
    pub adverse_selection_bps: Decimal,
    /// Expected edge in bps per unit of `|score|`.
    #[serde(default = "default_score_to_edge_bps")]
    pub score_to_edge_bps: Decimal,
    /// Economics gate. Unset disables it.
    #[serde(default)]
    pub min_net_edge_bps: Option<Decimal>,
}

fn default_base_notional_usd() -> Decimal {
    Decimal::from(100)
}

fn default_kelly_fraction() -> Decimal {
    Decimal::new(5, 1) // 0.5
}

fn default_min_trade_usd() -> Decimal {
    Decimal::from(5)
}

fn default_max_trade_usd() -> Decimal {
    Decimal::from(50)
}

fn default_slippage_mode() -> SlippageMode {
    SlippageMode::Fixed
}

fn default_fixed_slippage_bps() -> Decimal {
    Decimal::from(50)
}

fn default_edge_factor_bps() -> Decimal {
    Decimal::from(25)
}

fn default_confidence_factor_bps() -> Decimal {
    Decimal::from(20)
}

fn default_expiry_factor_bps() -> Decimal {
    Decimal::from(30)
}

fn default_max_slippage_bps() -> Decimal {
    Decimal::from(200)
}

fn default_gas_fee_usd_per_side() -> Decimal {
    Decimal::new(5, 2) // $0.05
}

fn default_adverse_selection_bps() -> Decimal {
    Decimal::from(30)
}

fn default_score_to_edge_bps() -> Decimal {
    Decimal::from(500)
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            base_notional_usd: default_base_notional_usd(),
            kelly_fraction: default_kelly_fraction(),
            min_trade_usd: default_min_trade_usd(),
            max_trade_usd: default_max_trade_usd(),
            slippage_mode: default_slippage_mode(),
            fixed_slippage_bps: default_fixed_slippage_bps(),
            edge_factor_bps: default_edge_factor_bps(),
            confidence_factor_bps: default_confidence_factor_bps(),
            expiry_factor_bps: default_expiry_factor_bps(),
            max_slippage_bps: default_max_slippage_bps(),
            gas_fee_usd_per_side: default_gas_fee_usd_per_side(),
            adverse_selection_bps: default_adverse_selection_bps(),
            score_to_edge_bps: default_score_to_edge_bps(),
            min_net_edge_bps: None,
        }
    }
}

impl ExecutionConfig {
    pub fn validate(&self) -> ExecutorResult<()> {
        if self.min_trade_usd <= Decimal::ZERO {
            return Err(ExecutorError::ConfigError(
                "execution.min_trade_usd must be positive".to_string(),
            ));
        }
        if self.min_trade_usd > self.max_trade_usd {
            return Err(ExecutorError::ConfigError(format!(
                "execution.min_trade_usd ({}) exceeds max_trade_usd ({})",
                self.min_trade_usd, self.max_trade_usd
            )));
        }
        if self.kelly_fraction < Decimal::ZERO || self.kelly_fraction > Decimal::ONE {
            return Err(ExecutorError::ConfigError(format!(
                "execution.kelly_fraction ({}) must be within [0, 1]",
                self.kelly_fraction
            )));
        }
        let non_negative = [
            ("base_notional_usd", self.base_notional_usd),
            ("fixed_slippage_bps", self.fixed_slippage_bps),
            ("edge_factor_bps", self.edge_factor_bps),
            ("confidence_factor_bps", self.confidence_factor_bps),
            ("expiry_factor_bps", self.expiry_factor_bps),
            ("max_slippage_bps", self.max_slippage_bps),
            ("gas_fee_usd_per_side", self.gas_fee_usd_per_side),
            ("adverse_selection_bps", self.adverse_selection_bps),
            ("score_to_edge_bps", self.score_to_edge_bps),
        ];
        if let Some((name, value)) = non_negative.iter().find(|(_, v)| *v < Decimal::ZERO) {
            return Err(ExecutorError::ConfigError(format!(
                "execution.{name} ({value}) must be non-negative"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_defaults() {
        let config = ExecutionConfig::default();
        assert_eq!(config.fixed_slippage_bps, dec!(50));
        assert_eq!(config.max_slippage_bps, dec!(200));
        assert_eq!(config.gas_fee_usd_per_side, dec!(0.05));
        assert_eq!(config.adverse_selection_bps, dec!(30));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: ExecutionConfig =
            serde_json::from_str(r#"{"slippage_mode":"dynamic","min_net_edge_bps":"20"}"#)
                .unwrap();
        assert_eq!(config.slippage_mode, SlippageMode::Dynamic);
        assert_eq!(config.min_net_edge_bps, Some(dec!(20)));
        assert_eq!(config.max_trade_usd, dec!(50));
    }

    #[test]
    fn test_validate_rejects_inverted_bounds() {
        let config = ExecutionConfig {
            min_trade_usd: dec!(60),
            ..ExecutionConfig::default()
        };
        assert!(config.validate().is_err());

        let config = ExecutionConfig {
            gas_fee_usd_per_side: dec!(-1),
            ..ExecutionConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
