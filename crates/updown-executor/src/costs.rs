//! Sizing and trading-cost estimates.
//!
//! All amounts are in exact decimals; f64 inputs (confidence, score) are
//! converted once at the boundary.

use crate::config::{ExecutionConfig, SlippageMode};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use updown_core::{Usd, BPS_DIVISOR};

/// Inputs to the dynamic slippage model.
#[derive(Debug, Clone, Copy, Default)]
pub struct SlippageInputs {
    /// `|yes - no|` from live odds.
    pub edge_strength: Option<Decimal>,
    pub confidence: f64,
    pub seconds_to_close: Option<i64>,
    pub round_secs: Option<i64>,
}

/// Cost breakdown for one candidate trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CostEstimate {
    pub slippage_bps: Decimal,
    pub gas_cost_bps: Decimal,
    pub adverse_selection_bps: Decimal,
    pub total_cost_bps: Decimal,
    /// Both sides of gas.
    pub fee_usd: Usd,
    pub expected_edge_bps: Decimal,
    pub net_edge_bps: Decimal,
}

fn dec(value: f64) -> Decimal {
    Decimal::from_f64(value).unwrap_or(Decimal::ZERO)
}

/// `clamp(kelly_fraction * edge_strength * base_notional, min, max)`.
///
/// `headroom` lowers the upper bound to what is left under a round cap.
/// Callers block the trade when the headroom is below `min_trade_usd`.
pub fn position_size(
    config: &ExecutionConfig,
    edge_strength: Option<Decimal>,
    headroom: Option<Usd>,
) -> Usd {
    let edge = edge_strength.unwrap_or(Decimal::ZERO).max(Decimal::ZERO);
    let raw = Usd::new(config.kelly_fraction * edge * config.base_notional_usd);
    let max = Usd::new(config.max_trade_usd);
    let upper = headroom.map_or(max, |h| h.min(max));
    raw.clamp(Usd::new(config.min_trade_usd), upper)
}

/// Entry slippage in bps, capped at `max_slippage_bps`.
pub fn slippage_bps(config: &ExecutionConfig, inputs: &SlippageInputs) -> Decimal {
    let raw = match config.slippage_mode {
        SlippageMode::Fixed => config.fixed_slippage_bps,
        SlippageMode::Dynamic => {
            let edge = inputs
                .edge_strength
                .unwrap_or(Decimal::ZERO)
                .clamp(Decimal::ZERO, Decimal::ONE)
                * config.edge_factor_bps;

            let conf_weight = ((inputs.confidence - 0.5) * 2.0).clamp(0.0, 1.0);
            let confidence = dec(conf_weight) * config.confidence_factor_bps;

            let expiry = match (inputs.seconds_to_close, inputs.round_secs) {
                (Some(secs), Some(round)) if round > 0 => {
                    let remaining = Decimal::from(secs.clamp(0, round)) / Decimal::from(round);
                    (Decimal::ONE - remaining) * config.expiry_factor_bps
                }
                _ => Decimal::ZERO,
            };

            edge + confidence + expiry
        }
    };
    raw.clamp(Decimal::ZERO, config.max_slippage_bps)
}

/// Gas for entry and exit expressed in bps of `notional`.
pub fn gas_cost_bps(config: &ExecutionConfig, notional: Usd) -> Decimal {
    if notional.inner() <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    config.gas_fee_usd_per_side * Decimal::TWO / notional.inner() * BPS_DIVISOR
}

/// `|score| * score_to_edge_bps`.
pub fn expected_edge_bps(config: &ExecutionConfig, score: f64) -> Decimal {
    dec(score.abs()) * config.score_to_edge_bps
}

/// Full cost estimate for a trade of `notional`.
pub fn estimate(
    config: &ExecutionConfig,
    notional: Usd,
    score: f64,
    inputs: &SlippageInputs,
) -> CostEstimate {
    let slippage = slippage_bps(config, inputs);
    let gas = gas_cost_bps(config, notional);
    let total = slippage + gas + config.adverse_selection_bps;
    let expected = expected_edge_bps(config, score);
    CostEstimate {
        slippage_bps: slippage,
        gas_cost_bps: gas,
        adverse_selection_bps: config.adverse_selection_bps,
        total_cost_bps: total,
        fee_usd: Usd::new(config.gas_fee_usd_per_side * Decimal::TWO),
        expected_edge_bps: expected,
        net_edge_bps: expected - total,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn dynamic(max: Decimal) -> ExecutionConfig {
        ExecutionConfig {
            slippage_mode: SlippageMode::Dynamic,
            edge_factor_bps: dec!(20),
            confidence_factor_bps: dec!(20),
            expiry_factor_bps: dec!(20),
            max_slippage_bps: max,
            ..ExecutionConfig::default()
        }
    }

    fn inputs() -> SlippageInputs {
        SlippageInputs {
            edge_strength: Some(dec!(0.5)),
            confidence: 0.7,
            seconds_to_close: Some(450),
            round_secs: Some(900),
        }
    }

    #[test]
    fn test_dynamic_slippage_sum_under_cap() {
        // 10 (edge) + 8 (confidence) + 10 (expiry)
        let bps = slippage_bps(&dynamic(dec!(100)), &inputs());
        assert_eq!(bps.round_dp(8), dec!(28));
    }

    #[test]
    fn test_dynamic_slippage_capped() {
        let bps = slippage_bps(&dynamic(dec!(20)), &inputs());
        assert_eq!(bps, dec!(20));
    }

    #[test]
    fn test_dynamic_components_floor_at_zero() {
        let low = SlippageInputs {
            edge_strength: None,
            confidence: 0.3,
            seconds_to_close: Some(900),
            round_secs: Some(900),
        };
        assert_eq!(slippage_bps(&dynamic(dec!(100)), &low), Decimal::ZERO);
    }

    #[test]
    fn test_fixed_slippage() {
        let config = ExecutionConfig::default();
        assert_eq!(slippage_bps(&config, &inputs()), dec!(50));
        let capped = ExecutionConfig {
            fixed_slippage_bps: dec!(500),
            ..ExecutionConfig::default()
        };
        assert_eq!(slippage_bps(&capped, &inputs()), dec!(200));
    }

    #[test]
    fn test_position_size_clamped() {
        let config = ExecutionConfig::default();
        // 0.5 * 0.4 * 100 = 20
        assert_eq!(position_size(&config, Some(dec!(0.4)), None), Usd::new(dec!(20)));
        assert_eq!(position_size(&config, Some(dec!(0.01)), None), Usd::new(dec!(5)));
        assert_eq!(position_size(&config, Some(dec!(2)), None), Usd::new(dec!(50)));
        assert_eq!(position_size(&config, None, None), Usd::new(dec!(5)));
    }

    #[test]
    fn test_position_size_respects_headroom() {
        let config = ExecutionConfig::default();
        let headroom = Some(Usd::new(dec!(15)));
        assert_eq!(position_size(&config, Some(dec!(0.4)), headroom), Usd::new(dec!(15)));
        assert_eq!(position_size(&config, Some(dec!(0.1)), headroom), Usd::new(dec!(5)));
        assert_eq!(
            position_size(&config, Some(dec!(2)), Some(Usd::new(dec!(80)))),
            Usd::new(dec!(50))
        );
    }

    #[test]
    fn test_estimate_totals() {
        let config = ExecutionConfig::default();
        let est = estimate(&config, Usd::new(dec!(20)), -0.4, &inputs());
        // gas: 0.10 / 20 * 10_000 = 50 bps
        assert_eq!(est.gas_cost_bps, dec!(50));
        assert_eq!(est.total_cost_bps, dec!(130));
        assert_eq!(est.fee_usd, Usd::new(dec!(0.10)));
        assert_eq!(est.expected_edge_bps.round_dp(8), dec!(200));
        assert_eq!(est.net_edge_bps.round_dp(8), dec!(70));
    }
}
