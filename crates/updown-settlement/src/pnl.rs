//! Outcome and PnL math for a held binary token.

use rust_decimal::Decimal;
use updown_core::{Action, Outcome, Position, Price, PriceToBeat, Settlement, Usd};

/// Breakdown of a settled position's PnL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pnl {
    pub return_pct: Decimal,
    pub gross_pnl_usd: Usd,
    pub total_cost_usd: Usd,
    pub net_pnl_usd: Usd,
}

/// `win` iff `(action == BUY_YES) == (close > price_to_beat)`.
///
/// A close equal to the price to beat is not "up", so BUY_NO wins it.
pub fn decide_outcome(action: Action, close: Option<Price>, price_to_beat: Option<Price>) -> Outcome {
    let (Some(close), Some(ptb)) = (close, price_to_beat) else {
        return Outcome::Invalid;
    };
    if !action.is_trade() {
        return Outcome::Invalid;
    }
    if (action == Action::BuyYes) == (close > ptb) {
        Outcome::Win
    } else {
        Outcome::Loss
    }
}

/// Held-token payout: 1 on win, 0 on loss, the entry price on invalid.
pub fn exit_price(outcome: Outcome, entry: Price) -> Price {
    match outcome {
        Outcome::Win => Price::ONE,
        Outcome::Loss => Price::ZERO,
        Outcome::Invalid => entry,
    }
}

/// `return_pct = (exit - entry) / entry`, `gross = notional * return_pct`,
/// `net = gross - notional * total_cost_bps / 10_000`.
pub fn compute_pnl(entry: Price, exit: Price, notional: Usd, total_cost_bps: Decimal) -> Pnl {
    let return_pct = if entry.is_positive() {
        (exit.inner() - entry.inner()) / entry.inner()
    } else {
        Decimal::ZERO
    };
    let gross = notional * return_pct;
    let cost = notional.at_bps(total_cost_bps);
    Pnl {
        return_pct,
        gross_pnl_usd: gross,
        total_cost_usd: cost,
        net_pnl_usd: gross - cost,
    }
}

/// Build the settlement record for `position`.
///
/// Invalid settlements still carry the cost the trade would have paid.
pub fn settle_position(
    position: &Position,
    close_price: Option<Price>,
    price_to_beat: Option<PriceToBeat>,
    closed_at_ms: i64,
    invalid_reason: Option<String>,
) -> Settlement {
    let mut outcome = decide_outcome(position.action, close_price, price_to_beat.map(|p| p.value));
    let mut reason = invalid_reason;
    if reason.is_some() {
        outcome = Outcome::Invalid;
    } else if outcome == Outcome::Invalid {
        reason = Some(
            match (close_price, price_to_beat) {
                (None, _) => "close_price_unavailable",
                (_, None) => "price_to_beat_unavailable",
                _ => "no_trade_action",
            }
            .to_string(),
        );
    }

    let exit = exit_price(outcome, position.entry_price);
    let pnl = compute_pnl(position.entry_price, exit, position.notional_usd, position.total_cost_bps);

    Settlement {
        position_id: position.id.clone(),
        round_id: position.round_id,
        action: position.action,
        outcome,
        entry_price: position.entry_price,
        exit_price: exit,
        close_price,
        price_to_beat,
        return_pct: pnl.return_pct,
        gross_pnl_usd: pnl.gross_pnl_usd,
        total_cost_usd: pnl.total_cost_usd,
        net_pnl_usd: pnl.net_pnl_usd,
        invalid_reason: reason,
        closed_at_ms,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use updown_core::{PositionId, PriceToBeatTier};

    fn p(v: Decimal) -> Price {
        Price::new(v)
    }

    fn position(action: Action, entry: Decimal) -> Position {
        Position {
            id: PositionId::new("42-1"),
            round_id: 42,
            action,
            entry_price: p(entry),
            notional_usd: Usd::new(dec!(25)),
            slippage_bps: dec!(50),
            fee_usd: Usd::new(dec!(0.10)),
            adverse_selection_bps: dec!(30),
            expected_edge_bps: dec!(200),
            total_cost_bps: dec!(100),
            confidence: 0.7,
            score: 0.4,
            strategy: "momentum".to_string(),
            reference_price_at_entry: None,
            opened_at_ms: 0,
        }
    }

    fn ptb(v: Decimal) -> PriceToBeat {
        PriceToBeat {
            value: p(v),
            source_rank: PriceToBeatTier::ExchangeKline,
            resolved_at_ms: 0,
        }
    }

    #[test]
    fn test_pnl_worked_example() {
        let pnl = compute_pnl(p(dec!(100)), p(dec!(103)), Usd::new(dec!(25)), dec!(50));
        assert_eq!(pnl.return_pct, dec!(0.03));
        assert_eq!(pnl.gross_pnl_usd, Usd::new(dec!(0.75)));
        assert_eq!(pnl.total_cost_usd, Usd::new(dec!(0.125)));
        assert_eq!(pnl.net_pnl_usd, Usd::new(dec!(0.625)));
    }

    #[test]
    fn test_buy_no_wins_when_close_below() {
        assert_eq!(
            decide_outcome(Action::BuyNo, Some(p(dec!(98))), Some(p(dec!(100)))),
            Outcome::Win
        );
        assert_eq!(
            decide_outcome(Action::BuyYes, Some(p(dec!(98))), Some(p(dec!(100)))),
            Outcome::Loss
        );
    }

    #[test]
    fn test_equal_close_goes_to_buy_no() {
        let close = Some(p(dec!(100)));
        assert_eq!(decide_outcome(Action::BuyYes, close, Some(p(dec!(100)))), Outcome::Loss);
        assert_eq!(decide_outcome(Action::BuyNo, close, Some(p(dec!(100)))), Outcome::Win);
    }

    #[test]
    fn test_missing_inputs_invalid() {
        assert_eq!(decide_outcome(Action::BuyYes, None, Some(p(dec!(1)))), Outcome::Invalid);
        assert_eq!(decide_outcome(Action::BuyYes, Some(p(dec!(1))), None), Outcome::Invalid);
    }

    #[test]
    fn test_settle_win_on_held_token() {
        let s = settle_position(
            &position(Action::BuyYes, dec!(0.5)),
            Some(p(dec!(101))),
            Some(ptb(dec!(100))),
            1_000,
            None,
        );
        assert_eq!(s.outcome, Outcome::Win);
        assert_eq!(s.exit_price, Price::ONE);
        assert_eq!(s.return_pct, dec!(1));
        assert_eq!(s.gross_pnl_usd, Usd::new(dec!(25)));
        assert_eq!(s.total_cost_usd, Usd::new(dec!(0.25)));
        assert_eq!(s.net_pnl_usd, Usd::new(dec!(24.75)));
        assert!(s.invalid_reason.is_none());
    }

    #[test]
    fn test_settle_loss() {
        let s = settle_position(
            &position(Action::BuyYes, dec!(0.4)),
            Some(p(dec!(99))),
            Some(ptb(dec!(100))),
            1_000,
            None,
        );
        assert_eq!(s.outcome, Outcome::Loss);
        assert_eq!(s.gross_pnl_usd, Usd::new(dec!(-25)));
        assert_eq!(s.net_pnl_usd, Usd::new(dec!(-25.25)));
    }

    #[test]
    fn test_settle_invalid_refunds_entry() {
        let s = settle_position(&position(Action::BuyNo, dec!(0.6)), None, Some(ptb(dec!(100))), 1_000, None);
        assert_eq!(s.outcome, Outcome::Invalid);
        assert_eq!(s.exit_price, p(dec!(0.6)));
        assert_eq!(s.gross_pnl_usd, Usd::ZERO);
        assert_eq!(s.invalid_reason.as_deref(), Some("close_price_unavailable"));

        let forced = settle_position(
            &position(Action::BuyNo, dec!(0.6)),
            Some(p(dec!(98))),
            Some(ptb(dec!(100))),
            1_000,
            Some("orphaned_on_restart".to_string()),
        );
        assert_eq!(forced.outcome, Outcome::Invalid);
        assert_eq!(forced.invalid_reason.as_deref(), Some("orphaned_on_restart"));
    }
}
