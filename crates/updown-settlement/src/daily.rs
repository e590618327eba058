//! Per-UTC-day settlement totals.

use chrono::{DateTime, NaiveDate};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::BTreeMap;
use updown_core::{Outcome, Settlement, Usd};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DailyTotals {
    pub date: NaiveDate,
    pub trades: u64,
    pub wins: u64,
    pub losses: u64,
    pub invalid: u64,
    pub net_pnl_usd: Usd,
}

impl DailyTotals {
    fn new(date: NaiveDate) -> Self {
        Self {
            date,
            trades: 0,
            wins: 0,
            losses: 0,
            invalid: 0,
            net_pnl_usd: Usd::ZERO,
        }
    }
}

/// UTC date of a Unix-ms timestamp.
pub fn utc_date(ts_ms: i64) -> NaiveDate {
    DateTime::from_timestamp_millis(ts_ms)
        .map(|dt| dt.date_naive())
        .unwrap_or_default()
}

#[derive(Debug, Default)]
pub struct DailyTotalsBook {
    days: Mutex<BTreeMap<NaiveDate, DailyTotals>>,
}

impl DailyTotalsBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a settlement on the UTC day it closed.
    pub fn record(&self, settlement: &Settlement) {
        let date = utc_date(settlement.closed_at_ms);
        let mut days = self.days.lock();
        let day = days.entry(date).or_insert_with(|| DailyTotals::new(date));
        day.trades += 1;
        match settlement.outcome {
            Outcome::Win => day.wins += 1,
            Outcome::Loss => day.losses += 1,
            Outcome::Invalid => day.invalid += 1,
        }
        day.net_pnl_usd += settlement.net_pnl_usd;
    }

    pub fn day(&self, date: NaiveDate) -> DailyTotals {
        self.days
            .lock()
            .get(&date)
            .cloned()
            .unwrap_or_else(|| DailyTotals::new(date))
    }

    /// All days, oldest first.
    pub fn all(&self) -> Vec<DailyTotals> {
        self.days.lock().values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use updown_core::{Action, PositionId, Price};

    fn settlement(outcome: Outcome, net: Decimal, closed_at_ms: i64) -> Settlement {
        Settlement {
            position_id: PositionId::new(format!("{closed_at_ms}")),
            round_id: 1,
            action: Action::BuyYes,
            outcome,
            entry_price: Price::new(dec!(0.5)),
            exit_price: Price::ONE,
            close_price: None,
            price_to_beat: None,
            return_pct: Decimal::ZERO,
            gross_pnl_usd: Usd::ZERO,
            total_cost_usd: Usd::ZERO,
            net_pnl_usd: Usd::new(net),
            invalid_reason: None,
            closed_at_ms,
        }
    }

    #[test]
    fn test_totals_split_by_utc_day() {
        let book = DailyTotalsBook::new();
        // 2024-01-01T23:59:59Z and 2024-01-02T00:00:01Z
        book.record(&settlement(Outcome::Win, dec!(10), 1_704_153_599_000));
        book.record(&settlement(Outcome::Loss, dec!(-4), 1_704_153_599_500));
        book.record(&settlement(Outcome::Invalid, dec!(-0.1), 1_704_153_601_000));

        let days = book.all();
        assert_eq!(days.len(), 2);
        assert_eq!(days[0].date, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        assert_eq!((days[0].trades, days[0].wins, days[0].losses), (2, 1, 1));
        assert_eq!(days[0].net_pnl_usd, Usd::new(dec!(6)));
        assert_eq!(days[1].invalid, 1);
    }

    #[test]
    fn test_empty_day() {
        let book = DailyTotalsBook::new();
        let date = utc_date(0);
        assert_eq!(book.day(date).trades, 0);
    }
}
