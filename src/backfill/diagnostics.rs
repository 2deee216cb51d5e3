//! Advisory checks on backfill entries after the seeded matching pass.

use crate::domain::{Origin, WarningCategory, WarningLog};
use crate::engine::fifo::MatchOutput;
use chrono::Duration;

/// Warn about backfill lots nothing consumed ("stale") and consumed backfill
/// entries that sit next to a provider lot of the same symbol and direction
/// ("redundant", most likely the provider now reports the entry itself).
pub fn backfill_diagnostics(matched: &MatchOutput, redundancy_window_days: i64, warnings: &mut WarningLog) {
    for lot in matched.open_lots.iter().filter(|l| l.origin == Origin::Backfill) {
        let consumed = matched
            .closed_trades
            .iter()
            .any(|t| t.entry_transaction_id == lot.origin_transaction_id);
        if !consumed {
            warnings.low(
                WarningCategory::Backfill,
                format!(
                    "Stale backfill entry {} ({} {}): no exit matched it",
                    lot.origin_transaction_id, lot.symbol, lot.direction
                ),
            );
        }
    }

    let window = Duration::days(redundancy_window_days.max(0));
    let within = |apart: Duration| apart <= window && apart >= -window;
    let mut flagged: Vec<&str> = Vec::new();
    for trade in matched
        .closed_trades
        .iter()
        .filter(|t| t.entry_origin == Origin::Backfill)
    {
        if flagged.contains(&trade.entry_transaction_id.as_str()) {
            continue;
        }
        let nearby = matched.open_lots.iter().find(|lot| {
            lot.origin == Origin::Real
                && lot.symbol == trade.symbol
                && lot.direction == trade.direction
                && within(lot.entry_date - trade.entry_date)
        });
        if let Some(lot) = nearby {
            flagged.push(trade.entry_transaction_id.as_str());
            warnings.low(
                WarningCategory::Backfill,
                format!(
                    "Possibly redundant backfill entry {}: provider lot {} for {} opened on {}",
                    trade.entry_transaction_id, lot.origin_transaction_id, lot.symbol, lot.entry_date
                ),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        ClosedTrade, CurrencyCode, Decimal, Direction, OpenLot, Symbol,
    };
    use chrono::NaiveDate;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn lot(id: &str, origin: Origin, day: &str) -> OpenLot {
        OpenLot {
            symbol: Symbol::new("AAPL"),
            direction: Direction::Long,
            entry_date: date(day),
            entry_price: Decimal::from_i64(100),
            entry_fee: Decimal::zero(),
            remaining_quantity: Decimal::from_i64(10),
            currency: CurrencyCode::usd(),
            origin_transaction_id: id.to_string(),
            origin,
        }
    }

    fn trade(entry_id: &str, entry_day: &str) -> ClosedTrade {
        ClosedTrade {
            symbol: Symbol::new("AAPL"),
            currency: CurrencyCode::usd(),
            direction: Direction::Long,
            entry_transaction_id: entry_id.to_string(),
            exit_transaction_id: "s1".to_string(),
            entry_date: date(entry_day),
            exit_date: date("2024-03-01"),
            quantity: Decimal::from_i64(10),
            entry_price: Decimal::from_i64(100),
            exit_price: Decimal::from_i64(110),
            entry_fee: Decimal::zero(),
            exit_fee: Decimal::zero(),
            pnl_dollars: Decimal::from_i64(100),
            entry_origin: Origin::Backfill,
        }
    }

    #[test]
    fn test_stale_backfill_lot() {
        let matched = MatchOutput {
            open_lots: vec![lot("backfill_x_entry_for_s9", Origin::Backfill, "2024-01-02")],
            ..Default::default()
        };
        let mut warnings = WarningLog::new();
        backfill_diagnostics(&matched, 3, &mut warnings);

        assert_eq!(warnings.len(), 1);
        assert!(warnings.messages()[0].starts_with("Stale backfill entry"));
    }

    #[test]
    fn test_redundant_within_window_only() {
        let matched = MatchOutput {
            closed_trades: vec![trade("backfill_x_entry_for_s1", "2024-01-10")],
            open_lots: vec![lot("real-b1", Origin::Real, "2024-01-12")],
            ..Default::default()
        };
        let mut warnings = WarningLog::new();
        backfill_diagnostics(&matched, 3, &mut warnings);
        assert_eq!(warnings.len(), 1);
        assert!(warnings.messages()[0].contains("redundant"));

        let mut quiet = WarningLog::new();
        backfill_diagnostics(&matched, 1, &mut quiet);
        assert!(quiet.is_empty());
    }
}
