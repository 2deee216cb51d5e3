//! Domain types and determinism layer for performance reconstruction.
//!
//! This module provides:
//! - Lossless numeric handling via Decimal wrapper
//! - Domain primitives: Symbol, CurrencyCode, TxnType, Direction, Origin
//! - Transactions, lots, trades, holdings and income events
//! - Stable transaction ordering key for deterministic processing
//! - The warning log shared by every pipeline stage

pub mod decimal;
pub mod holding;
pub mod lot;
pub mod ordering;
pub mod primitives;
pub mod transaction;
pub mod warning;

pub use decimal::Decimal;
pub use holding::{Holding, IncomeEvent, IncomeKind};
pub use lot::{ClosedTrade, IncompleteTrade, LotKey, OpenLot};
pub use ordering::{first_out_of_order, sort_transactions_deterministic, TransactionOrderingKey};
pub use primitives::{CurrencyCode, CurrencyParseError, Direction, Origin, Symbol, TxnType};
pub use transaction::{Transaction, TransactionError};
pub use warning::{DataWarning, Severity, WarningCategory, WarningLog};

use chrono::{Datelike, Duration, NaiveDate};

/// One calendar day; the engine's "one time unit" for synthetic offsets.
pub fn day_before(date: NaiveDate) -> NaiveDate {
    date - Duration::days(1)
}

/// Last calendar day of the month containing `date`.
pub fn month_end(date: NaiveDate) -> NaiveDate {
    let (y, m) = if date.month() == 12 {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    };
    NaiveDate::from_ymd_opt(y, m, 1)
        .map(day_before)
        .unwrap_or(date)
}

/// Every month end from the month of `start` through the month of `end`, inclusive.
pub fn month_ends(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    let mut out = Vec::new();
    let last = month_end(end);
    let mut current = month_end(start);
    while current <= last {
        out.push(current);
        current = month_end(current + Duration::days(1));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_month_end() {
        assert_eq!(month_end(date("2024-02-10")), date("2024-02-29"));
        assert_eq!(month_end(date("2023-12-01")), date("2023-12-31"));
        assert_eq!(month_end(date("2024-04-30")), date("2024-04-30"));
    }

    #[test]
    fn test_month_ends_inclusive() {
        let ends = month_ends(date("2023-11-15"), date("2024-02-03"));
        assert_eq!(
            ends,
            vec![
                date("2023-11-30"),
                date("2023-12-31"),
                date("2024-01-31"),
                date("2024-02-29")
            ]
        );
        assert!(month_ends(date("2024-03-01"), date("2024-02-01")).is_empty());
    }

    #[test]
    fn test_day_before_crosses_month() {
        assert_eq!(day_before(date("2024-03-01")), date("2024-02-29"));
    }
}
