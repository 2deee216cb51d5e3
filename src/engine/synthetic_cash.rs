//! Cash-side counterparts for synthetic entries.
//!
//! A synthetic entry adds shares to the timeline; without a matching purchase
//! the later sale proceeds would look like pure profit. Each entry therefore
//! becomes a zero-fee transaction priced from the cache (or the exit price hint
//! for incomplete trades).

use super::timeline::{synthetic_reference, SyntheticEntry};
use crate::datasource::PriceSource;
use crate::domain::{Decimal, Origin, Transaction, TxnType, WarningCategory, WarningLog};

pub const SYNTHETIC_CASH_SOURCE: &str = "synthetic_cash_event";

pub fn generate_synthetic_cash_events(
    entries: &[SyntheticEntry],
    prices: &dyn PriceSource,
    warnings: &mut WarningLog,
) -> Vec<Transaction> {
    let mut out = Vec::with_capacity(entries.len());
    for entry in entries {
        let price = match entry.origin {
            Origin::SyntheticIncompleteTrade => entry
                .price_hint
                .or_else(|| cached_price(entry, prices)),
            _ => cached_price(entry, prices),
        };
        let Some(price) = price.filter(|p| p.is_positive()) else {
            warnings.low(
                WarningCategory::MissingPrice,
                format!(
                    "{}: no price at or before {} for synthetic entry; cash event skipped",
                    entry.key, entry.date
                ),
            );
            continue;
        };

        out.push(
            Transaction::new(
                TxnType::entry_for(entry.key.direction),
                entry.key.symbol.clone(),
                entry.date,
                entry.quantity,
                price,
                Decimal::zero(),
                entry.key.currency.clone(),
                SYNTHETIC_CASH_SOURCE,
                format!("cash_{}", synthetic_reference(entry)),
            )
            .with_origin(Origin::SyntheticCashEvent),
        );
    }
    tracing::debug!(generated = out.len(), entries = entries.len(), "synthetic cash events");
    out
}

fn cached_price(entry: &SyntheticEntry, prices: &dyn PriceSource) -> Option<Decimal> {
    prices
        .price_at_or_before(&entry.key.symbol, entry.date)
        .map(|p| p.price)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasource::InMemoryMarketData;
    use crate::domain::{CurrencyCode, Direction, LotKey, Symbol};
    use chrono::NaiveDate;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn entry(direction: Direction, origin: Origin, hint: Option<Decimal>) -> SyntheticEntry {
        SyntheticEntry {
            key: LotKey::new(Symbol::new("AAPL"), CurrencyCode::usd(), direction),
            date: date("2024-03-09"),
            quantity: Decimal::from_i64(100),
            origin,
            price_hint: hint,
        }
    }

    #[test]
    fn test_current_position_uses_price_cache() {
        let market = InMemoryMarketData::new().with_price("AAPL", date("2024-03-08"), Decimal::from_i64(170));
        let mut warnings = WarningLog::new();
        let events = generate_synthetic_cash_events(
            &[entry(Direction::Long, Origin::SyntheticCurrentPosition, None)],
            &market,
            &mut warnings,
        );

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].txn_type, TxnType::Buy);
        assert_eq!(events[0].price, Decimal::from_i64(170));
        assert_eq!(events[0].fee, Decimal::zero());
        assert_eq!(events[0].origin, Origin::SyntheticCashEvent);
        assert_eq!(events[0].source, SYNTHETIC_CASH_SOURCE);
    }

    #[test]
    fn test_incomplete_trade_uses_price_hint_and_short_side() {
        let market = InMemoryMarketData::new();
        let mut warnings = WarningLog::new();
        let events = generate_synthetic_cash_events(
            &[entry(Direction::Short, Origin::SyntheticIncompleteTrade, Some(Decimal::from_i64(42)))],
            &market,
            &mut warnings,
        );

        assert_eq!(events[0].txn_type, TxnType::Short);
        assert_eq!(events[0].price, Decimal::from_i64(42));
    }

    #[test]
    fn test_missing_price_skips_with_warning() {
        let market = InMemoryMarketData::new();
        let mut warnings = WarningLog::new();
        let events = generate_synthetic_cash_events(
            &[entry(Direction::Long, Origin::SyntheticCurrentPosition, None)],
            &market,
            &mut warnings,
        );

        assert!(events.is_empty());
        assert_eq!(warnings.len(), 1);
    }
}
