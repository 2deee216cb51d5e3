//! Current holdings and income events supplied by the position collaborator.

use crate::domain::{CurrencyCode, Decimal, Direction, Symbol};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Broker-reported current position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Holding {
    pub symbol: Symbol,
    /// Signed quantity: negative for a short position.
    pub quantity: Decimal,
    pub currency: CurrencyCode,
    /// Total broker cost basis for the whole position.
    #[serde(default)]
    pub cost_basis: Option<Decimal>,
    /// True when `cost_basis` is already in the reporting currency.
    #[serde(default)]
    pub cost_basis_usd: bool,
}

impl Holding {
    pub fn direction(&self) -> Direction {
        if self.quantity.is_negative() {
            Direction::Short
        } else {
            Direction::Long
        }
    }

    pub fn abs_quantity(&self) -> Decimal {
        self.quantity.abs()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IncomeKind {
    Dividend,
    Interest,
}

/// Cash income credited to the account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncomeEvent {
    pub symbol: Symbol,
    pub date: NaiveDate,
    pub amount: Decimal,
    pub currency: CurrencyCode,
    pub kind: IncomeKind,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_holding_direction_from_sign() {
        let mut holding = Holding {
            symbol: Symbol::new("TSLA"),
            quantity: Decimal::from_i64(-5),
            currency: CurrencyCode::usd(),
            cost_basis: None,
            cost_basis_usd: false,
        };
        assert_eq!(holding.direction(), Direction::Short);
        assert_eq!(holding.abs_quantity(), Decimal::from_i64(5));

        holding.quantity = Decimal::from_i64(5);
        assert_eq!(holding.direction(), Direction::Long);
    }

    #[test]
    fn test_holding_deserialize_defaults() {
        let json = r#"{"symbol":"vod","quantity":100,"currency":"GBP"}"#;
        let holding: Holding = serde_json::from_str(json).unwrap();
        assert_eq!(holding.symbol.as_str(), "VOD");
        assert_eq!(holding.cost_basis, None);
        assert!(!holding.cost_basis_usd);
    }
}
