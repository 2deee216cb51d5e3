//! Lots and trade records produced by FIFO matching.

use crate::domain::{CurrencyCode, Decimal, Direction, Origin, Symbol};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lot-table key: positions are tracked per (symbol, currency, direction).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LotKey {
    pub symbol: Symbol,
    pub currency: CurrencyCode,
    pub direction: Direction,
}

impl LotKey {
    pub fn new(symbol: Symbol, currency: CurrencyCode, direction: Direction) -> Self {
        Self {
            symbol,
            currency,
            direction,
        }
    }
}

impl fmt::Display for LotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.symbol, self.currency, self.direction)
    }
}

/// A still-open quantity acquired at a specific date and price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenLot {
    pub symbol: Symbol,
    pub direction: Direction,
    pub entry_date: NaiveDate,
    pub entry_price: Decimal,
    /// Fee attributable to `remaining_quantity`; shrinks pro rata on partial closes.
    pub entry_fee: Decimal,
    pub remaining_quantity: Decimal,
    pub currency: CurrencyCode,
    pub origin_transaction_id: String,
    pub origin: Origin,
}

impl OpenLot {
    pub fn key(&self) -> LotKey {
        LotKey::new(self.symbol.clone(), self.currency.clone(), self.direction)
    }

    /// `remaining_quantity * entry_price + entry_fee`, in lot currency.
    pub fn cost_basis(&self) -> Decimal {
        self.remaining_quantity * self.entry_price + self.entry_fee
    }
}

/// A fully matched entry/exit pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClosedTrade {
    pub symbol: Symbol,
    pub currency: CurrencyCode,
    pub direction: Direction,
    pub entry_transaction_id: String,
    pub exit_transaction_id: String,
    pub entry_date: NaiveDate,
    pub exit_date: NaiveDate,
    pub quantity: Decimal,
    pub entry_price: Decimal,
    pub exit_price: Decimal,
    pub entry_fee: Decimal,
    pub exit_fee: Decimal,
    /// Net of both fee legs, in trade currency.
    pub pnl_dollars: Decimal,
    pub entry_origin: Origin,
}

impl ClosedTrade {
    /// Realized P&L in trade currency for the given legs.
    pub fn compute_pnl(
        direction: Direction,
        quantity: Decimal,
        entry_price: Decimal,
        exit_price: Decimal,
        entry_fee: Decimal,
        exit_fee: Decimal,
    ) -> Decimal {
        let gross = match direction {
            Direction::Long => (exit_price - entry_price) * quantity,
            Direction::Short => (entry_price - exit_price) * quantity,
        };
        gross - entry_fee - exit_fee
    }
}

/// An exit for which no entry could be found.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncompleteTrade {
    pub symbol: Symbol,
    pub currency: CurrencyCode,
    /// Direction of the position the exit tried to close.
    pub direction: Direction,
    pub exit_transaction_id: String,
    pub exit_date: NaiveDate,
    pub quantity: Decimal,
    pub exit_price: Decimal,
    pub exit_fee: Decimal,
    pub source: String,
}

impl IncompleteTrade {
    pub fn key(&self) -> LotKey {
        LotKey::new(self.symbol.clone(), self.currency.clone(), self.direction)
    }
}
