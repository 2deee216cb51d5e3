//! Read-only market data consumed by the engine.
//!
//! The engine never fetches anything itself: price and FX series are populated by
//! external collaborators and handed over behind these traits.

use crate::domain::{CurrencyCode, Decimal, Symbol};
use chrono::NaiveDate;
use std::fmt;

pub mod files;
pub mod memory;

pub use files::{LoadError, Snapshot, SnapshotLoader};
pub use memory::InMemoryMarketData;

/// A dated close price.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub price: Decimal,
}

/// Price series lookup.
pub trait PriceSource: fmt::Debug {
    /// Latest price dated on or before `date`. Never returns a later price.
    fn price_at_or_before(&self, symbol: &Symbol, date: NaiveDate) -> Option<PricePoint>;

    /// Whether any price exists for `symbol`.
    fn has_series(&self, symbol: &Symbol) -> bool;
}

/// FX spot-rate lookup into the reporting currency.
pub trait FxSource: fmt::Debug {
    /// Reporting-currency units per one unit of `currency` at `date`.
    ///
    /// Implementations resolve to the latest quote on or before `date`.
    fn rate_at(&self, currency: &CurrencyCode, date: NaiveDate) -> Option<Decimal>;
}

/// Both caches together, as handed to an analysis run.
pub trait MarketData: PriceSource + FxSource {}

impl<T: PriceSource + FxSource> MarketData for T {}
