//! In-memory price and FX cache.
//!
//! Stores series as `HashMap<key, BTreeMap<date, value>>`; the BTreeMap gives
//! "at or before" lookups as a reverse range scan.

use super::{FxSource, PricePoint, PriceSource};
use crate::domain::{CurrencyCode, Decimal, Symbol};
use chrono::NaiveDate;
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, Default)]
pub struct InMemoryMarketData {
    prices: HashMap<Symbol, BTreeMap<NaiveDate, Decimal>>,
    fx: HashMap<CurrencyCode, BTreeMap<NaiveDate, Decimal>>,
}

impl InMemoryMarketData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_price(&mut self, symbol: Symbol, date: NaiveDate, price: Decimal) {
        self.prices.entry(symbol).or_default().insert(date, price);
    }

    /// Add a rate quoted as reporting-currency units per unit of `currency`.
    pub fn add_fx_rate(&mut self, currency: CurrencyCode, date: NaiveDate, rate: Decimal) {
        self.fx.entry(currency).or_default().insert(date, rate);
    }

    pub fn with_price(mut self, symbol: &str, date: NaiveDate, price: Decimal) -> Self {
        self.add_price(Symbol::new(symbol), date, price);
        self
    }

    pub fn with_fx_rate(mut self, currency: &str, date: NaiveDate, rate: Decimal) -> Self {
        if let Ok(code) = CurrencyCode::parse(currency) {
            self.add_fx_rate(code, date, rate);
        }
        self
    }

    fn latest_at_or_before(
        series: Option<&BTreeMap<NaiveDate, Decimal>>,
        date: NaiveDate,
    ) -> Option<(NaiveDate, Decimal)> {
        series?
            .range(..=date)
            .next_back()
            .map(|(d, v)| (*d, *v))
    }
}

impl PriceSource for InMemoryMarketData {
    fn price_at_or_before(&self, symbol: &Symbol, date: NaiveDate) -> Option<PricePoint> {
        Self::latest_at_or_before(self.prices.get(symbol), date)
            .map(|(date, price)| PricePoint { date, price })
    }

    fn has_series(&self, symbol: &Symbol) -> bool {
        self.prices.get(symbol).map(|s| !s.is_empty()).unwrap_or(false)
    }
}

impl FxSource for InMemoryMarketData {
    fn rate_at(&self, currency: &CurrencyCode, date: NaiveDate) -> Option<Decimal> {
        Self::latest_at_or_before(self.fx.get(currency), date).map(|(_, rate)| rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn d(s: &str) -> Decimal {
        Decimal::from_str_canonical(s).unwrap()
    }

    #[test]
    fn test_price_never_looks_forward() {
        let market = InMemoryMarketData::new()
            .with_price("AAPL", date("2024-01-10"), d("180"))
            .with_price("AAPL", date("2024-01-20"), d("190"));
        let aapl = Symbol::new("AAPL");

        assert_eq!(market.price_at_or_before(&aapl, date("2024-01-05")), None);
        assert_eq!(
            market.price_at_or_before(&aapl, date("2024-01-15")).unwrap().price,
            d("180")
        );
        let exact = market.price_at_or_before(&aapl, date("2024-01-20")).unwrap();
        assert_eq!(exact.price, d("190"));
        assert_eq!(exact.date, date("2024-01-20"));
        assert!(market.has_series(&aapl));
        assert!(!market.has_series(&Symbol::new("MSFT")));
    }

    #[test]
    fn test_fx_resolves_latest_quote() {
        let market = InMemoryMarketData::new()
            .with_fx_rate("GBP", date("2024-01-01"), d("1.27"))
            .with_fx_rate("GBP", date("2024-02-01"), d("1.26"));
        let gbp = CurrencyCode::parse("GBP").unwrap();

        assert_eq!(market.rate_at(&gbp, date("2024-01-31")), Some(d("1.27")));
        assert_eq!(market.rate_at(&gbp, date("2024-03-01")), Some(d("1.26")));
        assert_eq!(market.rate_at(&gbp, date("2023-12-31")), None);
    }
}
