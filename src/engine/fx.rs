//! Conversion of native-currency amounts into the reporting currency.

use crate::datasource::FxSource;
use crate::domain::{CurrencyCode, Decimal, WarningCategory, WarningLog};
use chrono::NaiveDate;

/// Converts amounts using the FX cache at each amount's own date.
#[derive(Debug, Clone, Copy)]
pub struct FxConverter<'a> {
    source: &'a dyn FxSource,
    reporting: &'a CurrencyCode,
}

impl<'a> FxConverter<'a> {
    pub fn new(source: &'a dyn FxSource, reporting: &'a CurrencyCode) -> Self {
        Self { source, reporting }
    }

    pub fn reporting_currency(&self) -> &CurrencyCode {
        self.reporting
    }

    /// Reporting units per unit of `currency`; identity for the reporting currency.
    pub fn rate(&self, currency: &CurrencyCode, date: NaiveDate) -> Option<Decimal> {
        if currency == self.reporting {
            return Some(Decimal::one());
        }
        self.source.rate_at(currency, date).filter(|r| r.is_positive())
    }

    pub fn to_reporting(&self, amount: Decimal, currency: &CurrencyCode, date: NaiveDate) -> Option<Decimal> {
        self.rate(currency, date).map(|rate| amount * rate)
    }

    /// Cross conversion between two arbitrary currencies via the reporting currency.
    pub fn convert(
        &self,
        amount: Decimal,
        from: &CurrencyCode,
        to: &CurrencyCode,
        date: NaiveDate,
    ) -> Option<Decimal> {
        if from == to {
            return Some(amount);
        }
        let from_rate = self.rate(from, date)?;
        let to_rate = self.rate(to, date)?;
        (amount * from_rate).checked_div(to_rate)
    }

    /// Like [`to_reporting`](Self::to_reporting) but never fails: a missing rate
    /// leaves the amount unconverted and records a high-severity warning.
    pub fn to_reporting_or_warn(
        &self,
        amount: Decimal,
        currency: &CurrencyCode,
        date: NaiveDate,
        warnings: &mut WarningLog,
    ) -> Decimal {
        match self.to_reporting(amount, currency, date) {
            Some(converted) => converted,
            None => {
                warnings.high(
                    WarningCategory::MissingFx,
                    format!(
                        "No {}/{} FX rate at or before {}; amount left unconverted",
                        currency, self.reporting, date
                    ),
                );
                amount
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasource::InMemoryMarketData;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn d(s: &str) -> Decimal {
        Decimal::from_str_canonical(s).unwrap()
    }

    #[test]
    fn test_identity_and_conversion() {
        let market = InMemoryMarketData::new()
            .with_fx_rate("GBP", date("2024-01-01"), d("1.25"))
            .with_fx_rate("EUR", date("2024-01-01"), d("1.10"));
        let usd = CurrencyCode::usd();
        let fx = FxConverter::new(&market, &usd);
        let gbp = CurrencyCode::parse("GBP").unwrap();
        let eur = CurrencyCode::parse("EUR").unwrap();

        assert_eq!(fx.to_reporting(d("100"), &usd, date("2020-01-01")), Some(d("100")));
        assert_eq!(fx.to_reporting(d("100"), &gbp, date("2024-01-02")), Some(d("125")));
        assert_eq!(fx.convert(d("110"), &eur, &gbp, date("2024-01-02")), Some(d("96.8")));
    }

    #[test]
    fn test_missing_rate_warns_high() {
        let market = InMemoryMarketData::new();
        let usd = CurrencyCode::usd();
        let fx = FxConverter::new(&market, &usd);
        let mut warnings = WarningLog::new();

        let out = fx.to_reporting_or_warn(d("10"), &CurrencyCode::parse("JPY").unwrap(), date("2024-01-01"), &mut warnings);
        assert_eq!(out, d("10"));
        assert!(warnings.has_high_severity(WarningCategory::MissingFx));
    }
}
