//! Monthly Modified Dietz returns and the growth-of-a-dollar series.

use super::cash::{ExternalFlow, MonthlyNav};
use crate::domain::{Decimal, WarningCategory, WarningLog};
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthlyReturn {
    pub month_end: NaiveDate,
    /// Fraction, not percent: 0.05 is +5%.
    pub value: Decimal,
    /// Value before any safety clamp.
    pub raw: Decimal,
    pub clamped: bool,
    /// |raw| above 300%.
    pub suspicious: bool,
}

/// When the −100% floor applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReturnsPolicy {
    pub data_coverage_pct: Decimal,
    pub has_short_positions: bool,
}

impl ReturnsPolicy {
    /// A long-only portfolio cannot lose more than everything; below that
    /// the loss is an artifact of positions we could not reconstruct.
    pub fn clamp_enabled(&self) -> bool {
        self.data_coverage_pct < Decimal::hundred() && !self.has_short_positions
    }
}

/// Modified Dietz for one period.
///
/// `flows` are `(day_of_month, amount)`; weight is `(D − d) / D`. When the
/// period starts empty the denominator is the net flow itself. Returns `None`
/// when the denominator is not positive.
pub fn modified_dietz(
    start_value: Decimal,
    end_value: Decimal,
    flows: &[(u32, Decimal)],
    days_in_period: u32,
) -> Option<Decimal> {
    let net_flow: Decimal = flows.iter().map(|(_, amount)| *amount).sum();
    let days = Decimal::from_i64(i64::from(days_in_period.max(1)));

    let denominator = if start_value.is_zero() {
        net_flow
    } else {
        let weighted: Decimal = flows
            .iter()
            .map(|(day, amount)| {
                let remaining = Decimal::from_i64(i64::from(days_in_period.saturating_sub(*day)));
                (*amount * remaining).checked_div(days).unwrap_or_else(Decimal::zero)
            })
            .sum();
        start_value + weighted
    };

    if !denominator.is_positive() {
        return None;
    }
    (end_value - start_value - net_flow).checked_div(denominator)
}

/// One return per NAV month; the first month starts from zero.
pub fn compute_monthly_returns(
    navs: &[MonthlyNav],
    flows: &[ExternalFlow],
    warnings: &mut WarningLog,
) -> Vec<MonthlyReturn> {
    let mut out = Vec::with_capacity(navs.len());
    let mut start_value = Decimal::zero();
    let mut period_start: Option<NaiveDate> = None;

    for nav in navs {
        let month_flows: Vec<(u32, Decimal)> = flows
            .iter()
            .filter(|f| period_start.map_or(true, |s| f.date > s) && f.date <= nav.valuation_date)
            .map(|f| (f.date.day(), f.amount_reporting))
            .collect();
        let days = nav.month_end.day();

        let raw = match modified_dietz(start_value, nav.nav, &month_flows, days) {
            Some(r) => r,
            None => {
                // Only a month with nothing in it at all is silently zero.
                if !(start_value.is_zero() && month_flows.is_empty() && nav.nav.is_zero()) {
                    warnings.low(
                        WarningCategory::Returns,
                        format!(
                            "{}: non-positive Modified Dietz denominator; return set to 0",
                            nav.month_end.format("%Y-%m")
                        ),
                    );
                }
                Decimal::zero()
            }
        };
        out.push(MonthlyReturn {
            month_end: nav.month_end,
            value: raw,
            raw,
            clamped: false,
            suspicious: false,
        });

        start_value = nav.nav;
        period_start = Some(nav.valuation_date);
    }
    out
}

/// Floor returns at −100% where the policy allows and flag implausible magnitudes.
pub fn apply_safety_clamp(returns: &mut [MonthlyReturn], policy: &ReturnsPolicy, warnings: &mut WarningLog) {
    let floor = -Decimal::one();
    let suspicious_threshold = Decimal::from_i64(3);

    for r in returns.iter_mut() {
        if policy.clamp_enabled() && r.raw < floor {
            r.value = floor;
            r.clamped = true;
            warnings.low(
                WarningCategory::Returns,
                format!(
                    "{}: return of {}% clamped to -100% (incomplete data coverage)",
                    r.month_end.format("%Y-%m"),
                    (r.raw * Decimal::hundred()).round_dp(2)
                ),
            );
            continue;
        }
        if r.raw.abs() > suspicious_threshold {
            r.suspicious = true;
            warnings.low(
                WarningCategory::Returns,
                format!(
                    "{}: suspicious return of {}%",
                    r.month_end.format("%Y-%m"),
                    (r.raw * Decimal::hundred()).round_dp(2)
                ),
            );
        }
    }
}

/// Cumulative value of one unit invested at the start of the first month.
pub fn growth_of_dollar(returns: &[MonthlyReturn]) -> Vec<(NaiveDate, Decimal)> {
    let mut value = Decimal::one();
    returns
        .iter()
        .map(|r| {
            value = value * (Decimal::one() + r.value);
            (r.month_end, value)
        })
        .collect()
}
