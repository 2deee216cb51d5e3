//! Lot-based P&L, NAV-based reconciliation and the confidence gate.

use super::fifo::MatchOutput;
use super::fx::FxConverter;
use crate::datasource::PriceSource;
use crate::domain::{
    ClosedTrade, Decimal, Direction, IncomeEvent, IncomeKind, OpenLot, Origin, WarningCategory,
    WarningLog,
};
use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncomeSummary {
    pub dividends: Decimal,
    pub interest: Decimal,
    pub total: Decimal,
    /// Income received over the trailing 365 days.
    pub projected_annual: Decimal,
}

/// Lot-derived P&L in the reporting currency.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LotPnl {
    pub realized: Decimal,
    pub unrealized: Decimal,
    pub income: IncomeSummary,
    pub total: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfidenceThresholds {
    pub coverage_target_pct: Decimal,
    pub gap_tolerance_pct: Decimal,
    pub gap_floor: Decimal,
}

impl Default for ConfidenceThresholds {
    fn default() -> Self {
        Self {
            coverage_target_pct: Decimal::from_i64(95),
            gap_tolerance_pct: Decimal::from_i64(5),
            gap_floor: Decimal::from_i64(1000),
        }
    }
}

/// Facts the confidence gate checks besides the gap itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfidenceInputs {
    pub data_coverage_pct: Decimal,
    pub incomplete_trades: usize,
    pub nav_end: Decimal,
    pub used_synthetic_data: bool,
    pub has_high_severity_pricing_warnings: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationResult {
    pub official_pnl_usd: Decimal,
    pub lot_pnl_usd: Decimal,
    pub reconciliation_gap_usd: Decimal,
    pub high_confidence_realized: bool,
    /// One reason per failed check.
    pub warnings: Vec<String>,
}

/// Realized P&L of one trade, each leg at its own date's FX rate.
pub fn realized_trade_pnl(trade: &ClosedTrade, fx: &FxConverter<'_>, warnings: &mut WarningLog) -> Decimal {
    let entry_notional = trade.quantity * trade.entry_price;
    let exit_notional = trade.quantity * trade.exit_price;
    // Seeded lots were costed at as-of FX; their entry leg uses the exit date instead
    // of a pre-window date that may predate the FX series.
    let entry_date = if trade.entry_origin == Origin::Seeded {
        trade.exit_date
    } else {
        trade.entry_date
    };
    let entry_leg = fx.to_reporting_or_warn(entry_notional, &trade.currency, entry_date, warnings);
    let entry_fee = fx.to_reporting_or_warn(trade.entry_fee, &trade.currency, entry_date, warnings);
    let exit_leg = fx.to_reporting_or_warn(exit_notional, &trade.currency, trade.exit_date, warnings);
    let exit_fee = fx.to_reporting_or_warn(trade.exit_fee, &trade.currency, trade.exit_date, warnings);

    let gross = match trade.direction {
        Direction::Long => exit_leg - entry_leg,
        Direction::Short => entry_leg - exit_leg,
    };
    gross - entry_fee - exit_fee
}

/// Unrealized P&L of one open lot at `as_of`.
pub fn unrealized_lot_pnl(
    lot: &OpenLot,
    prices: &dyn PriceSource,
    fx: &FxConverter<'_>,
    as_of: NaiveDate,
    warnings: &mut WarningLog,
) -> Decimal {
    let price = match prices.price_at_or_before(&lot.symbol, as_of) {
        Some(point) => point.price,
        None => {
            warnings.high(
                WarningCategory::Unpriceable,
                format!("{}: no price at or before {}; open lot valued at cost", lot.symbol, as_of),
            );
            lot.entry_price
        }
    };
    let entry_date = if lot.origin == Origin::Seeded { as_of } else { lot.entry_date };

    let cost = fx.to_reporting_or_warn(lot.remaining_quantity * lot.entry_price, &lot.currency, entry_date, warnings);
    let fee = fx.to_reporting_or_warn(lot.entry_fee, &lot.currency, entry_date, warnings);
    let value = fx.to_reporting_or_warn(lot.remaining_quantity * price, &lot.currency, as_of, warnings);

    match lot.direction {
        Direction::Long => value - cost - fee,
        Direction::Short => cost - fee - value,
    }
}

pub fn summarize_income(
    income: &[IncomeEvent],
    fx: &FxConverter<'_>,
    as_of: NaiveDate,
    warnings: &mut WarningLog,
) -> IncomeSummary {
    let trailing_start = as_of - Duration::days(365);
    let mut summary = IncomeSummary::default();
    for event in income.iter().filter(|e| e.date <= as_of) {
        let amount = fx.to_reporting_or_warn(event.amount, &event.currency, event.date, warnings);
        match event.kind {
            IncomeKind::Dividend => summary.dividends += amount,
            IncomeKind::Interest => summary.interest += amount,
        }
        if event.date > trailing_start {
            summary.projected_annual += amount;
        }
    }
    summary.total = summary.dividends + summary.interest;
    summary
}

pub fn compute_lot_pnl(
    matched: &MatchOutput,
    income: &[IncomeEvent],
    prices: &dyn PriceSource,
    fx: &FxConverter<'_>,
    as_of: NaiveDate,
    warnings: &mut WarningLog,
) -> LotPnl {
    let realized: Decimal = matched
        .closed_trades
        .iter()
        .map(|t| realized_trade_pnl(t, fx, warnings))
        .sum();
    let unrealized: Decimal = matched
        .open_lots
        .iter()
        .map(|lot| unrealized_lot_pnl(lot, prices, fx, as_of, warnings))
        .sum();
    let income = summarize_income(income, fx, as_of, warnings);
    let total = realized + unrealized + income.total;
    LotPnl {
        realized,
        unrealized,
        income,
        total,
    }
}

/// Compare NAV-based and lot-based P&L and decide whether realized numbers
/// can be presented as high confidence.
pub fn reconcile(
    official_pnl: Decimal,
    lot_pnl: Decimal,
    inputs: &ConfidenceInputs,
    thresholds: &ConfidenceThresholds,
) -> ReconciliationResult {
    let gap = official_pnl - lot_pnl;
    let mut reasons = Vec::new();

    if inputs.data_coverage_pct < thresholds.coverage_target_pct {
        reasons.push(format!(
            "Data coverage {}% is below the {}% target",
            inputs.data_coverage_pct.round_dp(2),
            thresholds.coverage_target_pct
        ));
    }
    if inputs.incomplete_trades > 0 {
        reasons.push(format!(
            "{} incomplete trade(s) without a matching entry",
            inputs.incomplete_trades
        ));
    }
    let tolerance =
        inputs.nav_end.abs().max(thresholds.gap_floor) * thresholds.gap_tolerance_pct / Decimal::hundred();
    if gap.abs() > tolerance {
        reasons.push(format!(
            "Reconciliation gap {} exceeds tolerance {}",
            gap.round_dp(2),
            tolerance.round_dp(2)
        ));
    }
    if inputs.used_synthetic_data {
        reasons.push("Synthetic or estimated positions were used".to_string());
    }
    if inputs.has_high_severity_pricing_warnings {
        reasons.push("High-severity pricing or FX warnings present".to_string());
    }

    let high_confidence_realized = reasons.is_empty();
    if !high_confidence_realized {
        tracing::info!(reasons = reasons.len(), gap = %gap.round_dp(2), "realized P&L below confidence gate");
    }

    ReconciliationResult {
        official_pnl_usd: official_pnl,
        lot_pnl_usd: lot_pnl,
        reconciliation_gap_usd: gap,
        high_confidence_realized,
        warnings: reasons,
    }
}
