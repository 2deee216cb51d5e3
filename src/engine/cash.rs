//! Cash ledger derivation and month-end NAV.
//!
//! Cash is tracked per currency. Whenever an event would take a balance below
//! zero the shortfall is treated as an external deposit on that date and the
//! balance is reset to zero; those deposits are the external flows fed into
//! the return calculation.

use super::fx::FxConverter;
use super::timeline::PositionTimeline;
use crate::datasource::PriceSource;
use crate::domain::{
    CurrencyCode, Decimal, Direction, IncomeEvent, Transaction, TxnType, WarningCategory,
    WarningLog,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A deposit inferred from a cash shortfall.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalFlow {
    pub date: NaiveDate,
    pub currency: CurrencyCode,
    /// Positive: money entering the account.
    pub amount: Decimal,
    pub amount_reporting: Decimal,
    /// Transaction id (or income reference) that triggered the shortfall.
    pub reference: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CashSnapshot {
    pub month_end: NaiveDate,
    pub balances: BTreeMap<CurrencyCode, Decimal>,
    /// Sum of balances in the reporting currency at the valuation date.
    pub value: Decimal,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CashLedger {
    pub flows: Vec<ExternalFlow>,
    pub snapshots: Vec<CashSnapshot>,
}

impl CashLedger {
    pub fn total_flows_reporting(&self) -> Decimal {
        self.flows.iter().map(|f| f.amount_reporting).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthlyNav {
    pub month_end: NaiveDate,
    /// `min(month_end, as_of)`.
    pub valuation_date: NaiveDate,
    pub positions_value: Decimal,
    pub cash_value: Decimal,
    pub nav: Decimal,
}

struct CashEvent {
    date: NaiveDate,
    rank: u8,
    seq: usize,
    currency: CurrencyCode,
    amount: Decimal,
    reference: String,
}

fn cash_delta(txn: &Transaction) -> Decimal {
    match txn.txn_type {
        TxnType::Buy | TxnType::Cover => -(txn.notional() + txn.fee),
        TxnType::Sell | TxnType::Short => txn.notional() - txn.fee,
    }
}

/// Valuation date for a month: its end, capped at `as_of`.
pub fn valuation_date(month_end: NaiveDate, as_of: NaiveDate) -> NaiveDate {
    month_end.min(as_of)
}

/// Replay every cash-affecting event and snapshot balances at each month end.
pub fn derive_cash_ledger(
    transactions: &[Transaction],
    income: &[IncomeEvent],
    months: &[NaiveDate],
    as_of: NaiveDate,
    fx: &FxConverter<'_>,
    warnings: &mut WarningLog,
) -> CashLedger {
    let mut events: Vec<CashEvent> = transactions
        .iter()
        .enumerate()
        .map(|(seq, txn)| CashEvent {
            date: txn.date,
            rank: txn.origin.rank(),
            seq,
            currency: txn.currency.clone(),
            amount: cash_delta(txn),
            reference: txn.transaction_id.clone(),
        })
        .collect();
    let offset = events.len();
    // Income lands after same-day trades.
    events.extend(income.iter().enumerate().map(|(i, event)| CashEvent {
        date: event.date,
        rank: u8::MAX,
        seq: offset + i,
        currency: event.currency.clone(),
        amount: event.amount,
        reference: format!("income_{}_{}", event.symbol, event.date),
    }));
    events.sort_by(|a, b| (a.date, a.rank, a.seq).cmp(&(b.date, b.rank, b.seq)));

    let mut balances: BTreeMap<CurrencyCode, Decimal> = BTreeMap::new();
    let mut flows = Vec::new();
    let mut snapshots = Vec::with_capacity(months.len());
    let mut pending = events.into_iter().peekable();

    for &month in months {
        let valuation = valuation_date(month, as_of);
        while let Some(event) = pending.next_if(|e| e.date <= valuation) {
            let balance = balances
                .entry(event.currency.clone())
                .or_insert_with(Decimal::zero);
            *balance += event.amount;
            if balance.is_negative() {
                let amount = -*balance;
                *balance = Decimal::zero();
                let amount_reporting =
                    fx.to_reporting_or_warn(amount, &event.currency, event.date, warnings);
                flows.push(ExternalFlow {
                    date: event.date,
                    currency: event.currency,
                    amount,
                    amount_reporting,
                    reference: event.reference,
                });
            }
        }

        let value = balances
            .iter()
            .map(|(ccy, bal)| fx.to_reporting_or_warn(*bal, ccy, valuation, warnings))
            .sum();
        snapshots.push(CashSnapshot {
            month_end: month,
            balances: balances.clone(),
            value,
        });
    }

    if pending.peek().is_some() {
        warnings.low(
            WarningCategory::Timeline,
            format!("cash events dated after {} were ignored", as_of),
        );
    }

    tracing::debug!(flows = flows.len(), months = snapshots.len(), "cash ledger derived");
    CashLedger { flows, snapshots }
}

/// Month-end NAV: positions valued at the latest cached price plus cash.
pub fn compute_monthly_nav(
    timeline: &PositionTimeline,
    ledger: &CashLedger,
    as_of: NaiveDate,
    prices: &dyn PriceSource,
    fx: &FxConverter<'_>,
    warnings: &mut WarningLog,
) -> Vec<MonthlyNav> {
    ledger
        .snapshots
        .iter()
        .map(|snapshot| {
            let valuation = valuation_date(snapshot.month_end, as_of);
            let mut positions_value = Decimal::zero();
            for (key, quantity) in timeline.positions_at(valuation) {
                let price = match prices.price_at_or_before(&key.symbol, valuation) {
                    Some(point) => point.price,
                    None => {
                        let fallback = timeline.last_trade_price(&key, valuation);
                        if !prices.has_series(&key.symbol) {
                            warnings.high(
                                WarningCategory::Unpriceable,
                                format!("{}: no price series; valued at last trade price", key.symbol),
                            );
                        } else {
                            warnings.low(
                                WarningCategory::MissingPrice,
                                format!(
                                    "{}: no price at or before {}; valued at last trade price",
                                    key.symbol, valuation
                                ),
                            );
                        }
                        fallback.unwrap_or_else(Decimal::zero)
                    }
                };
                let native = match key.direction {
                    Direction::Long => quantity * price,
                    Direction::Short => -(quantity * price),
                };
                positions_value += fx.to_reporting_or_warn(native, &key.currency, valuation, warnings);
            }
            MonthlyNav {
                month_end: snapshot.month_end,
                valuation_date: valuation,
                positions_value,
                cash_value: snapshot.value,
                nav: positions_value + snapshot.value,
            }
        })
        .collect()
}
