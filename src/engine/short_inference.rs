//! Delta-gap gated short inference for providers that report short entries as SELL.
//!
//! A SELL with no long inventory is only turned into a SHORT when the symbol's
//! visible net share flow explains the broker's current holding; otherwise the
//! residual stays an incomplete trade and gets a synthetic entry downstream.

use crate::domain::{Decimal, Holding, Origin, Symbol, Transaction, TxnType};
use std::collections::{BTreeMap, BTreeSet};

/// Per-symbol comparison between visible transactions and broker holdings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeltaGap {
    pub symbol: Symbol,
    /// Σ(BUY + COVER) − Σ(SELL + SHORT) over the transaction window.
    pub visible_net_delta: Decimal,
    /// Signed broker quantity, shorts negative.
    pub current_holdings: Decimal,
}

impl DeltaGap {
    pub fn gap(&self) -> Decimal {
        self.current_holdings - self.visible_net_delta
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShortInferencePolicy {
    ambiguous_sources: BTreeSet<String>,
    eligible: BTreeSet<Symbol>,
}

impl ShortInferencePolicy {
    /// No inference at all; every unmatched SELL becomes incomplete.
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Mark symbols eligible where `|gap| <= tolerance`.
    ///
    /// Only symbols with at least one SELL from an ambiguous source are considered.
    pub fn from_delta_gap(
        transactions: &[Transaction],
        holdings: &[Holding],
        ambiguous_sources: &[String],
        tolerance: Decimal,
    ) -> Self {
        let ambiguous_sources: BTreeSet<String> = ambiguous_sources
            .iter()
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .collect();

        let candidates: BTreeSet<Symbol> = transactions
            .iter()
            .filter(|t| {
                t.txn_type == TxnType::Sell
                    && t.origin == Origin::Real
                    && ambiguous_sources.contains(&t.source.to_lowercase())
            })
            .map(|t| t.symbol.clone())
            .collect();

        let mut eligible = BTreeSet::new();
        for gap in compute_delta_gaps(transactions, holdings) {
            if !candidates.contains(&gap.symbol) {
                continue;
            }
            if gap.gap().abs() <= tolerance {
                tracing::debug!(symbol = %gap.symbol, delta = %gap.visible_net_delta, "short inference enabled");
                eligible.insert(gap.symbol);
            } else {
                tracing::debug!(
                    symbol = %gap.symbol,
                    gap = %gap.gap(),
                    "short inference disabled: visible flow does not explain holdings"
                );
            }
        }

        Self {
            ambiguous_sources,
            eligible,
        }
    }

    /// Whether an unmatched SELL residual of `txn` may open a SHORT (and, for a
    /// BUY, whether it may cover open shorts first).
    pub fn allows_inference(&self, txn: &Transaction) -> bool {
        txn.origin == Origin::Real
            && matches!(txn.txn_type, TxnType::Buy | TxnType::Sell)
            && self.eligible.contains(&txn.symbol)
            && self.ambiguous_sources.contains(&txn.source.to_lowercase())
    }

    pub fn is_eligible(&self, symbol: &Symbol) -> bool {
        self.eligible.contains(symbol)
    }

    pub fn eligible_symbols(&self) -> impl Iterator<Item = &Symbol> {
        self.eligible.iter()
    }
}

/// Gap report for every symbol seen in transactions or holdings, in symbol order.
pub fn compute_delta_gaps(transactions: &[Transaction], holdings: &[Holding]) -> Vec<DeltaGap> {
    let mut visible: BTreeMap<Symbol, Decimal> = BTreeMap::new();
    for txn in transactions {
        *visible.entry(txn.symbol.clone()).or_insert_with(Decimal::zero) += txn.signed_quantity();
    }

    let mut held: BTreeMap<Symbol, Decimal> = BTreeMap::new();
    for holding in holdings {
        *held.entry(holding.symbol.clone()).or_insert_with(Decimal::zero) += holding.quantity;
    }

    let symbols: BTreeSet<&Symbol> = visible.keys().chain(held.keys()).collect();
    symbols
        .into_iter()
        .map(|symbol| DeltaGap {
            symbol: symbol.clone(),
            visible_net_delta: visible.get(symbol).copied().unwrap_or_else(Decimal::zero),
            current_holdings: held.get(symbol).copied().unwrap_or_else(Decimal::zero),
        })
        .collect()
}
