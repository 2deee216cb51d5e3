//! Position timeline reconstruction.
//!
//! Lot effects from the final matching pass are replayed per key. Wherever the
//! replay cannot reach what the broker reports today, a synthetic entry is
//! dated one day before the symbol's first visible activity so that positions
//! never go negative along the way.

use super::fifo::MatchOutput;
use super::quantity_epsilon;
use crate::domain::{
    day_before, Decimal, Direction, Holding, LotKey, Origin, Symbol, Transaction, WarningCategory,
    WarningLog,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// A fabricated opening inserted to explain holdings or unmatched exits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyntheticEntry {
    pub key: LotKey,
    pub date: NaiveDate,
    pub quantity: Decimal,
    /// Either [`Origin::SyntheticCurrentPosition`] or [`Origin::SyntheticIncompleteTrade`].
    pub origin: Origin,
    /// Quantity-weighted exit price of the trades this entry stands in for.
    pub price_hint: Option<Decimal>,
}

/// One dated change in position size.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionTimelineEvent {
    pub date: NaiveDate,
    pub key: LotKey,
    /// + grows the position, − shrinks it.
    pub quantity_delta: Decimal,
    /// Trade price, or the price hint for synthetic entries (zero if unknown).
    pub price: Decimal,
    pub origin: Origin,
    pub seq: usize,
    pub reference: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionTimeline {
    /// Sorted by (date, origin rank, seq).
    pub events: Vec<PositionTimelineEvent>,
    pub synthetic_entries: Vec<SyntheticEntry>,
    /// Share of current positions reconstructed without a synthetic entry, 0–100.
    pub data_coverage_pct: Decimal,
}

impl PositionTimeline {
    /// Position size per key after all events dated on or before `date`.
    pub fn positions_at(&self, date: NaiveDate) -> BTreeMap<LotKey, Decimal> {
        let eps = quantity_epsilon();
        let mut out: BTreeMap<LotKey, Decimal> = BTreeMap::new();
        for event in self.events.iter().take_while(|e| e.date <= date) {
            *out.entry(event.key.clone()).or_insert_with(Decimal::zero) += event.quantity_delta;
        }
        out.retain(|_, qty| qty.abs() > eps);
        out
    }

    pub fn final_positions(&self) -> BTreeMap<LotKey, Decimal> {
        match self.events.last() {
            Some(last) => self.positions_at(last.date),
            None => BTreeMap::new(),
        }
    }

    /// Latest event price for `key` on or before `date`, ignoring zero hints.
    pub fn last_trade_price(&self, key: &LotKey, date: NaiveDate) -> Option<Decimal> {
        self.events
            .iter()
            .take_while(|e| e.date <= date)
            .filter(|e| &e.key == key && e.price.is_positive())
            .last()
            .map(|e| e.price)
    }

    pub fn has_short_positions(&self) -> bool {
        self.events
            .iter()
            .any(|e| e.key.direction == Direction::Short && e.quantity_delta.is_positive())
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.events.first().map(|e| e.date)
    }
}

/// Build the timeline from the final matching pass and current holdings.
pub fn build_timeline(
    transactions: &[Transaction],
    matched: &MatchOutput,
    holdings: &[Holding],
    inception: NaiveDate,
    warnings: &mut WarningLog,
) -> PositionTimeline {
    let eps = quantity_epsilon();

    let mut earliest: BTreeMap<&Symbol, NaiveDate> = BTreeMap::new();
    for txn in transactions {
        earliest
            .entry(&txn.symbol)
            .and_modify(|d| *d = (*d).min(txn.date))
            .or_insert(txn.date);
    }

    let mut visible: BTreeMap<LotKey, Decimal> = BTreeMap::new();
    let mut events: Vec<PositionTimelineEvent> = matched
        .effects
        .iter()
        .map(|effect| {
            *visible.entry(effect.key.clone()).or_insert_with(Decimal::zero) += effect.size_delta();
            PositionTimelineEvent {
                date: effect.date,
                key: effect.key.clone(),
                quantity_delta: effect.size_delta(),
                price: effect.price,
                origin: effect.origin,
                seq: effect.seq,
                reference: effect.transaction_id.clone(),
            }
        })
        .collect();

    let mut held: BTreeMap<LotKey, Decimal> = BTreeMap::new();
    for holding in holdings.iter().filter(|h| h.abs_quantity() > eps) {
        let key = LotKey::new(holding.symbol.clone(), holding.currency.clone(), holding.direction());
        *held.entry(key).or_insert_with(Decimal::zero) += holding.abs_quantity();
    }

    let mut synthetic_entries = Vec::new();
    let mut covered: BTreeSet<LotKey> = BTreeSet::new();

    for (key, held_qty) in &held {
        let seen = visible.get(key).copied().unwrap_or_else(Decimal::zero);
        let missing = *held_qty - seen;
        if missing > eps {
            let anchor = earliest.get(&key.symbol).copied().unwrap_or(inception);
            synthetic_entries.push(SyntheticEntry {
                key: key.clone(),
                date: day_before(anchor),
                quantity: missing,
                origin: Origin::SyntheticCurrentPosition,
                price_hint: None,
            });
            covered.insert(key.clone());
        } else if missing < -eps {
            warnings.low(
                WarningCategory::Timeline,
                format!(
                    "{}: transactions imply {} more than the broker reports",
                    key,
                    (-missing).round_dp(6)
                ),
            );
        }
    }

    for (key, seen) in &visible {
        if !held.contains_key(key) && *seen > eps {
            warnings.low(
                WarningCategory::Timeline,
                format!("{}: transactions leave {} open but nothing is held", key, seen.round_dp(6)),
            );
        }
    }

    // One aggregated entry per key for exits that never found an entry.
    let mut incomplete: BTreeMap<LotKey, (Decimal, Decimal, NaiveDate)> = BTreeMap::new();
    for trade in &matched.incomplete_trades {
        let slot = incomplete
            .entry(trade.key())
            .or_insert((Decimal::zero(), Decimal::zero(), trade.exit_date));
        slot.0 += trade.quantity;
        slot.1 += trade.quantity * trade.exit_price;
        slot.2 = slot.2.min(trade.exit_date);
    }
    for (key, (quantity, notional, first_exit)) in incomplete {
        if covered.contains(&key) || quantity <= eps {
            continue;
        }
        synthetic_entries.push(SyntheticEntry {
            key,
            date: day_before(first_exit),
            quantity,
            origin: Origin::SyntheticIncompleteTrade,
            price_hint: notional.checked_div(quantity),
        });
    }

    let base_seq = events.len();
    for (i, entry) in synthetic_entries.iter().enumerate() {
        events.push(PositionTimelineEvent {
            date: entry.date,
            key: entry.key.clone(),
            quantity_delta: entry.quantity,
            price: entry.price_hint.unwrap_or_else(Decimal::zero),
            origin: entry.origin,
            seq: base_seq + i,
            reference: synthetic_reference(entry),
        });
    }
    events.sort_by(|a, b| {
        (a.date, a.origin.rank(), a.seq).cmp(&(b.date, b.origin.rank(), b.seq))
    });

    let current_positions = held.len();
    let data_coverage_pct = if current_positions == 0 {
        Decimal::hundred()
    } else {
        let complete = Decimal::from_i64((current_positions - covered.len()) as i64);
        (complete * Decimal::hundred())
            .checked_div(Decimal::from_i64(current_positions as i64))
            .unwrap_or_else(Decimal::hundred)
    };

    tracing::info!(
        events = events.len(),
        synthetic = synthetic_entries.len(),
        coverage = %data_coverage_pct.round_dp(2),
        "position timeline built"
    );

    PositionTimeline {
        events,
        synthetic_entries,
        data_coverage_pct,
    }
}

pub fn synthetic_reference(entry: &SyntheticEntry) -> String {
    format!(
        "{}_{}_{}_{}",
        entry.origin,
        entry.key.symbol,
        entry.key.currency,
        entry.key.direction.to_string().to_lowercase()
    )
}
