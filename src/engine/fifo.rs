//! FIFO lot matching.
//!
//! Lots are queued per (symbol, currency, direction). Exits consume the oldest
//! lots first; fees are prorated on both legs so partial fills never double
//! count. An exit with no inventory left becomes an [`IncompleteTrade`] unless
//! the short-inference policy turns its residual into a SHORT.

use super::short_inference::ShortInferencePolicy;
use super::{quantity_epsilon, EffectType, LotEffect};
use crate::domain::{
    first_out_of_order, ClosedTrade, Decimal, Direction, IncompleteTrade, LotKey, OpenLot,
    Transaction, TxnType,
};
use crate::error::EngineError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};

/// Everything one matching pass produces.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchOutput {
    pub closed_trades: Vec<ClosedTrade>,
    /// Remaining lots in key order, oldest first within a key.
    pub open_lots: Vec<OpenLot>,
    pub incomplete_trades: Vec<IncompleteTrade>,
    pub effects: Vec<LotEffect>,
    /// Number of SELL residuals turned into inferred SHORT lots.
    pub inferred_shorts: usize,
}

impl MatchOutput {
    /// Net remaining quantity per key.
    pub fn open_quantity_by_key(&self) -> BTreeMap<LotKey, Decimal> {
        let mut out: BTreeMap<LotKey, Decimal> = BTreeMap::new();
        for lot in &self.open_lots {
            *out.entry(lot.key()).or_insert_with(Decimal::zero) += lot.remaining_quantity;
        }
        out
    }
}

/// Run FIFO matching over date-ordered transactions.
///
/// `seed_lots` are placed at the head of their queues before any transaction is
/// processed. Out-of-order input is rejected with [`EngineError::NonMonotonic`].
pub fn match_transactions(
    transactions: &[Transaction],
    policy: &ShortInferencePolicy,
    seed_lots: Option<&[OpenLot]>,
) -> Result<MatchOutput, EngineError> {
    if let Some(index) = first_out_of_order(transactions) {
        return Err(EngineError::NonMonotonic {
            index,
            transaction_id: transactions[index].transaction_id.clone(),
        });
    }

    let mut matcher = FifoMatcher::new();
    if let Some(seeds) = seed_lots {
        let mut seeds: Vec<&OpenLot> = seeds.iter().collect();
        seeds.sort_by(|a, b| a.entry_date.cmp(&b.entry_date));
        for lot in seeds {
            matcher.lots.entry(lot.key()).or_default().push_back(lot.clone());
        }
    }

    for (seq, txn) in transactions.iter().enumerate() {
        matcher.process(seq, txn, policy);
    }

    let output = matcher.finish();
    tracing::debug!(
        closed = output.closed_trades.len(),
        open = output.open_lots.len(),
        incomplete = output.incomplete_trades.len(),
        inferred_shorts = output.inferred_shorts,
        "FIFO pass complete"
    );
    Ok(output)
}

struct FifoMatcher {
    lots: BTreeMap<LotKey, VecDeque<OpenLot>>,

    // Outputs accumulated during processing.
    closed_trades: Vec<ClosedTrade>,
    incomplete_trades: Vec<IncompleteTrade>,
    effects: Vec<LotEffect>,
    inferred_shorts: usize,
}

impl FifoMatcher {
    fn new() -> Self {
        Self {
            lots: BTreeMap::new(),
            closed_trades: Vec::new(),
            incomplete_trades: Vec::new(),
            effects: Vec::new(),
            inferred_shorts: 0,
        }
    }

    fn process(&mut self, seq: usize, txn: &Transaction, policy: &ShortInferencePolicy) {
        let eps = quantity_epsilon();
        match txn.txn_type {
            TxnType::Buy => {
                let mut remaining = txn.quantity;
                if policy.allows_inference(txn) {
                    remaining = self.close_fifo(seq, txn, Direction::Short, remaining);
                }
                if remaining > eps {
                    self.open_lot(seq, txn, Direction::Long, remaining);
                }
            }
            TxnType::Short => self.open_lot(seq, txn, Direction::Short, txn.quantity),
            TxnType::Sell => {
                let residual = self.close_fifo(seq, txn, Direction::Long, txn.quantity);
                if residual > eps {
                    if policy.allows_inference(txn) {
                        self.inferred_shorts += 1;
                        tracing::debug!(id = %txn.transaction_id, qty = %residual, "SELL residual opened as inferred SHORT");
                        self.open_lot(seq, txn, Direction::Short, residual);
                    } else {
                        self.record_incomplete(seq, txn, Direction::Long, residual);
                    }
                }
            }
            TxnType::Cover => {
                let residual = self.close_fifo(seq, txn, Direction::Short, txn.quantity);
                if residual > eps {
                    self.record_incomplete(seq, txn, Direction::Short, residual);
                }
            }
        }
    }

    /// Portion of the transaction fee attributable to `quantity`.
    fn fee_share(txn: &Transaction, quantity: Decimal) -> Decimal {
        if quantity >= txn.quantity {
            return txn.fee;
        }
        (txn.fee * quantity)
            .checked_div(txn.quantity)
            .unwrap_or_else(Decimal::zero)
    }

    fn key_for(txn: &Transaction, direction: Direction) -> LotKey {
        LotKey::new(txn.symbol.clone(), txn.currency.clone(), direction)
    }

    fn open_lot(&mut self, seq: usize, txn: &Transaction, direction: Direction, quantity: Decimal) {
        let key = Self::key_for(txn, direction);
        self.lots.entry(key.clone()).or_default().push_back(OpenLot {
            symbol: txn.symbol.clone(),
            direction,
            entry_date: txn.date,
            entry_price: txn.price,
            entry_fee: Self::fee_share(txn, quantity),
            remaining_quantity: quantity,
            currency: txn.currency.clone(),
            origin_transaction_id: txn.transaction_id.clone(),
            origin: txn.origin,
        });
        self.push_effect(seq, txn, key, EffectType::Open, quantity);
    }

    /// Consume lots of `direction` oldest-first; returns the unmatched residual.
    fn close_fifo(
        &mut self,
        seq: usize,
        txn: &Transaction,
        direction: Direction,
        quantity: Decimal,
    ) -> Decimal {
        let eps = quantity_epsilon();
        let key = Self::key_for(txn, direction);
        let mut remaining = quantity;

        if let Some(queue) = self.lots.get_mut(&key) {
            while remaining > eps {
                let Some(lot) = queue.front_mut() else {
                    break;
                };
                let consumed = lot.remaining_quantity.min(remaining);
                let entry_fee = if consumed >= lot.remaining_quantity {
                    lot.entry_fee
                } else {
                    (lot.entry_fee * consumed)
                        .checked_div(lot.remaining_quantity)
                        .unwrap_or_else(Decimal::zero)
                };
                let exit_fee = Self::fee_share(txn, consumed);

                self.closed_trades.push(ClosedTrade {
                    symbol: lot.symbol.clone(),
                    currency: lot.currency.clone(),
                    direction,
                    entry_transaction_id: lot.origin_transaction_id.clone(),
                    exit_transaction_id: txn.transaction_id.clone(),
                    entry_date: lot.entry_date,
                    exit_date: txn.date,
                    quantity: consumed,
                    entry_price: lot.entry_price,
                    exit_price: txn.price,
                    entry_fee,
                    exit_fee,
                    pnl_dollars: ClosedTrade::compute_pnl(
                        direction,
                        consumed,
                        lot.entry_price,
                        txn.price,
                        entry_fee,
                        exit_fee,
                    ),
                    entry_origin: lot.origin,
                });

                lot.remaining_quantity -= consumed;
                lot.entry_fee -= entry_fee;
                remaining -= consumed;
                if lot.remaining_quantity <= eps {
                    queue.pop_front();
                }
            }
            if queue.is_empty() {
                self.lots.remove(&key);
            }
        }

        let matched = quantity - remaining;
        if matched > eps {
            self.push_effect(seq, txn, key, EffectType::Close, matched);
        }
        remaining
    }

    fn record_incomplete(&mut self, seq: usize, txn: &Transaction, direction: Direction, quantity: Decimal) {
        tracing::debug!(id = %txn.transaction_id, symbol = %txn.symbol, qty = %quantity, "exit without matching entry");
        self.incomplete_trades.push(IncompleteTrade {
            symbol: txn.symbol.clone(),
            currency: txn.currency.clone(),
            direction,
            exit_transaction_id: txn.transaction_id.clone(),
            exit_date: txn.date,
            quantity,
            exit_price: txn.price,
            exit_fee: Self::fee_share(txn, quantity),
            source: txn.source.clone(),
        });
        // The shares still left the account; the timeline must see them go.
        let key = Self::key_for(txn, direction);
        self.push_effect(seq, txn, key, EffectType::Close, quantity);
    }

    fn push_effect(
        &mut self,
        seq: usize,
        txn: &Transaction,
        key: LotKey,
        effect_type: EffectType,
        quantity: Decimal,
    ) {
        // Merge consecutive effects of one transaction on the same key.
        if let Some(last) = self.effects.last_mut() {
            if last.seq == seq && last.key == key && last.effect_type == effect_type {
                last.quantity += quantity;
                return;
            }
        }
        self.effects.push(LotEffect {
            seq,
            transaction_id: txn.transaction_id.clone(),
            date: txn.date,
            key,
            effect_type,
            quantity,
            price: txn.price,
            origin: txn.origin,
        });
    }

    fn finish(self) -> MatchOutput {
        let eps = quantity_epsilon();
        let open_lots = self
            .lots
            .into_values()
            .flatten()
            .filter(|lot| lot.remaining_quantity > eps)
            .collect();
        MatchOutput {
            closed_trades: self.closed_trades,
            open_lots,
            incomplete_trades: self.incomplete_trades,
            effects: self.effects,
            inferred_shorts: self.inferred_shorts,
        }
    }
}
