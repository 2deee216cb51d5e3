//! Stable transaction ordering for deterministic processing.

use crate::domain::Transaction;
use chrono::NaiveDate;

/// Stable ordering key for transactions.
///
/// Ordering: date -> origin rank -> insertion sequence. Fabricated openings
/// (seeded, synthetic, backfill) sort ahead of provider rows on the same date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct TransactionOrderingKey {
    pub date: NaiveDate,
    pub origin_rank: u8,
    pub seq: usize,
}

impl TransactionOrderingKey {
    pub fn from_transaction(txn: &Transaction, seq: usize) -> Self {
        TransactionOrderingKey {
            date: txn.date,
            origin_rank: txn.origin.rank(),
            seq,
        }
    }
}

/// Sort transactions deterministically, using the current position as the
/// insertion sequence.
pub fn sort_transactions_deterministic(txns: Vec<Transaction>) -> Vec<Transaction> {
    let mut keyed: Vec<(TransactionOrderingKey, Transaction)> = txns
        .into_iter()
        .enumerate()
        .map(|(seq, txn)| (TransactionOrderingKey::from_transaction(&txn, seq), txn))
        .collect();
    keyed.sort_by(|a, b| a.0.cmp(&b.0));
    keyed.into_iter().map(|(_, txn)| txn).collect()
}

/// Index of the first transaction dated before its predecessor, if any.
pub fn first_out_of_order(txns: &[Transaction]) -> Option<usize> {
    txns.windows(2)
        .position(|pair| pair[1].date < pair[0].date)
        .map(|i| i + 1)
}
