use crate::backfill::BackfillError;
use crate::domain::TransactionError;
use thiserror::Error;

/// Fatal analysis errors.
///
/// Only structurally invalid input ends up here; ordinary data gaps are reported
/// through the warning log instead.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Invalid transaction: {0}")]
    InvalidTransaction(#[from] TransactionError),
    #[error("Transactions out of date order at index {index} ({transaction_id})")]
    NonMonotonic { index: usize, transaction_id: String },
    #[error("Backfill error: {0}")]
    Backfill(#[from] BackfillError),
}
