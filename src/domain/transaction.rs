//! Normalized transaction record.

use crate::domain::{CurrencyCode, Decimal, Direction, Origin, Symbol, TxnType};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A single normalized BUY/SELL/SHORT/COVER record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    #[serde(rename = "type")]
    pub txn_type: TxnType,
    pub symbol: Symbol,
    pub date: NaiveDate,
    /// Always positive; the type carries the sign.
    pub quantity: Decimal,
    pub price: Decimal,
    pub fee: Decimal,
    pub currency: CurrencyCode,
    /// Provider tag (e.g., "schwab", "plaid") or a synthetic/backfill tag.
    pub source: String,
    /// Provider id, or a stable hash when the provider supplied none.
    pub transaction_id: String,
    pub origin: Origin,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransactionError {
    #[error("transaction {id}: quantity must be positive, got {quantity}")]
    NonPositiveQuantity { id: String, quantity: Decimal },
    #[error("transaction {id}: price must be non-negative, got {price}")]
    NegativePrice { id: String, price: Decimal },
    #[error("transaction {id}: fee must be non-negative, got {fee}")]
    NegativeFee { id: String, fee: Decimal },
    #[error("transaction {id}: symbol is empty")]
    EmptySymbol { id: String },
}

impl Transaction {
    /// Create a provider-sourced transaction.
    ///
    /// An empty `transaction_id` is replaced by a hash of the deterministic fields.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        txn_type: TxnType,
        symbol: Symbol,
        date: NaiveDate,
        quantity: Decimal,
        price: Decimal,
        fee: Decimal,
        currency: CurrencyCode,
        source: impl Into<String>,
        transaction_id: impl Into<String>,
    ) -> Self {
        let source = source.into();
        let transaction_id = transaction_id.into().trim().to_string();
        let transaction_id = if transaction_id.is_empty() {
            Self::compute_transaction_key(
                txn_type, &symbol, date, &quantity, &price, &fee, &currency, &source,
            )
        } else {
            transaction_id
        };
        Transaction {
            txn_type,
            symbol,
            date,
            quantity,
            price,
            fee,
            currency,
            source,
            transaction_id,
            origin: Origin::Real,
        }
    }

    /// Whether this row survives a case-insensitive source filter.
    pub fn matches_source(&self, filter: Option<&str>) -> bool {
        filter.map_or(true, |f| self.source.eq_ignore_ascii_case(f))
    }

    /// Re-tag the provenance of this transaction.
    pub fn with_origin(mut self, origin: Origin) -> Self {
        self.origin = origin;
        self
    }

    /// Stable key for rows without a provider id.
    #[allow(clippy::too_many_arguments)]
    pub fn compute_transaction_key(
        txn_type: TxnType,
        symbol: &Symbol,
        date: NaiveDate,
        quantity: &Decimal,
        price: &Decimal,
        fee: &Decimal,
        currency: &CurrencyCode,
        source: &str,
    ) -> String {
        use sha2::{Digest, Sha256};

        fn hash_var(hasher: &mut Sha256, data: &str) {
            hasher.update((data.len() as u32).to_le_bytes());
            hasher.update(data.as_bytes());
        }

        let mut hasher = Sha256::new();
        hash_var(&mut hasher, &txn_type.to_string());
        hash_var(&mut hasher, symbol.as_str());
        hash_var(&mut hasher, &date.to_string());
        hash_var(&mut hasher, &quantity.to_canonical_string());
        hash_var(&mut hasher, &price.to_canonical_string());
        hash_var(&mut hasher, &fee.to_canonical_string());
        hash_var(&mut hasher, currency.as_str());
        hash_var(&mut hasher, source);
        let hash = hasher.finalize();
        format!("hash:{}", hex::encode(&hash[..16]))
    }

    /// Structural validation; failures abort the analysis.
    pub fn validate(&self) -> Result<(), TransactionError> {
        if self.symbol.is_empty() {
            return Err(TransactionError::EmptySymbol {
                id: self.transaction_id.clone(),
            });
        }
        if !self.quantity.is_positive() {
            return Err(TransactionError::NonPositiveQuantity {
                id: self.transaction_id.clone(),
                quantity: self.quantity,
            });
        }
        if self.price.is_negative() {
            return Err(TransactionError::NegativePrice {
                id: self.transaction_id.clone(),
                price: self.price,
            });
        }
        if self.fee.is_negative() {
            return Err(TransactionError::NegativeFee {
                id: self.transaction_id.clone(),
                fee: self.fee,
            });
        }
        Ok(())
    }

    pub fn direction(&self) -> Direction {
        self.txn_type.direction()
    }

    /// Gross notional `quantity * price`.
    pub fn notional(&self) -> Decimal {
        self.quantity * self.price
    }

    /// Signed share flow into the account (+ for BUY/COVER).
    pub fn signed_quantity(&self) -> Decimal {
        if self.txn_type.share_sign() > 0 {
            self.quantity
        } else {
            -self.quantity
        }
    }
}
