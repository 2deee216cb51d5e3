//! Operator-curated entry prices for exits the providers never explained.
//!
//! A backfill file is either a bare JSON array of records or an object with an
//! `entries` array. Each record becomes an entry transaction tagged
//! [`Origin::Backfill`] with a deterministic id, so re-running with the same
//! file never duplicates a lot.
//!
//! `quantity` is optional. Without it the entry takes the unmatched quantity
//! of its exit: the linked `exit_transaction_id`, or else the earliest
//! unclaimed unmatched exit on the record's symbol and direction.

use crate::domain::{
    CurrencyCode, Decimal, Direction, IncompleteTrade, Origin, Symbol, Transaction, TxnType,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::Path;
use thiserror::Error;

pub mod diagnostics;

pub use diagnostics::backfill_diagnostics;

pub const BACKFILL_SOURCE_PREFIX: &str = "backfill_";

#[derive(Debug, Error)]
pub enum BackfillError {
    #[error("Failed to read backfill file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Backfill JSON is malformed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Backfill document must be an array or an object with an `entries` array")]
    Shape,
    #[error("Backfill entry {index}: {reason}")]
    Schema { index: usize, reason: String },
}

/// One curated entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BackfillRecord {
    pub symbol: Symbol,
    pub direction: Direction,
    pub manual_entry_date: NaiveDate,
    pub manual_entry_price: Decimal,
    #[serde(default)]
    pub manual_entry_fee: Decimal,
    /// Who supplied the price, e.g. `broker_statement`.
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity: Option<Decimal>,
    #[serde(default)]
    pub currency: Option<CurrencyCode>,
    /// The unmatched exit this entry explains, when known.
    #[serde(default, alias = "transaction_id")]
    pub exit_transaction_id: Option<String>,
    #[serde(default)]
    pub exit_date: Option<NaiveDate>,
    #[serde(default)]
    pub exit_price: Option<Decimal>,
}

impl BackfillRecord {
    fn validate(&self, index: usize) -> Result<(), BackfillError> {
        let fail = |reason: String| Err(BackfillError::Schema { index, reason });
        if self.symbol.is_empty() {
            return fail("symbol is empty".to_string());
        }
        if self.source.trim().is_empty() {
            return fail("source is empty".to_string());
        }
        if let Some(quantity) = self.quantity {
            if !quantity.is_positive() {
                return fail(format!("quantity must be positive, got {}", quantity));
            }
        }
        if !self.manual_entry_price.is_positive() {
            return fail(format!(
                "manual_entry_price must be positive, got {}",
                self.manual_entry_price
            ));
        }
        if self.manual_entry_fee.is_negative() {
            return fail(format!("manual_entry_fee must be non-negative, got {}", self.manual_entry_fee));
        }
        if let Some(exit_date) = self.exit_date {
            if exit_date < self.manual_entry_date {
                return fail(format!(
                    "manual_entry_date {} is after exit_date {}",
                    self.manual_entry_date, exit_date
                ));
            }
        }
        Ok(())
    }

    fn linked_exit(&self) -> Option<&str> {
        self.exit_transaction_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }

    /// Deterministic id of the injected entry transaction.
    pub fn entry_transaction_id(&self, index: usize) -> String {
        let source = normalized_source(&self.source);
        match self.linked_exit() {
            Some(exit_id) => {
                format!("backfill_{}_entry_for_{}", source, exit_id)
            }
            _ => {
                use sha2::{Digest, Sha256};

                let mut hasher = Sha256::new();
                for part in [
                    self.symbol.as_str().to_string(),
                    self.manual_entry_date.to_string(),
                    self.direction.to_string(),
                    self.quantity.map(|q| q.to_canonical_string()).unwrap_or_default(),
                    self.manual_entry_price.to_canonical_string(),
                    index.to_string(),
                ] {
                    hasher.update((part.len() as u32).to_le_bytes());
                    hasher.update(part.as_bytes());
                }
                let hash = hasher.finalize();
                format!("backfill_{}_entry_{}", source, hex::encode(&hash[..8]))
            }
        }
    }
}

fn normalized_source(source: &str) -> String {
    source.trim().to_lowercase().replace(char::is_whitespace, "_")
}

/// Parse and validate a backfill document.
pub fn parse_backfill(json: &str) -> Result<Vec<BackfillRecord>, BackfillError> {
    let value: serde_json::Value = serde_json::from_str(json)?;
    let entries = match value {
        serde_json::Value::Array(items) => items,
        serde_json::Value::Object(mut map) => match map.remove("entries") {
            Some(serde_json::Value::Array(items)) if map.is_empty() => items,
            _ => return Err(BackfillError::Shape),
        },
        _ => return Err(BackfillError::Shape),
    };

    let records = entries
        .into_iter()
        .enumerate()
        .map(|(index, item)| {
            serde_json::from_value::<BackfillRecord>(item).map_err(|e| BackfillError::Schema {
                index,
                reason: e.to_string(),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    validate_records(&records)?;
    Ok(records)
}

pub fn load_backfill(path: &Path) -> Result<Vec<BackfillRecord>, BackfillError> {
    let json = std::fs::read_to_string(path).map_err(|source| BackfillError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let records = parse_backfill(&json)?;
    tracing::info!(path = %path.display(), entries = records.len(), "loaded backfill file");
    Ok(records)
}

pub fn validate_records(records: &[BackfillRecord]) -> Result<(), BackfillError> {
    records
        .iter()
        .enumerate()
        .try_for_each(|(index, record)| record.validate(index))
}

/// What injection needs to know about the provider history.
#[derive(Debug, Clone, Copy)]
pub struct InjectionContext<'a> {
    /// Provider rows before any source filter; linked exits are looked up here.
    pub transactions: &'a [Transaction],
    /// Exits a provider-only matching pass could not explain.
    pub unmatched_exits: &'a [IncompleteTrade],
    pub source_filter: Option<&'a str>,
    pub reporting_currency: &'a CurrencyCode,
}

/// Turn records into entry transactions.
///
/// Records whose id already exists among the rows passing the source filter
/// are skipped. With a `source_filter`, a record linked to an exit from
/// another source is dropped. A record with no quantity and no resolvable
/// exit is a schema error.
pub fn inject_backfill(
    records: &[BackfillRecord],
    ctx: &InjectionContext<'_>,
) -> Result<Vec<Transaction>, BackfillError> {
    let by_id: HashMap<&str, &Transaction> = ctx
        .transactions
        .iter()
        .map(|t| (t.transaction_id.as_str(), t))
        .collect();
    let mut seen: HashSet<String> = ctx
        .transactions
        .iter()
        .filter(|t| t.matches_source(ctx.source_filter))
        .map(|t| t.transaction_id.clone())
        .collect();
    let mut claimed: BTreeSet<String> = records
        .iter()
        .filter_map(|r| r.linked_exit().map(str::to_string))
        .collect();
    let mut out = Vec::new();

    for (index, record) in records.iter().enumerate() {
        let linked = record.linked_exit().and_then(|id| by_id.get(id).copied());
        if let Some(exit) = linked {
            if !exit.matches_source(ctx.source_filter) {
                tracing::debug!(exit = %exit.transaction_id, "backfill exit outside source filter");
                continue;
            }
        }

        let record = resolve_quantity(record, index, linked, ctx.unmatched_exits, &mut claimed)?;
        let exit = linked.or_else(|| record.linked_exit().and_then(|id| by_id.get(id).copied()));
        let Some(quantity) = record.quantity else {
            continue;
        };

        let id = record.entry_transaction_id(index);
        if !seen.insert(id.clone()) {
            tracing::debug!(id = %id, "backfill entry already present");
            continue;
        }

        let currency = record
            .currency
            .clone()
            .or_else(|| exit.map(|t| t.currency.clone()))
            .unwrap_or_else(|| ctx.reporting_currency.clone());

        out.push(
            Transaction::new(
                TxnType::entry_for(record.direction),
                record.symbol.clone(),
                record.manual_entry_date,
                quantity,
                record.manual_entry_price,
                record.manual_entry_fee,
                currency,
                format!("{}{}", BACKFILL_SOURCE_PREFIX, normalized_source(&record.source)),
                id,
            )
            .with_origin(Origin::Backfill),
        );
    }

    tracing::info!(injected = out.len(), records = records.len(), "backfill injected");
    Ok(out)
}

/// Fill in a missing quantity (and exit link) from the exit it explains.
fn resolve_quantity(
    record: &BackfillRecord,
    index: usize,
    linked: Option<&Transaction>,
    unmatched: &[IncompleteTrade],
    claimed: &mut BTreeSet<String>,
) -> Result<BackfillRecord, BackfillError> {
    if record.quantity.is_some() {
        return Ok(record.clone());
    }
    let unmatched_quantity = |exit_id: &str| -> Decimal {
        unmatched
            .iter()
            .filter(|u| u.exit_transaction_id == exit_id)
            .map(|u| u.quantity)
            .sum()
    };
    let mut resolved = record.clone();

    if let Some(exit_id) = record.linked_exit() {
        let residual = unmatched_quantity(exit_id);
        resolved.quantity = if residual.is_positive() {
            Some(residual)
        } else {
            linked.map(|t| t.quantity)
        };
        if resolved.quantity.is_none() {
            return Err(BackfillError::Schema {
                index,
                reason: format!("quantity missing and exit {} not found", exit_id),
            });
        }
        return Ok(resolved);
    }

    let candidate = unmatched.iter().find(|u| {
        u.symbol == record.symbol
            && u.direction == record.direction
            && u.exit_date >= record.manual_entry_date
            && !claimed.contains(&u.exit_transaction_id)
    });
    match candidate {
        Some(exit) => {
            claimed.insert(exit.exit_transaction_id.clone());
            resolved.quantity = Some(unmatched_quantity(&exit.exit_transaction_id));
            resolved.exit_transaction_id = Some(exit.exit_transaction_id.clone());
            Ok(resolved)
        }
        None => Err(BackfillError::Schema {
            index,
            reason: format!(
                "quantity missing and no unmatched {} {} exit on or after {}",
                record.symbol, record.direction, record.manual_entry_date
            ),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    const DOC: &str = r#"{
        "entries": [
            {
                "symbol": "aapl",
                "direction": "LONG",
                "manual_entry_date": "2023-06-01",
                "manual_entry_price": 150.25,
                "source": "broker_statement",
                "quantity": 10,
                "exit_transaction_id": "plaid-s1"
            },
            {
                "symbol": "TSLA",
                "direction": "short",
                "manual_entry_date": "2023-07-01",
                "manual_entry_price": 250,
                "manual_entry_fee": 1.5,
                "source": "Manual",
                "quantity": 4,
                "currency": "EUR"
            }
        ]
    }"#;

    fn exit_txn() -> Transaction {
        Transaction::new(
            TxnType::Sell,
            Symbol::new("AAPL"),
            date("2024-02-01"),
            Decimal::from_i64(10),
            Decimal::from_i64(180),
            Decimal::zero(),
            CurrencyCode::parse("GBP").unwrap(),
            "plaid",
            "plaid-s1",
        )
    }

    #[test]
    fn test_parse_both_document_shapes() {
        let records = parse_backfill(DOC).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].symbol.as_str(), "AAPL");
        assert_eq!(records[1].direction, Direction::Short);

        let bare = serde_json::to_string(&records).unwrap();
        assert_eq!(parse_backfill(&bare).unwrap(), records);
    }

    #[test]
    fn test_unknown_field_is_schema_error() {
        let doc = r#"[{"symbol":"AAPL","direction":"LONG","manual_entry_date":"2023-06-01",
            "manual_entry_price":1,"source":"x","quantity":1,"price":3}]"#;
        let err = parse_backfill(doc).unwrap_err();
        assert!(matches!(err, BackfillError::Schema { index: 0, .. }));
    }

    #[test]
    fn test_invalid_values_rejected() {
        let doc = r#"[{"symbol":"AAPL","direction":"LONG","manual_entry_date":"2023-06-01",
            "manual_entry_price":0,"source":"x","quantity":1}]"#;
        assert!(matches!(
            parse_backfill(doc).unwrap_err(),
            BackfillError::Schema { index: 0, .. }
        ));
        assert!(matches!(parse_backfill(r#"{"rows": []}"#).unwrap_err(), BackfillError::Shape));
    }

    fn context<'a>(
        transactions: &'a [Transaction],
        unmatched: &'a [IncompleteTrade],
        filter: Option<&'a str>,
        reporting: &'a CurrencyCode,
    ) -> InjectionContext<'a> {
        InjectionContext {
            transactions,
            unmatched_exits: unmatched,
            source_filter: filter,
            reporting_currency: reporting,
        }
    }

    fn unmatched(exit: &Transaction, quantity: &str) -> IncompleteTrade {
        IncompleteTrade {
            symbol: exit.symbol.clone(),
            currency: exit.currency.clone(),
            direction: Direction::Long,
            exit_transaction_id: exit.transaction_id.clone(),
            exit_date: exit.date,
            quantity: Decimal::from_str_canonical(quantity).unwrap(),
            exit_price: exit.price,
            exit_fee: exit.fee,
            source: exit.source.clone(),
        }
    }

    #[test]
    fn test_inject_is_idempotent_and_inherits_currency() {
        let records = parse_backfill(DOC).unwrap();
        let existing = vec![exit_txn()];
        let usd = CurrencyCode::usd();

        let injected = inject_backfill(&records, &context(&existing, &[], None, &usd)).unwrap();
        assert_eq!(injected.len(), 2);
        assert_eq!(injected[0].transaction_id, "backfill_broker_statement_entry_for_plaid-s1");
        assert_eq!(injected[0].currency.as_str(), "GBP");
        assert_eq!(injected[0].origin, Origin::Backfill);
        assert_eq!(injected[0].source, "backfill_broker_statement");
        assert_eq!(injected[1].txn_type, TxnType::Short);
        assert_eq!(injected[1].currency.as_str(), "EUR");
        assert!(injected[1].transaction_id.starts_with("backfill_manual_entry_"));

        let mut all = existing.clone();
        all.extend(injected);
        assert!(inject_backfill(&records, &context(&all, &[], None, &usd))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_source_filter_drops_other_sources() {
        let records = parse_backfill(DOC).unwrap();
        let usd = CurrencyCode::usd();
        let rows = [exit_txn()];
        let injected = inject_backfill(&records, &context(&rows, &[], Some("ibkr"), &usd)).unwrap();
        // The plaid-linked row is filtered; the unlinked row stays.
        assert_eq!(injected.len(), 1);
        assert_eq!(injected[0].symbol.as_str(), "TSLA");
    }

    const NO_QUANTITY: &str = r#"[{
        "symbol": "AAPL",
        "direction": "LONG",
        "manual_entry_date": "2023-06-01",
        "manual_entry_price": 150,
        "manual_entry_fee": 0,
        "source": "broker_statement"
    }]"#;

    #[test]
    fn test_quantity_taken_from_unmatched_exit_on_same_key() {
        let records = parse_backfill(NO_QUANTITY).unwrap();
        assert_eq!(records[0].quantity, None);

        let usd = CurrencyCode::usd();
        let rows = [exit_txn()];
        let open = [unmatched(&rows[0], "7")];
        let injected = inject_backfill(&records, &context(&rows, &open, None, &usd)).unwrap();

        assert_eq!(injected.len(), 1);
        assert_eq!(injected[0].quantity, Decimal::from_i64(7));
        assert_eq!(injected[0].transaction_id, "backfill_broker_statement_entry_for_plaid-s1");
        assert_eq!(injected[0].currency.as_str(), "GBP");
    }

    #[test]
    fn test_quantity_taken_from_linked_exit() {
        let doc = r#"[{"symbol":"AAPL","direction":"LONG","manual_entry_date":"2023-06-01",
            "manual_entry_price":150,"source":"x","transaction_id":"plaid-s1"}]"#;
        let records = parse_backfill(doc).unwrap();
        let usd = CurrencyCode::usd();
        let rows = [exit_txn()];

        let injected = inject_backfill(&records, &context(&rows, &[], None, &usd)).unwrap();
        assert_eq!(injected[0].quantity, Decimal::from_i64(10));
    }

    #[test]
    fn test_quantity_without_any_exit_is_schema_error() {
        let records = parse_backfill(NO_QUANTITY).unwrap();
        let usd = CurrencyCode::usd();
        let err = inject_backfill(&records, &context(&[], &[], None, &usd)).unwrap_err();
        assert!(matches!(err, BackfillError::Schema { index: 0, .. }));
    }

    #[test]
    fn test_exit_excluded_by_source_filter_is_not_injected() {
        // The exit is known but belongs to a filtered-out provider.
        let records = parse_backfill(DOC).unwrap();
        let usd = CurrencyCode::usd();
        let rows = [exit_txn()];
        let injected = inject_backfill(&records[..1], &context(&rows, &[], Some("ibkr"), &usd)).unwrap();
        assert!(injected.is_empty());
    }
}
