//! Snapshot directory loader used by the binary.
//!
//! Layout:
//! - `transactions.csv` with header `type,symbol,date,quantity,price,fee,currency,source,transaction_id`
//! - `holdings.json`: array of holdings
//! - `market.json`: `{"prices": {SYM: [[date, px], ...]}, "fx": {CCY: [[date, rate], ...]}}`
//! - `income.json` (optional): array of income events
//! - `backfill.json` (optional) unless an explicit backfill path is given

use super::InMemoryMarketData;
use crate::backfill::{load_backfill, BackfillError, BackfillRecord};
use crate::domain::{CurrencyCode, Decimal, Holding, IncomeEvent, Symbol, Transaction, TxnType};
use chrono::NaiveDate;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const TRANSACTIONS_FILE: &str = "transactions.csv";
pub const HOLDINGS_FILE: &str = "holdings.json";
pub const MARKET_FILE: &str = "market.json";
pub const INCOME_FILE: &str = "income.json";
pub const DEFAULT_BACKFILL_FILE: &str = "backfill.json";

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("csv parse error in {file} row {row}: {reason}")]
    Csv { file: String, row: usize, reason: String },
    #[error("json parse error in {file}: {source}")]
    Json {
        file: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("Invalid market data in {file}: {reason}")]
    Market { file: String, reason: String },
    #[error(transparent)]
    Backfill(#[from] BackfillError),
}

/// Everything one analysis needs, as read from disk.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub transactions: Vec<Transaction>,
    pub holdings: Vec<Holding>,
    pub income: Vec<IncomeEvent>,
    pub backfill: Vec<BackfillRecord>,
    pub market: InMemoryMarketData,
}

#[derive(Debug, Clone)]
pub struct SnapshotLoader {
    dir: PathBuf,
    backfill_path: Option<PathBuf>,
}

impl SnapshotLoader {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            backfill_path: None,
        }
    }

    pub fn with_backfill_path(mut self, path: Option<PathBuf>) -> Self {
        self.backfill_path = path;
        self
    }

    pub fn load(&self) -> Result<Snapshot, LoadError> {
        let transactions = parse_transactions_csv(&read(&self.dir.join(TRANSACTIONS_FILE))?.into_bytes())?;
        let holdings: Vec<Holding> = parse_json(&self.dir.join(HOLDINGS_FILE))?;
        let market = parse_market(&self.dir.join(MARKET_FILE))?;

        let income_path = self.dir.join(INCOME_FILE);
        let income: Vec<IncomeEvent> = if income_path.exists() {
            parse_json(&income_path)?
        } else {
            Vec::new()
        };

        let backfill_path = self
            .backfill_path
            .clone()
            .or_else(|| Some(self.dir.join(DEFAULT_BACKFILL_FILE)).filter(|p| p.exists()));
        let backfill = match backfill_path {
            Some(path) => load_backfill(&path)?,
            None => Vec::new(),
        };

        tracing::info!(
            dir = %self.dir.display(),
            transactions = transactions.len(),
            holdings = holdings.len(),
            income = income.len(),
            backfill = backfill.len(),
            "snapshot loaded"
        );

        Ok(Snapshot {
            transactions,
            holdings,
            income,
            backfill,
            market,
        })
    }
}

fn read(path: &Path) -> Result<String, LoadError> {
    std::fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.display().to_string(),
        source,
    })
}

fn parse_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, LoadError> {
    serde_json::from_str(&read(path)?).map_err(|source| LoadError::Json {
        file: path.display().to_string(),
        source,
    })
}

/// Parse normalized transactions. Amounts are read as strings to keep them lossless.
pub fn parse_transactions_csv(csv_bytes: &[u8]) -> Result<Vec<Transaction>, LoadError> {
    #[derive(Debug, Deserialize)]
    struct Row {
        #[serde(rename = "type")]
        txn_type: String,
        symbol: String,
        date: String,
        quantity: String,
        price: String,
        #[serde(default)]
        fee: String,
        currency: String,
        #[serde(default)]
        source: String,
        #[serde(default)]
        transaction_id: String,
    }

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(csv_bytes);

    let mut transactions = Vec::new();
    for (i, record) in reader.deserialize::<Row>().enumerate() {
        let row_no = i + 1;
        let fail = |reason: String| LoadError::Csv {
            file: TRANSACTIONS_FILE.to_string(),
            row: row_no,
            reason,
        };
        let row = record.map_err(|e| fail(e.to_string()))?;

        let txn_type: TxnType = row.txn_type.parse().map_err(|e| fail(format!("{}", e)))?;
        let date = NaiveDate::parse_from_str(&row.date, "%Y-%m-%d")
            .map_err(|e| fail(format!("invalid date {:?}: {}", row.date, e)))?;
        let quantity = Decimal::from_str_canonical(&row.quantity)
            .map_err(|e| fail(format!("invalid quantity: {}", e)))?;
        let price = Decimal::from_str_canonical(&row.price)
            .map_err(|e| fail(format!("invalid price: {}", e)))?;
        let fee = if row.fee.is_empty() {
            Decimal::zero()
        } else {
            Decimal::from_str_canonical(&row.fee).map_err(|e| fail(format!("invalid fee: {}", e)))?
        };
        let currency = CurrencyCode::parse(&row.currency).map_err(|e| fail(e.to_string()))?;

        transactions.push(Transaction::new(
            txn_type,
            Symbol::new(&row.symbol),
            date,
            quantity,
            price,
            fee,
            currency,
            row.source.to_lowercase(),
            row.transaction_id,
        ));
    }

    Ok(transactions)
}

fn parse_market(path: &Path) -> Result<InMemoryMarketData, LoadError> {
    #[derive(Debug, Deserialize)]
    #[serde(deny_unknown_fields)]
    struct RawMarket {
        #[serde(default)]
        prices: BTreeMap<String, Vec<(NaiveDate, Decimal)>>,
        #[serde(default)]
        fx: BTreeMap<String, Vec<(NaiveDate, Decimal)>>,
    }

    let raw: RawMarket = parse_json(path)?;
    let file = path.display().to_string();
    let mut market = InMemoryMarketData::new();

    for (symbol, series) in raw.prices {
        let symbol = Symbol::new(&symbol);
        for (date, price) in series {
            if price.is_negative() {
                return Err(LoadError::Market {
                    file,
                    reason: format!("negative price for {} on {}", symbol, date),
                });
            }
            market.add_price(symbol.clone(), date, price);
        }
    }
    for (code, series) in raw.fx {
        let currency = CurrencyCode::parse(&code).map_err(|e| LoadError::Market {
            file: file.clone(),
            reason: e.to_string(),
        })?;
        for (date, rate) in series {
            if !rate.is_positive() {
                return Err(LoadError::Market {
                    file,
                    reason: format!("non-positive FX rate for {} on {}", currency, date),
                });
            }
            market.add_fx_rate(currency.clone(), date, rate);
        }
    }
    Ok(market)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasource::{FxSource, PriceSource};
    use std::fs;

    const CSV: &str = "type,symbol,date,quantity,price,fee,currency,source,transaction_id\n\
        BUY,aapl,2024-01-02,10,180.50,1,usd,IBKR,t1\n\
        sell, AAPL ,2024-02-01,4,190,,USD,ibkr,\n";

    #[test]
    fn test_parse_transactions_csv() {
        let txns = parse_transactions_csv(CSV.as_bytes()).unwrap();
        assert_eq!(txns.len(), 2);
        assert_eq!(txns[0].txn_type, TxnType::Buy);
        assert_eq!(txns[0].symbol.as_str(), "AAPL");
        assert_eq!(txns[0].price, Decimal::from_str_canonical("180.50").unwrap());
        assert_eq!(txns[0].source, "ibkr");
        assert_eq!(txns[1].fee, Decimal::zero());
        assert!(txns[1].transaction_id.starts_with("hash:"));
    }

    #[test]
    fn test_bad_row_reports_row_number() {
        let csv = "type,symbol,date,quantity,price,fee,currency,source,transaction_id\n\
            BUY,AAPL,2024-01-02,10,1,0,USD,ibkr,t1\n\
            HOLD,AAPL,2024-01-03,10,1,0,USD,ibkr,t2\n";
        match parse_transactions_csv(csv.as_bytes()) {
            Err(LoadError::Csv { row, .. }) => assert_eq!(row, 2),
            other => panic!("Expected Csv error, got {:?}", other),
        }
    }

    #[test]
    fn test_load_snapshot_directory() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(TRANSACTIONS_FILE), CSV).unwrap();
        fs::write(
            dir.path().join(HOLDINGS_FILE),
            r#"[{"symbol":"AAPL","quantity":6,"currency":"USD","cost_basis":1083}]"#,
        )
        .unwrap();
        fs::write(
            dir.path().join(MARKET_FILE),
            r#"{"prices":{"AAPL":[["2024-01-31",185.0]]},"fx":{"GBP":[["2024-01-01",1.27]]}}"#,
        )
        .unwrap();
        fs::write(
            dir.path().join(DEFAULT_BACKFILL_FILE),
            r#"[{"symbol":"MSFT","direction":"LONG","manual_entry_date":"2023-01-05",
                "manual_entry_price":240,"source":"statement","quantity":2}]"#,
        )
        .unwrap();

        let snapshot = SnapshotLoader::new(dir.path()).load().unwrap();
        assert_eq!(snapshot.transactions.len(), 2);
        assert_eq!(snapshot.holdings[0].quantity, Decimal::from_i64(6));
        assert!(snapshot.income.is_empty());
        assert_eq!(snapshot.backfill.len(), 1);

        let price = snapshot
            .market
            .price_at_or_before(&Symbol::new("AAPL"), NaiveDate::from_ymd_opt(2024, 2, 15).unwrap())
            .unwrap();
        assert_eq!(price.price, Decimal::from_i64(185));
        assert!(snapshot
            .market
            .rate_at(&CurrencyCode::parse("GBP").unwrap(), NaiveDate::from_ymd_opt(2024, 3, 1).unwrap())
            .is_some());
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = SnapshotLoader::new(dir.path()).load().unwrap_err();
        assert!(matches!(err, LoadError::Io { .. }));
    }
}
