//! Domain primitives: Symbol, CurrencyCode, TxnType, Direction, Origin.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Instrument ticker (e.g., "AAPL", "VOD.L").
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Symbol(pub String);

impl From<String> for Symbol {
    fn from(value: String) -> Self {
        Symbol::new(value)
    }
}

impl From<Symbol> for String {
    fn from(value: Symbol) -> Self {
        value.0
    }
}

impl Symbol {
    /// Create a Symbol, normalizing to trimmed upper case.
    pub fn new(symbol: impl AsRef<str>) -> Self {
        Symbol(symbol.as_ref().trim().to_ascii_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// ISO 4217 currency code, always three upper-case ASCII letters.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CurrencyCode(String);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid currency code: {0:?}")]
pub struct CurrencyParseError(pub String);

impl CurrencyCode {
    pub fn parse(code: &str) -> Result<Self, CurrencyParseError> {
        let code = code.trim().to_ascii_uppercase();
        if code.len() == 3 && code.chars().all(|c| c.is_ascii_alphabetic()) {
            Ok(CurrencyCode(code))
        } else {
            Err(CurrencyParseError(code))
        }
    }

    pub fn usd() -> Self {
        CurrencyCode("USD".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for CurrencyCode {
    type Err = CurrencyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for CurrencyCode {
    type Error = CurrencyParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<CurrencyCode> for String {
    fn from(value: CurrencyCode) -> Self {
        value.0
    }
}

impl fmt::Display for CurrencyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Normalized transaction type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TxnType {
    #[serde(alias = "buy")]
    Buy,
    #[serde(alias = "sell")]
    Sell,
    #[serde(alias = "short")]
    Short,
    #[serde(alias = "cover")]
    Cover,
}

impl TxnType {
    /// Position direction this transaction opens or closes.
    pub fn direction(&self) -> Direction {
        match self {
            TxnType::Buy | TxnType::Sell => Direction::Long,
            TxnType::Short | TxnType::Cover => Direction::Short,
        }
    }

    pub fn is_entry(&self) -> bool {
        matches!(self, TxnType::Buy | TxnType::Short)
    }

    /// +1 for quantity flowing into the account (BUY, COVER), -1 otherwise.
    pub fn share_sign(&self) -> i64 {
        match self {
            TxnType::Buy | TxnType::Cover => 1,
            TxnType::Sell | TxnType::Short => -1,
        }
    }

    /// Entry transaction type that opens a position in `direction`.
    pub fn entry_for(direction: Direction) -> Self {
        match direction {
            Direction::Long => TxnType::Buy,
            Direction::Short => TxnType::Short,
        }
    }
}

impl FromStr for TxnType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "BUY" => Ok(TxnType::Buy),
            "SELL" => Ok(TxnType::Sell),
            "SHORT" => Ok(TxnType::Short),
            "COVER" => Ok(TxnType::Cover),
            other => Err(format!("unknown transaction type: {}", other)),
        }
    }
}

impl fmt::Display for TxnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TxnType::Buy => write!(f, "BUY"),
            TxnType::Sell => write!(f, "SELL"),
            TxnType::Short => write!(f, "SHORT"),
            TxnType::Cover => write!(f, "COVER"),
        }
    }
}

/// Position direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    #[serde(alias = "long")]
    Long,
    #[serde(alias = "short")]
    Short,
}

impl Direction {
    pub fn sign(&self) -> i64 {
        match self {
            Direction::Long => 1,
            Direction::Short => -1,
        }
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "LONG" => Ok(Direction::Long),
            "SHORT" => Ok(Direction::Short),
            other => Err(format!("unknown direction: {}", other)),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Long => write!(f, "LONG"),
            Direction::Short => write!(f, "SHORT"),
        }
    }
}

/// Provenance of a transaction or lot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    /// Reported by a provider through the normalizer.
    Real,
    SyntheticCurrentPosition,
    SyntheticIncompleteTrade,
    SyntheticCashEvent,
    /// Operator-curated backfill row.
    Backfill,
    /// Pre-window lot back-solved from broker cost basis.
    Seeded,
}

impl Origin {
    /// Tie-break rank within a date: fabricated openings sort before real rows.
    pub fn rank(&self) -> u8 {
        match self {
            Origin::Seeded => 0,
            Origin::SyntheticCurrentPosition
            | Origin::SyntheticIncompleteTrade
            | Origin::SyntheticCashEvent => 1,
            Origin::Backfill => 2,
            Origin::Real => 3,
        }
    }

    pub fn is_synthetic(&self) -> bool {
        matches!(
            self,
            Origin::SyntheticCurrentPosition
                | Origin::SyntheticIncompleteTrade
                | Origin::SyntheticCashEvent
                | Origin::Seeded
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Origin::Real => "real",
            Origin::SyntheticCurrentPosition => "synthetic_current_position",
            Origin::SyntheticIncompleteTrade => "synthetic_incomplete_trade",
            Origin::SyntheticCashEvent => "synthetic_cash_event",
            Origin::Backfill => "backfill",
            Origin::Seeded => "seeded",
        }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symbol_normalization() {
        assert_eq!(Symbol::new(" aapl ").as_str(), "AAPL");
    }

    #[test]
    fn test_currency_parse() {
        assert_eq!(CurrencyCode::parse("gbp").unwrap().as_str(), "GBP");
        assert!(CurrencyCode::parse("GBPX").is_err());
        assert!(CurrencyCode::parse("G1P").is_err());
    }

    #[test]
    fn test_currency_serde_rejects_invalid() {
        let ok: CurrencyCode = serde_json::from_str("\"eur\"").unwrap();
        assert_eq!(ok.as_str(), "EUR");
        assert!(serde_json::from_str::<CurrencyCode>("\"euro\"").is_err());
    }

    #[test]
    fn test_txn_type_direction_and_sign() {
        assert_eq!(TxnType::Sell.direction(), Direction::Long);
        assert_eq!(TxnType::Cover.direction(), Direction::Short);
        assert_eq!(TxnType::Buy.share_sign(), 1);
        assert_eq!(TxnType::Cover.share_sign(), 1);
        assert_eq!(TxnType::Short.share_sign(), -1);
        assert_eq!(TxnType::entry_for(Direction::Short), TxnType::Short);
    }

    #[test]
    fn test_txn_type_serialization() {
        let json = serde_json::to_string(&TxnType::Cover).unwrap();
        assert_eq!(json, "\"COVER\"");
        assert_eq!("sell".parse::<TxnType>().unwrap(), TxnType::Sell);
    }

    #[test]
    fn test_origin_rank_orders_synthetic_first() {
        assert!(Origin::SyntheticCurrentPosition.rank() < Origin::Backfill.rank());
        assert!(Origin::Backfill.rank() < Origin::Real.rank());
        assert_eq!(
            serde_json::to_string(&Origin::SyntheticCashEvent).unwrap(),
            "\"synthetic_cash_event\""
        );
    }
}
