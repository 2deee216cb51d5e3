pub mod backfill;
pub mod config;
pub mod datasource;
pub mod domain;
pub mod engine;
pub mod error;
pub mod orchestration;

pub use backfill::{BackfillError, BackfillRecord};
pub use config::Config;
pub use datasource::{FxSource, InMemoryMarketData, LoadError, PriceSource, Snapshot, SnapshotLoader};
pub use domain::{
    ClosedTrade, CurrencyCode, Decimal, Direction, Holding, IncomeEvent, IncompleteTrade, OpenLot,
    Origin, Symbol, Transaction, TxnType,
};
pub use error::EngineError;
pub use orchestration::{AnalysisInput, AnalysisResult, Analyzer};
