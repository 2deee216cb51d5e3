//! Pipeline composition: one synchronous analysis per call.

pub mod analyzer;

pub use analyzer::{AnalysisInput, AnalysisResult, Analyzer, IncompleteTradeReport};
