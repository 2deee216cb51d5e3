//! Pure computation engine(s) for deterministic performance reconstruction.

use crate::domain::{Decimal, Direction, LotKey, Origin};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub mod cash;
pub mod fifo;
pub mod fx;
pub mod reconcile;
pub mod returns;
pub mod seeding;
pub mod short_inference;
pub mod synthetic_cash;
pub mod timeline;

pub use cash::{CashLedger, CashSnapshot, ExternalFlow, MonthlyNav};
pub use fifo::{match_transactions, MatchOutput};
pub use fx::FxConverter;
pub use reconcile::{ConfidenceThresholds, IncomeSummary, LotPnl, ReconciliationResult};
pub use returns::{MonthlyReturn, ReturnsPolicy};
pub use seeding::SeedContext;
pub use short_inference::ShortInferencePolicy;
pub use timeline::{PositionTimeline, PositionTimelineEvent, SyntheticEntry};

/// An effect of a transaction on one lot-table key.
///
/// A single transaction can emit two effects, e.g. a SELL that closes the
/// remaining long quantity and opens an inferred short with the residual.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LotEffect {
    /// Index of the transaction in the sorted input.
    pub seq: usize,
    pub transaction_id: String,
    pub date: NaiveDate,
    pub key: LotKey,
    pub effect_type: EffectType,
    /// Absolute quantity.
    pub quantity: Decimal,
    pub price: Decimal,
    pub origin: Origin,
}

impl LotEffect {
    /// Change in position size for the effect's key (+ grows, - shrinks).
    pub fn size_delta(&self) -> Decimal {
        match self.effect_type {
            EffectType::Open => self.quantity,
            EffectType::Close => -self.quantity,
        }
    }

    pub fn direction(&self) -> Direction {
        self.key.direction
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectType {
    /// Increasing position.
    #[default]
    Open,
    /// Decreasing position.
    Close,
}

/// Quantities below this are treated as zero.
pub fn quantity_epsilon() -> Decimal {
    Decimal::new(rust_decimal::Decimal::new(1, 9))
}
