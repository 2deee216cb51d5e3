//! Data-quality warnings accumulated during an analysis run.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningCategory {
    MissingPrice,
    MissingFx,
    /// Instrument held with no usable price at all.
    Unpriceable,
    Seeding,
    Timeline,
    Returns,
    Backfill,
    Confidence,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataWarning {
    pub severity: Severity,
    pub category: WarningCategory,
    pub message: String,
}

/// Ordered, de-duplicated warning list.
///
/// Every new entry is also emitted through `tracing::warn!`.
#[derive(Debug, Clone, Default)]
pub struct WarningLog {
    entries: Vec<DataWarning>,
    seen: HashSet<String>,
}

impl WarningLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, severity: Severity, category: WarningCategory, message: impl Into<String>) {
        let message = message.into();
        if !self.seen.insert(message.clone()) {
            return;
        }
        tracing::warn!(?severity, ?category, "{}", message);
        self.entries.push(DataWarning {
            severity,
            category,
            message,
        });
    }

    pub fn low(&mut self, category: WarningCategory, message: impl Into<String>) {
        self.push(Severity::Low, category, message);
    }

    pub fn high(&mut self, category: WarningCategory, message: impl Into<String>) {
        self.push(Severity::High, category, message);
    }

    pub fn entries(&self) -> &[DataWarning] {
        &self.entries
    }

    pub fn has_high_severity(&self, category: WarningCategory) -> bool {
        self.entries
            .iter()
            .any(|w| w.severity == Severity::High && w.category == category)
    }

    pub fn messages(&self) -> Vec<String> {
        self.entries.iter().map(|w| w.message.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicates_are_dropped_in_order() {
        let mut log = WarningLog::new();
        log.low(WarningCategory::MissingPrice, "no price for AAA on 2024-01-01");
        log.high(WarningCategory::Unpriceable, "BBB has no price series");
        log.low(WarningCategory::MissingPrice, "no price for AAA on 2024-01-01");

        assert_eq!(
            log.messages(),
            vec![
                "no price for AAA on 2024-01-01".to_string(),
                "BBB has no price series".to_string()
            ]
        );
        assert!(log.has_high_severity(WarningCategory::Unpriceable));
        assert!(!log.has_high_severity(WarningCategory::MissingPrice));
    }
}
