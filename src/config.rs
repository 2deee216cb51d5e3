use crate::domain::{CurrencyCode, Decimal};
use chrono::NaiveDate;
use std::collections::HashMap;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct Config {
    pub snapshot_dir: PathBuf,
    pub backfill_path: Option<PathBuf>,
    pub reporting_currency: CurrencyCode,
    /// Valuation date; `None` means today.
    pub as_of: Option<NaiveDate>,
    /// Restrict the analysis to one provider source.
    pub source_filter: Option<String>,
    /// Sources whose SELL rows may actually be short entries.
    pub short_inference_sources: Vec<String>,
    pub short_inference_tolerance: Decimal,
    pub coverage_target_pct: Decimal,
    pub gap_tolerance_pct: Decimal,
    pub gap_floor: Decimal,
    pub backfill_redundancy_window_days: i64,
    /// Emit `monthly_nav` and `growth_of_dollar`.
    pub include_series: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            snapshot_dir: PathBuf::from("."),
            backfill_path: None,
            reporting_currency: CurrencyCode::usd(),
            as_of: None,
            source_filter: None,
            short_inference_sources: Vec::new(),
            short_inference_tolerance: Decimal::new(rust_decimal::Decimal::new(1, 2)),
            coverage_target_pct: Decimal::from_i64(95),
            gap_tolerance_pct: Decimal::from_i64(5),
            gap_floor: Decimal::from_i64(1000),
            backfill_redundancy_window_days: 3,
            include_series: false,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_map(std::env::vars().collect())
    }

    pub fn from_env_map(env_map: HashMap<String, String>) -> Result<Self, ConfigError> {
        let defaults = Config::default();
        let get = |key: &str| {
            env_map
                .get(key)
                .map(|s| s.trim())
                .filter(|s| !s.is_empty())
        };

        let snapshot_dir = get("SNAPSHOT_DIR")
            .map(PathBuf::from)
            .ok_or_else(|| ConfigError::MissingEnv("SNAPSHOT_DIR".to_string()))?;

        let backfill_path = get("BACKFILL_PATH").map(PathBuf::from);

        let reporting_currency = match get("REPORTING_CURRENCY") {
            Some(code) => CurrencyCode::parse(code).map_err(|e| {
                ConfigError::InvalidValue("REPORTING_CURRENCY".to_string(), e.to_string())
            })?,
            None => defaults.reporting_currency,
        };

        let as_of = get("AS_OF")
            .map(|s| {
                NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|_| {
                    ConfigError::InvalidValue(
                        "AS_OF".to_string(),
                        "must be an ISO date (YYYY-MM-DD)".to_string(),
                    )
                })
            })
            .transpose()?;

        let source_filter = get("SOURCE_FILTER").map(|s| s.to_lowercase());

        let short_inference_sources = get("SHORT_INFERENCE_SOURCES")
            .map(|s| {
                s.split(',')
                    .map(|p| p.trim().to_lowercase())
                    .filter(|p| !p.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let short_inference_tolerance =
            parse_decimal(&env_map, "SHORT_INFERENCE_TOLERANCE", defaults.short_inference_tolerance)?;
        if short_inference_tolerance.is_negative() {
            return Err(ConfigError::InvalidValue(
                "SHORT_INFERENCE_TOLERANCE".to_string(),
                "must be non-negative".to_string(),
            ));
        }
        let coverage_target_pct = parse_decimal(&env_map, "COVERAGE_TARGET_PCT", defaults.coverage_target_pct)?;
        let gap_tolerance_pct = parse_decimal(&env_map, "GAP_TOLERANCE_PCT", defaults.gap_tolerance_pct)?;
        let gap_floor = parse_decimal(&env_map, "GAP_FLOOR", defaults.gap_floor)?;

        let backfill_redundancy_window_days = match get("BACKFILL_REDUNDANCY_WINDOW_DAYS") {
            Some(s) => s.parse::<i64>().ok().filter(|d| *d >= 0).ok_or_else(|| {
                ConfigError::InvalidValue(
                    "BACKFILL_REDUNDANCY_WINDOW_DAYS".to_string(),
                    "must be a non-negative integer".to_string(),
                )
            })?,
            None => defaults.backfill_redundancy_window_days,
        };

        let include_series = match get("INCLUDE_SERIES").map(|s| s.to_lowercase()) {
            None => defaults.include_series,
            Some(s) => match s.as_str() {
                "1" | "true" | "yes" => true,
                "0" | "false" | "no" => false,
                other => {
                    return Err(ConfigError::InvalidValue(
                        "INCLUDE_SERIES".to_string(),
                        format!("must be true or false, got {}", other),
                    ))
                }
            },
        };

        Ok(Config {
            snapshot_dir,
            backfill_path,
            reporting_currency,
            as_of,
            source_filter,
            short_inference_sources,
            short_inference_tolerance,
            coverage_target_pct,
            gap_tolerance_pct,
            gap_floor,
            backfill_redundancy_window_days,
            include_series,
        })
    }
}

fn parse_decimal(
    env_map: &HashMap<String, String>,
    key: &str,
    default: Decimal,
) -> Result<Decimal, ConfigError> {
    match env_map.get(key).map(|s| s.trim()).filter(|s| !s.is_empty()) {
        Some(raw) => Decimal::from_str_canonical(raw)
            .map_err(|_| ConfigError::InvalidValue(key.to_string(), "must be a decimal number".to_string())),
        None => Ok(default),
    }
}
