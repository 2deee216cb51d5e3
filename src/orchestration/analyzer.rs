use crate::backfill::{self, backfill_diagnostics, inject_backfill, BackfillRecord, InjectionContext};
use crate::config::Config;
use crate::datasource::{FxSource, MarketData, PriceSource};
use crate::domain::{
    month_ends, sort_transactions_deterministic, ClosedTrade, CurrencyCode, Decimal, Holding,
    IncomeEvent, IncompleteTrade, OpenLot, Origin, Transaction, WarningCategory, WarningLog,
};
use crate::engine::cash::{compute_monthly_nav, derive_cash_ledger};
use crate::engine::fifo::match_transactions;
use crate::engine::reconcile::{compute_lot_pnl, reconcile, ConfidenceInputs};
use crate::engine::returns::{apply_safety_clamp, compute_monthly_returns, growth_of_dollar};
use crate::engine::seeding::back_solve_seed_lots;
use crate::engine::synthetic_cash::generate_synthetic_cash_events;
use crate::engine::timeline::build_timeline;
use crate::engine::{
    ConfidenceThresholds, FxConverter, IncomeSummary, ReturnsPolicy, SeedContext,
    ShortInferencePolicy, SyntheticEntry,
};
use crate::error::EngineError;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Inputs of one analysis. Nothing here outlives the run.
#[derive(Debug, Clone)]
pub struct AnalysisInput {
    pub transactions: Vec<Transaction>,
    pub holdings: Vec<Holding>,
    pub income: Vec<IncomeEvent>,
    pub backfill: Vec<BackfillRecord>,
    pub as_of: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncompleteTradeReport {
    pub count: usize,
    pub trades: Vec<IncompleteTrade>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub reporting_currency: CurrencyCode,
    pub as_of: NaiveDate,
    pub realized_pnl: Decimal,
    pub unrealized_pnl: Decimal,
    pub income_total: IncomeSummary,
    pub official_pnl_usd: Decimal,
    pub lot_pnl_usd: Decimal,
    pub reconciliation_gap_usd: Decimal,
    pub high_confidence_realized: bool,
    /// Why `high_confidence_realized` is false, one entry per failed check.
    pub confidence_warnings: Vec<String>,
    /// Percent of current positions reconstructed without synthetic entries.
    pub data_coverage: Decimal,
    pub incomplete_trades: IncompleteTradeReport,
    pub data_warnings: Vec<String>,
    /// Keyed by month-end date.
    pub monthly_returns: BTreeMap<NaiveDate, Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub monthly_nav: Option<BTreeMap<NaiveDate, Decimal>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub growth_of_dollar: Option<BTreeMap<NaiveDate, Decimal>>,
    pub closed_trades: Vec<ClosedTrade>,
    pub open_lots: Vec<OpenLot>,
    pub synthetic_entries: Vec<SyntheticEntry>,
}

/// Runs the full reconstruction pipeline against read-only market data.
#[derive(Debug, Clone, Copy)]
pub struct Analyzer<'a> {
    config: &'a Config,
    prices: &'a dyn PriceSource,
    fx: &'a dyn FxSource,
}

impl<'a> Analyzer<'a> {
    pub fn new<M: MarketData>(config: &'a Config, market: &'a M) -> Self {
        Self {
            config,
            prices: market,
            fx: market,
        }
    }

    fn thresholds(&self) -> ConfidenceThresholds {
        ConfidenceThresholds {
            coverage_target_pct: self.config.coverage_target_pct,
            gap_tolerance_pct: self.config.gap_tolerance_pct,
            gap_floor: self.config.gap_floor,
        }
    }

    pub fn run(&self, input: AnalysisInput) -> Result<AnalysisResult, EngineError> {
        let AnalysisInput {
            transactions,
            holdings,
            income,
            backfill: backfill_records,
            as_of,
        } = input;
        let reporting = &self.config.reporting_currency;
        let fx = FxConverter::new(self.fx, reporting);
        let mut warnings = WarningLog::new();

        for txn in &transactions {
            txn.validate()?;
        }
        backfill::validate_records(&backfill_records)?;

        let source_filter = self.config.source_filter.as_deref();
        let mut provider: Vec<Transaction> = transactions
            .iter()
            .filter(|t| t.matches_source(source_filter))
            .cloned()
            .collect();
        let before = provider.len();
        provider.retain(|t| t.date <= as_of);
        if provider.len() < before {
            warnings.low(
                WarningCategory::Timeline,
                format!("{} transaction(s) dated after {} ignored", before - provider.len(), as_of),
            );
        }

        // Quantity-less records take the residual of an exit the provider rows leave unmatched.
        let unmatched_exits = if backfill_records.iter().any(|r| r.quantity.is_none()) {
            let provider_only = sort_transactions_deterministic(
                provider
                    .iter()
                    .filter(|t| t.origin != Origin::Backfill)
                    .cloned()
                    .collect(),
            );
            match_transactions(&provider_only, &ShortInferencePolicy::disabled(), None)?.incomplete_trades
        } else {
            Vec::new()
        };

        // Backfill entries go first so inception and both FIFO passes see them.
        let injection = InjectionContext {
            transactions: &transactions,
            unmatched_exits: &unmatched_exits,
            source_filter,
            reporting_currency: reporting,
        };
        let mut combined = inject_backfill(&backfill_records, &injection)?;
        for txn in &combined {
            txn.validate()?;
        }
        combined.extend(provider);
        let transactions = sort_transactions_deterministic(combined);
        let inception = transactions.first().map(|t| t.date).unwrap_or(as_of);
        tracing::info!(transactions = transactions.len(), %inception, %as_of, "analysis started");

        let policy = ShortInferencePolicy::from_delta_gap(
            &transactions,
            &holdings,
            &self.config.short_inference_sources,
            self.config.short_inference_tolerance,
        );

        let first_pass = match_transactions(&transactions, &policy, None)?;
        let seed_ctx = SeedContext {
            transactions: &transactions,
            policy: &policy,
            fx,
            as_of,
            inception,
        };
        let seeds = back_solve_seed_lots(&holdings, &first_pass, &seed_ctx, &mut warnings)?;
        let matched = if seeds.is_empty() {
            first_pass
        } else {
            match_transactions(&transactions, &policy, Some(seeds.as_slice()))?
        };
        tracing::info!(
            closed = matched.closed_trades.len(),
            open = matched.open_lots.len(),
            incomplete = matched.incomplete_trades.len(),
            seeded = seeds.len(),
            "lot matching complete"
        );

        backfill_diagnostics(&matched, self.config.backfill_redundancy_window_days, &mut warnings);

        let timeline = build_timeline(&transactions, &matched, &holdings, inception, &mut warnings);
        let synthetic_cash =
            generate_synthetic_cash_events(&timeline.synthetic_entries, self.prices, &mut warnings);

        let mut cash_transactions = synthetic_cash;
        cash_transactions.extend(transactions.iter().cloned());
        let cash_transactions = sort_transactions_deterministic(cash_transactions);

        let start = [
            timeline.first_date(),
            cash_transactions.first().map(|t| t.date),
            income.iter().map(|e| e.date).min(),
        ]
        .into_iter()
        .flatten()
        .min()
        .unwrap_or(as_of);
        let months = month_ends(start, as_of);

        let ledger = derive_cash_ledger(&cash_transactions, &income, &months, as_of, &fx, &mut warnings);
        let navs = compute_monthly_nav(&timeline, &ledger, as_of, self.prices, &fx, &mut warnings);

        let mut returns = compute_monthly_returns(&navs, &ledger.flows, &mut warnings);
        let returns_policy = ReturnsPolicy {
            data_coverage_pct: timeline.data_coverage_pct,
            has_short_positions: timeline.has_short_positions(),
        };
        apply_safety_clamp(&mut returns, &returns_policy, &mut warnings);
        tracing::info!(months = returns.len(), flows = ledger.flows.len(), "returns computed");

        let lot_pnl = compute_lot_pnl(&matched, &income, self.prices, &fx, as_of, &mut warnings);
        let nav_end = navs.last().map(|n| n.nav).unwrap_or_else(Decimal::zero);
        let official_pnl = nav_end - ledger.total_flows_reporting();
        let confidence = ConfidenceInputs {
            data_coverage_pct: timeline.data_coverage_pct,
            incomplete_trades: matched.incomplete_trades.len(),
            nav_end,
            used_synthetic_data: !timeline.synthetic_entries.is_empty() || !seeds.is_empty(),
            has_high_severity_pricing_warnings: warnings.has_high_severity(WarningCategory::Unpriceable)
                || warnings.has_high_severity(WarningCategory::MissingFx),
        };
        let reconciliation = reconcile(official_pnl, lot_pnl.total, &confidence, &self.thresholds());
        tracing::info!(
            official = %reconciliation.official_pnl_usd.round_dp(2),
            lot = %reconciliation.lot_pnl_usd.round_dp(2),
            high_confidence = reconciliation.high_confidence_realized,
            warnings = warnings.len(),
            "analysis complete"
        );

        let include_series = self.config.include_series;
        Ok(AnalysisResult {
            reporting_currency: reporting.clone(),
            as_of,
            realized_pnl: lot_pnl.realized,
            unrealized_pnl: lot_pnl.unrealized,
            income_total: lot_pnl.income,
            official_pnl_usd: reconciliation.official_pnl_usd,
            lot_pnl_usd: reconciliation.lot_pnl_usd,
            reconciliation_gap_usd: reconciliation.reconciliation_gap_usd,
            high_confidence_realized: reconciliation.high_confidence_realized,
            confidence_warnings: reconciliation.warnings,
            data_coverage: timeline.data_coverage_pct,
            incomplete_trades: IncompleteTradeReport {
                count: matched.incomplete_trades.len(),
                trades: matched.incomplete_trades,
            },
            data_warnings: warnings.messages(),
            monthly_returns: returns.iter().map(|r| (r.month_end, r.value)).collect(),
            monthly_nav: include_series.then(|| navs.iter().map(|n| (n.month_end, n.nav)).collect()),
            growth_of_dollar: include_series.then(|| growth_of_dollar(&returns).into_iter().collect()),
            closed_trades: matched.closed_trades,
            open_lots: matched.open_lots,
            synthetic_entries: timeline.synthetic_entries,
        })
    }
}
