//! Back-solving pre-window lots from broker cost basis.
//!
//! When a long holding is larger than the window's transactions explain, the
//! missing shares must have been bought before the window. Their total cost is
//! whatever part of the broker's reported basis the visible open lots do not
//! account for:
//!
//! ```text
//! pre_window_cost   = broker_cost_basis − Σ cost(open long lots in window)
//! pre_window_shares = current_shares + Σ exits − Σ entries   (long side, window only)
//! seed_price        = pre_window_cost / pre_window_shares
//! ```
//!
//! The formula prices the seed before window exits consume it. A seeded
//! matching pass then shows which seed shares and window lots are still open,
//! and the seed is repriced so those open lots carry exactly the broker basis.
//! When the still-open window lots alone cost more than the basis, the formula
//! price is kept and a warning says the basis cannot be reconciled.

use super::fifo::{match_transactions, MatchOutput};
use super::fx::FxConverter;
use super::quantity_epsilon;
use super::short_inference::ShortInferencePolicy;
use crate::error::EngineError;
use crate::domain::{
    day_before, CurrencyCode, Decimal, Direction, Holding, OpenLot, Origin, Symbol, Transaction,
    WarningCategory, WarningLog,
};
use chrono::NaiveDate;

/// Inputs shared by every holding's back-solve.
#[derive(Debug, Clone, Copy)]
pub struct SeedContext<'a> {
    pub transactions: &'a [Transaction],
    /// Policy of the matching passes; the seeded layout is replayed with it.
    pub policy: &'a ShortInferencePolicy,
    pub fx: FxConverter<'a>,
    pub as_of: NaiveDate,
    /// Fallback seed anchor for symbols with no transactions.
    pub inception: NaiveDate,
}

impl<'a> SeedContext<'a> {
    fn earliest_date(&self, symbol: &Symbol) -> Option<NaiveDate> {
        self.transactions
            .iter()
            .filter(|t| &t.symbol == symbol)
            .map(|t| t.date)
            .min()
    }
}

/// Seed lots for every long holding whose broker basis implies pre-window shares.
///
/// `first_pass` must be a matching pass run without seeds. Every holding that
/// needs a seed but cannot get one produces a warning.
pub fn back_solve_seed_lots(
    holdings: &[Holding],
    first_pass: &MatchOutput,
    ctx: &SeedContext<'_>,
    warnings: &mut WarningLog,
) -> Result<Vec<OpenLot>, EngineError> {
    let mut candidates = Vec::new();
    for holding in holdings {
        if holding.quantity.is_zero() {
            continue;
        }
        if holding.direction() == Direction::Short {
            if pre_window_shares(holding, first_pass).abs() > quantity_epsilon() {
                warnings.low(
                    WarningCategory::Seeding,
                    format!(
                        "{}: short holding not explained by transactions; short cost-basis seeding is not supported",
                        holding.symbol
                    ),
                );
            }
            continue;
        }
        if let Some(candidate) = back_solve_holding(holding, first_pass, ctx, warnings) {
            candidates.push((holding, candidate));
        }
    }
    if candidates.is_empty() {
        return Ok(Vec::new());
    }

    let provisional: Vec<OpenLot> = candidates.iter().map(|(_, c)| c.lot.clone()).collect();
    let layout = match_transactions(ctx.transactions, ctx.policy, Some(provisional.as_slice()))?;

    let mut seeds = Vec::with_capacity(candidates.len());
    for (holding, candidate) in candidates {
        let seed = fit_to_broker_basis(holding, candidate, &layout, ctx, warnings);
        tracing::info!(
            symbol = %seed.symbol,
            qty = %seed.remaining_quantity,
            price = %seed.entry_price,
            "seeded pre-window lot"
        );
        seeds.push(seed);
    }
    Ok(seeds)
}

/// A formula-priced seed plus the basis it was derived from.
struct SeedCandidate {
    lot: OpenLot,
    broker_basis: Decimal,
    basis_currency: CurrencyCode,
}

/// Shares held before the window: current + long exits − long entries.
fn pre_window_shares(holding: &Holding, first_pass: &MatchOutput) -> Decimal {
    let direction = holding.direction();
    let visible: Decimal = first_pass
        .effects
        .iter()
        .filter(|e| {
            e.key.symbol == holding.symbol
                && e.key.currency == holding.currency
                && e.key.direction == direction
        })
        .map(|e| e.size_delta())
        .sum();
    holding.abs_quantity() - visible
}

fn back_solve_holding(
    holding: &Holding,
    first_pass: &MatchOutput,
    ctx: &SeedContext<'_>,
    warnings: &mut WarningLog,
) -> Option<SeedCandidate> {
    let eps = quantity_epsilon();
    let shares = pre_window_shares(holding, first_pass);
    if shares.abs() <= eps {
        return None;
    }
    if shares.is_negative() {
        warnings.low(
            WarningCategory::Seeding,
            format!(
                "{}: transactions imply {} more shares than held; nothing to seed",
                holding.symbol,
                (-shares).round_dp(6)
            ),
        );
        return None;
    }

    let Some(broker_basis) = holding.cost_basis else {
        warnings.low(
            WarningCategory::Seeding,
            format!(
                "{}: {} pre-window shares but no broker cost basis; lot seeding skipped",
                holding.symbol,
                shares.round_dp(6)
            ),
        );
        return None;
    };

    let basis_currency = if holding.cost_basis_usd {
        ctx.fx.reporting_currency().clone()
    } else {
        holding.currency.clone()
    };

    // Observed cost of the window's open long lots, in the basis currency.
    let mut observed = Decimal::zero();
    for lot in first_pass
        .open_lots
        .iter()
        .filter(|l| {
            l.symbol == holding.symbol
                && l.currency == holding.currency
                && l.direction == Direction::Long
        })
    {
        match ctx
            .fx
            .convert(lot.cost_basis(), &lot.currency, &basis_currency, ctx.as_of)
        {
            Some(cost) => observed += cost,
            None => {
                warnings.low(
                    WarningCategory::Seeding,
                    format!(
                        "{}: no FX to convert {} lot cost into {}; lot seeding skipped",
                        holding.symbol, lot.currency, basis_currency
                    ),
                );
                return None;
            }
        }
    }

    let pre_window_cost = broker_basis - observed;
    if !pre_window_cost.is_positive() {
        warnings.low(
            WarningCategory::Seeding,
            format!(
                "{}: broker cost basis {} does not exceed observed lot cost {}; lot seeding skipped",
                holding.symbol,
                broker_basis.round_dp(2),
                observed.round_dp(2)
            ),
        );
        return None;
    }

    let unit_cost = pre_window_cost.checked_div(shares)?;
    let entry_price = match ctx.fx.convert(unit_cost, &basis_currency, &holding.currency, ctx.as_of) {
        Some(price) => price,
        None => {
            warnings.low(
                WarningCategory::Seeding,
                format!(
                    "{}: no FX to express seed price in {}; lot seeding skipped",
                    holding.symbol, holding.currency
                ),
            );
            return None;
        }
    };

    let anchor = ctx.earliest_date(&holding.symbol).unwrap_or(ctx.inception);
    let lot = OpenLot {
        symbol: holding.symbol.clone(),
        direction: Direction::Long,
        entry_date: day_before(anchor),
        entry_price,
        entry_fee: Decimal::zero(),
        remaining_quantity: shares,
        currency: holding.currency.clone(),
        origin_transaction_id: seed_transaction_id(&holding.symbol, &holding.currency),
        origin: Origin::Seeded,
    };
    Some(SeedCandidate {
        lot,
        broker_basis,
        basis_currency,
    })
}

/// Reprice a seed so the lots still open after the seeded pass carry the
/// broker basis: surviving seed shares × price + open window lot cost = basis.
fn fit_to_broker_basis(
    holding: &Holding,
    candidate: SeedCandidate,
    layout: &MatchOutput,
    ctx: &SeedContext<'_>,
    warnings: &mut WarningLog,
) -> OpenLot {
    let SeedCandidate {
        mut lot,
        broker_basis,
        basis_currency,
    } = candidate;

    let mut seed_remaining = Decimal::zero();
    let mut window_cost = Decimal::zero();
    for open in layout.open_lots.iter().filter(|l| {
        l.symbol == holding.symbol && l.currency == holding.currency && l.direction == Direction::Long
    }) {
        if open.origin_transaction_id == lot.origin_transaction_id {
            seed_remaining += open.remaining_quantity;
            continue;
        }
        match ctx
            .fx
            .convert(open.cost_basis(), &open.currency, &basis_currency, ctx.as_of)
        {
            Some(cost) => window_cost += cost,
            None => return lot,
        }
    }
    // Every seed share was sold inside the window; nothing left to reprice.
    if seed_remaining <= quantity_epsilon() {
        return lot;
    }

    let remaining_cost = broker_basis - window_cost;
    if !remaining_cost.is_positive() {
        warnings.low(
            WarningCategory::Seeding,
            format!(
                "{}: broker cost basis {} cannot cover {} of window lots still open; seed kept at {} over all pre-window shares",
                holding.symbol,
                broker_basis.round_dp(2),
                window_cost.round_dp(2),
                lot.entry_price.round_dp(6)
            ),
        );
        return lot;
    }

    let fitted = remaining_cost
        .checked_div(seed_remaining)
        .and_then(|unit| ctx.fx.convert(unit, &basis_currency, &holding.currency, ctx.as_of));
    if let Some(price) = fitted {
        lot.entry_price = price;
    }
    lot
}

pub fn seed_transaction_id(symbol: &Symbol, currency: &CurrencyCode) -> String {
    format!("seed_{}_{}", symbol, currency)
}
