//! Whole-pipeline properties: share conservation, the return clamp and
//! backfill diagnostics, checked on `Analyzer::run` output.

use chrono::NaiveDate;
use realperf::backfill::parse_backfill;
use realperf::domain::Origin;
use realperf::{
    AnalysisInput, AnalysisResult, Analyzer, BackfillRecord, Config, CurrencyCode, Decimal,
    Holding, InMemoryMarketData, Symbol, Transaction, TxnType,
};
use std::collections::BTreeMap;

fn d(s: &str) -> Decimal {
    Decimal::from_str_canonical(s).unwrap()
}

fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

fn txn(id: &str, kind: TxnType, sym: &str, day: &str, qty: &str, px: &str) -> Transaction {
    Transaction::new(
        kind,
        Symbol::new(sym),
        date(day),
        d(qty),
        d(px),
        Decimal::zero(),
        CurrencyCode::usd(),
        "ibkr",
        id,
    )
}

fn holding(sym: &str, qty: &str) -> Holding {
    Holding {
        symbol: Symbol::new(sym),
        quantity: d(qty),
        currency: CurrencyCode::usd(),
        cost_basis: None,
        cost_basis_usd: false,
    }
}

fn run(
    market: &InMemoryMarketData,
    transactions: Vec<Transaction>,
    holdings: Vec<Holding>,
    backfill: Vec<BackfillRecord>,
    as_of: &str,
) -> AnalysisResult {
    let config = Config::default();
    Analyzer::new(&config, market)
        .run(AnalysisInput {
            transactions,
            holdings,
            income: Vec::new(),
            backfill,
            as_of: date(as_of),
        })
        .unwrap()
}

fn linked_backfill(symbol: &str, day: &str, price: &str, qty: &str, exit: &str) -> Vec<BackfillRecord> {
    parse_backfill(&format!(
        r#"[{{"symbol":"{}","direction":"LONG","manual_entry_date":"{}","manual_entry_price":{},
            "source":"statement","quantity":{},"exit_transaction_id":"{}"}}]"#,
        symbol, day, price, qty, exit
    ))
    .unwrap()
}

#[test]
fn test_shares_conserved_across_real_backfilled_and_synthetic_entries() {
    let market = InMemoryMarketData::new()
        .with_price("AAPL", date("2024-01-31"), d("170"))
        .with_price("MSFT", date("2023-04-28"), d("300"))
        .with_price("MSFT", date("2024-01-31"), d("400"))
        .with_price("TSLA", date("2024-01-31"), d("190"));
    let transactions = vec![
        txn("s1", TxnType::Sell, "AAPL", "2024-01-10", "10", "150"),
        txn("t1", TxnType::Sell, "TSLA", "2024-01-15", "3", "200"),
        txn("b2", TxnType::Buy, "AAPL", "2024-01-20", "5", "160"),
    ];
    // MSFT is held with no history; TSLA was sold with no known entry.
    let holdings = vec![holding("AAPL", "5"), holding("MSFT", "20")];
    let backfill = linked_backfill("AAPL", "2023-05-01", "120", "10", "s1");
    let result = run(&market, transactions.clone(), holdings.clone(), backfill.clone(), "2024-01-31");

    let mut net: BTreeMap<String, Decimal> = BTreeMap::new();
    let mut add = |sym: &str, qty: Decimal| {
        *net.entry(sym.to_string()).or_insert_with(Decimal::zero) += qty;
    };
    for t in &transactions {
        let signed = if t.txn_type.is_entry() { t.quantity } else { -t.quantity };
        add(t.symbol.as_str(), signed);
    }
    for record in &backfill {
        add(record.symbol.as_str(), record.quantity.unwrap());
    }
    for entry in &result.synthetic_entries {
        add(entry.key.symbol.as_str(), entry.quantity);
    }
    for lot in result.open_lots.iter().filter(|l| l.origin == Origin::Seeded) {
        add(lot.symbol.as_str(), lot.remaining_quantity);
    }

    let held = |sym: &str| {
        holdings
            .iter()
            .find(|h| h.symbol.as_str() == sym)
            .map(|h| h.quantity)
            .unwrap_or_else(Decimal::zero)
    };
    for sym in ["AAPL", "MSFT", "TSLA"] {
        assert_eq!(net[sym], held(sym), "{sym}: entries minus exits");

        let open: Decimal = result
            .open_lots
            .iter()
            .filter(|l| l.symbol.as_str() == sym)
            .map(|l| l.remaining_quantity)
            .sum();
        let unexplained: Decimal = result
            .synthetic_entries
            .iter()
            .filter(|e| e.key.symbol.as_str() == sym && e.origin == Origin::SyntheticCurrentPosition)
            .map(|e| e.quantity)
            .sum();
        assert_eq!(open + unexplained, held(sym), "{sym}: open lots plus synthetic positions");
    }
    assert_eq!(result.incomplete_trades.count, 1);
    assert_eq!(result.incomplete_trades.trades[0].exit_transaction_id, "t1");
}

#[test]
fn test_collapse_on_incomplete_long_only_book_is_clamped() {
    // Jan: ZZZ (no history) worth 99 plus one share of WWW. Feb: ZZZ goes to
    // zero and YYY is bought for 208 on the last day and marked at zero.
    let market = InMemoryMarketData::new()
        .with_price("ZZZ", date("2023-12-29"), d("9.9"))
        .with_price("ZZZ", date("2024-02-15"), d("0"))
        .with_price("WWW", date("2024-01-02"), d("1"))
        .with_price("YYY", date("2024-02-29"), d("0"));
    let result = run(
        &market,
        vec![
            txn("w1", TxnType::Buy, "WWW", "2024-01-02", "1", "1"),
            txn("y1", TxnType::Buy, "YYY", "2024-02-29", "1", "208"),
        ],
        vec![holding("ZZZ", "10"), holding("WWW", "1"), holding("YYY", "1")],
        Vec::new(),
        "2024-02-29",
    );

    assert!(result.data_coverage < Decimal::hundred());
    assert_eq!(result.monthly_returns[&date("2024-01-31")], Decimal::zero());
    // Raw Modified Dietz: (1 - 100 - 208) / 100 = -3.07
    assert_eq!(result.monthly_returns[&date("2024-02-29")], d("-1"));
    assert!(result
        .data_warnings
        .iter()
        .any(|w| w.contains("2024-02: return of -307") && w.contains("clamped")));
}

#[test]
fn test_collapse_on_tracked_short_book_is_kept() {
    // Long WWW at 100 and short 10 SSS at 10; SSS then squeezes to 40.7.
    let market = InMemoryMarketData::new()
        .with_price("WWW", date("2024-01-31"), d("100"))
        .with_price("SSS", date("2024-01-31"), d("10"))
        .with_price("SSS", date("2024-02-29"), d("40.7"));
    let result = run(
        &market,
        vec![
            txn("w1", TxnType::Buy, "WWW", "2024-01-02", "1", "100"),
            txn("x1", TxnType::Short, "SSS", "2024-01-03", "10", "10"),
        ],
        vec![holding("WWW", "1"), holding("SSS", "-10")],
        Vec::new(),
        "2024-02-29",
    );

    assert_eq!(result.data_coverage, Decimal::hundred());
    // (-207 - 100) / 100
    assert_eq!(result.monthly_returns[&date("2024-02-29")], d("-3.07"));
    assert!(result.data_warnings.iter().all(|w| !w.contains("clamped")));
    assert!(result
        .data_warnings
        .iter()
        .any(|w| w.contains("2024-02: suspicious return of -307")));
}

#[test]
fn test_backfill_next_to_provider_lot_is_flagged_redundant() {
    // The provider now reports a buy one day after the curated entry.
    let market = InMemoryMarketData::new().with_price("AAPL", date("2024-02-29"), d("150"));
    let result = run(
        &market,
        vec![
            txn("b1", TxnType::Buy, "AAPL", "2024-01-06", "10", "121"),
            txn("s1", TxnType::Sell, "AAPL", "2024-02-01", "10", "150"),
        ],
        vec![holding("AAPL", "10")],
        linked_backfill("AAPL", "2024-01-05", "120", "10", "s1"),
        "2024-02-29",
    );

    let trade = &result.closed_trades[0];
    assert_eq!(trade.entry_origin, Origin::Backfill);
    assert_eq!(result.open_lots[0].origin_transaction_id, "b1");
    assert!(result.data_warnings.iter().any(|w| {
        w.contains("Possibly redundant backfill entry backfill_statement_entry_for_s1")
            && w.contains("provider lot b1")
    }));
}
