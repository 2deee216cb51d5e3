use anyhow::Context;
use realperf::{AnalysisInput, Analyzer, Config, SnapshotLoader};

fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing_subscriber::filter::LevelFilter::INFO.into()),
        )
        .init();

    // Load configuration
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = run(&config) {
        eprintln!("Analysis failed: {:#}", e);
        std::process::exit(1);
    }
}

fn run(config: &Config) -> anyhow::Result<()> {
    let snapshot = SnapshotLoader::new(&config.snapshot_dir)
        .with_backfill_path(config.backfill_path.clone())
        .load()
        .with_context(|| format!("loading snapshot from {}", config.snapshot_dir.display()))?;

    let as_of = config
        .as_of
        .unwrap_or_else(|| chrono::Local::now().date_naive());
    let input = AnalysisInput {
        transactions: snapshot.transactions,
        holdings: snapshot.holdings,
        income: snapshot.income,
        backfill: snapshot.backfill,
        as_of,
    };

    let result = Analyzer::new(config, &snapshot.market)
        .run(input)
        .context("running analysis")?;

    let json = serde_json::to_string_pretty(&result).context("serializing result")?;
    println!("{}", json);
    Ok(())
}
