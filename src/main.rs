use anyhow::Context;
use balance_ledger::{config::Config, db::init_db_with, LedgerEngine};
use tracing::{info, warn};

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing_subscriber::filter::LevelFilter::INFO.into()),
        )
        .init();

    if let Err(e) = run().await {
        eprintln!("balance-ledger: {:#}", e);
        std::process::exit(1);
    }
}

/// Open (or create) the store, apply migrations and audit every cached balance
/// against its journal.
async fn run() -> anyhow::Result<()> {
    let config = Config::from_env().context("Configuration error")?;

    let pool = init_db_with(&config.database_path, &config.pool)
        .await
        .with_context(|| format!("Failed to initialize database at {}", config.database_path))?;

    let ledger = LedgerEngine::new(pool, config.ledger.clone());
    let mismatches = ledger
        .reconcile_all()
        .await
        .context("Balance audit failed")?;

    for m in &mismatches {
        warn!(
            account = %m.account,
            cached = %m.cached,
            journal = %m.journal,
            "Audit mismatch"
        );
    }

    if mismatches.is_empty() {
        info!(db_path = %config.database_path, "Store ready, all balances match their journals");
        Ok(())
    } else {
        anyhow::bail!("{} account(s) diverge from their journals", mismatches.len())
    }
}
