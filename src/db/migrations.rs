//! Database migrations and initialization.

use crate::config::PoolSettings;
use sqlx::sqlite::{SqliteConnection, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Triggers carry `;` inside their bodies, so they are kept out of `schema.sql`
/// (which is split on `;`) and applied one by one.
const APPEND_ONLY_TRIGGERS: [&str; 2] = [
    r#"
    CREATE TRIGGER IF NOT EXISTS ledger_entries_no_update
    BEFORE UPDATE ON ledger_entries
    BEGIN
        SELECT RAISE(ABORT, 'ledger_entries is append-only');
    END
    "#,
    r#"
    CREATE TRIGGER IF NOT EXISTS ledger_entries_no_delete
    BEFORE DELETE ON ledger_entries
    BEGIN
        SELECT RAISE(ABORT, 'ledger_entries is append-only');
    END
    "#,
];

/// Initialize the SQLite database with default pool settings.
pub async fn init_db(db_path: &str) -> Result<SqlitePool, sqlx::Error> {
    init_db_with(db_path, &PoolSettings::default()).await
}

/// Initialize the SQLite database with schema and pragmas.
pub async fn init_db_with(
    db_path: &str,
    settings: &PoolSettings,
) -> Result<SqlitePool, sqlx::Error> {
    if let Some(parent) = Path::new(db_path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).ok();
        }
    }

    let busy_timeout = settings.busy_timeout;
    let pool = SqlitePoolOptions::new()
        .max_connections(settings.max_connections)
        .after_connect(move |conn, _meta| {
            Box::pin(async move { configure_pragmas_conn(conn, busy_timeout).await })
        })
        .connect(&format!("sqlite:{}?mode=rwc", db_path))
        .await?;

    run_migrations(&pool).await?;

    info!(db_path = %db_path, "Database initialized successfully");
    Ok(pool)
}

/// Run all database migrations.
pub(crate) async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    info!("Running database migrations...");
    let schema_sql = include_str!("schema.sql");

    for statement in schema_sql.split(';') {
        let trimmed = strip_comments(statement);
        if !trimmed.is_empty() {
            sqlx::query(&trimmed).execute(pool).await?;
        }
    }

    for trigger in APPEND_ONLY_TRIGGERS {
        sqlx::query(trigger).execute(pool).await?;
    }

    info!("Migrations completed successfully");
    Ok(())
}

fn strip_comments(statement: &str) -> String {
    statement
        .lines()
        .filter(|line| !line.trim_start().starts_with("--"))
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

/// Configure SQLite pragmas for concurrent writers.
async fn configure_pragmas_conn(
    conn: &mut SqliteConnection,
    busy_timeout: Duration,
) -> Result<(), sqlx::Error> {
    use sqlx::Row;

    sqlx::query("PRAGMA foreign_keys = ON")
        .execute(&mut *conn)
        .await?;

    // journal_mode returns the actual mode set; must use fetch to get result
    let row = sqlx::query("PRAGMA journal_mode = WAL")
        .fetch_one(&mut *conn)
        .await?;
    let journal_mode: String = row.get(0);
    tracing::debug!(journal_mode = %journal_mode, "SQLite journal_mode set");

    sqlx::query(&format!("PRAGMA busy_timeout = {}", busy_timeout.as_millis()))
        .execute(&mut *conn)
        .await?;
    sqlx::query("PRAGMA synchronous = NORMAL")
        .execute(&mut *conn)
        .await?;

    Ok(())
}
