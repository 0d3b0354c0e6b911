//! Append-only journal of change entries.

use crate::domain::{Amount, ChangeEntry, EntryKind, IdemKey, TimeMs};
use crate::error::LedgerError;
use sqlx::sqlite::{Sqlite, SqliteConnection};
use sqlx::{Executor, Row};

use super::{encode_metadata, parse_amount, parse_metadata};

/// A journal row about to be written.
#[derive(Debug, Clone)]
pub struct NewEntry<'a> {
    pub account_key: &'a str,
    pub delta: &'a Amount,
    pub kind: EntryKind,
    pub idem_key: &'a IdemKey,
    pub metadata: &'a serde_json::Value,
    pub created_at: TimeMs,
}

/// Result of a conditional append.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    /// Row written; carries the new entry id.
    Appended(i64),
    /// `(account_key, idem_key)` already present; nothing written.
    DuplicateKey,
}

/// Append an entry unless its idempotency key is already recorded for the account.
///
/// The uniqueness constraint is the guard: there is no pre-check, so two
/// concurrent submissions of the same key cannot both append.
pub async fn append_entry(
    conn: &mut SqliteConnection,
    entry: &NewEntry<'_>,
) -> Result<AppendOutcome, LedgerError> {
    let result = sqlx::query(
        r#"
        INSERT INTO ledger_entries (account_key, delta, kind, idem_key, metadata, created_at)
        VALUES (?, ?, ?, ?, ?, ?)
        ON CONFLICT(account_key, idem_key) DO NOTHING
        "#,
    )
    .bind(entry.account_key)
    .bind(entry.delta.to_canonical_string())
    .bind(entry.kind.as_str())
    .bind(entry.idem_key.as_str())
    .bind(encode_metadata(entry.metadata))
    .bind(entry.created_at.as_i64())
    .execute(conn)
    .await?;

    if result.rows_affected() > 0 {
        Ok(AppendOutcome::Appended(result.last_insert_rowid()))
    } else {
        Ok(AppendOutcome::DuplicateKey)
    }
}

/// All entries of an account in creation order.
pub async fn query_entries<'e, E>(
    executor: E,
    account_key: &str,
) -> Result<Vec<ChangeEntry>, LedgerError>
where
    E: Executor<'e, Database = Sqlite>,
{
    let rows = sqlx::query(
        r#"
        SELECT id, account_key, delta, kind, idem_key, metadata, created_at
        FROM ledger_entries
        WHERE account_key = ?
        ORDER BY id ASC
        "#,
    )
    .bind(account_key)
    .fetch_all(executor)
    .await?;

    rows.iter()
        .map(|row| {
            let kind_str: String = row.get("kind");
            let kind = kind_str
                .parse::<EntryKind>()
                .map_err(LedgerError::Corrupt)?;

            Ok(ChangeEntry {
                id: row.get("id"),
                account_key: row.get("account_key"),
                delta: parse_amount(&row.get::<String, _>("delta"), "delta")?,
                kind,
                idem_key: IdemKey::new(row.get::<String, _>("idem_key")),
                metadata: parse_metadata(&row.get::<String, _>("metadata"))?,
                created_at: TimeMs::new(row.get("created_at")),
            })
        })
        .collect()
}

/// Sum all deltas of an account.
///
/// # Implementation Note
///
/// Deltas are summed in Rust. SQLite's SUM over TEXT columns coerces to
/// INTEGER or REAL and would overflow or lose precision on large amounts.
pub async fn sum_deltas<'e, E>(executor: E, account_key: &str) -> Result<Amount, LedgerError>
where
    E: Executor<'e, Database = Sqlite>,
{
    let rows = sqlx::query(
        r#"
        SELECT delta
        FROM ledger_entries
        WHERE account_key = ?
        ORDER BY id ASC
        "#,
    )
    .bind(account_key)
    .fetch_all(executor)
    .await?;

    let mut sum = Amount::zero();
    for row in rows {
        let delta = parse_amount(&row.get::<String, _>("delta"), "delta")?;
        sum = sum + delta;
    }
    Ok(sum)
}
