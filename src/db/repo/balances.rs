//! Materialized balance rows.

use crate::domain::{AccountKey, AccountKind, Amount, TimeMs};
use crate::error::LedgerError;
use sqlx::sqlite::{Sqlite, SqliteConnection};
use sqlx::{Executor, Row};

use super::parse_amount;

/// A balance row with its decoded account identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountBalance {
    pub account: AccountKey,
    pub balance: Amount,
    pub updated_at: TimeMs,
}

/// Create the balance row at zero if the account has never been touched.
///
/// Runs as the first statement of a mutation so the unit of work takes the
/// write lock before it reads anything.
pub async fn ensure_account(
    conn: &mut SqliteConnection,
    account: &AccountKey,
    now: TimeMs,
) -> Result<bool, LedgerError> {
    let result = sqlx::query(
        r#"
        INSERT INTO ledger_balances (account_key, kind, owner, scope, balance, updated_at)
        VALUES (?, ?, ?, ?, '0', ?)
        ON CONFLICT(account_key) DO NOTHING
        "#,
    )
    .bind(account.storage_key())
    .bind(account.kind.as_str())
    .bind(&account.owner)
    .bind(&account.scope)
    .bind(now.as_i64())
    .execute(conn)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Read the cached balance. `None` means the account has never been mutated.
pub async fn fetch_balance<'e, E>(
    executor: E,
    account_key: &str,
) -> Result<Option<Amount>, LedgerError>
where
    E: Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query("SELECT balance FROM ledger_balances WHERE account_key = ?")
        .bind(account_key)
        .fetch_optional(executor)
        .await?;

    row.map(|r| parse_amount(&r.get::<String, _>("balance"), "balance"))
        .transpose()
}

/// Overwrite the cached balance. Only called after the matching journal append.
pub async fn store_balance(
    conn: &mut SqliteConnection,
    account_key: &str,
    balance: &Amount,
    now: TimeMs,
) -> Result<(), LedgerError> {
    let result = sqlx::query(
        r#"
        UPDATE ledger_balances
        SET balance = ?, updated_at = ?
        WHERE account_key = ?
        "#,
    )
    .bind(balance.to_canonical_string())
    .bind(now.as_i64())
    .bind(account_key)
    .execute(conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(LedgerError::Corrupt(format!(
            "balance row missing for {}",
            account_key
        )));
    }
    Ok(())
}

/// All balances of one owner for an account kind, ordered by scope.
pub async fn query_balances<'e, E>(
    executor: E,
    kind: AccountKind,
    owner: &str,
) -> Result<Vec<AccountBalance>, LedgerError>
where
    E: Executor<'e, Database = Sqlite>,
{
    let rows = sqlx::query(
        r#"
        SELECT owner, scope, balance, updated_at
        FROM ledger_balances
        WHERE kind = ? AND owner = ?
        ORDER BY scope ASC
        "#,
    )
    .bind(kind.as_str())
    .bind(owner)
    .fetch_all(executor)
    .await?;

    rows.iter()
        .map(|row| {
            Ok(AccountBalance {
                account: AccountKey::new(
                    kind,
                    row.get::<String, _>("owner"),
                    row.get::<String, _>("scope"),
                ),
                balance: parse_amount(&row.get::<String, _>("balance"), "balance")?,
                updated_at: TimeMs::new(row.get::<i64, _>("updated_at")),
            })
        })
        .collect()
}

/// Every account that has a balance row, ordered by storage key.
pub async fn query_accounts<'e, E>(executor: E) -> Result<Vec<AccountKey>, LedgerError>
where
    E: Executor<'e, Database = Sqlite>,
{
    let rows = sqlx::query(
        r#"
        SELECT kind, owner, scope
        FROM ledger_balances
        ORDER BY account_key ASC
        "#,
    )
    .fetch_all(executor)
    .await?;

    rows.iter()
        .map(|row| {
            let kind = row
                .get::<String, _>("kind")
                .parse::<AccountKind>()
                .map_err(LedgerError::Corrupt)?;
            Ok(AccountKey::new(
                kind,
                row.get::<String, _>("owner"),
                row.get::<String, _>("scope"),
            ))
        })
        .collect()
}
