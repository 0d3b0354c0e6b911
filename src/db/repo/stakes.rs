//! Staked position rows.
//!
//! Each lifecycle mutator is a single conditional UPDATE whose affected-row
//! count (or RETURNING row) decides between "applied" and "already applied".
//! Do not split these into read-then-write; the condition is the guard.

use crate::domain::{Address, Amount, Position, StakeEvent, TimeMs};
use crate::error::LedgerError;
use sqlx::sqlite::{Sqlite, SqliteConnection, SqliteRow};
use sqlx::{Executor, Row};

use super::{opt_time, parse_amount};

/// Wallet and amount returned by a gated update that matched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateHit {
    pub wallet: Address,
    pub amount: Amount,
}

fn position_from_row(row: &SqliteRow) -> Result<Position, LedgerError> {
    Ok(Position {
        id: row.get("id"),
        wallet: Address::new(row.get::<String, _>("wallet")),
        amount: parse_amount(&row.get::<String, _>("amount"), "amount")?,
        staked_at: TimeMs::new(row.get("staked_at")),
        can_unstake_after: TimeMs::new(row.get("can_unstake_after")),
        unstaked_at: opt_time(row.get("unstaked_at")),
        can_withdraw_after: opt_time(row.get("can_withdraw_after")),
        withdrawn_at: opt_time(row.get("withdrawn_at")),
        relocked_at: opt_time(row.get("relocked_at")),
    })
}

fn gate_hit_from_row(row: &SqliteRow) -> Result<GateHit, LedgerError> {
    Ok(GateHit {
        wallet: Address::new(row.get::<String, _>("wallet")),
        amount: parse_amount(&row.get::<String, _>("amount"), "amount")?,
    })
}

/// Insert a new position. Returns false if the id already exists.
pub async fn insert_stake(
    conn: &mut SqliteConnection,
    event: &StakeEvent,
) -> Result<bool, LedgerError> {
    let result = sqlx::query(
        r#"
        INSERT INTO stakes (id, wallet, amount, staked_at, can_unstake_after)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT(id) DO NOTHING
        "#,
    )
    .bind(event.position_id)
    .bind(event.wallet.as_str())
    .bind(event.amount.to_canonical_string())
    .bind(event.staked_at.as_i64())
    .bind(event.can_unstake_after.as_i64())
    .execute(conn)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Reduce the amount, but only if it still equals `previous`.
pub async fn reduce_amount_if(
    conn: &mut SqliteConnection,
    id: i64,
    previous: &Amount,
    remaining: &Amount,
    can_withdraw_after: TimeMs,
) -> Result<Option<GateHit>, LedgerError> {
    let row = sqlx::query(
        r#"
        UPDATE stakes
        SET amount = ?, can_withdraw_after = ?
        WHERE id = ? AND amount = ?
        RETURNING wallet, amount
        "#,
    )
    .bind(remaining.to_canonical_string())
    .bind(can_withdraw_after.as_i64())
    .bind(id)
    .bind(previous.to_canonical_string())
    .fetch_optional(conn)
    .await?;

    row.as_ref().map(gate_hit_from_row).transpose()
}

/// Set `unstaked_at` if not yet set.
pub async fn mark_unstaked(
    conn: &mut SqliteConnection,
    id: i64,
    unstaked_at: TimeMs,
    can_withdraw_after: TimeMs,
) -> Result<Option<GateHit>, LedgerError> {
    let row = sqlx::query(
        r#"
        UPDATE stakes
        SET unstaked_at = ?, can_withdraw_after = ?
        WHERE id = ? AND unstaked_at IS NULL
        RETURNING wallet, amount
        "#,
    )
    .bind(unstaked_at.as_i64())
    .bind(can_withdraw_after.as_i64())
    .bind(id)
    .fetch_optional(conn)
    .await?;

    row.as_ref().map(gate_hit_from_row).transpose()
}

/// Set `relocked_at` and close the stake period, but only while the position
/// is still staked (never relocked, unstaked or withdrawn).
///
/// The amount is left untouched here, so the returned amount is the
/// pre-relock amount.
pub async fn mark_relocked(
    conn: &mut SqliteConnection,
    id: i64,
    relocked_at: TimeMs,
) -> Result<Option<GateHit>, LedgerError> {
    let row = sqlx::query(
        r#"
        UPDATE stakes
        SET relocked_at = ?, unstaked_at = ?
        WHERE id = ?
          AND relocked_at IS NULL
          AND unstaked_at IS NULL
          AND withdrawn_at IS NULL
        RETURNING wallet, amount
        "#,
    )
    .bind(relocked_at.as_i64())
    .bind(relocked_at.as_i64())
    .bind(id)
    .fetch_optional(conn)
    .await?;

    row.as_ref().map(gate_hit_from_row).transpose()
}

/// Unconditional amount write. Only valid after a gate in the same unit of work matched.
pub async fn set_amount(
    conn: &mut SqliteConnection,
    id: i64,
    amount: &Amount,
) -> Result<(), LedgerError> {
    sqlx::query("UPDATE stakes SET amount = ? WHERE id = ?")
        .bind(amount.to_canonical_string())
        .bind(id)
        .execute(conn)
        .await?;
    Ok(())
}

/// Set `withdrawn_at` if not yet set.
pub async fn mark_withdrawn(
    conn: &mut SqliteConnection,
    id: i64,
    withdrawn_at: TimeMs,
) -> Result<Option<GateHit>, LedgerError> {
    let row = sqlx::query(
        r#"
        UPDATE stakes
        SET withdrawn_at = ?
        WHERE id = ? AND withdrawn_at IS NULL
        RETURNING wallet, amount
        "#,
    )
    .bind(withdrawn_at.as_i64())
    .bind(id)
    .fetch_optional(conn)
    .await?;

    row.as_ref().map(gate_hit_from_row).transpose()
}

pub async fn find_stake<'e, E>(executor: E, id: i64) -> Result<Option<Position>, LedgerError>
where
    E: Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query(
        r#"
        SELECT id, wallet, amount, staked_at, can_unstake_after, unstaked_at,
               can_withdraw_after, withdrawn_at, relocked_at
        FROM stakes
        WHERE id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(executor)
    .await?;

    row.as_ref().map(position_from_row).transpose()
}

/// Page through positions that are still staked, by ascending id after `after_id`.
pub async fn query_staked<'e, E>(
    executor: E,
    after_id: Option<i64>,
    limit: u32,
) -> Result<Vec<Position>, LedgerError>
where
    E: Executor<'e, Database = Sqlite>,
{
    let rows = sqlx::query(
        r#"
        SELECT id, wallet, amount, staked_at, can_unstake_after, unstaked_at,
               can_withdraw_after, withdrawn_at, relocked_at
        FROM stakes
        WHERE unstaked_at IS NULL AND id > ?
        ORDER BY id ASC
        LIMIT ?
        "#,
    )
    .bind(after_id.unwrap_or(i64::MIN))
    .bind(i64::from(limit))
    .fetch_all(executor)
    .await?;

    rows.iter().map(position_from_row).collect()
}
