//! Trade records written by the swap coordinator.

use crate::domain::{Address, CompetitionId, TimeMs, TradeRecord};
use crate::error::LedgerError;
use sqlx::sqlite::{Sqlite, SqliteConnection};
use sqlx::{Executor, Row};
use uuid::Uuid;

use super::{encode_metadata, parse_amount, parse_metadata};

/// Insert a trade. Returns false if a trade with this id was already recorded.
pub async fn insert_trade(
    conn: &mut SqliteConnection,
    record: &TradeRecord,
) -> Result<bool, LedgerError> {
    let result = sqlx::query(
        r#"
        INSERT INTO trades (
            id, agent, competition, from_token, to_token,
            from_amount, to_amount, metadata, created_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(id) DO NOTHING
        "#,
    )
    .bind(record.id.to_string())
    .bind(record.agent.as_str())
    .bind(record.competition.as_str())
    .bind(record.from_token.as_str())
    .bind(record.to_token.as_str())
    .bind(record.from_amount.to_canonical_string())
    .bind(record.to_amount.to_canonical_string())
    .bind(encode_metadata(&record.metadata))
    .bind(record.created_at.as_i64())
    .execute(conn)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn find_trade<'e, E>(executor: E, id: Uuid) -> Result<Option<TradeRecord>, LedgerError>
where
    E: Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query(
        r#"
        SELECT id, agent, competition, from_token, to_token,
               from_amount, to_amount, metadata, created_at
        FROM trades
        WHERE id = ?
        "#,
    )
    .bind(id.to_string())
    .fetch_optional(executor)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let id_str: String = row.get("id");
    let id = Uuid::parse_str(&id_str)
        .map_err(|e| LedgerError::Corrupt(format!("trade id {}: {}", id_str, e)))?;

    Ok(Some(TradeRecord {
        id,
        agent: Address::new(row.get::<String, _>("agent")),
        competition: CompetitionId::new(row.get::<String, _>("competition")),
        from_token: Address::new(row.get::<String, _>("from_token")),
        to_token: Address::new(row.get::<String, _>("to_token")),
        from_amount: parse_amount(&row.get::<String, _>("from_amount"), "from_amount")?,
        to_amount: parse_amount(&row.get::<String, _>("to_amount"), "to_amount")?,
        metadata: parse_metadata(&row.get::<String, _>("metadata"))?,
        created_at: TimeMs::new(row.get("created_at")),
    }))
}
