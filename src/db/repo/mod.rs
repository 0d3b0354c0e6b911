//! Query layer over the ledger tables.
//!
//! Functions are grouped by table family:
//! - `balances.rs` - materialized balance rows
//! - `journal.rs` - append-only change entries
//! - `stakes.rs` - staked position rows and their conditional updates
//! - `trades.rs` - trade records
//!
//! Every function takes the connection or executor to run on, so the engine
//! decides which unit of work a statement belongs to. Writes that must happen
//! together always take `&mut SqliteConnection`; single-statement reads accept
//! any SQLite executor (pool, connection, or transaction).

pub mod balances;
pub mod journal;
pub mod stakes;
pub mod trades;

pub use balances::AccountBalance;
pub use journal::{AppendOutcome, NewEntry};
pub use stakes::GateHit;

use crate::domain::{Amount, TimeMs};
use crate::error::LedgerError;

/// Parse a persisted integer column. Unlike display-only values, a ledger amount
/// that fails to parse is never defaulted.
pub(crate) fn parse_amount(raw: &str, column: &str) -> Result<Amount, LedgerError> {
    Amount::from_str_canonical(raw)
        .map_err(|e| LedgerError::Corrupt(format!("{}: {}", column, e)))
}

pub(crate) fn parse_metadata(raw: &str) -> Result<serde_json::Value, LedgerError> {
    serde_json::from_str(raw).map_err(|e| LedgerError::Corrupt(format!("metadata: {}", e)))
}

pub(crate) fn encode_metadata(value: &serde_json::Value) -> String {
    // serde_json::Value always serializes.
    value.to_string()
}

pub(crate) fn opt_time(value: Option<i64>) -> Option<TimeMs> {
    value.map(TimeMs::new)
}
