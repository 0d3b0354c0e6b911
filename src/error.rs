use crate::domain::Amount;
use thiserror::Error;

/// SQLite primary result codes that indicate lock contention rather than a bad statement.
const SQLITE_BUSY: i32 = 5;
const SQLITE_LOCKED: i32 = 6;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Insufficient balance on {account}: balance {balance}, requested {requested}")]
    InsufficientBalance {
        account: String,
        balance: Amount,
        requested: Amount,
    },
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Transient store conflict: {0}")]
    TransientStoreConflict(#[source] sqlx::Error),
    #[error("Store error: {0}")]
    Store(#[source] sqlx::Error),
    #[error("Corrupt row: {0}")]
    Corrupt(String),
}

impl LedgerError {
    /// Deadlock / busy / snapshot conflicts that a fresh attempt may clear.
    pub fn is_transient(&self) -> bool {
        matches!(self, LedgerError::TransientStoreConflict(_))
    }
}

impl From<sqlx::Error> for LedgerError {
    fn from(err: sqlx::Error) -> Self {
        if is_transient_store_error(&err) {
            LedgerError::TransientStoreConflict(err)
        } else {
            LedgerError::Store(err)
        }
    }
}

/// Detect SQLite busy/locked failures, including extended codes such as
/// `SQLITE_BUSY_SNAPSHOT` (517).
pub fn is_transient_store_error(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err
            .code()
            .and_then(|code| code.parse::<i32>().ok())
            .map(|code| matches!(code & 0xff, SQLITE_BUSY | SQLITE_LOCKED))
            .unwrap_or(false),
        _ => false,
    }
}
