//! Transaction scoping for engine operations.
//!
//! An operation either opens its own transaction or joins one the caller
//! already holds. Joining is done through a savepoint, so a failed operation
//! undoes only its own writes and never commits on the caller's behalf.

use sqlx::sqlite::{Sqlite, SqliteConnection, SqlitePool};
use sqlx::{Connection, Transaction};

/// A unit of work: a top-level transaction or a savepoint inside the caller's.
///
/// Dropping without `commit` rolls back what this unit wrote.
pub struct UnitOfWork<'c> {
    tx: Transaction<'c, Sqlite>,
    joined: bool,
}

impl<'c> UnitOfWork<'c> {
    /// Join `outer` if given, else open a new transaction on `pool`.
    pub async fn begin(
        pool: &SqlitePool,
        outer: Option<&'c mut SqliteConnection>,
    ) -> Result<UnitOfWork<'c>, sqlx::Error> {
        match outer {
            Some(conn) => Ok(UnitOfWork {
                tx: conn.begin().await?,
                joined: true,
            }),
            None => Ok(UnitOfWork {
                tx: pool.begin().await?,
                joined: false,
            }),
        }
    }

    /// True when this unit runs inside a caller-owned transaction.
    pub fn is_joined(&self) -> bool {
        self.joined
    }

    pub fn conn(&mut self) -> &mut SqliteConnection {
        &mut self.tx
    }

    /// Commit a top-level transaction, or release the savepoint of a joined one.
    pub async fn commit(self) -> Result<(), sqlx::Error> {
        self.tx.commit().await
    }

    pub async fn rollback(self) -> Result<(), sqlx::Error> {
        self.tx.rollback().await
    }
}
