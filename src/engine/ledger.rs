//! Idempotent balance mutations over the journal and the balance cache.
//!
//! Every mutation is: ensure the account row, append the journal entry
//! guarded by `(account_key, idem_key)`, then move the cached balance by the
//! same delta, all in one unit of work. A duplicate key short-circuits to a
//! no-op that reports the current balance.

use crate::config::LedgerConfig;
use crate::db::repo::{balances, journal, AccountBalance, AppendOutcome, NewEntry};
use crate::db::UnitOfWork;
use crate::domain::{
    AccountKey, AccountKind, Amount, BalancePolicy, Change, ChangeEntry, EntryKind, IdemKey,
    TimeMs,
};
use crate::error::LedgerError;
use sqlx::sqlite::{SqliteConnection, SqlitePool};
use tracing::{debug, warn};

/// Result of an increase/decrease.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BalanceChange {
    /// A new entry was journaled; `balance` is the balance after it.
    Applied { balance: Amount, entry_id: i64 },
    /// The idempotency key was already recorded; nothing was written.
    Noop { balance: Amount },
}

impl BalanceChange {
    pub fn balance(&self) -> &Amount {
        match self {
            BalanceChange::Applied { balance, .. } => balance,
            BalanceChange::Noop { balance } => balance,
        }
    }

    pub fn is_applied(&self) -> bool {
        matches!(self, BalanceChange::Applied { .. })
    }
}

/// Cached balance next to the journal sum for one account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    pub account: AccountKey,
    pub cached: Amount,
    pub journal: Amount,
}

impl Reconciliation {
    pub fn is_consistent(&self) -> bool {
        self.cached == self.journal
    }
}

/// A signed journal posting. Internal callers (lifecycle, swap) use it for
/// zero and negative deltas that the public API does not accept.
#[derive(Debug, Clone)]
pub(crate) struct Posting<'a> {
    pub account: &'a AccountKey,
    pub delta: Amount,
    pub kind: EntryKind,
    pub key: &'a IdemKey,
    pub metadata: &'a serde_json::Value,
}

#[derive(Debug, Clone)]
pub struct LedgerEngine {
    pool: SqlitePool,
    config: LedgerConfig,
}

impl LedgerEngine {
    pub fn new(pool: SqlitePool, config: LedgerConfig) -> Self {
        Self { pool, config }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn policy_for(&self, kind: AccountKind) -> BalancePolicy {
        self.config.policy_for(kind)
    }

    /// Current cached balance; zero for an account that was never mutated.
    pub async fn balance(
        &self,
        account: &AccountKey,
        tx: Option<&mut SqliteConnection>,
    ) -> Result<Amount, LedgerError> {
        let key = account.storage_key();
        let cached = match tx {
            Some(conn) => balances::fetch_balance(conn, &key).await?,
            None => balances::fetch_balance(&self.pool, &key).await?,
        };
        Ok(cached.unwrap_or_default())
    }

    /// Credit `change.amount`. Tagged `credit` unless the change names a kind.
    ///
    /// # Errors
    /// `InvalidArgument` for a non-positive amount or empty key; store errors otherwise.
    pub async fn increase(
        &self,
        change: &Change,
        tx: Option<&mut SqliteConnection>,
    ) -> Result<BalanceChange, LedgerError> {
        require_positive(&change.amount)?;

        let mut unit = UnitOfWork::begin(&self.pool, tx).await?;
        let outcome = self
            .apply(
                unit.conn(),
                Posting {
                    account: &change.account,
                    delta: change.amount.clone(),
                    kind: change.kind.unwrap_or(EntryKind::Credit),
                    key: &change.key,
                    metadata: &change.metadata,
                },
            )
            .await?;
        unit.commit().await?;
        Ok(outcome)
    }

    /// Debit `change.amount`. Tagged `debit` unless the change names a kind.
    ///
    /// # Errors
    /// `InsufficientBalance` if the result would cross the account kind's floor;
    /// nothing is written in that case.
    pub async fn decrease(
        &self,
        change: &Change,
        tx: Option<&mut SqliteConnection>,
    ) -> Result<BalanceChange, LedgerError> {
        require_positive(&change.amount)?;

        let mut unit = UnitOfWork::begin(&self.pool, tx).await?;
        let outcome = self
            .apply(
                unit.conn(),
                Posting {
                    account: &change.account,
                    delta: -&change.amount,
                    kind: change.kind.unwrap_or(EntryKind::Debit),
                    key: &change.key,
                    metadata: &change.metadata,
                },
            )
            .await?;
        unit.commit().await?;
        Ok(outcome)
    }

    /// The account's journal in creation order.
    pub async fn entries(
        &self,
        account: &AccountKey,
        tx: Option<&mut SqliteConnection>,
    ) -> Result<Vec<ChangeEntry>, LedgerError> {
        let key = account.storage_key();
        match tx {
            Some(conn) => journal::query_entries(conn, &key).await,
            None => journal::query_entries(&self.pool, &key).await,
        }
    }

    /// Sum of every delta journaled for the account.
    pub async fn journal_sum(
        &self,
        account: &AccountKey,
        tx: Option<&mut SqliteConnection>,
    ) -> Result<Amount, LedgerError> {
        let key = account.storage_key();
        match tx {
            Some(conn) => journal::sum_deltas(conn, &key).await,
            None => journal::sum_deltas(&self.pool, &key).await,
        }
    }

    /// Compare the cached balance with the journal sum. Never repairs.
    pub async fn reconcile(
        &self,
        account: &AccountKey,
        tx: Option<&mut SqliteConnection>,
    ) -> Result<Reconciliation, LedgerError> {
        // Read both sides inside one transaction so they see the same snapshot.
        let mut unit = UnitOfWork::begin(&self.pool, tx).await?;
        let key = account.storage_key();
        let cached = balances::fetch_balance(unit.conn(), &key)
            .await?
            .unwrap_or_default();
        let journal = journal::sum_deltas(unit.conn(), &key).await?;
        unit.commit().await?;

        let reconciliation = Reconciliation {
            account: account.clone(),
            cached,
            journal,
        };
        if !reconciliation.is_consistent() {
            warn!(
                account = %key,
                cached = %reconciliation.cached,
                journal = %reconciliation.journal,
                "Balance cache diverges from journal"
            );
        }
        Ok(reconciliation)
    }

    /// Reconcile every known account. Returns only the inconsistent ones.
    pub async fn reconcile_all(&self) -> Result<Vec<Reconciliation>, LedgerError> {
        let accounts = balances::query_accounts(&self.pool).await?;
        let mut mismatches = Vec::new();
        for account in accounts {
            let reconciliation = self.reconcile(&account, None).await?;
            if !reconciliation.is_consistent() {
                mismatches.push(reconciliation);
            }
        }
        Ok(mismatches)
    }

    /// All balances an owner holds for one account kind.
    pub async fn balances_of(
        &self,
        kind: AccountKind,
        owner: &str,
    ) -> Result<Vec<AccountBalance>, LedgerError> {
        balances::query_balances(&self.pool, kind, owner).await
    }

    /// Journal one signed delta and move the cached balance, on `conn`.
    ///
    /// The caller owns the unit of work; an error leaves the unit's writes
    /// to be rolled back by the caller.
    pub(crate) async fn apply(
        &self,
        conn: &mut SqliteConnection,
        posting: Posting<'_>,
    ) -> Result<BalanceChange, LedgerError> {
        if posting.key.is_empty() {
            return Err(LedgerError::InvalidArgument(
                "idempotency key must not be empty".to_string(),
            ));
        }

        let now = TimeMs::now();
        let account_key = posting.account.storage_key();

        balances::ensure_account(conn, posting.account, now).await?;

        let appended = journal::append_entry(
            conn,
            &NewEntry {
                account_key: &account_key,
                delta: &posting.delta,
                kind: posting.kind,
                idem_key: posting.key,
                metadata: posting.metadata,
                created_at: now,
            },
        )
        .await?;

        let entry_id = match appended {
            AppendOutcome::Appended(id) => id,
            AppendOutcome::DuplicateKey => {
                let balance = balances::fetch_balance(&mut *conn, &account_key)
                    .await?
                    .unwrap_or_default();
                debug!(
                    account = %account_key,
                    idem_key = %posting.key,
                    balance = %balance,
                    "Duplicate idempotency key, no-op"
                );
                return Ok(BalanceChange::Noop { balance });
            }
        };

        let current = balances::fetch_balance(&mut *conn, &account_key)
            .await?
            .ok_or_else(|| {
                LedgerError::Corrupt(format!("balance row missing for {}", account_key))
            })?;
        let next = &current + &posting.delta;

        if posting.delta.is_negative() && !self.policy_for(posting.account.kind).permits(&next) {
            return Err(LedgerError::InsufficientBalance {
                account: account_key,
                balance: current,
                requested: -&posting.delta,
            });
        }

        balances::store_balance(conn, &account_key, &next, now).await?;

        debug!(
            account = %account_key,
            kind = %posting.kind,
            delta = %posting.delta,
            balance = %next,
            entry_id,
            "Applied ledger entry"
        );
        Ok(BalanceChange::Applied {
            balance: next,
            entry_id,
        })
    }
}

fn require_positive(amount: &Amount) -> Result<(), LedgerError> {
    if amount.is_positive() {
        Ok(())
    } else {
        Err(LedgerError::InvalidArgument(format!(
            "amount must be positive, got {}",
            amount
        )))
    }
}
