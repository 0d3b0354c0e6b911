//! Two-legged trades: debit one trading account, credit another, record the trade.
//!
//! Legs are applied in the order given by a [`LockOrder`] so two swaps sharing
//! accounts always touch them in the same sequence. A swap that runs on its
//! own transaction is retried on transient store conflicts; one that joins a
//! caller's transaction runs exactly once.

use crate::config::RetryPolicy;
use crate::db::repo::{balances, trades};
use crate::db::UnitOfWork;
use crate::domain::{AccountKey, Amount, EntryKind, IdemKey, TimeMs, TradeRecord, TradeSpec};
use crate::engine::ledger::{BalanceChange, LedgerEngine, Posting};
use crate::engine::retry::with_retry;
use crate::error::LedgerError;
use serde_json::json;
use sqlx::sqlite::SqliteConnection;
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// Total order over accounts used to sequence the legs of a swap.
///
/// Evaluated on every attempt, so implementations must be pure and stable.
pub trait LockOrder: Send + Sync + fmt::Debug {
    fn compare(&self, a: &AccountKey, b: &AccountKey) -> Ordering;
}

/// Orders accounts by their storage key.
#[derive(Debug, Clone, Copy, Default)]
pub struct LexicographicOrder;

impl LockOrder for LexicographicOrder {
    fn compare(&self, a: &AccountKey, b: &AccountKey) -> Ordering {
        a.storage_key().cmp(&b.storage_key())
    }
}

/// Balances of both legs after a swap. `to` is `None` for a burn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapBalances {
    pub from: Amount,
    pub to: Option<Amount>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SwapOutcome {
    Applied {
        record: TradeRecord,
        balances: SwapBalances,
    },
    /// The trade id was already recorded; `record` is the stored trade.
    Noop {
        record: TradeRecord,
        balances: SwapBalances,
    },
}

impl SwapOutcome {
    pub fn record(&self) -> &TradeRecord {
        match self {
            SwapOutcome::Applied { record, .. } | SwapOutcome::Noop { record, .. } => record,
        }
    }

    pub fn balances(&self) -> &SwapBalances {
        match self {
            SwapOutcome::Applied { balances, .. } | SwapOutcome::Noop { balances, .. } => balances,
        }
    }

    pub fn is_applied(&self) -> bool {
        matches!(self, SwapOutcome::Applied { .. })
    }
}

struct Leg {
    account: AccountKey,
    delta: Amount,
    kind: EntryKind,
    key: IdemKey,
}

#[derive(Debug, Clone)]
pub struct SwapCoordinator {
    ledger: LedgerEngine,
    retry: RetryPolicy,
    order: Arc<dyn LockOrder>,
}

impl SwapCoordinator {
    pub fn new(ledger: LedgerEngine, retry: RetryPolicy) -> Self {
        Self::with_order(ledger, retry, Arc::new(LexicographicOrder))
    }

    pub fn with_order(ledger: LedgerEngine, retry: RetryPolicy, order: Arc<dyn LockOrder>) -> Self {
        Self {
            ledger,
            retry,
            order,
        }
    }

    pub fn ledger(&self) -> &LedgerEngine {
        &self.ledger
    }

    /// Apply the trade atomically: trade row, debit leg and (unless a burn) credit leg.
    ///
    /// # Errors
    /// - `InvalidConfiguration` if both legs resolve to the same account
    /// - `InvalidArgument` for a non-positive `from_amount` or negative `to_amount`
    /// - `InsufficientBalance` if the debit would cross the floor
    /// - `TransientStoreConflict` once retries are exhausted
    pub async fn swap(
        &self,
        spec: &TradeSpec,
        tx: Option<&mut SqliteConnection>,
    ) -> Result<SwapOutcome, LedgerError> {
        validate(spec)?;

        match tx {
            Some(conn) => self.swap_once(spec, Some(conn)).await,
            None => {
                with_retry(&self.retry, LedgerError::is_transient, || {
                    self.swap_once(spec, None)
                })
                .await
            }
        }
    }

    async fn swap_once(
        &self,
        spec: &TradeSpec,
        tx: Option<&mut SqliteConnection>,
    ) -> Result<SwapOutcome, LedgerError> {
        let legs = self.ordered_legs(spec)?;
        let from_account = spec.from_account();
        let to_account = spec.to_account();

        let mut unit = UnitOfWork::begin(self.ledger.pool(), tx).await?;

        let record = TradeRecord::from_spec(spec, TimeMs::now());
        if !trades::insert_trade(unit.conn(), &record).await? {
            let stored = trades::find_trade(unit.conn(), spec.id)
                .await?
                .ok_or_else(|| LedgerError::Corrupt(format!("trade {} vanished", spec.id)))?;
            let from = balances::fetch_balance(unit.conn(), &from_account.storage_key())
                .await?
                .unwrap_or_default();
            let to = if stored.to_amount.is_zero() {
                None
            } else {
                Some(
                    balances::fetch_balance(unit.conn(), &to_account.storage_key())
                        .await?
                        .unwrap_or_default(),
                )
            };
            unit.commit().await?;

            debug!(trade_id = %spec.id, "Trade already recorded, no-op");
            return Ok(SwapOutcome::Noop {
                record: stored,
                balances: SwapBalances { from, to },
            });
        }

        let metadata = json!({
            "tradeId": spec.id.to_string(),
            "fromToken": spec.from_token.as_str(),
            "toToken": spec.to_token.as_str(),
        });

        let mut from = None;
        let mut to = None;
        for leg in &legs {
            let change = self
                .ledger
                .apply(
                    unit.conn(),
                    Posting {
                        account: &leg.account,
                        delta: leg.delta.clone(),
                        kind: leg.kind,
                        key: &leg.key,
                        metadata: &metadata,
                    },
                )
                .await?;
            let balance = match change {
                BalanceChange::Applied { balance, .. } => balance,
                BalanceChange::Noop { .. } => {
                    return Err(LedgerError::Corrupt(format!(
                        "leg {} of new trade {} already journaled",
                        leg.key, spec.id
                    )));
                }
            };
            if leg.account == from_account {
                from = Some(balance);
            } else {
                to = Some(balance);
            }
        }

        let from = from.ok_or_else(|| {
            LedgerError::Corrupt(format!("trade {} has no debit leg", spec.id))
        })?;
        unit.commit().await?;

        info!(
            trade_id = %spec.id,
            agent = %spec.agent,
            from_token = %spec.from_token,
            to_token = %spec.to_token,
            from_amount = %spec.from_amount,
            to_amount = %spec.to_amount,
            "Swap applied"
        );
        Ok(SwapOutcome::Applied {
            record,
            balances: SwapBalances { from, to },
        })
    }

    /// Build the legs and sort them by the lock order. A burn has a single leg.
    fn ordered_legs(&self, spec: &TradeSpec) -> Result<Vec<Leg>, LedgerError> {
        let from_account = spec.from_account();
        let to_account = spec.to_account();

        if self.order.compare(&from_account, &to_account) == Ordering::Equal {
            return Err(LedgerError::InvalidConfiguration(format!(
                "trade {} legs are indistinguishable: {} and {}",
                spec.id, from_account, to_account
            )));
        }

        let mut legs = vec![Leg {
            account: from_account,
            delta: -&spec.from_amount,
            kind: EntryKind::TradeDebit,
            key: IdemKey::builder("trade-debit").with("trade", spec.id).build(),
        }];
        if !spec.is_burn() {
            legs.push(Leg {
                account: to_account,
                delta: spec.to_amount.clone(),
                kind: EntryKind::TradeCredit,
                key: IdemKey::builder("trade-credit").with("trade", spec.id).build(),
            });
        }

        legs.sort_by(|a, b| self.order.compare(&a.account, &b.account));
        Ok(legs)
    }
}

fn validate(spec: &TradeSpec) -> Result<(), LedgerError> {
    if spec.from_account() == spec.to_account() {
        return Err(LedgerError::InvalidConfiguration(format!(
            "trade {} swaps {} into itself",
            spec.id, spec.from_token
        )));
    }
    if !spec.from_amount.is_positive() {
        return Err(LedgerError::InvalidArgument(format!(
            "trade {} from amount must be positive, got {}",
            spec.id, spec.from_amount
        )));
    }
    if spec.to_amount.is_negative() {
        return Err(LedgerError::InvalidArgument(format!(
            "trade {} to amount must not be negative, got {}",
            spec.id, spec.to_amount
        )));
    }
    Ok(())
}
