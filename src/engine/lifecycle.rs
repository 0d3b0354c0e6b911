//! Position lifecycle: stake → (partial/full) unstake → (partial/full) relock → withdraw.
//!
//! Every transition is one unit of work: the gating conditional update on the
//! `stakes` row, then the mirrored journal entry on the position's stake
//! account. A gate that does not match (position absent, or field already
//! set) is a no-op, which is the steady state for replayed upstream events.

use crate::db::repo::{stakes, GateHit};
use crate::db::UnitOfWork;
use crate::domain::{
    AccountKey, Address, Amount, EntryKind, IdemKey, Position, RelockEvent, StakeEvent,
    UnstakeEvent, WithdrawEvent,
};
use crate::engine::ledger::{BalanceChange, LedgerEngine, Posting};
use crate::error::LedgerError;
use serde_json::json;
use sqlx::sqlite::SqliteConnection;
use tracing::{debug, info};

/// Outcome of a lifecycle operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// The transition was applied; the position as it stands afterwards.
    Applied(Position),
    /// Already applied by an earlier delivery, or the position does not exist.
    Noop,
}

impl Transition {
    pub fn is_applied(&self) -> bool {
        matches!(self, Transition::Applied(_))
    }

    pub fn position(&self) -> Option<&Position> {
        match self {
            Transition::Applied(position) => Some(position),
            Transition::Noop => None,
        }
    }
}

/// One page of `all_staked`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StakedPage {
    pub positions: Vec<Position>,
    /// Pass back as `after` to fetch the next page; `None` when exhausted.
    pub next_cursor: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct PositionLifecycle {
    ledger: LedgerEngine,
}

impl PositionLifecycle {
    pub fn new(ledger: LedgerEngine) -> Self {
        Self { ledger }
    }

    pub fn ledger(&self) -> &LedgerEngine {
        &self.ledger
    }

    /// Create the position and journal `+amount`. An existing id is a no-op.
    pub async fn stake(
        &self,
        event: &StakeEvent,
        tx: Option<&mut SqliteConnection>,
    ) -> Result<Transition, LedgerError> {
        if !event.amount.is_positive() {
            return Err(LedgerError::InvalidTransition(format!(
                "stake {} amount must be positive, got {}",
                event.position_id, event.amount
            )));
        }

        let mut unit = UnitOfWork::begin(self.ledger.pool(), tx).await?;
        if !stakes::insert_stake(unit.conn(), event).await? {
            debug!(position_id = event.position_id, "Stake already recorded, no-op");
            return Ok(Transition::Noop);
        }

        self.journal(
            unit.conn(),
            event.position_id,
            &event.wallet,
            event.amount.clone(),
            EntryKind::Stake,
            &event.event_key,
        )
        .await?;

        let position = self.reload(unit.conn(), event.position_id).await?;
        unit.commit().await?;

        info!(
            position_id = position.id,
            wallet = %position.wallet,
            amount = %position.amount,
            "Stake recorded"
        );
        Ok(Transition::Applied(position))
    }

    /// Reduce the position from `previous` to `event.remaining_amount`.
    ///
    /// # Errors
    /// `InvalidTransition` unless `remaining_amount < previous`.
    pub async fn partial_unstake(
        &self,
        event: &UnstakeEvent,
        previous: &Amount,
        tx: Option<&mut SqliteConnection>,
    ) -> Result<Transition, LedgerError> {
        let delta = &event.remaining_amount - previous;
        if !delta.is_negative() {
            return Err(LedgerError::InvalidTransition(format!(
                "partial unstake of {} must remove funds: remaining {} vs previous {}",
                event.position_id, event.remaining_amount, previous
            )));
        }

        let mut unit = UnitOfWork::begin(self.ledger.pool(), tx).await?;
        let Some(hit) = stakes::reduce_amount_if(
            unit.conn(),
            event.position_id,
            previous,
            &event.remaining_amount,
            event.can_withdraw_after,
        )
        .await?
        else {
            debug!(position_id = event.position_id, "Partial unstake already applied, no-op");
            return Ok(Transition::Noop);
        };

        self.journal(
            unit.conn(),
            event.position_id,
            &hit.wallet,
            delta,
            EntryKind::Unstake,
            &event.event_key,
        )
        .await?;

        let position = self.reload(unit.conn(), event.position_id).await?;
        unit.commit().await?;

        info!(
            position_id = position.id,
            remaining = %position.amount,
            "Position partially unstaked"
        );
        Ok(Transition::Applied(position))
    }

    /// Close the stake period and start the withdrawal clock. The amount stays as is.
    ///
    /// # Errors
    /// `InvalidTransition` unless `remaining_amount == previous`.
    pub async fn full_unstake(
        &self,
        event: &UnstakeEvent,
        previous: &Amount,
        tx: Option<&mut SqliteConnection>,
    ) -> Result<Transition, LedgerError> {
        let delta = &event.remaining_amount - previous;
        if !delta.is_zero() {
            return Err(LedgerError::InvalidTransition(format!(
                "full unstake of {} must not change the amount: remaining {} vs previous {}",
                event.position_id, event.remaining_amount, previous
            )));
        }

        let mut unit = UnitOfWork::begin(self.ledger.pool(), tx).await?;
        let Some(hit) = stakes::mark_unstaked(
            unit.conn(),
            event.position_id,
            event.unstaked_at,
            event.can_withdraw_after,
        )
        .await?
        else {
            debug!(position_id = event.position_id, "Already unstaked, no-op");
            return Ok(Transition::Noop);
        };

        self.journal(
            unit.conn(),
            event.position_id,
            &hit.wallet,
            delta,
            EntryKind::Unstake,
            &event.event_key,
        )
        .await?;

        let position = self.reload(unit.conn(), event.position_id).await?;
        unit.commit().await?;

        info!(position_id = position.id, "Position fully unstaked");
        Ok(Transition::Applied(position))
    }

    /// Relock with a new, strictly positive amount.
    pub async fn partial_relock(
        &self,
        event: &RelockEvent,
        tx: Option<&mut SqliteConnection>,
    ) -> Result<Transition, LedgerError> {
        if !event.updated_amount.is_positive() {
            return Err(LedgerError::InvalidTransition(format!(
                "partial relock of {} needs a positive amount, got {}",
                event.position_id, event.updated_amount
            )));
        }
        self.relock(event, tx).await
    }

    /// Relock everything out of the position; `updated_amount` must be zero.
    pub async fn full_relock(
        &self,
        event: &RelockEvent,
        tx: Option<&mut SqliteConnection>,
    ) -> Result<Transition, LedgerError> {
        if !event.updated_amount.is_zero() {
            return Err(LedgerError::InvalidTransition(format!(
                "full relock of {} must leave zero, got {}",
                event.position_id, event.updated_amount
            )));
        }
        self.relock(event, tx).await
    }

    async fn relock(
        &self,
        event: &RelockEvent,
        tx: Option<&mut SqliteConnection>,
    ) -> Result<Transition, LedgerError> {
        let mut unit = UnitOfWork::begin(self.ledger.pool(), tx).await?;
        let Some(GateHit {
            wallet,
            amount: previous,
        }) = stakes::mark_relocked(unit.conn(), event.position_id, event.relocked_at).await?
        else {
            debug!(position_id = event.position_id, "Position already relocked or closed, no-op");
            return Ok(Transition::Noop);
        };

        stakes::set_amount(unit.conn(), event.position_id, &event.updated_amount).await?;
        self.journal(
            unit.conn(),
            event.position_id,
            &wallet,
            &event.updated_amount - &previous,
            EntryKind::Relock,
            &event.event_key,
        )
        .await?;

        let position = self.reload(unit.conn(), event.position_id).await?;
        unit.commit().await?;

        info!(
            position_id = position.id,
            previous = %previous,
            amount = %position.amount,
            "Position relocked"
        );
        Ok(Transition::Applied(position))
    }

    /// Mark the position withdrawn. Journals a zero delta: custody moves, the
    /// tracked amount does not.
    pub async fn withdraw(
        &self,
        event: &WithdrawEvent,
        tx: Option<&mut SqliteConnection>,
    ) -> Result<Transition, LedgerError> {
        let mut unit = UnitOfWork::begin(self.ledger.pool(), tx).await?;
        let Some(hit) =
            stakes::mark_withdrawn(unit.conn(), event.position_id, event.withdrawn_at).await?
        else {
            debug!(position_id = event.position_id, "Already withdrawn, no-op");
            return Ok(Transition::Noop);
        };

        self.journal(
            unit.conn(),
            event.position_id,
            &hit.wallet,
            Amount::zero(),
            EntryKind::Withdraw,
            &event.event_key,
        )
        .await?;

        let position = self.reload(unit.conn(), event.position_id).await?;
        unit.commit().await?;

        info!(position_id = position.id, "Position withdrawn");
        Ok(Transition::Applied(position))
    }

    pub async fn find_by_id(
        &self,
        id: i64,
        tx: Option<&mut SqliteConnection>,
    ) -> Result<Option<Position>, LedgerError> {
        match tx {
            Some(conn) => stakes::find_stake(conn, id).await,
            None => stakes::find_stake(self.ledger.pool(), id).await,
        }
    }

    /// Positions still staked, ascending by id, starting after `after`.
    pub async fn all_staked(&self, after: Option<i64>, limit: u32) -> Result<StakedPage, LedgerError> {
        if limit == 0 {
            return Err(LedgerError::InvalidArgument(
                "page limit must be positive".to_string(),
            ));
        }

        let positions = stakes::query_staked(self.ledger.pool(), after, limit).await?;
        let next_cursor = if positions.len() == limit as usize {
            positions.last().map(|p| p.id)
        } else {
            None
        };
        Ok(StakedPage {
            positions,
            next_cursor,
        })
    }

    /// Mirror a gated transition onto the position's stake account.
    ///
    /// The gate already proved this event is new, so a duplicate journal key
    /// means the event key was reused for a different transition.
    async fn journal(
        &self,
        conn: &mut SqliteConnection,
        position_id: i64,
        wallet: &Address,
        delta: Amount,
        kind: EntryKind,
        event_key: &IdemKey,
    ) -> Result<(), LedgerError> {
        let account = AccountKey::stake(wallet, position_id);
        let metadata = json!({ "positionId": position_id });
        let outcome = self
            .ledger
            .apply(
                conn,
                Posting {
                    account: &account,
                    delta,
                    kind,
                    key: event_key,
                    metadata: &metadata,
                },
            )
            .await?;

        match outcome {
            BalanceChange::Applied { .. } => Ok(()),
            BalanceChange::Noop { .. } => Err(LedgerError::InvalidTransition(format!(
                "event key {} already journaled for position {}",
                event_key, position_id
            ))),
        }
    }

    async fn reload(
        &self,
        conn: &mut SqliteConnection,
        id: i64,
    ) -> Result<Position, LedgerError> {
        stakes::find_stake(conn, id)
            .await?
            .ok_or_else(|| LedgerError::Corrupt(format!("position {} vanished mid-transition", id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LedgerConfig;
    use crate::db::migrations::init_db;
    use crate::domain::{PositionState, TimeMs};
    use tempfile::TempDir;

    async fn setup() -> (PositionLifecycle, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir
            .path()
            .join("test.db")
            .to_string_lossy()
            .to_string();
        let pool = init_db(&db_path).await.expect("init_db failed");
        let ledger = LedgerEngine::new(pool, LedgerConfig::default());
        (PositionLifecycle::new(ledger), temp_dir)
    }

    fn stake_event(id: i64, amount: i64) -> StakeEvent {
        StakeEvent {
            position_id: id,
            wallet: Address::new("0xWallet"),
            amount: Amount::from(amount),
            staked_at: TimeMs::new(1_000),
            can_unstake_after: TimeMs::new(2_000),
            event_key: IdemKey::new(format!("stake:{}", id)),
        }
    }

    fn relock_event(id: i64, updated: i64, key: &str) -> RelockEvent {
        RelockEvent {
            position_id: id,
            updated_amount: Amount::from(updated),
            relocked_at: TimeMs::new(5_000),
            event_key: IdemKey::new(key),
        }
    }

    #[tokio::test]
    async fn test_stake_twice_is_noop() {
        let (lifecycle, _temp) = setup().await;

        let first = lifecycle.stake(&stake_event(1, 500), None).await.unwrap();
        let position = first.position().unwrap();
        assert_eq!(position.amount, Amount::from(500));
        assert_eq!(position.wallet.as_str(), "0xwallet");
        assert_eq!(position.state(), PositionState::Staked);

        let second = lifecycle.stake(&stake_event(1, 500), None).await.unwrap();
        assert_eq!(second, Transition::Noop);

        let account = AccountKey::stake(&Address::new("0xwallet"), 1);
        assert_eq!(lifecycle.ledger().entries(&account, None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_stake_rejects_non_positive_amount() {
        let (lifecycle, _temp) = setup().await;
        let err = lifecycle.stake(&stake_event(1, 0), None).await.unwrap_err();
        assert!(matches!(err, LedgerError::InvalidTransition(_)));
        assert!(lifecycle.find_by_id(1, None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_partial_relock_updates_amount() {
        let (lifecycle, _temp) = setup().await;
        lifecycle.stake(&stake_event(3, 1000), None).await.unwrap();

        let relocked = lifecycle
            .partial_relock(&relock_event(3, 1200, "relock:3"), None)
            .await
            .unwrap();
        let position = relocked.position().unwrap();
        assert_eq!(position.amount, Amount::from(1200));
        assert_eq!(position.relocked_at, Some(TimeMs::new(5_000)));
        assert_eq!(position.unstaked_at, Some(TimeMs::new(5_000)));
        assert_eq!(position.state(), PositionState::Relocked);

        let account = AccountKey::stake(&position.wallet, 3);
        let entries = lifecycle.ledger().entries(&account, None).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].delta, Amount::from(200));
        assert_eq!(entries[1].kind, EntryKind::Relock);

        let replay = lifecycle
            .partial_relock(&relock_event(3, 1200, "relock:3"), None)
            .await
            .unwrap();
        assert_eq!(replay, Transition::Noop);
    }

    #[tokio::test]
    async fn test_full_relock_empties_position() {
        let (lifecycle, _temp) = setup().await;
        lifecycle.stake(&stake_event(4, 800), None).await.unwrap();

        let relocked = lifecycle
            .full_relock(&relock_event(4, 0, "relock:4"), None)
            .await
            .unwrap();
        assert_eq!(relocked.position().unwrap().amount, Amount::zero());

        let account = AccountKey::stake(&Address::new("0xwallet"), 4);
        assert_eq!(
            lifecycle.ledger().balance(&account, None).await.unwrap(),
            Amount::zero()
        );
        let entries = lifecycle.ledger().entries(&account, None).await.unwrap();
        assert_eq!(entries[1].delta, Amount::from(-800));
    }

    #[tokio::test]
    async fn test_full_relock_rejects_remaining_amount() {
        let (lifecycle, _temp) = setup().await;
        lifecycle.stake(&stake_event(4, 800), None).await.unwrap();

        let err = lifecycle
            .full_relock(&relock_event(4, 10, "relock:4"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidTransition(_)));

        let position = lifecycle.find_by_id(4, None).await.unwrap().unwrap();
        assert!(position.relocked_at.is_none());
        assert_eq!(position.amount, Amount::from(800));
    }

    #[tokio::test]
    async fn test_partial_relock_rejects_zero() {
        let (lifecycle, _temp) = setup().await;
        lifecycle.stake(&stake_event(4, 800), None).await.unwrap();
        let err = lifecycle
            .partial_relock(&relock_event(4, 0, "relock:4"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidTransition(_)));
    }

    #[tokio::test]
    async fn test_relock_after_unstake_or_withdraw_is_noop() {
        let (lifecycle, _temp) = setup().await;
        lifecycle.stake(&stake_event(10, 1000), None).await.unwrap();
        lifecycle
            .full_unstake(
                &UnstakeEvent {
                    position_id: 10,
                    remaining_amount: Amount::from(1000),
                    unstaked_at: TimeMs::new(3_000),
                    can_withdraw_after: TimeMs::new(4_000),
                    event_key: IdemKey::new("unstake:10"),
                },
                &Amount::from(1000),
                None,
            )
            .await
            .unwrap();

        assert_eq!(
            lifecycle
                .partial_relock(&relock_event(10, 5000, "relock:10a"), None)
                .await
                .unwrap(),
            Transition::Noop
        );

        lifecycle
            .withdraw(
                &WithdrawEvent {
                    position_id: 10,
                    withdrawn_at: TimeMs::new(6_000),
                    event_key: IdemKey::new("withdraw:10"),
                },
                None,
            )
            .await
            .unwrap();

        assert_eq!(
            lifecycle
                .partial_relock(&relock_event(10, 5000, "relock:10b"), None)
                .await
                .unwrap(),
            Transition::Noop
        );
        assert_eq!(
            lifecycle
                .full_relock(&relock_event(10, 0, "relock:10c"), None)
                .await
                .unwrap(),
            Transition::Noop
        );

        let position = lifecycle.find_by_id(10, None).await.unwrap().unwrap();
        assert_eq!(position.amount, Amount::from(1000));
        assert_eq!(position.state(), PositionState::Withdrawn);
        assert!(position.relocked_at.is_none());
        assert_eq!(position.unstaked_at, Some(TimeMs::new(3_000)));

        let account = AccountKey::stake(&position.wallet, 10);
        let kinds: Vec<EntryKind> = lifecycle
            .ledger()
            .entries(&account, None)
            .await
            .unwrap()
            .iter()
            .map(|e| e.kind)
            .collect();
        assert_eq!(
            kinds,
            vec![EntryKind::Stake, EntryKind::Unstake, EntryKind::Withdraw]
        );
    }

    #[tokio::test]
    async fn test_missing_position_is_noop() {
        let (lifecycle, _temp) = setup().await;
        let withdraw = WithdrawEvent {
            position_id: 99,
            withdrawn_at: TimeMs::new(9_000),
            event_key: IdemKey::new("withdraw:99"),
        };
        assert_eq!(
            lifecycle.withdraw(&withdraw, None).await.unwrap(),
            Transition::Noop
        );
        assert_eq!(
            lifecycle
                .full_relock(&relock_event(99, 0, "relock:99"), None)
                .await
                .unwrap(),
            Transition::Noop
        );
    }

    #[tokio::test]
    async fn test_reused_event_key_rolls_back_gate() {
        let (lifecycle, _temp) = setup().await;
        lifecycle.stake(&stake_event(6, 100), None).await.unwrap();

        // Same key as the stake entry on the same account.
        let err = lifecycle
            .full_relock(&relock_event(6, 0, "stake:6"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidTransition(_)));

        let position = lifecycle.find_by_id(6, None).await.unwrap().unwrap();
        assert!(position.relocked_at.is_none());
        assert_eq!(position.amount, Amount::from(100));
    }

    #[tokio::test]
    async fn test_all_staked_pages() {
        let (lifecycle, _temp) = setup().await;
        for id in 1..=5 {
            lifecycle.stake(&stake_event(id, 10), None).await.unwrap();
        }
        lifecycle
            .full_unstake(
                &UnstakeEvent {
                    position_id: 2,
                    remaining_amount: Amount::from(10),
                    unstaked_at: TimeMs::new(3_000),
                    can_withdraw_after: TimeMs::new(4_000),
                    event_key: IdemKey::new("unstake:2"),
                },
                &Amount::from(10),
                None,
            )
            .await
            .unwrap();

        let first = lifecycle.all_staked(None, 2).await.unwrap();
        let ids: Vec<i64> = first.positions.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![1, 3]);
        assert_eq!(first.next_cursor, Some(3));

        let second = lifecycle.all_staked(first.next_cursor, 2).await.unwrap();
        let ids: Vec<i64> = second.positions.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![4, 5]);

        let third = lifecycle.all_staked(second.next_cursor, 2).await.unwrap();
        assert!(third.positions.is_empty());
        assert_eq!(third.next_cursor, None);

        assert!(matches!(
            lifecycle.all_staked(None, 0).await,
            Err(LedgerError::InvalidArgument(_))
        ));
    }
}
