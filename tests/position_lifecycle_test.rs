use balance_ledger::db::init_db;
use balance_ledger::{
    AccountKey, Address, Amount, EntryKind, IdemKey, LedgerConfig, LedgerEngine, LedgerError,
    PositionLifecycle, PositionState, RelockEvent, StakeEvent, TimeMs, Transition, UnstakeEvent,
    WithdrawEvent,
};
use tempfile::TempDir;

const WALLET: &str = "0x00000000000000000000000000000000000000aa";

async fn setup_lifecycle() -> (PositionLifecycle, TempDir) {
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

fn stake(id: i64, amount: i64) -> StakeEvent {
    StakeEvent {
        position_id: id,
        wallet: Address::new(WALLET),
        amount: Amount::from(amount),
        staked_at: TimeMs::new(1_700_000_000_000),
        can_unstake_after: TimeMs::new(1_700_086_400_000),
        event_key: IdemKey::new(format!("0xstaketx:{}", id)),
    }
}

fn unstake(id: i64, remaining: i64, tx_hash: &str) -> UnstakeEvent {
    UnstakeEvent {
        position_id: id,
        remaining_amount: Amount::from(remaining),
        unstaked_at: TimeMs::new(1_700_100_000_000),
        can_withdraw_after: TimeMs::new(1_700_200_000_000),
        event_key: IdemKey::new(tx_hash),
    }
}

fn stake_account(id: i64) -> AccountKey {
    AccountKey::stake(&Address::new(WALLET), id)
}

#[tokio::test]
async fn test_partial_then_full_unstake_sequence() {
    let (lifecycle, _temp) = setup_lifecycle().await;
    let previous = Amount::from(1000);

    lifecycle.stake(&stake(1, 1000), None).await.unwrap();

    let first = lifecycle
        .partial_unstake(&unstake(1, 700, "0xunstake-a"), &previous, None)
        .await
        .unwrap();
    assert!(first.is_applied());

    // Same upstream event delivered again.
    let replay = lifecycle
        .partial_unstake(&unstake(1, 700, "0xunstake-a"), &previous, None)
        .await
        .unwrap();
    assert_eq!(replay, Transition::Noop);

    let position = lifecycle.find_by_id(1, None).await.unwrap().unwrap();
    assert_eq!(position.amount, Amount::from(700));
    assert_eq!(position.state(), PositionState::PartiallyUnstaked);

    let entries = lifecycle.ledger().entries(&stake_account(1), None).await.unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[1].delta, Amount::from(-300));
    assert_eq!(entries[1].kind, EntryKind::Unstake);

    let full = lifecycle
        .full_unstake(&unstake(1, 700, "0xunstake-b"), &Amount::from(700), None)
        .await
        .unwrap();
    let position = full.position().unwrap();
    assert_eq!(position.unstaked_at, Some(TimeMs::new(1_700_100_000_000)));
    assert_eq!(position.amount, Amount::from(700));
    assert_eq!(position.state(), PositionState::FullyUnstaked);

    let repeat = lifecycle
        .full_unstake(&unstake(1, 700, "0xunstake-b"), &Amount::from(700), None)
        .await
        .unwrap();
    assert_eq!(repeat, Transition::Noop);

    let entries = lifecycle.ledger().entries(&stake_account(1), None).await.unwrap();
    assert_eq!(entries.len(), 3);
    assert!(entries[2].delta.is_zero());
    assert_eq!(
        lifecycle.ledger().balance(&stake_account(1), None).await.unwrap(),
        Amount::from(700)
    );
}

#[tokio::test]
async fn test_stake_then_full_unstake_writes_two_entries() {
    let (lifecycle, _temp) = setup_lifecycle().await;
    lifecycle.stake(&stake(5, 250), None).await.unwrap();

    let event = unstake(5, 250, "0xunstake-5");
    lifecycle
        .full_unstake(&event, &Amount::from(250), None)
        .await
        .unwrap();
    assert_eq!(
        lifecycle
            .full_unstake(&event, &Amount::from(250), None)
            .await
            .unwrap(),
        Transition::Noop
    );

    let entries = lifecycle.ledger().entries(&stake_account(5), None).await.unwrap();
    let deltas: Vec<Amount> = entries.iter().map(|e| e.delta.clone()).collect();
    assert_eq!(deltas, vec![Amount::from(250), Amount::zero()]);
}

#[tokio::test]
async fn test_partial_unstake_rejects_non_negative_delta() {
    let (lifecycle, _temp) = setup_lifecycle().await;
    lifecycle.stake(&stake(2, 1000), None).await.unwrap();

    for remaining in [1000, 1200] {
        let err = lifecycle
            .partial_unstake(&unstake(2, remaining, "0xbad"), &Amount::from(1000), None)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidTransition(_)));
    }

    let position = lifecycle.find_by_id(2, None).await.unwrap().unwrap();
    assert_eq!(position.state(), PositionState::Staked);
    assert_eq!(
        lifecycle.ledger().entries(&stake_account(2), None).await.unwrap().len(),
        1
    );
}

#[tokio::test]
async fn test_full_unstake_rejects_changed_amount() {
    let (lifecycle, _temp) = setup_lifecycle().await;
    lifecycle.stake(&stake(3, 1000), None).await.unwrap();

    let err = lifecycle
        .full_unstake(&unstake(3, 900, "0xbad"), &Amount::from(1000), None)
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::InvalidTransition(_)));
    assert!(lifecycle
        .find_by_id(3, None)
        .await
        .unwrap()
        .unwrap()
        .unstaked_at
        .is_none());
}

#[tokio::test]
async fn test_partial_unstake_of_unknown_position_is_noop() {
    let (lifecycle, _temp) = setup_lifecycle().await;
    let outcome = lifecycle
        .partial_unstake(&unstake(42, 10, "0xlate"), &Amount::from(20), None)
        .await
        .unwrap();
    assert_eq!(outcome, Transition::Noop);
}

#[tokio::test]
async fn test_unstake_then_withdraw() {
    let (lifecycle, _temp) = setup_lifecycle().await;
    lifecycle.stake(&stake(7, 400), None).await.unwrap();
    lifecycle
        .full_unstake(&unstake(7, 400, "0xunstake-7"), &Amount::from(400), None)
        .await
        .unwrap();

    let event = WithdrawEvent {
        position_id: 7,
        withdrawn_at: TimeMs::new(1_700_300_000_000),
        event_key: IdemKey::new("0xwithdraw-7"),
    };
    let withdrawn = lifecycle.withdraw(&event, None).await.unwrap();
    assert_eq!(withdrawn.position().unwrap().state(), PositionState::Withdrawn);
    assert_eq!(lifecycle.withdraw(&event, None).await.unwrap(), Transition::Noop);

    let entries = lifecycle.ledger().entries(&stake_account(7), None).await.unwrap();
    assert_eq!(entries.len(), 3);
    assert_eq!(entries[2].kind, EntryKind::Withdraw);
    assert!(entries[2].delta.is_zero());
}

#[tokio::test]
async fn test_relock_after_partial_unstake_tracks_amount() {
    let (lifecycle, _temp) = setup_lifecycle().await;
    lifecycle.stake(&stake(8, 1000), None).await.unwrap();
    lifecycle
        .partial_unstake(&unstake(8, 600, "0xunstake-8"), &Amount::from(1000), None)
        .await
        .unwrap();

    let relock = RelockEvent {
        position_id: 8,
        updated_amount: Amount::from(900),
        relocked_at: TimeMs::new(1_700_400_000_000),
        event_key: IdemKey::new("0xrelock-8"),
    };
    let outcome = lifecycle.partial_relock(&relock, None).await.unwrap();
    let position = outcome.position().unwrap();
    assert_eq!(position.amount, Amount::from(900));
    assert_eq!(position.relocked_at, Some(TimeMs::new(1_700_400_000_000)));
    assert_eq!(position.unstaked_at, Some(TimeMs::new(1_700_400_000_000)));
    assert!(!position.is_staked());

    let account = stake_account(8);
    let reconciliation = lifecycle.ledger().reconcile(&account, None).await.unwrap();
    assert!(reconciliation.is_consistent());
    assert_eq!(reconciliation.journal, Amount::from(900));

    // Relocked positions leave the staked set.
    let page = lifecycle.all_staked(None, 10).await.unwrap();
    assert!(page.positions.iter().all(|p| p.id != 8));
}

#[tokio::test]
async fn test_lifecycle_inside_caller_transaction() {
    let (lifecycle, _temp) = setup_lifecycle().await;

    let mut tx = lifecycle.ledger().pool().begin().await.unwrap();
    lifecycle.stake(&stake(9, 100), Some(&mut *tx)).await.unwrap();
    assert!(lifecycle.find_by_id(9, Some(&mut *tx)).await.unwrap().is_some());
    tx.rollback().await.unwrap();

    assert!(lifecycle.find_by_id(9, None).await.unwrap().is_none());
    assert!(lifecycle
        .ledger()
        .entries(&stake_account(9), None)
        .await
        .unwrap()
        .is_empty());
}
