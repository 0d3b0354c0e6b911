//! Staked positions and the upstream events that move them through their lifecycle.

use super::{Address, Amount, IdemKey, TimeMs};
use serde::{Deserialize, Serialize};

/// A staked position. `id` is assigned upstream, never generated here.
///
/// The nullable timestamps are one-way gates: once set they are never cleared.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    pub id: i64,
    pub wallet: Address,
    pub amount: Amount,
    pub staked_at: TimeMs,
    pub can_unstake_after: TimeMs,
    pub unstaked_at: Option<TimeMs>,
    pub can_withdraw_after: Option<TimeMs>,
    pub withdrawn_at: Option<TimeMs>,
    pub relocked_at: Option<TimeMs>,
}

/// Lifecycle state derived from which gates are set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionState {
    Staked,
    PartiallyUnstaked,
    FullyUnstaked,
    Relocked,
    Withdrawn,
}

impl Position {
    pub fn state(&self) -> PositionState {
        if self.withdrawn_at.is_some() {
            PositionState::Withdrawn
        } else if self.relocked_at.is_some() {
            PositionState::Relocked
        } else if self.unstaked_at.is_some() {
            PositionState::FullyUnstaked
        } else if self.can_withdraw_after.is_some() {
            PositionState::PartiallyUnstaked
        } else {
            PositionState::Staked
        }
    }

    /// Still counted as staked (the prior stake period has not been closed).
    pub fn is_staked(&self) -> bool {
        self.unstaked_at.is_none()
    }
}

/// A new stake observed upstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StakeEvent {
    pub position_id: i64,
    pub wallet: Address,
    pub amount: Amount,
    pub staked_at: TimeMs,
    pub can_unstake_after: TimeMs,
    pub event_key: IdemKey,
}

/// An unstake (partial or full). `remaining_amount` is what stays staked afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnstakeEvent {
    pub position_id: i64,
    pub remaining_amount: Amount,
    pub unstaked_at: TimeMs,
    pub can_withdraw_after: TimeMs,
    pub event_key: IdemKey,
}

/// A relock. `updated_amount` is the amount staked after the relock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelockEvent {
    pub position_id: i64,
    pub updated_amount: Amount,
    pub relocked_at: TimeMs,
    pub event_key: IdemKey,
}

/// A withdrawal of previously unstaked funds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WithdrawEvent {
    pub position_id: i64,
    pub withdrawn_at: TimeMs,
    pub event_key: IdemKey,
}
