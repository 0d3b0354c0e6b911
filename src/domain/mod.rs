//! Domain types for the balance ledger.
//!
//! This module provides:
//! - Arbitrary-precision integer amounts
//! - Domain primitives: TimeMs, Address, CompetitionId
//! - Account identity, balance policy and idempotency keys
//! - Journal entries, staked positions and trades

pub mod account;
pub mod amount;
pub mod entry;
pub mod position;
pub mod primitives;
pub mod trade;

pub use account::{AccountKey, AccountKind, BalancePolicy, IdemKey, IdemKeyBuilder};
pub use amount::{Amount, ParseAmountError};
pub use entry::{Change, ChangeEntry, EntryKind};
pub use position::{
    Position, PositionState, RelockEvent, StakeEvent, UnstakeEvent, WithdrawEvent,
};
pub use primitives::{Address, CompetitionId, TimeMs};
pub use trade::{TradeRecord, TradeSpec};
