pub mod config;
pub mod db;
pub mod domain;
pub mod engine;
pub mod error;

pub use config::{Config, LedgerConfig, PoolSettings, RetryPolicy};
pub use db::{init_db, init_db_with, UnitOfWork};
pub use domain::{
    AccountKey, AccountKind, Address, Amount, BalancePolicy, Change, ChangeEntry, CompetitionId,
    EntryKind, IdemKey, Position, PositionState, RelockEvent, StakeEvent, TimeMs, TradeRecord,
    TradeSpec, UnstakeEvent, WithdrawEvent,
};
pub use engine::{
    BalanceChange, LedgerEngine, LexicographicOrder, LockOrder, PositionLifecycle,
    Reconciliation, StakedPage, SwapBalances, SwapCoordinator, SwapOutcome, Transition,
};
pub use error::LedgerError;
