//! Balance-mutation engines built on the ledger store.
//!
//! - `ledger` - idempotent increase/decrease, balance reads and reconciliation
//! - `lifecycle` - the staked position state machine
//! - `swap` - two-legged trades with ordered legs and bounded retry
//! - `retry` - backoff helpers shared by the engines

pub mod ledger;
pub mod lifecycle;
pub mod retry;
pub mod swap;

pub use ledger::{BalanceChange, LedgerEngine, Reconciliation};
pub use lifecycle::{PositionLifecycle, StakedPage, Transition};
pub use retry::{with_retry, BoundedBackoff};
pub use swap::{LexicographicOrder, LockOrder, SwapBalances, SwapCoordinator, SwapOutcome};
