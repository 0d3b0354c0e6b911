//! Journal change entries and the mutation request that produces them.

use super::{AccountKey, Amount, IdemKey, TimeMs};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Tag recorded on each journal row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EntryKind {
    Credit,
    Debit,
    BoostSpend,
    Stake,
    Unstake,
    Relock,
    Withdraw,
    TradeDebit,
    TradeCredit,
}

impl EntryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::Credit => "credit",
            EntryKind::Debit => "debit",
            EntryKind::BoostSpend => "boost-spend",
            EntryKind::Stake => "stake",
            EntryKind::Unstake => "unstake",
            EntryKind::Relock => "relock",
            EntryKind::Withdraw => "withdraw",
            EntryKind::TradeDebit => "trade-debit",
            EntryKind::TradeCredit => "trade-credit",
        }
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntryKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "credit" => EntryKind::Credit,
            "debit" => EntryKind::Debit,
            "boost-spend" => EntryKind::BoostSpend,
            "stake" => EntryKind::Stake,
            "unstake" => EntryKind::Unstake,
            "relock" => EntryKind::Relock,
            "withdraw" => EntryKind::Withdraw,
            "trade-debit" => EntryKind::TradeDebit,
            "trade-credit" => EntryKind::TradeCredit,
            other => return Err(format!("unknown entry kind {}", other)),
        })
    }
}

/// Immutable journal row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEntry {
    pub id: i64,
    pub account_key: String,
    pub delta: Amount,
    pub kind: EntryKind,
    pub idem_key: IdemKey,
    pub metadata: serde_json::Value,
    pub created_at: TimeMs,
}

/// A requested increase or decrease of one account.
///
/// `amount` is the unsigned magnitude; direction comes from the operation.
#[derive(Debug, Clone)]
pub struct Change {
    pub account: AccountKey,
    pub amount: Amount,
    pub key: IdemKey,
    pub kind: Option<EntryKind>,
    pub metadata: serde_json::Value,
}

impl Change {
    pub fn new(account: AccountKey, amount: impl Into<Amount>, key: impl Into<IdemKey>) -> Self {
        Self {
            account,
            amount: amount.into(),
            key: key.into(),
            kind: None,
            metadata: serde_json::Value::Null,
        }
    }

    /// Override the default `credit`/`debit` tag.
    pub fn kind(mut self, kind: EntryKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}
