//! Account identity, balance policy and idempotency keys.

use super::{Address, Amount, CompetitionId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// What an account holds. Drives the balance floor policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountKind {
    /// Voting credits per user per competition.
    Boost,
    /// Token balance per agent per competition.
    Trading,
    /// Tracked amount of a single staked position.
    Stake,
}

impl AccountKind {
    pub const ALL: [AccountKind; 3] = [AccountKind::Boost, AccountKind::Trading, AccountKind::Stake];

    pub fn as_str(&self) -> &'static str {
        match self {
            AccountKind::Boost => "boost",
            AccountKind::Trading => "trading",
            AccountKind::Stake => "stake",
        }
    }
}

impl fmt::Display for AccountKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccountKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "boost" => Ok(AccountKind::Boost),
            "trading" => Ok(AccountKind::Trading),
            "stake" => Ok(AccountKind::Stake),
            other => Err(format!("unknown account kind {}", other)),
        }
    }
}

/// Lower bound a decrease may not cross.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BalancePolicy {
    /// Balance must stay >= 0.
    #[default]
    NonNegative,
    /// Balance may go below zero.
    Unbounded,
}

impl BalancePolicy {
    /// Whether a resulting balance is allowed under this policy.
    pub fn permits(&self, resulting: &Amount) -> bool {
        match self {
            BalancePolicy::NonNegative => !resulting.is_negative(),
            BalancePolicy::Unbounded => true,
        }
    }
}

/// Composite account identity: owner x scope, tagged with its kind.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AccountKey {
    pub kind: AccountKind,
    pub owner: String,
    pub scope: String,
}

impl AccountKey {
    pub fn new(kind: AccountKind, owner: impl Into<String>, scope: impl Into<String>) -> Self {
        Self {
            kind,
            owner: owner.into(),
            scope: scope.into(),
        }
    }

    /// Boost credits of a user within a competition.
    pub fn boost(user: &Address, competition: &CompetitionId) -> Self {
        Self::new(AccountKind::Boost, user.as_str(), competition.as_str())
    }

    /// Balance of one token held by an agent within a competition.
    pub fn trading(agent: &Address, token: &Address, competition: &CompetitionId) -> Self {
        Self::new(
            AccountKind::Trading,
            agent.as_str(),
            format!(
                "{}/{}",
                escape(competition.as_str(), &['/']),
                escape(token.as_str(), &['/'])
            ),
        )
    }

    /// Tracked amount of a staked position.
    pub fn stake(wallet: &Address, position_id: i64) -> Self {
        Self::new(AccountKind::Stake, wallet.as_str(), position_id.to_string())
    }

    /// Canonical storage key: `{kind}:{owner}@{scope}`.
    ///
    /// `%`, `:` and `@` inside owner and scope are percent-escaped, so distinct
    /// keys never collapse onto one row.
    pub fn storage_key(&self) -> String {
        format!(
            "{}:{}@{}",
            self.kind,
            escape(&self.owner, &[':', '@']),
            escape(&self.scope, &[':', '@'])
        )
    }
}

/// Percent-escape `%` and each reserved character.
fn escape(raw: &str, reserved: &[char]) -> String {
    if !raw.contains(|c: char| c == '%' || reserved.contains(&c)) {
        return raw.to_string();
    }
    let mut out = String::with_capacity(raw.len() + 4);
    for c in raw.chars() {
        if c == '%' || reserved.contains(&c) {
            out.push_str(&format!("%{:02X}", c as u32));
        } else {
            out.push(c);
        }
    }
    out
}

impl fmt::Display for AccountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.storage_key())
    }
}

/// Opaque idempotency key. Unique per logical operation per account.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdemKey(String);

impl IdemKey {
    pub fn new(raw: impl Into<String>) -> Self {
        IdemKey(raw.into())
    }

    /// Start a debuggable key of the form `{op}:{k1}={v1}&{k2}={v2}`.
    pub fn builder(operation: &str) -> IdemKeyBuilder {
        IdemKeyBuilder {
            operation: operation.to_string(),
            parts: Vec::new(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for IdemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for IdemKey {
    fn from(value: &str) -> Self {
        IdemKey::new(value)
    }
}

impl From<String> for IdemKey {
    fn from(value: String) -> Self {
        IdemKey(value)
    }
}

/// Builder for natural-key idempotency keys. Parts keep insertion order.
#[derive(Debug, Clone)]
pub struct IdemKeyBuilder {
    operation: String,
    parts: Vec<(String, String)>,
}

impl IdemKeyBuilder {
    pub fn with(mut self, key: &str, value: impl fmt::Display) -> Self {
        self.parts.push((key.to_string(), value.to_string()));
        self
    }

    pub fn build(self) -> IdemKey {
        let natural = self
            .parts
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&");
        IdemKey(format!("{}:{}", self.operation, natural))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_keys() {
        let user = Address::new("0xAB");
        let comp = CompetitionId::new("c1");
        let token = Address::new("0xT0");

        assert_eq!(AccountKey::boost(&user, &comp).storage_key(), "boost:0xab@c1");
        assert_eq!(
            AccountKey::trading(&user, &token, &comp).storage_key(),
            "trading:0xab@c1/0xt0"
        );
        assert_eq!(AccountKey::stake(&user, 5).storage_key(), "stake:0xab@5");
    }

    #[test]
    fn test_storage_keys_do_not_collide_on_separators() {
        let a = AccountKey::new(AccountKind::Boost, "u@x", "c");
        let b = AccountKey::new(AccountKind::Boost, "u", "x@c");
        assert_ne!(a.storage_key(), b.storage_key());
        assert_eq!(a.storage_key(), "boost:u%40x@c");

        let c = AccountKey::new(AccountKind::Boost, "u:1", "c");
        let d = AccountKey::new(AccountKind::Boost, "u%3A1", "c");
        assert_ne!(c.storage_key(), d.storage_key());

        let agent = Address::new("0xa");
        let t1 = AccountKey::trading(&agent, &Address::new("c"), &CompetitionId::new("a/b"));
        let t2 = AccountKey::trading(&agent, &Address::new("b/c"), &CompetitionId::new("a"));
        assert_ne!(t1, t2);
        assert_ne!(t1.storage_key(), t2.storage_key());
    }

    #[test]
    fn test_account_kind_roundtrip() {
        for kind in AccountKind::ALL {
            assert_eq!(kind.as_str().parse::<AccountKind>().unwrap(), kind);
        }
        assert!("savings".parse::<AccountKind>().is_err());
    }

    #[test]
    fn test_idem_key_builder_format() {
        let key = IdemKey::builder("award-boost")
            .with("user", "0xab")
            .with("competition", "c1")
            .build();
        assert_eq!(key.as_str(), "award-boost:user=0xab&competition=c1");
    }

    #[test]
    fn test_balance_policy() {
        assert!(BalancePolicy::NonNegative.permits(&Amount::zero()));
        assert!(!BalancePolicy::NonNegative.permits(&Amount::from(-1)));
        assert!(BalancePolicy::Unbounded.permits(&Amount::from(-1)));
    }

    #[test]
    fn test_idem_key_empty() {
        assert!(IdemKey::new("  ").is_empty());
        assert!(!IdemKey::new("k").is_empty());
    }
}
