//! Two-legged trades applied by the swap coordinator.

use super::{AccountKey, Address, Amount, CompetitionId, TimeMs};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A requested trade: spend `from_amount` of `from_token`, receive `to_amount` of `to_token`.
///
/// A zero `to_amount` is a burn: only the debit leg is applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeSpec {
    pub id: Uuid,
    pub agent: Address,
    pub competition: CompetitionId,
    pub from_token: Address,
    pub to_token: Address,
    pub from_amount: Amount,
    pub to_amount: Amount,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl TradeSpec {
    pub fn from_account(&self) -> AccountKey {
        AccountKey::trading(&self.agent, &self.from_token, &self.competition)
    }

    pub fn to_account(&self) -> AccountKey {
        AccountKey::trading(&self.agent, &self.to_token, &self.competition)
    }

    pub fn is_burn(&self) -> bool {
        self.to_amount.is_zero()
    }
}

/// A persisted trade row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeRecord {
    pub id: Uuid,
    pub agent: Address,
    pub competition: CompetitionId,
    pub from_token: Address,
    pub to_token: Address,
    pub from_amount: Amount,
    pub to_amount: Amount,
    pub metadata: serde_json::Value,
    pub created_at: TimeMs,
}

impl TradeRecord {
    pub fn from_spec(spec: &TradeSpec, created_at: TimeMs) -> Self {
        Self {
            id: spec.id,
            agent: spec.agent.clone(),
            competition: spec.competition.clone(),
            from_token: spec.from_token.clone(),
            to_token: spec.to_token.clone(),
            from_amount: spec.from_amount.clone(),
            to_amount: spec.to_amount.clone(),
            metadata: spec.metadata.clone(),
            created_at,
        }
    }
}
