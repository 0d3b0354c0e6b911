use crate::domain::{AccountKind, BalancePolicy};
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_path: String,
    pub pool: PoolSettings,
    pub ledger: LedgerConfig,
    pub retry: RetryPolicy,
}

/// SQLite pool sizing and lock-wait settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolSettings {
    pub max_connections: u32,
    pub busy_timeout: Duration,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_connections: 5,
            busy_timeout: Duration::from_millis(5000),
        }
    }
}

/// Per-kind balance floor. Kinds not listed stay `NonNegative`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerConfig {
    pub negative_balance_kinds: Vec<AccountKind>,
}

impl LedgerConfig {
    pub fn allow_negative(mut self, kind: AccountKind) -> Self {
        if !self.negative_balance_kinds.contains(&kind) {
            self.negative_balance_kinds.push(kind);
        }
        self
    }

    pub fn policy_for(&self, kind: AccountKind) -> BalancePolicy {
        if self.negative_balance_kinds.contains(&kind) {
            BalancePolicy::Unbounded
        } else {
            BalancePolicy::NonNegative
        }
    }
}

/// Bounded exponential retry for transient store conflicts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(50),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_map(std::env::vars().collect())
    }

    pub fn from_env_map(env_map: HashMap<String, String>) -> Result<Self, ConfigError> {
        let database_path = env_map
            .get("DATABASE_PATH")
            .cloned()
            .ok_or_else(|| ConfigError::MissingEnv("DATABASE_PATH".to_string()))?;

        let max_connections = env_map
            .get("DB_MAX_CONNECTIONS")
            .map(|s| s.as_str())
            .unwrap_or("5")
            .parse::<u32>()
            .ok()
            .filter(|n| *n > 0)
            .ok_or_else(|| {
                ConfigError::InvalidValue(
                    "DB_MAX_CONNECTIONS".to_string(),
                    "must be a positive u32".to_string(),
                )
            })?;

        let busy_timeout_ms = parse_u64(&env_map, "DB_BUSY_TIMEOUT_MS", "5000")?;
        let max_retries = env_map
            .get("SWAP_MAX_RETRIES")
            .map(|s| s.as_str())
            .unwrap_or("3")
            .parse::<u32>()
            .map_err(|_| {
                ConfigError::InvalidValue(
                    "SWAP_MAX_RETRIES".to_string(),
                    "must be a valid u32".to_string(),
                )
            })?;
        let base_delay_ms = parse_u64(&env_map, "SWAP_RETRY_BASE_DELAY_MS", "50")?;

        let negative_balance_kinds = parse_negative_balance_kinds(&env_map)?;

        Ok(Config {
            database_path,
            pool: PoolSettings {
                max_connections,
                busy_timeout: Duration::from_millis(busy_timeout_ms),
            },
            ledger: LedgerConfig {
                negative_balance_kinds,
            },
            retry: RetryPolicy {
                max_retries,
                base_delay: Duration::from_millis(base_delay_ms),
            },
        })
    }
}

fn parse_u64(
    env_map: &HashMap<String, String>,
    key: &str,
    default: &str,
) -> Result<u64, ConfigError> {
    env_map
        .get(key)
        .map(|s| s.as_str())
        .unwrap_or(default)
        .parse::<u64>()
        .map_err(|_| ConfigError::InvalidValue(key.to_string(), "must be a valid u64".to_string()))
}

fn parse_negative_balance_kinds(
    env_map: &HashMap<String, String>,
) -> Result<Vec<AccountKind>, ConfigError> {
    let Some(raw) = env_map.get("NEGATIVE_BALANCE_KINDS") else {
        return Ok(Vec::new());
    };

    let mut kinds = Vec::new();
    for part in raw.split(',').map(|s| s.trim()).filter(|s| !s.is_empty()) {
        let kind = part.parse::<AccountKind>().map_err(|_| {
            ConfigError::InvalidValue(
                "NEGATIVE_BALANCE_KINDS".to_string(),
                format!("must be a list of boost, trading, or stake, got {}", part),
            )
        })?;
        if !kinds.contains(&kind) {
            kinds.push(kind);
        }
    }
    Ok(kinds)
}
