//! Node configuration with TOML file support.

use serde::{Deserialize, Serialize};
use std::path::Path;

use kestrel_ledger::{Exceptions, GenesisConfig};
use kestrel_types::{Milestone, Milestones, NetworkId};

use crate::logging::LogFormat;
use crate::NodeError;

/// Configuration for a Kestrel chain core.
///
/// Can be loaded from a TOML file via [`NodeConfig::from_toml_file`] or
/// built programmatically (e.g. for tests).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Which network to follow. Selects the default milestones.
    #[serde(default = "default_network")]
    pub network: NetworkId,

    /// Log format: "human" or "json".
    #[serde(default = "default_log_format")]
    pub log_format: String,

    /// Log level filter: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Capacity of the in-memory recent-block cache.
    #[serde(default = "default_recent_blocks")]
    pub recent_blocks: usize,

    /// Milestone schedule override. Empty means the network default.
    #[serde(default)]
    pub milestones: Vec<Milestone>,

    #[serde(default)]
    pub database_rollback: DatabaseRollbackConfig,

    #[serde(default)]
    pub pool: PoolConfig,

    #[serde(default)]
    pub exceptions: ExceptionsConfig,

    /// Balances seeded before the genesis block is applied.
    #[serde(default)]
    pub genesis: GenesisConfig,
}

/// Bounds of the database rollback loop.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseRollbackConfig {
    /// Most blocks removed before giving up.
    #[serde(default = "default_max_block_rewind")]
    pub max_block_rewind: u64,

    /// Blocks removed per integrity check.
    #[serde(default = "default_steps")]
    pub steps: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Serialized size budget of one block's transactions.
    #[serde(default = "default_max_transaction_bytes")]
    pub max_transaction_bytes: usize,
}

/// Transactions force-applied without validation.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExceptionsConfig {
    /// Hex transaction ids.
    #[serde(default)]
    pub transactions: Vec<String>,
}

// ── Serde default helpers ──────────────────────────────────────────────

fn default_network() -> NetworkId {
    NetworkId::Dev
}

fn default_log_format() -> String {
    "human".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_recent_blocks() -> usize {
    100
}

fn default_max_block_rewind() -> u64 {
    20
}

fn default_steps() -> u64 {
    5
}

fn default_max_transaction_bytes() -> usize {
    2 * 1024 * 1024
}

// ── Impl ───────────────────────────────────────────────────────────────

impl NodeConfig {
    /// Load configuration from a TOML file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, NodeError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| NodeError::Config(e.to_string()))?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self, NodeError> {
        let config: Self = toml::from_str(s).map_err(|e| NodeError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize the configuration to a TOML string.
    pub fn to_toml_string(&self) -> Result<String, NodeError> {
        toml::to_string_pretty(self).map_err(|e| NodeError::Config(e.to_string()))
    }

    fn validate(&self) -> Result<(), NodeError> {
        if self.database_rollback.steps == 0 {
            return Err(NodeError::Config("database_rollback.steps must be positive".into()));
        }
        if self.recent_blocks == 0 {
            return Err(NodeError::Config("recent_blocks must be positive".into()));
        }
        self.log_format()?;
        self.milestones()?;
        self.exceptions()?;
        Ok(())
    }

    /// The configured schedule, or the network default when none is set.
    pub fn milestones(&self) -> Result<Milestones, NodeError> {
        if self.milestones.is_empty() {
            return Ok(Milestones::for_network(self.network));
        }
        Milestones::new(self.milestones.clone()).map_err(|e| NodeError::Config(e.to_string()))
    }

    pub fn exceptions(&self) -> Result<Exceptions, NodeError> {
        Exceptions::from_hex(&self.exceptions.transactions)
            .map_err(|e| NodeError::Config(format!("exceptions: {e}")))
    }

    pub fn log_format(&self) -> Result<LogFormat, NodeError> {
        match self.log_format.as_str() {
            "human" => Ok(LogFormat::Human),
            "json" => Ok(LogFormat::Json),
            other => Err(NodeError::Config(format!("unknown log format {other:?}"))),
        }
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            network: default_network(),
            log_format: default_log_format(),
            log_level: default_log_level(),
            recent_blocks: default_recent_blocks(),
            milestones: Vec::new(),
            database_rollback: DatabaseRollbackConfig::default(),
            pool: PoolConfig::default(),
            exceptions: ExceptionsConfig::default(),
            genesis: GenesisConfig::default(),
        }
    }
}

impl Default for DatabaseRollbackConfig {
    fn default() -> Self {
        Self {
            max_block_rewind: default_max_block_rewind(),
            steps: default_steps(),
        }
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self { max_transaction_bytes: default_max_transaction_bytes() }
    }
}
