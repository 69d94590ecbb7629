//! Engine Configuration
//!
//! Configured externally (file, env, CLI), immutable after startup.
//! Only the initial role comes from config; later role changes arrive
//! as assignments from the cluster controller, never from disk.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::codec::{SUB_PART_VERSION_CURRENT, SUB_PART_VERSION_MIN};
use crate::role::HaRole;

/// Errors loading or validating the engine configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Result type for config operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Static configuration of one replication engine instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Unique identity of this replica.
    pub node_id: Uuid,

    /// Role at startup. Changes after startup come through
    /// [`crate::role::RoleController::assign`].
    pub initial_role: HaRole,

    /// Oldest sub-part version this build still speaks.
    pub version_min: u16,

    /// Newest sub-part version this build speaks.
    pub version_max: u16,

    /// Whether periodic digest verification runs at all.
    pub warm_sync_enabled: bool,

    /// Interval between warm-sync digest checks.
    pub warm_sync_interval_ms: u64,

    /// How long the standby waits for a snapshot chunk or data response
    /// before restarting the exchange.
    pub chunk_timeout_ms: u64,

    /// Capacity of the unacknowledged async update queue.
    pub queue_capacity: usize,

    /// Acknowledged history retained in the sent-message replay log.
    pub replay_depth: usize,
}

impl EngineConfig {
    /// Fresh config with a generated node identity and the given role.
    pub fn new(initial_role: HaRole) -> Self {
        Self {
            node_id: Uuid::new_v4(),
            initial_role,
            version_min: SUB_PART_VERSION_MIN.get(),
            version_max: SUB_PART_VERSION_CURRENT.get(),
            warm_sync_enabled: true,
            warm_sync_interval_ms: 10_000,
            chunk_timeout_ms: 3_000,
            queue_capacity: 1024,
            replay_depth: 512,
        }
    }

    /// Load and validate a JSON config file.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let raw = fs::read_to_string(path)?;
        let config: EngineConfig = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Persist as pretty-printed JSON.
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        let raw = serde_json::to_string_pretty(self)?;
        fs::write(path, raw)?;
        Ok(())
    }

    /// Validate field ranges and cross-field constraints.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.version_min < SUB_PART_VERSION_MIN.get() {
            return Err(ConfigError::Invalid(format!(
                "version_min {} is below the oldest supported version {}",
                self.version_min,
                SUB_PART_VERSION_MIN.get()
            )));
        }
        if self.version_max > SUB_PART_VERSION_CURRENT.get() {
            return Err(ConfigError::Invalid(format!(
                "version_max {} is beyond this build's newest version {}",
                self.version_max,
                SUB_PART_VERSION_CURRENT.get()
            )));
        }
        if self.version_min > self.version_max {
            return Err(ConfigError::Invalid(format!(
                "version_min {} exceeds version_max {}",
                self.version_min, self.version_max
            )));
        }
        if self.warm_sync_enabled && self.warm_sync_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "warm_sync_interval_ms must be positive when warm sync is enabled".to_string(),
            ));
        }
        if self.chunk_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "chunk_timeout_ms must be positive".to_string(),
            ));
        }
        if self.queue_capacity == 0 {
            return Err(ConfigError::Invalid(
                "queue_capacity must be positive".to_string(),
            ));
        }
        if self.replay_depth == 0 {
            return Err(ConfigError::Invalid(
                "replay_depth must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new(HaRole::Standby)
    }
}
