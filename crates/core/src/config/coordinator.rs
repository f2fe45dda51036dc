// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Coordinator configuration file
//!
//! ```toml
//! server_id = "node-a"
//!
//! [locking]
//! provider = "shared"
//! max_lease = "30m"
//! idle_eviction = "30m"
//! capacity = 10000
//! store_path = "/var/lib/wq/locks.json"
//!
//! [reclaim]
//! interval = "10m"
//! initial_delay = "10m"
//!
//! [cluster]
//! ha_enabled = true
//! primary = false
//! primary_registered = true
//!
//! [tunables]
//! "mvn.metadata.calculation.workers" = 4
//! ```

use super::tunables::Tunables;
use crate::coordination::{
    LockingProviderKind, MemoryLockConfig, ReclaimConfig, StaticMembership, DEFAULT_MAX_LEASE,
};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Errors loading or validating configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// `[locking]` section
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LockingConfig {
    /// `memory` or `shared` (`jvm` and `db` are accepted aliases)
    pub provider: String,
    /// Lease of a shared lock row
    #[serde(with = "humantime_serde")]
    pub max_lease: Duration,
    /// Idle time after which a memory lock handle is evicted
    #[serde(with = "humantime_serde")]
    pub idle_eviction: Duration,
    /// Maximum cached memory lock handles
    pub capacity: usize,
    /// Lock table file for the shared provider
    pub store_path: Option<PathBuf>,
}

impl Default for LockingConfig {
    fn default() -> Self {
        let memory = MemoryLockConfig::default();
        Self {
            provider: LockingProviderKind::Memory.to_string(),
            max_lease: DEFAULT_MAX_LEASE,
            idle_eviction: memory.idle_timeout,
            capacity: memory.capacity,
            store_path: None,
        }
    }
}

impl LockingConfig {
    pub fn kind(&self) -> Result<LockingProviderKind, ConfigError> {
        self.provider
            .parse()
            .map_err(|e: crate::coordination::LockError| ConfigError::Invalid(e.to_string()))
    }

    pub fn memory_config(&self) -> MemoryLockConfig {
        MemoryLockConfig::new()
            .with_idle_timeout(self.idle_eviction)
            .with_capacity(self.capacity)
    }
}

/// Top-level coordinator configuration
#[derive(Clone, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CoordinationConfig {
    /// Identity of this node in the shared lock table
    pub server_id: String,
    pub locking: LockingConfig,
    pub reclaim: ReclaimConfig,
    pub cluster: StaticMembership,
    pub tunables: Tunables,
}

impl Default for CoordinationConfig {
    fn default() -> Self {
        Self {
            server_id: uuid::Uuid::new_v4().to_string(),
            locking: LockingConfig::default(),
            reclaim: ReclaimConfig::default(),
            cluster: StaticMembership::default(),
            tunables: Tunables::default(),
        }
    }
}

impl CoordinationConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate the file at `path`
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server_id.trim().is_empty() {
            return Err(ConfigError::Invalid("server_id must not be empty".into()));
        }
        if self.locking.capacity == 0 {
            return Err(ConfigError::Invalid(
                "locking.capacity must be at least 1".into(),
            ));
        }
        if self.locking.max_lease.is_zero() {
            return Err(ConfigError::Invalid(
                "locking.max_lease must be positive".into(),
            ));
        }
        if self.locking.kind()? == LockingProviderKind::Shared && self.locking.store_path.is_none()
        {
            return Err(ConfigError::Invalid(
                "the shared locking provider requires locking.store_path".into(),
            ));
        }
        for key in self.tunables.unknown_keys() {
            tracing::warn!(key, "tunable is not read by any work queue");
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "coordinator_tests.rs"]
mod tests;
