// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Periodic reclamation of expired locks
//!
//! Every node evicts its own stale lock state. Cluster-wide cleanup of the
//! shared table runs only on the primary of an HA cluster, or on any node
//! while no primary is registered.

use super::provider::LockReclaim;
use crate::panic::panic_message;
use serde::{Deserialize, Serialize};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Cluster membership as seen by this node
pub trait ClusterMembership: Send + Sync {
    fn is_ha_enabled(&self) -> bool;
    fn is_primary(&self) -> bool;
    /// Whether any node is currently registered as primary
    fn has_active_primary(&self) -> bool;
}

/// A single node outside any cluster
#[derive(Clone, Copy, Debug, Default)]
pub struct StandaloneMembership;

impl ClusterMembership for StandaloneMembership {
    fn is_ha_enabled(&self) -> bool {
        false
    }

    fn is_primary(&self) -> bool {
        false
    }

    fn has_active_primary(&self) -> bool {
        false
    }
}

/// Membership fixed at startup from configuration
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StaticMembership {
    pub ha_enabled: bool,
    pub primary: bool,
    pub primary_registered: bool,
}

impl ClusterMembership for StaticMembership {
    fn is_ha_enabled(&self) -> bool {
        self.ha_enabled
    }

    fn is_primary(&self) -> bool {
        self.primary
    }

    fn has_active_primary(&self) -> bool {
        self.primary_registered || (self.ha_enabled && self.primary)
    }
}

/// Schedule of the reclamation job
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ReclaimConfig {
    /// Delay between the end of one run and the start of the next
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
    /// Delay before the first run
    #[serde(with = "humantime_serde")]
    pub initial_delay: Duration,
}

impl Default for ReclaimConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10 * 60),
            initial_delay: Duration::from_secs(10 * 60),
        }
    }
}

impl ReclaimConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_initial_delay(mut self, initial_delay: Duration) -> Self {
        self.initial_delay = initial_delay;
        self
    }
}

/// What one cleanup step did
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StepOutcome {
    Skipped,
    Reclaimed { count: usize },
    Failed { error: String },
}

impl StepOutcome {
    pub fn reclaimed(&self) -> usize {
        match self {
            StepOutcome::Reclaimed { count } => *count,
            _ => 0,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, StepOutcome::Failed { .. })
    }
}

/// Result of one reclamation run
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ReclaimReport {
    pub shared: StepOutcome,
    pub local: StepOutcome,
}

/// Background job releasing locks whose holders are gone
pub struct ExpiredLockReclaimer {
    config: ReclaimConfig,
    membership: Arc<dyn ClusterMembership>,
    targets: Arc<dyn LockReclaim>,
}

impl ExpiredLockReclaimer {
    pub fn new(
        config: ReclaimConfig,
        membership: Arc<dyn ClusterMembership>,
        targets: Arc<dyn LockReclaim>,
    ) -> Self {
        Self {
            config,
            membership,
            targets,
        }
    }

    pub fn config(&self) -> &ReclaimConfig {
        &self.config
    }

    /// Whether this node is responsible for the shared table
    pub fn should_clean_shared(&self) -> bool {
        (self.membership.is_ha_enabled() && self.membership.is_primary())
            || !self.membership.has_active_primary()
    }

    /// Run both cleanup steps once
    pub fn run_once(&self) -> ReclaimReport {
        let shared = if self.should_clean_shared() {
            step("shared", || self.targets.reclaim_shared())
        } else {
            tracing::debug!("another node is primary, skipping shared lock cleanup");
            StepOutcome::Skipped
        };
        let local = step("local", || self.targets.reclaim_local());
        ReclaimReport { shared, local }
    }

    /// Run on a fixed delay until the handle is aborted
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            tokio::time::sleep(self.config.initial_delay).await;
            loop {
                let job = Arc::clone(&self);
                match tokio::task::spawn_blocking(move || job.run_once()).await {
                    Ok(report) => tracing::trace!(?report, "expired lock reclamation finished"),
                    Err(e) => tracing::warn!(error = %e, "expired lock reclamation aborted"),
                }
                tokio::time::sleep(self.config.interval).await;
            }
        })
    }
}

fn step<E: std::fmt::Display>(
    scope: &'static str,
    run: impl FnOnce() -> Result<usize, E>,
) -> StepOutcome {
    let error = match std::panic::catch_unwind(AssertUnwindSafe(run)) {
        Ok(Ok(count)) => {
            if count > 0 {
                tracing::debug!(scope, count, "reclaimed expired locks");
            }
            return StepOutcome::Reclaimed { count };
        }
        Ok(Err(e)) => e.to_string(),
        Err(panic) => panic_message(panic.as_ref()),
    };
    tracing::warn!(scope, error = %error, "failed to clean expired locks");
    StepOutcome::Failed { error }
}

#[cfg(test)]
#[path = "maintenance_tests.rs"]
mod tests;
