// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Locking providers
//!
//! A provider hands out named [`ConflictsGuard`] maps and single keyed
//! guards. The backend (process memory or the shared lock table) is chosen
//! once, when the provider is built.

use super::guard::{ConflictsGuard, KeyedConflictGuard};
use super::lock::LockError;
use super::memory::{MemoryConflictsGuard, MemoryLockConfig};
use super::shared::{SharedConflictsGuard, SharedLockService};
use crate::clock::{Clock, SystemClock};
use dashmap::DashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Map backing single guards handed out by key; not available by name
pub const GENERAL_MAP: &str = "general";

/// Which backend a provider locks against
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LockingProviderKind {
    Memory,
    Shared,
}

impl LockingProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LockingProviderKind::Memory => "memory",
            LockingProviderKind::Shared => "shared",
        }
    }
}

impl fmt::Display for LockingProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LockingProviderKind {
    type Err = LockError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" | "jvm" => Ok(LockingProviderKind::Memory),
            "shared" | "db" => Ok(LockingProviderKind::Shared),
            _ => Err(LockError::UnsupportedProvider(s.to_string())),
        }
    }
}

/// Source of conflict guards
pub trait LockingProvider: Send + Sync {
    fn kind(&self) -> LockingProviderKind;

    /// Get or create the map called `name`, without the reserved-name check
    fn guards_for(&self, name: &str) -> Arc<dyn ConflictsGuard>;

    /// A single guard for `key`, drawn from the general map
    fn conflict_guard(&self, key: &str) -> KeyedConflictGuard {
        KeyedConflictGuard::new(self.guards_for(GENERAL_MAP), key)
    }

    /// The named map `name`. The general map is reserved.
    fn conflicts_guard(&self, name: &str) -> Result<Arc<dyn ConflictsGuard>, LockError> {
        if name == GENERAL_MAP {
            return Err(LockError::ReservedName(name.to_string()));
        }
        Ok(self.guards_for(name))
    }
}

/// Cleanup hooks the reclamation job drives
pub trait LockReclaim: Send + Sync {
    /// Remove cluster-wide lock state whose lease ran out
    fn reclaim_shared(&self) -> Result<usize, LockError>;

    /// Remove this node's stale lock state
    fn reclaim_local(&self) -> Result<usize, LockError>;
}

/// Provider whose maps live in process memory
pub struct MemoryLockingProvider<C: Clock = SystemClock> {
    config: MemoryLockConfig,
    clock: C,
    maps: DashMap<String, Arc<MemoryConflictsGuard<C>>>,
}

impl<C: Clock> MemoryLockingProvider<C> {
    pub fn new(config: MemoryLockConfig, clock: C) -> Self {
        Self {
            config,
            clock,
            maps: DashMap::new(),
        }
    }

    fn map(&self, name: &str) -> Arc<MemoryConflictsGuard<C>> {
        let entry = self.maps.entry(name.to_string()).or_insert_with(|| {
            tracing::debug!(map = %name, "creating memory lock map");
            Arc::new(MemoryConflictsGuard::new(
                self.config.clone(),
                self.clock.clone(),
            ))
        });
        Arc::clone(entry.value())
    }

    /// Names of the maps created so far
    pub fn map_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.maps.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }
}

impl<C: Clock> LockingProvider for MemoryLockingProvider<C> {
    fn kind(&self) -> LockingProviderKind {
        LockingProviderKind::Memory
    }

    fn guards_for(&self, name: &str) -> Arc<dyn ConflictsGuard> {
        self.map(name)
    }
}

impl<C: Clock> LockReclaim for MemoryLockingProvider<C> {
    fn reclaim_shared(&self) -> Result<usize, LockError> {
        Ok(0)
    }

    fn reclaim_local(&self) -> Result<usize, LockError> {
        let maps: Vec<_> = self.maps.iter().map(|e| Arc::clone(e.value())).collect();
        Ok(maps.iter().map(|map| map.evict_idle()).sum())
    }
}

/// Provider whose maps are categories of the shared lock table
pub struct SharedLockingProvider<C: Clock = SystemClock> {
    service: Arc<SharedLockService<C>>,
    maps: DashMap<String, Arc<SharedConflictsGuard<C>>>,
}

impl<C: Clock> SharedLockingProvider<C> {
    pub fn new(service: Arc<SharedLockService<C>>) -> Self {
        Self {
            service,
            maps: DashMap::new(),
        }
    }

    pub fn service(&self) -> &Arc<SharedLockService<C>> {
        &self.service
    }

    fn map(&self, name: &str) -> Arc<SharedConflictsGuard<C>> {
        let entry = self.maps.entry(name.to_string()).or_insert_with(|| {
            Arc::new(SharedConflictsGuard::new(Arc::clone(&self.service), name))
        });
        Arc::clone(entry.value())
    }
}

impl<C: Clock> LockingProvider for SharedLockingProvider<C> {
    fn kind(&self) -> LockingProviderKind {
        LockingProviderKind::Shared
    }

    fn guards_for(&self, name: &str) -> Arc<dyn ConflictsGuard> {
        self.map(name)
    }
}

impl<C: Clock> LockReclaim for SharedLockingProvider<C> {
    fn reclaim_shared(&self) -> Result<usize, LockError> {
        self.service.clean_expired_shared()
    }

    fn reclaim_local(&self) -> Result<usize, LockError> {
        Ok(self.service.clean_expired_local())
    }
}

/// The locking backend selected for this node
pub enum LockingBackend<C: Clock = SystemClock> {
    Memory(Arc<MemoryLockingProvider<C>>),
    Shared(Arc<SharedLockingProvider<C>>),
}

impl<C: Clock> Clone for LockingBackend<C> {
    fn clone(&self) -> Self {
        match self {
            LockingBackend::Memory(p) => LockingBackend::Memory(Arc::clone(p)),
            LockingBackend::Shared(p) => LockingBackend::Shared(Arc::clone(p)),
        }
    }
}

impl<C: Clock> LockingBackend<C> {
    pub fn memory(config: MemoryLockConfig, clock: C) -> Self {
        LockingBackend::Memory(Arc::new(MemoryLockingProvider::new(config, clock)))
    }

    pub fn shared(service: Arc<SharedLockService<C>>) -> Self {
        LockingBackend::Shared(Arc::new(SharedLockingProvider::new(service)))
    }

    pub fn kind(&self) -> LockingProviderKind {
        match self {
            LockingBackend::Memory(_) => LockingProviderKind::Memory,
            LockingBackend::Shared(_) => LockingProviderKind::Shared,
        }
    }

    pub fn provider(&self) -> Arc<dyn LockingProvider> {
        match self {
            LockingBackend::Memory(p) => Arc::clone(p) as Arc<dyn LockingProvider>,
            LockingBackend::Shared(p) => Arc::clone(p) as Arc<dyn LockingProvider>,
        }
    }

    pub fn reclaim(&self) -> Arc<dyn LockReclaim> {
        match self {
            LockingBackend::Memory(p) => Arc::clone(p) as Arc<dyn LockReclaim>,
            LockingBackend::Shared(p) => Arc::clone(p) as Arc<dyn LockReclaim>,
        }
    }

    /// Startup hook: purge rows a previous run of this server left behind
    pub fn init(&self) -> Result<usize, LockError> {
        match self {
            LockingBackend::Memory(_) => Ok(0),
            LockingBackend::Shared(p) => p.service().init(),
        }
    }

    /// Shutdown hook: release everything this server holds
    pub fn destroy(&self) -> Result<usize, LockError> {
        match self {
            LockingBackend::Memory(_) => Ok(0),
            LockingBackend::Shared(p) => p.service().destroy(),
        }
    }
}

#[cfg(test)]
#[path = "provider_tests.rs"]
mod tests;
