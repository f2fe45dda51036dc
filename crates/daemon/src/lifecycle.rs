// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Coordinator lifecycle: startup and shutdown.

use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use wq_core::coordination::{LockError, SharedLockService, StoreError};
use wq_core::work::{InMemoryQueueMonitor, QueueMonitor, QueueSnapshot};
use wq_core::{
    ConfigError, CoordinationConfig, ExpiredLockReclaimer, LockStore, LockingBackend,
    LockingProviderKind, SystemClock, WorkQueueRegistry,
};
use wq_storage::FileLockTable;

/// Running coordinator state
pub struct Coordinator {
    config: CoordinationConfig,
    backend: LockingBackend<SystemClock>,
    registry: Arc<WorkQueueRegistry>,
    monitor: Arc<InMemoryQueueMonitor>,
    reclaimer: JoinHandle<()>,
    /// When the coordinator started
    pub start_time: Instant,
}

impl Coordinator {
    pub fn config(&self) -> &CoordinationConfig {
        &self.config
    }

    /// Locking backend selected by configuration
    pub fn locking(&self) -> &LockingBackend<SystemClock> {
        &self.backend
    }

    pub fn registry(&self) -> &Arc<WorkQueueRegistry> {
        &self.registry
    }

    /// State of every work queue created so far
    pub fn queue_snapshots(&self) -> Vec<QueueSnapshot> {
        self.monitor.snapshots()
    }

    /// Stop the queues and the reclaimer, then release every shared lock
    /// this server holds
    pub async fn shutdown(self) -> Result<(), LifecycleError> {
        info!("Shutting down coordinator...");

        // 1. Stop accepting work; running callbacks finish on their own
        self.registry.close_all_queues();

        // 2. Stop the reclamation loop
        self.reclaimer.abort();
        if let Err(e) = self.reclaimer.await {
            if !e.is_cancelled() {
                warn!("Expired lock reclaimer ended abnormally: {}", e);
            }
        }

        // 3. Release locks held by this server
        let released = self.backend.destroy()?;

        info!(
            released,
            uptime_secs = self.start_time.elapsed().as_secs(),
            "Coordinator shutdown complete"
        );
        Ok(())
    }
}

/// Lifecycle errors
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Lock error: {0}")]
    Lock(#[from] LockError),

    #[error("Lock store error: {0}")]
    Store(#[from] StoreError),
}

/// Start the coordinator.
///
/// Must be called from within a tokio runtime; the reclaimer runs as a task
/// on it.
pub async fn startup(config: CoordinationConfig) -> Result<Coordinator, LifecycleError> {
    // 1. Build the locking backend and purge rows left by a previous run
    let backend = locking_backend(&config)?;
    let purged = backend.init()?;

    // 2. Work queue registry, sized from tunables and reported to the monitor
    let monitor = Arc::new(InMemoryQueueMonitor::new());
    let registry = Arc::new(
        WorkQueueRegistry::new(Arc::new(config.tunables.clone()))
            .with_monitor(Arc::clone(&monitor) as Arc<dyn QueueMonitor>),
    );

    // 3. Expired lock reclamation
    let reclaimer = Arc::new(ExpiredLockReclaimer::new(
        config.reclaim.clone(),
        Arc::new(config.cluster),
        backend.reclaim(),
    ));
    let reclaimer = reclaimer.spawn();

    info!(
        server_id = %config.server_id,
        provider = %backend.kind(),
        purged,
        "Coordinator started"
    );

    Ok(Coordinator {
        config,
        backend,
        registry,
        monitor,
        reclaimer,
        start_time: Instant::now(),
    })
}

/// Build the locking backend named by `config.locking.provider`
pub fn locking_backend(
    config: &CoordinationConfig,
) -> Result<LockingBackend<SystemClock>, LifecycleError> {
    let backend = match config.locking.kind()? {
        LockingProviderKind::Memory => {
            LockingBackend::memory(config.locking.memory_config(), SystemClock)
        }
        LockingProviderKind::Shared => {
            let path = config
                .locking
                .store_path
                .as_deref()
                .ok_or(LockError::MissingStore)?;
            let store: Arc<dyn LockStore> = Arc::new(FileLockTable::open(path)?);
            info!(path = %path.display(), "Using file lock table");
            LockingBackend::shared(Arc::new(
                SharedLockService::new(store, config.server_id.clone(), SystemClock)
                    .with_max_lease(config.locking.max_lease),
            ))
        }
    };
    Ok(backend)
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
