// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! wq-core: Background work queues and cluster-aware conflict guards
//!
//! This crate provides:
//! - Bounded, deduplicating work queues keyed by item identity
//! - A registry of singleton queues sized from tunables
//! - Named lock guards with in-memory and shared (lease-based) backends
//! - Periodic reclamation of expired locks

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod clock;
pub mod config;
pub mod coordination;
mod panic;
pub mod work;

// Re-exports
pub use clock::{Clock, FakeClock, SystemClock};
pub use config::{ConfigError, CoordinationConfig, LockingConfig, SizingSource, Tunables};
pub use coordination::{
    ClusterMembership, ConflictGuard, ConflictsGuard, ExpiredLockReclaimer, KeyedConflictGuard,
    LockError, LockReclaim, LockStore, LockingBackend, LockingProvider, LockingProviderKind,
    MemoryLockTable, ReclaimConfig, SharedLockService, StaticMembership, StoreError,
};
pub use work::{
    BoxError, DedupPolicy, OfferOutcome, QueueId, QueueView, WorkCallback, WorkItem, WorkQueue,
    WorkQueueRegistry,
};
