// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Mutual exclusion for background work
//!
//! This module provides:
//! - **ConflictGuard / ConflictsGuard** - Named locks with try-with-timeout
//! - **Memory backend** - Idle-expiring in-process lock cache
//! - **Shared backend** - Lease-based rows in a [`LockStore`] shared by a cluster
//! - **ExpiredLockReclaimer** - Periodic cleanup of locks whose holders are gone

pub mod guard;
pub mod lock;
pub mod maintenance;
pub mod memory;
pub mod provider;
pub mod shared;
pub mod store;

pub use guard::{ConflictGuard, ConflictsGuard, KeyedConflictGuard};
pub use lock::{HolderId, LockError, LockRecord};
pub use maintenance::{
    ClusterMembership, ExpiredLockReclaimer, ReclaimConfig, ReclaimReport, StandaloneMembership,
    StaticMembership, StepOutcome,
};
pub use memory::{MemoryConflictsGuard, MemoryLockConfig};
pub use provider::{
    LockReclaim, LockingBackend, LockingProvider, LockingProviderKind, MemoryLockingProvider,
    SharedLockingProvider, GENERAL_MAP,
};
pub use shared::{SharedConflictsGuard, SharedLockService, DEFAULT_MAX_LEASE};
pub use store::{LockStore, MemoryLockTable, StoreError};
