// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Conflict guard interfaces
//!
//! Callers depend only on these traits; whether a key is guarded in process
//! memory or in the shared lock table is decided when the provider is built.

use super::lock::LockError;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

/// A single named lock
pub trait ConflictGuard: Send + Sync {
    /// Try to take the lock, waiting at most `timeout`.
    ///
    /// `Ok(false)` means the lock stayed busy for the whole timeout.
    fn try_to_lock(&self, timeout: Duration) -> Result<bool, LockError>;

    fn unlock(&self) -> Result<(), LockError>;

    /// Clear ownership regardless of the current holder
    fn force_unlock(&self) -> Result<bool, LockError>;

    fn is_locked(&self) -> Result<bool, LockError>;
}

/// A keyed collection of locks, created lazily per key
pub trait ConflictsGuard: Send + Sync {
    /// Try to take the lock for `key`, waiting at most `timeout`.
    ///
    /// `Ok(false)` means the lock stayed busy for the whole timeout.
    fn try_to_lock(&self, key: &str, timeout: Duration) -> Result<bool, LockError>;

    /// Release `key`.
    ///
    /// Fails with [`LockError::StaleHandle`] when the lock was evicted or
    /// reclaimed while held, and with [`LockError::NotHeld`] when the caller
    /// does not hold it.
    fn unlock(&self, key: &str) -> Result<(), LockError>;

    /// Clear ownership of `key` regardless of the current holder.
    ///
    /// Returns whether anything was released.
    fn force_unlock(&self, key: &str) -> Result<bool, LockError>;

    fn is_locked(&self, key: &str) -> Result<bool, LockError>;

    /// Number of keys currently locked
    fn size(&self) -> Result<usize, LockError>;

    /// Keys currently locked
    fn key_set(&self) -> Result<BTreeSet<String>, LockError>;
}

/// A [`ConflictGuard`] bound to one key of a [`ConflictsGuard`]
#[derive(Clone)]
pub struct KeyedConflictGuard {
    guards: Arc<dyn ConflictsGuard>,
    key: String,
}

impl KeyedConflictGuard {
    pub fn new(guards: Arc<dyn ConflictsGuard>, key: impl Into<String>) -> Self {
        Self {
            guards,
            key: key.into(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

impl std::fmt::Debug for KeyedConflictGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyedConflictGuard")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

impl ConflictGuard for KeyedConflictGuard {
    fn try_to_lock(&self, timeout: Duration) -> Result<bool, LockError> {
        self.guards.try_to_lock(&self.key, timeout)
    }

    fn unlock(&self) -> Result<(), LockError> {
        self.guards.unlock(&self.key)
    }

    fn force_unlock(&self) -> Result<bool, LockError> {
        self.guards.force_unlock(&self.key)
    }

    fn is_locked(&self) -> Result<bool, LockError> {
        self.guards.is_locked(&self.key)
    }
}

#[cfg(test)]
#[path = "guard_tests.rs"]
mod tests;
