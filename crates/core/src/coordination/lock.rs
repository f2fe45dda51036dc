// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Lock ownership records and errors shared by both conflict-guard backends

use super::store::StoreError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Identifies the thread holding a lock within one server
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HolderId(pub String);

impl HolderId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Holder id of the calling thread
    pub fn current() -> Self {
        let thread = std::thread::current();
        match thread.name() {
            Some(name) => Self(format!("{:?}:{}", thread.id(), name)),
            None => Self(format!("{:?}", thread.id())),
        }
    }
}

impl std::fmt::Display for HolderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One row of the shared lock table
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockRecord {
    /// Named map the key belongs to
    pub category: String,
    pub key: String,
    /// Server id of the node holding the lock
    pub owner: String,
    /// Thread on `owner` holding the lock
    pub holder: HolderId,
    pub acquired_at: DateTime<Utc>,
    pub lease_expires_at: DateTime<Utc>,
}

impl LockRecord {
    pub fn new(
        category: impl Into<String>,
        key: impl Into<String>,
        owner: impl Into<String>,
        holder: HolderId,
        acquired_at: DateTime<Utc>,
        lease: Duration,
    ) -> Self {
        Self {
            category: category.into(),
            key: key.into(),
            owner: owner.into(),
            holder,
            acquired_at,
            lease_expires_at: lease_deadline(acquired_at, lease),
        }
    }

    /// Whether the lease has run out at `now`
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.lease_expires_at
    }

    /// Whether this row was written by `holder` on `owner`
    pub fn is_held_by(&self, owner: &str, holder: &HolderId) -> bool {
        self.owner == owner && &self.holder == holder
    }

    /// Key used for this node's local bookkeeping
    pub fn local_id(&self) -> String {
        local_id(&self.category, &self.key)
    }
}

pub(crate) fn local_id(category: &str, key: &str) -> String {
    format!("category:{},key:{}", category, key)
}

pub(crate) fn lease_deadline(from: DateTime<Utc>, lease: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(lease)
        .ok()
        .and_then(|lease| from.checked_add_signed(lease))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Errors raised by conflict guards and locking providers
#[derive(Debug, Error)]
pub enum LockError {
    /// The handle was evicted or reclaimed before it was released
    #[error("lock '{key}' was evicted or reclaimed before release")]
    StaleHandle { key: String },
    #[error("lock '{key}' is not held by the caller")]
    NotHeld { key: String },
    #[error("lock '{key}' is held by {holder}, not by the releasing thread")]
    NotOwner { key: String, holder: HolderId },
    #[error("reentrant acquisition of lock '{key}' is not supported")]
    Reentrant { key: String },
    #[error("the '{0}' lock map is reserved for internal usage")]
    ReservedName(String),
    #[error("unsupported locking provider: {0}")]
    UnsupportedProvider(String),
    #[error("shared locking requires a lock store")]
    MissingStore,
    #[error("lock store error: {0}")]
    Store(#[from] StoreError),
}

#[cfg(test)]
#[path = "lock_tests.rs"]
mod tests;
