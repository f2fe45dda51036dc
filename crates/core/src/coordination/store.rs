// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Persistent lock table used by the shared conflict-guard backend
//!
//! A store row is identified by `(category, key)`. Mutual exclusion across
//! nodes rests entirely on [`LockStore::try_insert`] being atomic: the store
//! itself must reject a second row for the same pair.

use super::lock::{HolderId, LockRecord};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;
use thiserror::Error;

/// Errors from lock store operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("lock store unavailable: {0}")]
    Unavailable(String),
}

/// Transactional table of `{category, key, owner, lease}` rows
pub trait LockStore: Send + Sync {
    /// Insert `record` unless a row already exists for its category and key.
    ///
    /// Returns `true` when the row was inserted.
    fn try_insert(&self, record: &LockRecord) -> Result<bool, StoreError>;

    fn get(&self, category: &str, key: &str) -> Result<Option<LockRecord>, StoreError>;

    /// Delete the row only if it belongs to `owner`
    fn delete_owned(&self, category: &str, key: &str, owner: &str) -> Result<bool, StoreError>;

    /// Delete the row regardless of owner
    fn force_delete(&self, category: &str, key: &str) -> Result<bool, StoreError>;

    /// Delete the row only if its lease has run out at `now`, checked under
    /// the same exclusion as the delete
    fn delete_if_expired(
        &self,
        category: &str,
        key: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// Move the lease deadline of a row held by `owner`/`holder`
    fn extend_lease(
        &self,
        category: &str,
        key: &str,
        owner: &str,
        holder: &HolderId,
        expires_at: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    fn count(&self, category: &str) -> Result<usize, StoreError>;

    fn keys(&self, category: &str) -> Result<BTreeSet<String>, StoreError>;

    /// Rows whose lease has run out at `now`
    fn expired(&self, now: DateTime<Utc>) -> Result<Vec<LockRecord>, StoreError>;

    fn owned_by(&self, owner: &str) -> Result<Vec<LockRecord>, StoreError>;

    /// Delete every row belonging to `owner`, returning how many went
    fn delete_all_owned_by(&self, owner: &str) -> Result<usize, StoreError>;
}

type RowKey = (String, String);

/// In-process lock table
///
/// Shared through an `Arc`, one table can stand in for the cluster database
/// of several nodes living in the same process.
#[derive(Debug, Default)]
pub struct MemoryLockTable {
    rows: Mutex<BTreeMap<RowKey, LockRecord>>,
}

impl MemoryLockTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn rows(&self) -> std::sync::MutexGuard<'_, BTreeMap<RowKey, LockRecord>> {
        self.rows.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn row_key(category: &str, key: &str) -> RowKey {
    (category.to_string(), key.to_string())
}

impl LockStore for MemoryLockTable {
    fn try_insert(&self, record: &LockRecord) -> Result<bool, StoreError> {
        let mut rows = self.rows();
        let key = row_key(&record.category, &record.key);
        if rows.contains_key(&key) {
            return Ok(false);
        }
        rows.insert(key, record.clone());
        Ok(true)
    }

    fn get(&self, category: &str, key: &str) -> Result<Option<LockRecord>, StoreError> {
        Ok(self.rows().get(&row_key(category, key)).cloned())
    }

    fn delete_owned(&self, category: &str, key: &str, owner: &str) -> Result<bool, StoreError> {
        let mut rows = self.rows();
        let key = row_key(category, key);
        match rows.get(&key) {
            Some(row) if row.owner == owner => {
                rows.remove(&key);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn force_delete(&self, category: &str, key: &str) -> Result<bool, StoreError> {
        Ok(self.rows().remove(&row_key(category, key)).is_some())
    }

    fn delete_if_expired(
        &self,
        category: &str,
        key: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut rows = self.rows();
        let key = row_key(category, key);
        match rows.get(&key) {
            Some(row) if row.is_expired(now) => {
                rows.remove(&key);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn extend_lease(
        &self,
        category: &str,
        key: &str,
        owner: &str,
        holder: &HolderId,
        expires_at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        match self.rows().get_mut(&row_key(category, key)) {
            Some(row) if row.is_held_by(owner, holder) => {
                row.lease_expires_at = expires_at;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn count(&self, category: &str) -> Result<usize, StoreError> {
        Ok(self.rows().keys().filter(|(c, _)| c == category).count())
    }

    fn keys(&self, category: &str) -> Result<BTreeSet<String>, StoreError> {
        Ok(self
            .rows()
            .keys()
            .filter(|(c, _)| c == category)
            .map(|(_, k)| k.clone())
            .collect())
    }

    fn expired(&self, now: DateTime<Utc>) -> Result<Vec<LockRecord>, StoreError> {
        Ok(self
            .rows()
            .values()
            .filter(|row| row.is_expired(now))
            .cloned()
            .collect())
    }

    fn owned_by(&self, owner: &str) -> Result<Vec<LockRecord>, StoreError> {
        Ok(self
            .rows()
            .values()
            .filter(|row| row.owner == owner)
            .cloned()
            .collect())
    }

    fn delete_all_owned_by(&self, owner: &str) -> Result<usize, StoreError> {
        let mut rows = self.rows();
        let before = rows.len();
        rows.retain(|_, row| row.owner != owner);
        Ok(before - rows.len())
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
