// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cluster-wide conflict guards backed by a [`LockStore`]
//!
//! Every node in the cluster points its [`SharedLockService`] at the same
//! store. A lock is a row `{category, key, owner, holder, lease}`; the node
//! additionally remembers which rows its own threads hold so that releases
//! and local reclamation do not need a store round trip to check ownership.

use super::guard::ConflictsGuard;
use super::lock::{lease_deadline, local_id, HolderId, LockError, LockRecord};
use super::store::{LockStore, StoreError};
use crate::clock::{Clock, SystemClock};
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

const ACQUIRE_BACKOFF_START: Duration = Duration::from_millis(8);
const ACQUIRE_BACKOFF_MAX: Duration = Duration::from_millis(2048);
const RELEASE_RETRIES: u32 = 3;
const RELEASE_BACKOFF_START: Duration = Duration::from_millis(4);
const RELEASE_BACKOFF_MAX: Duration = Duration::from_millis(256);
const BACKOFF_FACTOR: u32 = 4;

/// Default lease of a shared lock row
pub const DEFAULT_MAX_LEASE: Duration = Duration::from_secs(30 * 60);

/// Node-side handle on the shared lock table
pub struct SharedLockService<C: Clock = SystemClock> {
    store: Arc<dyn LockStore>,
    server_id: String,
    max_lease: Duration,
    clock: C,
    /// Rows held by threads of this node, by [`local_id`]
    local_locks: Mutex<HashMap<String, LockRecord>>,
}

impl<C: Clock> SharedLockService<C> {
    pub fn new(store: Arc<dyn LockStore>, server_id: impl Into<String>, clock: C) -> Self {
        Self {
            store,
            server_id: server_id.into(),
            max_lease: DEFAULT_MAX_LEASE,
            clock,
            local_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_max_lease(mut self, max_lease: Duration) -> Self {
        self.max_lease = max_lease;
        self
    }

    pub fn server_id(&self) -> &str {
        &self.server_id
    }

    pub fn max_lease(&self) -> Duration {
        self.max_lease
    }

    fn local(&self) -> MutexGuard<'_, HashMap<String, LockRecord>> {
        self.local_locks.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Try to insert a row for `category`/`key`, backing off between attempts
    /// until `timeout` runs out.
    pub fn acquire_lock(
        &self,
        category: &str,
        key: &str,
        timeout: Duration,
    ) -> Result<bool, LockError> {
        let me = HolderId::current();
        let id = local_id(category, key);
        if self
            .local()
            .get(&id)
            .is_some_and(|record| record.holder == me)
        {
            return Err(LockError::Reentrant {
                key: key.to_string(),
            });
        }

        let deadline = Instant::now().checked_add(timeout);
        let mut backoff = ACQUIRE_BACKOFF_START;
        loop {
            let record = LockRecord::new(
                category,
                key,
                &self.server_id,
                me.clone(),
                self.clock.utc_now(),
                self.max_lease,
            );
            if self.store.try_insert(&record)? {
                tracing::trace!(category, key, holder = %me, "acquired shared lock");
                self.local().insert(id, record);
                return Ok(true);
            }
            if let Some(existing) = self.store.get(category, key)? {
                if existing.is_held_by(&self.server_id, &me) {
                    return Err(LockError::Reentrant {
                        key: key.to_string(),
                    });
                }
            }

            let pause = match deadline {
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        tracing::trace!(category, key, ?timeout, "timed out waiting for shared lock");
                        return Ok(false);
                    }
                    backoff.min(remaining)
                }
                None => backoff,
            };
            std::thread::sleep(pause);
            backoff = (backoff * BACKOFF_FACTOR).min(ACQUIRE_BACKOFF_MAX);
        }
    }

    /// Release a row held by the calling thread
    pub fn unlock(&self, category: &str, key: &str) -> Result<(), LockError> {
        let me = HolderId::current();
        let id = local_id(category, key);

        let tracked = {
            let mut local = self.local();
            match local.get(&id) {
                Some(record) if record.holder != me => {
                    return Err(LockError::NotOwner {
                        key: key.to_string(),
                        holder: record.holder.clone(),
                    });
                }
                Some(_) => local.remove(&id).is_some(),
                None => false,
            }
        };

        if !tracked {
            match self.store.get(category, key)? {
                None => {
                    return Err(LockError::StaleHandle {
                        key: key.to_string(),
                    })
                }
                Some(row) if row.is_held_by(&self.server_id, &me) => {}
                Some(row) if row.owner == self.server_id => {
                    return Err(LockError::NotOwner {
                        key: key.to_string(),
                        holder: row.holder,
                    });
                }
                Some(_) => {
                    return Err(LockError::NotHeld {
                        key: key.to_string(),
                    })
                }
            }
        }

        if self.delete_with_retry(category, key)? {
            Ok(())
        } else {
            Err(LockError::StaleHandle {
                key: key.to_string(),
            })
        }
    }

    fn delete_with_retry(&self, category: &str, key: &str) -> Result<bool, StoreError> {
        let mut backoff = RELEASE_BACKOFF_START;
        let mut attempt = 0;
        loop {
            match self.store.delete_owned(category, key, &self.server_id) {
                Ok(deleted) => return Ok(deleted),
                Err(e) if attempt < RELEASE_RETRIES => {
                    attempt += 1;
                    tracing::debug!(category, key, attempt, error = %e, "retrying shared lock release");
                    std::thread::sleep(backoff);
                    backoff = (backoff * BACKOFF_FACTOR).min(RELEASE_BACKOFF_MAX);
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Delete the row whoever holds it
    pub fn force_unlock(&self, category: &str, key: &str) -> Result<bool, LockError> {
        self.local().remove(&local_id(category, key));
        let deleted = self.store.force_delete(category, key)?;
        if deleted {
            tracing::debug!(category, key, "force released shared lock");
        }
        Ok(deleted)
    }

    pub fn is_locked(&self, category: &str, key: &str) -> Result<bool, LockError> {
        if self.local().contains_key(&local_id(category, key)) {
            return Ok(true);
        }
        Ok(self.store.get(category, key)?.is_some())
    }

    /// Whether the calling thread holds the row
    pub fn is_locked_by_me(&self, category: &str, key: &str) -> Result<bool, LockError> {
        let me = HolderId::current();
        Ok(self
            .store
            .get(category, key)?
            .is_some_and(|row| row.is_held_by(&self.server_id, &me)))
    }

    /// Push the lease of a row held by the calling thread `max_lease` into
    /// the future. Returns `false` when the row is gone or held by someone else.
    pub fn heartbeat(&self, category: &str, key: &str) -> Result<bool, LockError> {
        let me = HolderId::current();
        let expires_at = lease_deadline(self.clock.utc_now(), self.max_lease);
        let extended = self
            .store
            .extend_lease(category, key, &self.server_id, &me, expires_at)?;
        if extended {
            if let Some(record) = self.local().get_mut(&local_id(category, key)) {
                record.lease_expires_at = expires_at;
            }
        }
        Ok(extended)
    }

    pub fn size(&self, category: &str) -> Result<usize, LockError> {
        Ok(self.store.count(category)?)
    }

    pub fn keys(&self, category: &str) -> Result<BTreeSet<String>, LockError> {
        Ok(self.store.keys(category)?)
    }

    /// Rows held by this node's threads
    pub fn local_records(&self) -> Vec<LockRecord> {
        self.local().values().cloned().collect()
    }

    /// Delete every row in the store whose lease ran out
    pub fn clean_expired_shared(&self) -> Result<usize, LockError> {
        let now = self.clock.utc_now();
        let mut removed = 0;
        for row in self.store.expired(now)? {
            match self.store.delete_if_expired(&row.category, &row.key, now) {
                Ok(true) => {
                    removed += 1;
                    tracing::debug!(
                        category = %row.category,
                        key = %row.key,
                        owner = %row.owner,
                        holder = %row.holder,
                        "deleted expired shared lock"
                    );
                }
                Ok(false) => {}
                Err(e) => {
                    tracing::debug!(
                        category = %row.category,
                        key = %row.key,
                        error = %e,
                        "failed to delete expired shared lock"
                    );
                }
            }
        }
        if removed > 0 {
            tracing::info!(removed, "reclaimed expired shared locks");
        }
        Ok(removed)
    }

    /// Forget local bookkeeping for rows whose lease ran out
    pub fn clean_expired_local(&self) -> usize {
        let now = self.clock.utc_now();
        let mut local = self.local();
        let before = local.len();
        local.retain(|id, record| {
            let expired = record.is_expired(now);
            if expired {
                tracing::debug!(lock = %id, holder = %record.holder, "dropping expired local lock");
            }
            !expired
        });
        before - local.len()
    }

    /// Delete rows left behind by a previous run of this server id
    pub fn init(&self) -> Result<usize, LockError> {
        let removed = self.store.delete_all_owned_by(&self.server_id)?;
        if removed > 0 {
            tracing::info!(server_id = %self.server_id, removed, "purged shared locks from previous run");
        }
        Ok(removed)
    }

    /// Release every row owned by this server id
    pub fn destroy(&self) -> Result<usize, LockError> {
        self.local().clear();
        let removed = self.store.delete_all_owned_by(&self.server_id)?;
        tracing::info!(server_id = %self.server_id, removed, "released shared locks");
        Ok(removed)
    }
}

/// [`ConflictsGuard`] over one category of the shared lock table
pub struct SharedConflictsGuard<C: Clock = SystemClock> {
    service: Arc<SharedLockService<C>>,
    category: String,
}

impl<C: Clock> SharedConflictsGuard<C> {
    pub fn new(service: Arc<SharedLockService<C>>, category: impl Into<String>) -> Self {
        Self {
            service,
            category: category.into(),
        }
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    /// Extend the lease on a key held by the calling thread
    pub fn heartbeat(&self, key: &str) -> Result<bool, LockError> {
        self.service.heartbeat(&self.category, key)
    }
}

impl<C: Clock> ConflictsGuard for SharedConflictsGuard<C> {
    fn try_to_lock(&self, key: &str, timeout: Duration) -> Result<bool, LockError> {
        self.service.acquire_lock(&self.category, key, timeout)
    }

    fn unlock(&self, key: &str) -> Result<(), LockError> {
        self.service.unlock(&self.category, key)
    }

    fn force_unlock(&self, key: &str) -> Result<bool, LockError> {
        self.service.force_unlock(&self.category, key)
    }

    fn is_locked(&self, key: &str) -> Result<bool, LockError> {
        self.service.is_locked(&self.category, key)
    }

    fn size(&self) -> Result<usize, LockError> {
        self.service.size(&self.category)
    }

    fn key_set(&self) -> Result<BTreeSet<String>, LockError> {
        self.service.keys(&self.category)
    }
}

#[cfg(test)]
#[path = "shared_tests.rs"]
mod tests;
