// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-process conflict guards backed by an idle-expiring lock cache
//!
//! Keys are typically content hashes or repository paths, so lock handles are
//! created on demand and dropped once they are unheld and nobody has touched
//! them for `idle_timeout`. The cache never grows past `capacity` while unheld handles
//! can still be evicted.

use super::guard::ConflictsGuard;
use super::lock::{HolderId, LockError};
use crate::clock::Clock;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Memory backend configuration
#[derive(Clone, Debug)]
pub struct MemoryLockConfig {
    /// How long an untouched handle survives in the cache
    pub idle_timeout: Duration,
    /// Upper bound on cached handles
    pub capacity: usize,
}

impl Default for MemoryLockConfig {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(30 * 60),
            capacity: 10_000,
        }
    }
}

impl MemoryLockConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }
}

#[derive(Default)]
struct LockSlot {
    holder: Mutex<Option<HolderId>>,
    released: Condvar,
    /// Threads currently inside `try_to_lock` for this slot
    waiters: AtomicUsize,
}

impl LockSlot {
    fn holder(&self) -> MutexGuard<'_, Option<HolderId>> {
        self.holder.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn is_held(&self) -> bool {
        self.holder().is_some()
    }

    fn acquire(&self, me: &HolderId, key: &str, timeout: Duration) -> Result<bool, LockError> {
        let deadline = Instant::now().checked_add(timeout);
        let mut holder = self.holder();
        loop {
            match holder.as_ref() {
                None => {
                    *holder = Some(me.clone());
                    return Ok(true);
                }
                Some(current) if current == me => {
                    return Err(LockError::Reentrant {
                        key: key.to_string(),
                    });
                }
                Some(_) => {}
            }

            holder = match deadline {
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        return Ok(false);
                    }
                    match self.released.wait_timeout(holder, remaining) {
                        Ok((guard, _)) => guard,
                        Err(e) => e.into_inner().0,
                    }
                }
                None => self
                    .released
                    .wait(holder)
                    .unwrap_or_else(|e| e.into_inner()),
            };
        }
    }
}

struct CacheEntry {
    slot: Arc<LockSlot>,
    last_access: Instant,
}

impl CacheEntry {
    /// Idle past the timeout with no holder and no waiters
    fn evictable(&self, now: Instant, idle_timeout: Duration) -> bool {
        now.saturating_duration_since(self.last_access) >= idle_timeout
            && self.slot.waiters.load(Ordering::SeqCst) == 0
            && !self.slot.is_held()
    }
}

/// Keyed in-process locks with idle eviction
pub struct MemoryConflictsGuard<C: Clock> {
    config: MemoryLockConfig,
    clock: C,
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl<C: Clock> MemoryConflictsGuard<C> {
    pub fn new(config: MemoryLockConfig, clock: C) -> Self {
        Self {
            config,
            clock,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &MemoryLockConfig {
        &self.config
    }

    /// Number of handles currently cached, held or not
    pub fn cached(&self) -> usize {
        self.entries().len()
    }

    /// Drop every handle idle past the timeout, returning how many went
    pub fn evict_idle(&self) -> usize {
        let now = self.clock.now();
        let idle_timeout = self.config.idle_timeout;
        let mut entries = self.entries();
        let before = entries.len();
        entries.retain(|_, entry| !entry.evictable(now, idle_timeout));
        let evicted = before - entries.len();
        if evicted > 0 {
            tracing::debug!(evicted, "evicted idle lock handles");
        }
        evicted
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, CacheEntry>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Fetch or create the slot for `key` and register the caller as a waiter
    fn checkout(&self, key: &str) -> Arc<LockSlot> {
        let now = self.clock.now();
        let mut entries = self.entries();
        if entries
            .get(key)
            .is_some_and(|entry| entry.evictable(now, self.config.idle_timeout))
        {
            entries.remove(key);
        }
        if !entries.contains_key(key) {
            self.make_room(&mut entries, now);
        }
        let entry = entries
            .entry(key.to_string())
            .or_insert_with(|| CacheEntry {
                slot: Arc::new(LockSlot::default()),
                last_access: now,
            });
        entry.last_access = now;
        entry.slot.waiters.fetch_add(1, Ordering::SeqCst);
        Arc::clone(&entry.slot)
    }

    fn checkin(&self, key: &str, slot: &Arc<LockSlot>) {
        let now = self.clock.now();
        let mut entries = self.entries();
        if let Some(entry) = entries.get_mut(key) {
            if Arc::ptr_eq(&entry.slot, slot) {
                entry.last_access = now;
            }
        }
        slot.waiters.fetch_sub(1, Ordering::SeqCst);
    }

    fn make_room(&self, entries: &mut HashMap<String, CacheEntry>, now: Instant) {
        let capacity = self.config.capacity;
        if entries.len() < capacity {
            return;
        }
        let idle_timeout = self.config.idle_timeout;
        entries.retain(|_, entry| !entry.evictable(now, idle_timeout));
        if entries.len() < capacity {
            return;
        }

        let mut free: Vec<(Instant, String)> = entries
            .iter()
            .filter(|(_, entry)| {
                entry.slot.waiters.load(Ordering::SeqCst) == 0 && !entry.slot.is_held()
            })
            .map(|(key, entry)| (entry.last_access, key.clone()))
            .collect();
        free.sort();
        let excess = entries.len() + 1 - capacity;
        for (_, key) in free.into_iter().take(excess) {
            entries.remove(&key);
        }

        if entries.len() >= capacity {
            tracing::warn!(
                capacity,
                cached = entries.len(),
                "lock cache is full of held locks, growing past capacity"
            );
        }
    }
}

impl<C: Clock> ConflictsGuard for MemoryConflictsGuard<C> {
    fn try_to_lock(&self, key: &str, timeout: Duration) -> Result<bool, LockError> {
        let me = HolderId::current();
        let slot = self.checkout(key);
        let result = slot.acquire(&me, key, timeout);
        self.checkin(key, &slot);
        if let Ok(false) = result {
            tracing::trace!(key = %key, ?timeout, "timed out waiting for lock");
        }
        result
    }

    fn unlock(&self, key: &str) -> Result<(), LockError> {
        let me = HolderId::current();
        let stale = || LockError::StaleHandle {
            key: key.to_string(),
        };

        let slot = {
            let now = self.clock.now();
            let mut entries = self.entries();
            let evictable = match entries.get(key) {
                Some(entry) => entry.evictable(now, self.config.idle_timeout),
                None => return Err(stale()),
            };
            if evictable {
                entries.remove(key);
                return Err(stale());
            }
            let Some(entry) = entries.get_mut(key) else {
                return Err(stale());
            };
            entry.last_access = now;
            Arc::clone(&entry.slot)
        };

        let mut holder = slot.holder();
        match holder.as_ref() {
            Some(current) if *current == me => {
                *holder = None;
                drop(holder);
                slot.released.notify_one();
                Ok(())
            }
            Some(current) => Err(LockError::NotOwner {
                key: key.to_string(),
                holder: current.clone(),
            }),
            None => Err(LockError::NotHeld {
                key: key.to_string(),
            }),
        }
    }

    fn force_unlock(&self, key: &str) -> Result<bool, LockError> {
        let slot = match self.entries().get(key) {
            Some(entry) => Arc::clone(&entry.slot),
            None => return Ok(false),
        };
        let released = slot.holder().take();
        slot.released.notify_all();
        if let Some(holder) = &released {
            tracing::debug!(key = %key, holder = %holder, "force released lock");
        }
        Ok(released.is_some())
    }

    fn is_locked(&self, key: &str) -> Result<bool, LockError> {
        Ok(self
            .entries()
            .get(key)
            .is_some_and(|entry| entry.slot.is_held()))
    }

    fn size(&self) -> Result<usize, LockError> {
        Ok(self
            .entries()
            .values()
            .filter(|entry| entry.slot.is_held())
            .count())
    }

    fn key_set(&self) -> Result<BTreeSet<String>, LockError> {
        Ok(self
            .entries()
            .iter()
            .filter(|(_, entry)| entry.slot.is_held())
            .map(|(key, _)| key.clone())
            .collect())
    }
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;
