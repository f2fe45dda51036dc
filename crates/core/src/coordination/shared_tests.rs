// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::clock::FakeClock;
use crate::coordination::store::MemoryLockTable;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU32, Ordering};
use std::thread;

fn node(
    table: &Arc<MemoryLockTable>,
    server_id: &str,
    clock: &FakeClock,
) -> Arc<SharedLockService<FakeClock>> {
    let store: Arc<dyn LockStore> = Arc::clone(table) as Arc<dyn LockStore>;
    Arc::new(
        SharedLockService::new(store, server_id, clock.clone())
            .with_max_lease(Duration::from_secs(60)),
    )
}

#[test]
fn acquire_writes_a_row_owned_by_this_server() {
    let clock = FakeClock::new();
    let table = Arc::new(MemoryLockTable::new());
    let service = node(&table, "node-a", &clock);

    assert!(service.acquire_lock("general", "k", Duration::ZERO).unwrap());

    let row = table.get("general", "k").unwrap().unwrap();
    assert_eq!(row.owner, "node-a");
    assert_eq!(row.holder, HolderId::current());
    assert_eq!(row.lease_expires_at, clock.utc_now() + chrono::Duration::seconds(60));
    assert_eq!(service.local_records().len(), 1);
    assert!(service.is_locked_by_me("general", "k").unwrap());
}

#[test]
fn second_node_times_out_while_row_exists() {
    let clock = FakeClock::new();
    let table = Arc::new(MemoryLockTable::new());
    let a = node(&table, "node-a", &clock);
    let b = node(&table, "node-b", &clock);

    assert!(a.acquire_lock("general", "k", Duration::ZERO).unwrap());
    let started = Instant::now();
    assert!(!b.acquire_lock("general", "k", Duration::from_millis(50)).unwrap());
    assert!(started.elapsed() >= Duration::from_millis(50));
    assert!(b.is_locked("general", "k").unwrap());
}

#[test]
fn waiting_node_acquires_after_release() {
    let clock = FakeClock::new();
    let table = Arc::new(MemoryLockTable::new());
    let a = node(&table, "node-a", &clock);
    let b = node(&table, "node-b", &clock);

    assert!(a.acquire_lock("general", "k", Duration::ZERO).unwrap());
    let waiter = thread::spawn(move || b.acquire_lock("general", "k", Duration::from_secs(5)));
    thread::sleep(Duration::from_millis(30));
    a.unlock("general", "k").unwrap();

    assert!(waiter.join().unwrap().unwrap());
    assert_eq!(table.get("general", "k").unwrap().unwrap().owner, "node-b");
}

#[test]
fn reacquire_by_same_thread_is_rejected() {
    let clock = FakeClock::new();
    let table = Arc::new(MemoryLockTable::new());
    let service = node(&table, "node-a", &clock);

    assert!(service.acquire_lock("general", "k", Duration::ZERO).unwrap());
    assert!(matches!(
        service.acquire_lock("general", "k", Duration::ZERO),
        Err(LockError::Reentrant { .. })
    ));
}

#[test]
fn reentrancy_is_detected_from_the_store_after_local_bookkeeping_is_lost() {
    let clock = FakeClock::new();
    let table = Arc::new(MemoryLockTable::new());
    let service = node(&table, "node-a", &clock);
    assert!(service.acquire_lock("general", "k", Duration::ZERO).unwrap());

    clock.advance(Duration::from_secs(61));
    assert_eq!(service.clean_expired_local(), 1);

    assert!(matches!(
        service.acquire_lock("general", "k", Duration::ZERO),
        Err(LockError::Reentrant { .. })
    ));
}

#[test]
fn other_thread_on_same_node_cannot_release() {
    let clock = FakeClock::new();
    let table = Arc::new(MemoryLockTable::new());
    let service = node(&table, "node-a", &clock);
    assert!(service.acquire_lock("general", "k", Duration::ZERO).unwrap());

    let other = Arc::clone(&service);
    let err = thread::spawn(move || other.unlock("general", "k"))
        .join()
        .unwrap()
        .unwrap_err();
    assert!(matches!(err, LockError::NotOwner { .. }));
    assert!(table.get("general", "k").unwrap().is_some());
}

#[test]
fn other_node_cannot_release() {
    let clock = FakeClock::new();
    let table = Arc::new(MemoryLockTable::new());
    let a = node(&table, "node-a", &clock);
    let b = node(&table, "node-b", &clock);
    assert!(a.acquire_lock("general", "k", Duration::ZERO).unwrap());

    assert!(matches!(
        b.unlock("general", "k"),
        Err(LockError::NotHeld { .. })
    ));
    assert!(a.is_locked_by_me("general", "k").unwrap());
}

#[test]
fn release_after_reclamation_is_stale() {
    let clock = FakeClock::new();
    let table = Arc::new(MemoryLockTable::new());
    let service = node(&table, "node-a", &clock);
    assert!(service.acquire_lock("general", "k", Duration::ZERO).unwrap());

    clock.advance(Duration::from_secs(61));
    assert_eq!(service.clean_expired_shared().unwrap(), 1);

    assert!(matches!(
        service.unlock("general", "k"),
        Err(LockError::StaleHandle { .. })
    ));
}

#[test]
fn release_of_unknown_key_is_stale() {
    let clock = FakeClock::new();
    let table = Arc::new(MemoryLockTable::new());
    let service = node(&table, "node-a", &clock);
    assert!(matches!(
        service.unlock("general", "never"),
        Err(LockError::StaleHandle { .. })
    ));
}

#[test]
fn heartbeat_extends_the_lease() {
    let clock = FakeClock::new();
    let table = Arc::new(MemoryLockTable::new());
    let service = node(&table, "node-a", &clock);
    assert!(service.acquire_lock("general", "k", Duration::ZERO).unwrap());

    clock.advance(Duration::from_secs(45));
    assert!(service.heartbeat("general", "k").unwrap());
    clock.advance(Duration::from_secs(45));

    assert_eq!(service.clean_expired_shared().unwrap(), 0);
    assert_eq!(service.clean_expired_local(), 0);
    service.unlock("general", "k").unwrap();
    assert!(!service.heartbeat("general", "k").unwrap());
}

#[test]
fn force_unlock_clears_any_owner() {
    let clock = FakeClock::new();
    let table = Arc::new(MemoryLockTable::new());
    let a = node(&table, "node-a", &clock);
    let b = node(&table, "node-b", &clock);
    assert!(a.acquire_lock("general", "k", Duration::ZERO).unwrap());

    assert!(b.force_unlock("general", "k").unwrap());
    assert!(!b.force_unlock("general", "k").unwrap());
    assert!(b.acquire_lock("general", "k", Duration::ZERO).unwrap());
}

#[test]
fn expired_cleanup_only_touches_expired_rows() {
    let clock = FakeClock::new();
    let table = Arc::new(MemoryLockTable::new());
    let a = node(&table, "node-a", &clock);
    assert!(a.acquire_lock("general", "old", Duration::ZERO).unwrap());
    clock.advance(Duration::from_secs(40));
    assert!(a.acquire_lock("general", "new", Duration::ZERO).unwrap());
    clock.advance(Duration::from_secs(30));

    assert_eq!(a.clean_expired_shared().unwrap(), 1);
    assert_eq!(a.clean_expired_shared().unwrap(), 0);
    assert_eq!(a.keys("general").unwrap(), BTreeSet::from(["new".to_string()]));
    assert_eq!(a.clean_expired_local(), 1);
    assert_eq!(a.clean_expired_local(), 0);
}

#[test]
fn init_and_destroy_only_touch_own_rows() {
    let clock = FakeClock::new();
    let table = Arc::new(MemoryLockTable::new());
    let a = node(&table, "node-a", &clock);
    let b = node(&table, "node-b", &clock);
    assert!(a.acquire_lock("general", "a1", Duration::ZERO).unwrap());
    assert!(a.acquire_lock("paths", "a2", Duration::ZERO).unwrap());
    assert!(b.acquire_lock("general", "b1", Duration::ZERO).unwrap());

    let restarted = node(&table, "node-a", &clock);
    assert_eq!(restarted.init().unwrap(), 2);
    assert_eq!(b.destroy().unwrap(), 1);
    assert_eq!(table.count("general").unwrap(), 0);
    assert!(b.local_records().is_empty());
}

#[test]
fn guard_view_scopes_keys_to_its_category() {
    let clock = FakeClock::new();
    let table = Arc::new(MemoryLockTable::new());
    let service = node(&table, "node-a", &clock);
    let paths = SharedConflictsGuard::new(Arc::clone(&service), "paths");
    let builds = SharedConflictsGuard::new(Arc::clone(&service), "builds");

    assert!(paths.try_to_lock("x", Duration::ZERO).unwrap());
    assert!(builds.try_to_lock("x", Duration::ZERO).unwrap());
    assert_eq!(paths.size().unwrap(), 1);
    assert!(paths.heartbeat("x").unwrap());

    paths.unlock("x").unwrap();
    assert!(!paths.is_locked("x").unwrap());
    assert!(builds.is_locked("x").unwrap());
    assert_eq!(builds.key_set().unwrap(), BTreeSet::from(["x".to_string()]));
    assert_eq!(paths.category(), "paths");
}

/// Fails the first `failures` owner-conditional deletes
struct FlakyStore {
    inner: MemoryLockTable,
    failures: AtomicU32,
}

impl LockStore for FlakyStore {
    fn try_insert(&self, record: &LockRecord) -> Result<bool, StoreError> {
        self.inner.try_insert(record)
    }

    fn get(&self, category: &str, key: &str) -> Result<Option<LockRecord>, StoreError> {
        self.inner.get(category, key)
    }

    fn delete_owned(&self, category: &str, key: &str, owner: &str) -> Result<bool, StoreError> {
        let left = self.failures.load(Ordering::SeqCst);
        if left > 0 {
            self.failures.store(left - 1, Ordering::SeqCst);
            return Err(StoreError::Unavailable("connection reset".into()));
        }
        self.inner.delete_owned(category, key, owner)
    }

    fn force_delete(&self, category: &str, key: &str) -> Result<bool, StoreError> {
        self.inner.force_delete(category, key)
    }

    fn delete_if_expired(
        &self,
        category: &str,
        key: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        self.inner.delete_if_expired(category, key, now)
    }

    fn extend_lease(
        &self,
        category: &str,
        key: &str,
        owner: &str,
        holder: &HolderId,
        expires_at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        self.inner
            .extend_lease(category, key, owner, holder, expires_at)
    }

    fn count(&self, category: &str) -> Result<usize, StoreError> {
        self.inner.count(category)
    }

    fn keys(&self, category: &str) -> Result<BTreeSet<String>, StoreError> {
        self.inner.keys(category)
    }

    fn expired(&self, now: DateTime<Utc>) -> Result<Vec<LockRecord>, StoreError> {
        self.inner.expired(now)
    }

    fn owned_by(&self, owner: &str) -> Result<Vec<LockRecord>, StoreError> {
        self.inner.owned_by(owner)
    }

    fn delete_all_owned_by(&self, owner: &str) -> Result<usize, StoreError> {
        self.inner.delete_all_owned_by(owner)
    }
}

fn flaky(failures: u32) -> Arc<FlakyStore> {
    Arc::new(FlakyStore {
        inner: MemoryLockTable::new(),
        failures: AtomicU32::new(failures),
    })
}

#[test]
fn release_retries_transient_store_failures() {
    let store = flaky(3);
    let service = SharedLockService::new(
        Arc::clone(&store) as Arc<dyn LockStore>,
        "node-a",
        FakeClock::new(),
    );
    assert!(service.acquire_lock("general", "k", Duration::ZERO).unwrap());

    service.unlock("general", "k").unwrap();
    assert!(store.get("general", "k").unwrap().is_none());
}

#[test]
fn release_gives_up_after_bounded_retries() {
    let store = flaky(10);
    let service = SharedLockService::new(
        Arc::clone(&store) as Arc<dyn LockStore>,
        "node-a",
        FakeClock::new(),
    );
    assert!(service.acquire_lock("general", "k", Duration::ZERO).unwrap());

    assert!(matches!(
        service.unlock("general", "k"),
        Err(LockError::Store(StoreError::Unavailable(_)))
    ));
    assert_eq!(store.failures.load(Ordering::SeqCst), 6);
}

/// Renews every lease it reports as expired, as a live holder's heartbeat
/// racing the cleanup pass would
struct RenewingStore {
    inner: MemoryLockTable,
    renew_to: DateTime<Utc>,
}

impl LockStore for RenewingStore {
    fn try_insert(&self, record: &LockRecord) -> Result<bool, StoreError> {
        self.inner.try_insert(record)
    }

    fn get(&self, category: &str, key: &str) -> Result<Option<LockRecord>, StoreError> {
        self.inner.get(category, key)
    }

    fn delete_owned(&self, category: &str, key: &str, owner: &str) -> Result<bool, StoreError> {
        self.inner.delete_owned(category, key, owner)
    }

    fn force_delete(&self, category: &str, key: &str) -> Result<bool, StoreError> {
        self.inner.force_delete(category, key)
    }

    fn delete_if_expired(
        &self,
        category: &str,
        key: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        self.inner.delete_if_expired(category, key, now)
    }

    fn extend_lease(
        &self,
        category: &str,
        key: &str,
        owner: &str,
        holder: &HolderId,
        expires_at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        self.inner
            .extend_lease(category, key, owner, holder, expires_at)
    }

    fn count(&self, category: &str) -> Result<usize, StoreError> {
        self.inner.count(category)
    }

    fn keys(&self, category: &str) -> Result<BTreeSet<String>, StoreError> {
        self.inner.keys(category)
    }

    fn expired(&self, now: DateTime<Utc>) -> Result<Vec<LockRecord>, StoreError> {
        let rows = self.inner.expired(now)?;
        for row in &rows {
            self.inner
                .extend_lease(&row.category, &row.key, &row.owner, &row.holder, self.renew_to)?;
        }
        Ok(rows)
    }

    fn owned_by(&self, owner: &str) -> Result<Vec<LockRecord>, StoreError> {
        self.inner.owned_by(owner)
    }

    fn delete_all_owned_by(&self, owner: &str) -> Result<usize, StoreError> {
        self.inner.delete_all_owned_by(owner)
    }
}

#[test]
fn cleanup_keeps_a_lease_renewed_after_it_was_listed() {
    let clock = FakeClock::new();
    let store = Arc::new(RenewingStore {
        inner: MemoryLockTable::new(),
        renew_to: clock.utc_now() + chrono::Duration::hours(1),
    });
    let service = SharedLockService::new(
        Arc::clone(&store) as Arc<dyn LockStore>,
        "node-a",
        clock.clone(),
    )
    .with_max_lease(Duration::from_secs(60));
    assert!(service.acquire_lock("general", "k", Duration::ZERO).unwrap());

    clock.advance(Duration::from_secs(61));
    assert_eq!(service.clean_expired_shared().unwrap(), 0);

    let row = store.get("general", "k").unwrap().unwrap();
    assert_eq!(row.owner, "node-a");
    assert!(service.is_locked_by_me("general", "k").unwrap());
    service.unlock("general", "k").unwrap();
}
