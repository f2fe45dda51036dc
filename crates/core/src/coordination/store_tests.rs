// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::clock::{Clock, FakeClock};
use std::sync::Arc;
use std::time::Duration;

fn row(clock: &FakeClock, category: &str, key: &str, owner: &str) -> LockRecord {
    LockRecord::new(
        category,
        key,
        owner,
        HolderId::new("t1"),
        clock.utc_now(),
        Duration::from_secs(60),
    )
}

#[test]
fn insert_is_rejected_when_row_exists() {
    let clock = FakeClock::new();
    let table = MemoryLockTable::new();

    assert!(table.try_insert(&row(&clock, "general", "k", "node-a")).unwrap());
    assert!(!table.try_insert(&row(&clock, "general", "k", "node-b")).unwrap());

    let stored = table.get("general", "k").unwrap().unwrap();
    assert_eq!(stored.owner, "node-a");
}

#[test]
fn same_key_in_other_category_is_independent() {
    let clock = FakeClock::new();
    let table = MemoryLockTable::new();

    assert!(table.try_insert(&row(&clock, "general", "k", "node-a")).unwrap());
    assert!(table.try_insert(&row(&clock, "paths", "k", "node-b")).unwrap());
    assert_eq!(table.count("general").unwrap(), 1);
    assert_eq!(table.count("paths").unwrap(), 1);
}

#[test]
fn delete_owned_ignores_other_owners() {
    let clock = FakeClock::new();
    let table = MemoryLockTable::new();
    table.try_insert(&row(&clock, "general", "k", "node-a")).unwrap();

    assert!(!table.delete_owned("general", "k", "node-b").unwrap());
    assert!(table.get("general", "k").unwrap().is_some());
    assert!(table.delete_owned("general", "k", "node-a").unwrap());
    assert!(table.get("general", "k").unwrap().is_none());
}

#[test]
fn force_delete_reports_whether_row_existed() {
    let clock = FakeClock::new();
    let table = MemoryLockTable::new();
    table.try_insert(&row(&clock, "general", "k", "node-a")).unwrap();

    assert!(table.force_delete("general", "k").unwrap());
    assert!(!table.force_delete("general", "k").unwrap());
}

#[test]
fn expired_lists_only_rows_past_their_lease() {
    let clock = FakeClock::new();
    let table = MemoryLockTable::new();
    table.try_insert(&row(&clock, "general", "old", "node-a")).unwrap();
    clock.advance(Duration::from_secs(30));
    table.try_insert(&row(&clock, "general", "new", "node-a")).unwrap();
    clock.advance(Duration::from_secs(45));

    let expired = table.expired(clock.utc_now()).unwrap();
    assert_eq!(expired.len(), 1);
    assert_eq!(expired[0].key, "old");
}

#[test]
fn delete_if_expired_spares_rows_still_leased() {
    let clock = FakeClock::new();
    let table = MemoryLockTable::new();
    table.try_insert(&row(&clock, "general", "k", "node-a")).unwrap();

    clock.advance(Duration::from_secs(59));
    assert!(!table.delete_if_expired("general", "k", clock.utc_now()).unwrap());
    assert!(table.get("general", "k").unwrap().is_some());

    clock.advance(Duration::from_secs(1));
    assert!(table.delete_if_expired("general", "k", clock.utc_now()).unwrap());
    assert!(table.get("general", "k").unwrap().is_none());
    assert!(!table.delete_if_expired("general", "k", clock.utc_now()).unwrap());
}

#[test]
fn delete_if_expired_rechecks_a_renewed_lease() {
    let clock = FakeClock::new();
    let table = MemoryLockTable::new();
    table.try_insert(&row(&clock, "general", "k", "node-a")).unwrap();
    clock.advance(Duration::from_secs(61));

    let listed = table.expired(clock.utc_now()).unwrap();
    assert_eq!(listed.len(), 1);
    let renewed = clock.utc_now() + chrono::Duration::hours(1);
    assert!(table
        .extend_lease("general", "k", "node-a", &HolderId::new("t1"), renewed)
        .unwrap());

    assert!(!table.delete_if_expired("general", "k", clock.utc_now()).unwrap());
    assert_eq!(table.get("general", "k").unwrap().unwrap().lease_expires_at, renewed);
}

#[test]
fn extend_lease_requires_matching_holder() {
    let clock = FakeClock::new();
    let table = MemoryLockTable::new();
    table.try_insert(&row(&clock, "general", "k", "node-a")).unwrap();
    let later = clock.utc_now() + chrono::Duration::seconds(600);

    assert!(!table
        .extend_lease("general", "k", "node-a", &HolderId::new("t2"), later)
        .unwrap());
    assert!(table
        .extend_lease("general", "k", "node-a", &HolderId::new("t1"), later)
        .unwrap());
    assert_eq!(
        table.get("general", "k").unwrap().unwrap().lease_expires_at,
        later
    );
}

#[test]
fn owner_queries_and_bulk_delete() {
    let clock = FakeClock::new();
    let table = MemoryLockTable::new();
    table.try_insert(&row(&clock, "general", "a", "node-a")).unwrap();
    table.try_insert(&row(&clock, "paths", "b", "node-a")).unwrap();
    table.try_insert(&row(&clock, "general", "c", "node-b")).unwrap();

    assert_eq!(table.owned_by("node-a").unwrap().len(), 2);
    assert_eq!(table.delete_all_owned_by("node-a").unwrap(), 2);
    assert_eq!(table.keys("general").unwrap(), BTreeSet::from(["c".to_string()]));
}

#[test]
fn concurrent_inserts_admit_exactly_one_row() {
    let clock = FakeClock::new();
    let table = Arc::new(MemoryLockTable::new());

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let table = Arc::clone(&table);
            let record = row(&clock, "general", "contended", &format!("node-{}", i));
            std::thread::spawn(move || table.try_insert(&record).unwrap())
        })
        .collect();

    let winners = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|inserted| *inserted)
        .count();
    assert_eq!(winners, 1);
}
