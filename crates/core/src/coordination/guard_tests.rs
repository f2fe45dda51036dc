// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::clock::SystemClock;
use crate::coordination::memory::{MemoryConflictsGuard, MemoryLockConfig};

fn guards() -> Arc<dyn ConflictsGuard> {
    Arc::new(MemoryConflictsGuard::new(
        MemoryLockConfig::default(),
        SystemClock,
    ))
}

#[test]
fn keyed_guard_delegates_to_its_key() {
    let guards = guards();
    let guard = KeyedConflictGuard::new(Arc::clone(&guards), "libs-release/a.jar");

    assert!(guard.try_to_lock(Duration::from_millis(10)).unwrap());
    assert!(guard.is_locked().unwrap());
    assert!(guards.is_locked("libs-release/a.jar").unwrap());
    assert!(!guards.is_locked("libs-release/b.jar").unwrap());

    guard.unlock().unwrap();
    assert!(!guard.is_locked().unwrap());
}

#[test]
fn guards_for_same_key_share_ownership() {
    let guards = guards();
    let first = KeyedConflictGuard::new(Arc::clone(&guards), "k");
    let second = KeyedConflictGuard::new(Arc::clone(&guards), "k");

    assert!(first.try_to_lock(Duration::ZERO).unwrap());
    let contender = second.clone();
    let acquired = std::thread::spawn(move || contender.try_to_lock(Duration::from_millis(20)))
        .join()
        .unwrap()
        .unwrap();
    assert!(!acquired);

    assert!(second.force_unlock().unwrap());
    assert!(!first.is_locked().unwrap());
}

#[test]
fn debug_output_names_the_key() {
    let guard = KeyedConflictGuard::new(guards(), "debian/pool");
    assert!(format!("{:?}", guard).contains("debian/pool"));
    assert_eq!(guard.key(), "debian/pool");
}
