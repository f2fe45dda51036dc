// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn path_items_share_key_per_repo_path() {
    let a = PathWorkItem::new("libs-release", "org/acme/maven-metadata.xml");
    let b = PathWorkItem::new("libs-release", "org/acme/maven-metadata.xml");
    let other_repo = PathWorkItem::new("libs-snapshot", "org/acme/maven-metadata.xml");

    assert_eq!(a.unique_key(), "libs-release:org/acme/maven-metadata.xml");
    assert_eq!(a.unique_key(), b.unique_key());
    assert_ne!(a.unique_key(), other_repo.unique_key());
    assert!(a.is_same_occurrence_as(&b));
    assert_eq!(PathWorkItem::DEDUP_POLICY, DedupPolicy::Coalesce);
}

#[test]
fn replication_events_keep_key_and_occurrence_apart() {
    let deploy = ReplicationEvent::new("repo", "a.jar", ReplicationAction::Deploy, 1);
    let delete = ReplicationEvent::new("repo", "a.jar", ReplicationAction::Delete, 2);
    let replay = ReplicationEvent::new("repo", "a.jar", ReplicationAction::Deploy, 1);

    assert_eq!(deploy.unique_key(), delete.unique_key());
    assert!(!deploy.is_same_occurrence_as(&delete));
    assert!(deploy.is_same_occurrence_as(&replay));
    assert_eq!(
        ReplicationEvent::DEDUP_POLICY,
        DedupPolicy::PreserveOccurrences
    );
}

#[test]
fn default_policy_is_coalesce() {
    assert_eq!(DedupPolicy::default(), DedupPolicy::Coalesce);
    assert_eq!(
        serde_json::to_string(&DedupPolicy::PreserveOccurrences).unwrap(),
        "\"preserve_occurrences\""
    );
}
