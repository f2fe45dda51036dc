// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::work::item::PathWorkItem;
use crate::work::queue::WorkQueue;

#[test]
fn snapshots_reflect_live_queue_state() {
    let monitor = InMemoryQueueMonitor::new();
    let rpm = Arc::new(WorkQueue::<PathWorkItem>::new("Rpm Metadata", 8));
    let helm = Arc::new(WorkQueue::<PathWorkItem>::new("Helm Metadata", 2));
    monitor.register_queue(rpm.clone()).unwrap();
    monitor.register_queue(helm.clone()).unwrap();

    rpm.offer_work(PathWorkItem::new("rpm-local", "repodata"), Arc::new(|_: &PathWorkItem| Ok(())))
        .unwrap();
    helm.stop_queue();

    let snapshots = monitor.snapshots();
    assert_eq!(snapshots.len(), 2);
    assert_eq!(snapshots[0].name, "Helm Metadata");
    assert!(snapshots[0].stopped);
    assert_eq!(
        snapshots[1],
        QueueSnapshot {
            name: "Rpm Metadata".to_string(),
            max_workers: 8,
            active_workers: 0,
            available_permits: 8,
            queue_size: 1,
            stopped: false,
        }
    );
}

#[test]
fn snapshot_serializes_as_flat_json() {
    let queue = WorkQueue::<PathWorkItem>::new("Debian Metadata", 8);
    let json = serde_json::to_value(QueueSnapshot::of(&queue)).unwrap();
    assert_eq!(json["name"], "Debian Metadata");
    assert_eq!(json["max_workers"], 8);
    assert_eq!(json["queue_size"], 0);
}
