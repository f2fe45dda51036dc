// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Monitoring sink for work queues

use super::queue::{BoxError, QueueView};
use serde::Serialize;
use std::sync::{Arc, Mutex};

/// Receives every queue the registry creates
pub trait QueueMonitor: Send + Sync {
    fn register_queue(&self, queue: Arc<dyn QueueView>) -> Result<(), BoxError>;
}

/// Point-in-time state of one queue
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct QueueSnapshot {
    pub name: String,
    pub max_workers: usize,
    pub active_workers: usize,
    pub available_permits: usize,
    pub queue_size: usize,
    pub stopped: bool,
}

impl QueueSnapshot {
    pub fn of(queue: &dyn QueueView) -> Self {
        Self {
            name: queue.name().to_string(),
            max_workers: queue.max_workers(),
            active_workers: queue.active_workers(),
            available_permits: queue.available_permits(),
            queue_size: queue.queue_size(),
            stopped: queue.is_stopped(),
        }
    }
}

/// Monitor that keeps registered queues for later inspection
#[derive(Default)]
pub struct InMemoryQueueMonitor {
    queues: Mutex<Vec<Arc<dyn QueueView>>>,
}

impl InMemoryQueueMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshots of every registered queue, sorted by name
    pub fn snapshots(&self) -> Vec<QueueSnapshot> {
        let queues = self.queues.lock().unwrap_or_else(|e| e.into_inner());
        let mut snapshots: Vec<_> = queues.iter().map(|q| QueueSnapshot::of(q.as_ref())).collect();
        snapshots.sort_by(|a, b| a.name.cmp(&b.name));
        snapshots
    }
}

impl QueueMonitor for InMemoryQueueMonitor {
    fn register_queue(&self, queue: Arc<dyn QueueView>) -> Result<(), BoxError> {
        self.queues
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(queue);
        Ok(())
    }
}

#[cfg(test)]
#[path = "monitor_tests.rs"]
mod tests;
