// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Registry of singleton work queues
//!
//! The first caller asking for a queue identity creates it, sized from the
//! tunables; every later caller gets the same instance. A queue is bound to
//! the item type it was created with.

use super::identity::QueueId;
use super::item::WorkItem;
use super::monitor::QueueMonitor;
use super::queue::{QueueView, WorkQueue};
use crate::config::SizingSource;
use crate::panic::panic_message;
use dashmap::DashMap;
use std::any::{type_name, Any};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use thiserror::Error;

/// Errors from registry lookups
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("unsupported work queue: no queue serves callback '{0}'")]
    UnsupportedQueue(String),
    #[error("no work queue '{0}' has been created")]
    QueueNotFound(String),
    #[error("work queue '{queue}' holds {expected}, not {requested}")]
    ItemTypeMismatch {
        queue: String,
        expected: &'static str,
        requested: &'static str,
    },
}

struct RegisteredQueue {
    typed: Arc<dyn Any + Send + Sync>,
    view: Arc<dyn QueueView>,
    item_type: &'static str,
}

/// Maps queue identities to their singleton queues
pub struct WorkQueueRegistry {
    queues: DashMap<QueueId, RegisteredQueue>,
    sizing: Arc<dyn SizingSource>,
    monitor: Option<Arc<dyn QueueMonitor>>,
}

impl WorkQueueRegistry {
    pub fn new(sizing: Arc<dyn SizingSource>) -> Self {
        Self {
            queues: DashMap::new(),
            sizing,
            monitor: None,
        }
    }

    pub fn with_monitor(mut self, monitor: Arc<dyn QueueMonitor>) -> Self {
        self.monitor = Some(monitor);
        self
    }

    /// Worker count for `id`; negative tunables clamp to zero
    pub fn worker_count(&self, id: QueueId) -> usize {
        let configured = self.sizing.get_int(id.workers_key());
        if configured < 0 {
            tracing::warn!(
                queue = %id,
                key = id.workers_key(),
                configured,
                "negative worker count, queue will not run work"
            );
        }
        usize::try_from(configured).unwrap_or(0)
    }

    /// Get or create the queue for `id`
    pub fn get_work_queue<T: WorkItem>(
        &self,
        id: QueueId,
    ) -> Result<Arc<WorkQueue<T>>, RegistryError> {
        let existing = self
            .queues
            .get(&id)
            .map(|entry| (Arc::clone(&entry.typed), entry.item_type));
        let (typed, item_type) = match existing {
            Some(found) => found,
            None => {
                // Sizing lookups and logging stay outside the map shard lock
                let workers = self.worker_count(id);
                let mut created: Option<Arc<dyn QueueView>> = None;
                let found = {
                    let entry = self.queues.entry(id).or_insert_with(|| {
                        let queue = Arc::new(WorkQueue::<T>::new(id.display_name(), workers));
                        created = Some(Arc::clone(&queue) as Arc<dyn QueueView>);
                        RegisteredQueue {
                            typed: Arc::clone(&queue) as Arc<dyn Any + Send + Sync>,
                            view: queue,
                            item_type: type_name::<T>(),
                        }
                    });
                    (Arc::clone(&entry.typed), entry.item_type)
                };
                if let Some(view) = created {
                    tracing::info!(queue = %id, workers, "created work queue");
                    self.register_with_monitor(id, view);
                }
                found
            }
        };

        typed
            .downcast::<WorkQueue<T>>()
            .map_err(|_| RegistryError::ItemTypeMismatch {
                queue: id.display_name().to_string(),
                expected: item_type,
                requested: type_name::<T>(),
            })
    }

    /// Get or create the queue serving the producer callback `name`
    pub fn get_work_queue_by_callback<T: WorkItem>(
        &self,
        name: &str,
    ) -> Result<Arc<WorkQueue<T>>, RegistryError> {
        let id = QueueId::from_callback(name)
            .ok_or_else(|| RegistryError::UnsupportedQueue(name.to_string()))?;
        self.get_work_queue(id)
    }

    fn register_with_monitor(&self, id: QueueId, view: Arc<dyn QueueView>) {
        let Some(monitor) = &self.monitor else {
            return;
        };
        if let Err(e) = monitor.register_queue(view) {
            tracing::warn!(queue = %id, error = %e, "failed to register work queue with monitor");
        }
    }

    /// Every queue created so far, in identity order
    pub fn get_existing_work_queues(&self) -> Vec<(QueueId, Arc<dyn QueueView>)> {
        let mut queues: Vec<_> = self
            .queues
            .iter()
            .map(|entry| (*entry.key(), Arc::clone(&entry.value().view)))
            .collect();
        queues.sort_by_key(|(id, _)| *id);
        queues
    }

    pub fn queue(&self, id: QueueId) -> Option<Arc<dyn QueueView>> {
        self.queues.get(&id).map(|entry| Arc::clone(&entry.view))
    }

    /// Pending items of an existing queue
    pub fn estimated_pending_tasks(&self, id: QueueId) -> Result<usize, RegistryError> {
        self.queue(id)
            .map(|queue| queue.queue_size())
            .ok_or_else(|| RegistryError::QueueNotFound(id.display_name().to_string()))
    }

    /// Pending items of the queue serving callback `name`
    pub fn estimated_pending_tasks_by_callback(&self, name: &str) -> Result<usize, RegistryError> {
        let id = QueueId::from_callback(name)
            .ok_or_else(|| RegistryError::UnsupportedQueue(name.to_string()))?;
        self.estimated_pending_tasks(id)
    }

    /// Stop every queue; a failure on one does not stop the rest
    pub fn close_all_queues(&self) {
        for (id, queue) in self.get_existing_work_queues() {
            if let Err(panic) = std::panic::catch_unwind(AssertUnwindSafe(|| queue.stop_queue())) {
                tracing::error!(
                    queue = %id,
                    error = %panic_message(panic.as_ref()),
                    "failed to close work queue"
                );
            }
        }
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
