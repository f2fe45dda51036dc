// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bounded, deduplicating work queue
//!
//! Producers offer items together with the callback that processes them.
//! Workers call [`WorkQueue::do_jobs`] to drain ready items while holding one
//! of `max_workers` permits. Per key, at most one item is in flight at any
//! time; further offers for a busy key wait behind it according to the item
//! kind's [`DedupPolicy`].

use super::item::{DedupPolicy, WorkItem};
use crate::panic::panic_message;
use std::collections::{HashMap, VecDeque};
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Error type returned by work callbacks
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Producer-supplied processing function
pub type WorkCallback<T> = Arc<dyn Fn(&T) -> Result<(), BoxError> + Send + Sync>;

/// Upper bound on a single wait in [`WorkQueue::wait_for_item_done`]
const DONE_POLL: Duration = Duration::from_millis(100);

/// Errors from queue operations
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("work item offered to queue '{queue}' has an empty key")]
    EmptyKey { queue: String },
}

/// Result of an offer
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OfferOutcome {
    /// Queued as new pending work
    Accepted,
    /// Merged into work already pending for the key
    Coalesced,
    /// The queue was stopped
    Rejected,
}

struct PendingWork<T> {
    item: T,
    callback: WorkCallback<T>,
}

struct KeyBacklog<T> {
    pending: VecDeque<PendingWork<T>>,
    in_flight: bool,
}

impl<T> Default for KeyBacklog<T> {
    fn default() -> Self {
        Self {
            pending: VecDeque::new(),
            in_flight: false,
        }
    }
}

/// A key is in `ready` exactly when it has pending work and nothing in flight
struct QueueState<T> {
    backlog: HashMap<String, KeyBacklog<T>>,
    ready: VecDeque<String>,
    pending: usize,
    permits: usize,
    accepting: bool,
}

impl<T: WorkItem> QueueState<T> {
    fn take_ready(&mut self) -> Option<(String, PendingWork<T>)> {
        while let Some(key) = self.ready.pop_front() {
            let Some(backlog) = self.backlog.get_mut(&key) else {
                continue;
            };
            if let Some(work) = backlog.pending.pop_front() {
                backlog.in_flight = true;
                self.pending -= 1;
                return Some((key, work));
            }
        }
        None
    }

    fn finish(&mut self, key: &str) {
        let Some(backlog) = self.backlog.get_mut(key) else {
            return;
        };
        backlog.in_flight = false;
        if backlog.pending.is_empty() {
            self.backlog.remove(key);
        } else {
            self.ready.push_back(key.to_string());
        }
    }
}

/// Named queue executing at most `max_workers` callbacks at once
pub struct WorkQueue<T: WorkItem> {
    name: String,
    max_workers: usize,
    state: Mutex<QueueState<T>>,
    /// Signalled whenever a key finishes or the queue stops
    done: Condvar,
}

impl<T: WorkItem> WorkQueue<T> {
    pub fn new(name: impl Into<String>, max_workers: usize) -> Self {
        Self {
            name: name.into(),
            max_workers,
            state: Mutex::new(QueueState {
                backlog: HashMap::new(),
                ready: VecDeque::new(),
                pending: 0,
                permits: max_workers,
                accepting: true,
            }),
            done: Condvar::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    fn state(&self) -> MutexGuard<'_, QueueState<T>> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Offer `item` for processing by `callback`.
    ///
    /// Duplicates never fail: depending on the item kind they merge into
    /// pending work or queue up behind it.
    pub fn offer_work(
        &self,
        item: T,
        callback: WorkCallback<T>,
    ) -> Result<OfferOutcome, QueueError> {
        if item.unique_key().is_empty() {
            return Err(QueueError::EmptyKey {
                queue: self.name.clone(),
            });
        }

        let mut state = self.state();
        if !state.accepting {
            tracing::debug!(queue = %self.name, key = %item.unique_key(), "queue stopped, rejecting work");
            return Ok(OfferOutcome::Rejected);
        }

        let key = item.unique_key().to_string();
        let backlog = state.backlog.entry(key.clone()).or_default();
        let merge = match T::DEDUP_POLICY {
            DedupPolicy::Coalesce => !backlog.pending.is_empty(),
            DedupPolicy::PreserveOccurrences => backlog
                .pending
                .iter()
                .any(|work| work.item.is_same_occurrence_as(&item)),
        };
        if merge {
            tracing::trace!(queue = %self.name, key = %key, "coalesced work item");
            return Ok(OfferOutcome::Coalesced);
        }

        backlog.pending.push_back(PendingWork { item, callback });
        let became_ready = !backlog.in_flight && backlog.pending.len() == 1;
        state.pending += 1;
        if became_ready {
            state.ready.push_back(key);
        }
        Ok(OfferOutcome::Accepted)
    }

    /// Offer `item`, then work the queue on the calling thread if a permit
    /// is free.
    pub fn offer_and_work(
        &self,
        item: T,
        callback: WorkCallback<T>,
    ) -> Result<OfferOutcome, QueueError> {
        let outcome = self.offer_work(item, callback)?;
        if outcome != OfferOutcome::Rejected {
            self.do_jobs();
        }
        Ok(outcome)
    }

    /// Offer `item` and, if a permit is free, start a background worker.
    ///
    /// Inside a tokio runtime the worker runs on the blocking pool; otherwise
    /// on a fresh thread.
    pub fn submit(
        self: &Arc<Self>,
        item: T,
        callback: WorkCallback<T>,
    ) -> Result<OfferOutcome, QueueError> {
        let outcome = self.offer_work(item, callback)?;
        if outcome != OfferOutcome::Rejected && self.available_permits() > 0 {
            let queue = Arc::clone(self);
            let work = move || {
                queue.do_jobs();
            };
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    handle.spawn_blocking(work);
                }
                Err(_) => {
                    std::thread::spawn(work);
                }
            }
        }
        Ok(outcome)
    }

    /// Drain ready work while holding one permit.
    ///
    /// Returns how many callbacks ran. Returns immediately when no permit is
    /// free, so a queue with zero workers never runs anything.
    pub fn do_jobs(&self) -> usize {
        let mut state = self.state();
        if state.permits == 0 {
            return 0;
        }
        state.permits -= 1;

        let mut executed = 0;
        while let Some((key, work)) = state.take_ready() {
            drop(state);
            self.execute(&key, &work);
            executed += 1;
            state = self.state();
            state.finish(&key);
            self.done.notify_all();
        }

        state.permits += 1;
        executed
    }

    fn execute(&self, key: &str, work: &PendingWork<T>) {
        let started = Instant::now();
        match std::panic::catch_unwind(AssertUnwindSafe(|| (work.callback)(&work.item))) {
            Ok(Ok(())) => {
                tracing::trace!(queue = %self.name, key = %key, elapsed = ?started.elapsed(), "work item done");
            }
            Ok(Err(e)) => {
                tracing::error!(queue = %self.name, key = %key, error = %e, "work item failed");
            }
            Err(panic) => {
                tracing::error!(
                    queue = %self.name,
                    key = %key,
                    error = %panic_message(panic.as_ref()),
                    "work item panicked"
                );
            }
        }
    }

    /// Free worker capacity, `0..=max_workers`
    pub fn available_permits(&self) -> usize {
        self.state().permits
    }

    /// Workers currently holding a permit
    pub fn active_workers(&self) -> usize {
        self.max_workers - self.available_permits()
    }

    /// Number of pending (not yet started) items
    pub fn get_queue_size(&self) -> usize {
        self.state().pending
    }

    pub fn is_stopped(&self) -> bool {
        !self.state().accepting
    }

    /// Block until nothing is pending or in flight for `item`'s key
    pub fn wait_for_item_done(&self, item: &T) {
        let key = item.unique_key();
        let mut state = self.state();
        while state.backlog.contains_key(key) {
            state = match self.done.wait_timeout(state, DONE_POLL) {
                Ok((guard, _)) => guard,
                Err(e) => e.into_inner().0,
            };
        }
    }

    /// Like [`wait_for_item_done`](Self::wait_for_item_done), giving up after
    /// `timeout`. Returns whether the key drained.
    pub fn wait_for_item_done_timeout(&self, item: &T, timeout: Duration) -> bool {
        let key = item.unique_key();
        let deadline = Instant::now().checked_add(timeout);
        let mut state = self.state();
        while state.backlog.contains_key(key) {
            let wait = match deadline {
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        return false;
                    }
                    remaining.min(DONE_POLL)
                }
                None => DONE_POLL,
            };
            state = match self.done.wait_timeout(state, wait) {
                Ok((guard, _)) => guard,
                Err(e) => e.into_inner().0,
            };
        }
        true
    }

    /// Stop accepting work and drop everything pending.
    ///
    /// Callbacks already running finish normally.
    pub fn stop_queue(&self) {
        let mut state = self.state();
        state.accepting = false;
        let dropped = state.pending;
        state.backlog.retain(|_, backlog| {
            backlog.pending.clear();
            backlog.in_flight
        });
        state.ready.clear();
        state.pending = 0;
        drop(state);
        self.done.notify_all();
        tracing::info!(queue = %self.name, dropped, "work queue stopped");
    }
}

impl<T: WorkItem> std::fmt::Debug for WorkQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkQueue")
            .field("name", &self.name)
            .field("max_workers", &self.max_workers)
            .finish_non_exhaustive()
    }
}

/// Type-erased view of a queue for monitoring and shutdown
pub trait QueueView: Send + Sync {
    fn name(&self) -> &str;
    fn max_workers(&self) -> usize;
    fn available_permits(&self) -> usize;
    fn active_workers(&self) -> usize;
    fn queue_size(&self) -> usize;
    fn is_stopped(&self) -> bool;
    fn stop_queue(&self);
}

impl<T: WorkItem> QueueView for WorkQueue<T> {
    fn name(&self) -> &str {
        WorkQueue::name(self)
    }

    fn max_workers(&self) -> usize {
        WorkQueue::max_workers(self)
    }

    fn available_permits(&self) -> usize {
        WorkQueue::available_permits(self)
    }

    fn active_workers(&self) -> usize {
        WorkQueue::active_workers(self)
    }

    fn queue_size(&self) -> usize {
        self.get_queue_size()
    }

    fn is_stopped(&self) -> bool {
        WorkQueue::is_stopped(self)
    }

    fn stop_queue(&self) {
        WorkQueue::stop_queue(self)
    }
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;
