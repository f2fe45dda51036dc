// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Background work scheduling
//!
//! - **WorkItem** - Schedulable unit with a deduplication key
//! - **WorkQueue** - Bounded queue running one item per key at a time
//! - **WorkQueueRegistry** - Singleton queues by identity, sized from tunables

pub mod identity;
pub mod item;
pub mod monitor;
pub mod queue;
pub mod registry;

pub use identity::QueueId;
pub use item::{DedupPolicy, PathWorkItem, ReplicationAction, ReplicationEvent, WorkItem};
pub use monitor::{InMemoryQueueMonitor, QueueMonitor, QueueSnapshot};
pub use queue::{BoxError, OfferOutcome, QueueError, QueueView, WorkCallback, WorkQueue};
pub use registry::{RegistryError, WorkQueueRegistry};
