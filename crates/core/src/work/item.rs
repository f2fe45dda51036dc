// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Units of schedulable work
//!
//! A work item carries two separate notions of identity. [`WorkItem::unique_key`]
//! decides which items may never run concurrently and which pending items may
//! be merged. [`WorkItem::is_same_occurrence_as`] decides whether two items
//! with the same key describe the same event.

use serde::Serialize;

/// What a queue does with an offer whose key already has pending work
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DedupPolicy {
    /// Keep at most one pending item per key; later offers merge into it
    #[default]
    Coalesce,
    /// Queue distinct occurrences behind each other and run them in offer
    /// order; only an offer of the same occurrence merges
    PreserveOccurrences,
}

/// Work accepted by a [`WorkQueue`](super::WorkQueue)
pub trait WorkItem: Send + Sync + 'static {
    /// Duplicate policy of this item kind
    const DEDUP_POLICY: DedupPolicy = DedupPolicy::Coalesce;

    /// Key for deduplication and per-key mutual exclusion. Must not be empty.
    fn unique_key(&self) -> &str;

    /// Whether `other` describes the same occurrence as `self`
    fn is_same_occurrence_as(&self, other: &Self) -> bool;
}

/// Recalculation request for one repository path
///
/// Any number of requests for the same path collapse into a single pending
/// recalculation.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct PathWorkItem {
    pub repo_key: String,
    pub path: String,
    key: String,
}

impl PathWorkItem {
    pub fn new(repo_key: impl Into<String>, path: impl Into<String>) -> Self {
        let repo_key = repo_key.into();
        let path = path.into();
        let key = format!("{}:{}", repo_key, path);
        Self {
            repo_key,
            path,
            key,
        }
    }
}

impl WorkItem for PathWorkItem {
    fn unique_key(&self) -> &str {
        &self.key
    }

    fn is_same_occurrence_as(&self, other: &Self) -> bool {
        self == other
    }
}

/// What happened to a path in a replicated repository
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplicationAction {
    Deploy,
    Delete,
    PropertyChange,
}

/// One replication event for a path
///
/// Events for the same path must reach the target in the order they
/// happened, so distinct events are never merged.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct ReplicationEvent {
    pub repo_key: String,
    pub path: String,
    pub action: ReplicationAction,
    /// Position of the event in the source's event log
    pub sequence: u64,
    key: String,
}

impl ReplicationEvent {
    pub fn new(
        repo_key: impl Into<String>,
        path: impl Into<String>,
        action: ReplicationAction,
        sequence: u64,
    ) -> Self {
        let repo_key = repo_key.into();
        let path = path.into();
        let key = format!("{}:{}", repo_key, path);
        Self {
            repo_key,
            path,
            action,
            sequence,
            key,
        }
    }
}

impl WorkItem for ReplicationEvent {
    const DEDUP_POLICY: DedupPolicy = DedupPolicy::PreserveOccurrences;

    fn unique_key(&self) -> &str {
        &self.key
    }

    fn is_same_occurrence_as(&self, other: &Self) -> bool {
        self.sequence == other.sequence && self.action == other.action
    }
}

#[cfg(test)]
#[path = "item_tests.rs"]
mod tests;
