// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Integer tunables that size the work queues

use crate::work::QueueId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Read access to integer tunables
pub trait SizingSource: Send + Sync {
    fn get_int(&self, name: &str) -> i64;
}

/// Tunable overrides on top of the built-in queue sizes
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Tunables {
    overrides: BTreeMap<String, i64>,
}

impl Tunables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: i64) -> Self {
        self.overrides.insert(name.into(), value);
        self
    }

    pub fn set(&mut self, name: impl Into<String>, value: i64) {
        self.overrides.insert(name.into(), value);
    }

    /// The override for `name`, if any
    pub fn get(&self, name: &str) -> Option<i64> {
        self.overrides.get(name).copied()
    }

    /// Names with an override that no queue reads
    pub fn unknown_keys(&self) -> Vec<&str> {
        self.overrides
            .keys()
            .filter(|name| QueueId::from_workers_key(name).is_none())
            .map(String::as_str)
            .collect()
    }
}

impl SizingSource for Tunables {
    /// Override, else the queue default for a known worker key, else 0
    fn get_int(&self, name: &str) -> i64 {
        self.get(name)
            .or_else(|| QueueId::from_workers_key(name).map(|id| id.default_workers()))
            .unwrap_or(0)
    }
}

#[cfg(test)]
#[path = "tunables_tests.rs"]
mod tests;
