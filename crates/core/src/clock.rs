// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Clock abstraction for testable time handling
//!
//! Idle eviction runs on the monotonic clock; lease timestamps written to the
//! shared lock table use wall-clock time so every node reads them the same way.

use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// A clock that provides the current time
pub trait Clock: Clone + Send + Sync + 'static {
    /// Monotonic time, used for idle tracking within one process
    fn now(&self) -> Instant;

    /// Wall-clock time, used for lease timestamps shared across nodes
    fn utc_now(&self) -> DateTime<Utc>;
}

/// Real system clock
#[derive(Clone, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn utc_now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Fake clock for testing with controllable time
///
/// Both the monotonic and the wall-clock readings move together.
#[derive(Clone, Debug)]
pub struct FakeClock {
    current: Arc<Mutex<(Instant, DateTime<Utc>)>>,
}

impl FakeClock {
    pub fn new() -> Self {
        Self {
            current: Arc::new(Mutex::new((Instant::now(), Utc::now()))),
        }
    }

    /// Advance the clock by the given duration
    pub fn advance(&self, duration: Duration) {
        let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        current.0 += duration;
        if let Some(wall) = chrono::Duration::from_std(duration)
            .ok()
            .and_then(|delta| current.1.checked_add_signed(delta))
        {
            current.1 = wall;
        }
    }
}

impl Default for FakeClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for FakeClock {
    fn now(&self) -> Instant {
        self.current.lock().unwrap_or_else(|e| e.into_inner()).0
    }

    fn utc_now(&self) -> DateTime<Utc> {
        self.current.lock().unwrap_or_else(|e| e.into_inner()).1
    }
}

#[cfg(test)]
#[path = "clock_tests.rs"]
mod tests;
