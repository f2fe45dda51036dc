// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Configuration modules

mod coordinator;
mod tunables;

pub use coordinator::{ConfigError, CoordinationConfig, LockingConfig};
pub use tunables::{SizingSource, Tunables};
