// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! File-backed lock table for the shared conflict-guard backend
//!
//! The table is one JSON document. Every operation takes an exclusive lock
//! on a sidecar `.lock` file, reads the document, and rewrites it through a
//! temp file and rename when it changed. Processes on one host pointing at
//! the same path therefore see a single transactional table.

use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use wq_core::coordination::{HolderId, LockRecord, LockStore, StoreError};

#[derive(Debug, Default, Serialize, Deserialize)]
struct TableDocument {
    #[serde(default)]
    locks: Vec<LockRecord>,
}

impl TableDocument {
    fn position(&self, category: &str, key: &str) -> Option<usize> {
        self.locks
            .iter()
            .position(|row| row.category == category && row.key == key)
    }
}

/// Lock table persisted as a JSON file
#[derive(Debug)]
pub struct FileLockTable {
    path: PathBuf,
    lock_path: PathBuf,
    /// Serializes access from threads of this process
    guard: Mutex<()>,
}

impl FileLockTable {
    /// Open the table at `path`, creating its directory if needed.
    ///
    /// The file itself is created on the first write.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let mut lock_path = path.as_os_str().to_owned();
        lock_path.push(".lock");
        Ok(Self {
            path: path.to_path_buf(),
            lock_path: PathBuf::from(lock_path),
            guard: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run `op` against the current document under the table lock.
    ///
    /// `op` returns its result and whether it modified the document.
    fn transact<R>(
        &self,
        op: impl FnOnce(&mut TableDocument) -> (R, bool),
    ) -> Result<R, StoreError> {
        let _in_process = self.guard.lock().unwrap_or_else(|e| e.into_inner());
        let lock_file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&self.lock_path)?;
        lock_file.lock_exclusive()?;

        let result = self.read().and_then(|mut doc| {
            let (value, dirty) = op(&mut doc);
            if dirty {
                self.write(&doc)?;
            }
            Ok(value)
        });

        if let Err(e) = FileExt::unlock(&lock_file) {
            tracing::warn!(path = %self.lock_path.display(), error = %e, "failed to unlock lock table");
        }
        result
    }

    fn read(&self) -> Result<TableDocument, StoreError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(TableDocument::default()),
            Err(e) => return Err(e.into()),
        };
        if content.trim().is_empty() {
            return Ok(TableDocument::default());
        }
        Ok(serde_json::from_str(&content)?)
    }

    fn write(&self, doc: &TableDocument) -> Result<(), StoreError> {
        let mut tmp_path = self.path.as_os_str().to_owned();
        tmp_path.push(".tmp");
        let tmp_path = PathBuf::from(tmp_path);

        let mut file = File::create(&tmp_path)?;
        serde_json::to_writer_pretty(&mut file, doc)?;
        file.write_all(b"\n")?;
        file.sync_all()?;
        std::fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }
}

impl LockStore for FileLockTable {
    fn try_insert(&self, record: &LockRecord) -> Result<bool, StoreError> {
        self.transact(|doc| {
            if doc.position(&record.category, &record.key).is_some() {
                return (false, false);
            }
            doc.locks.push(record.clone());
            (true, true)
        })
    }

    fn get(&self, category: &str, key: &str) -> Result<Option<LockRecord>, StoreError> {
        self.transact(|doc| {
            let row = doc.position(category, key).map(|i| doc.locks[i].clone());
            (row, false)
        })
    }

    fn delete_owned(&self, category: &str, key: &str, owner: &str) -> Result<bool, StoreError> {
        self.transact(|doc| match doc.position(category, key) {
            Some(i) if doc.locks[i].owner == owner => {
                doc.locks.remove(i);
                (true, true)
            }
            _ => (false, false),
        })
    }

    fn force_delete(&self, category: &str, key: &str) -> Result<bool, StoreError> {
        self.transact(|doc| match doc.position(category, key) {
            Some(i) => {
                doc.locks.remove(i);
                (true, true)
            }
            None => (false, false),
        })
    }

    fn delete_if_expired(
        &self,
        category: &str,
        key: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        self.transact(|doc| match doc.position(category, key) {
            Some(i) if doc.locks[i].is_expired(now) => {
                doc.locks.remove(i);
                (true, true)
            }
            _ => (false, false),
        })
    }

    fn extend_lease(
        &self,
        category: &str,
        key: &str,
        owner: &str,
        holder: &HolderId,
        expires_at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        self.transact(|doc| match doc.position(category, key) {
            Some(i) if doc.locks[i].is_held_by(owner, holder) => {
                doc.locks[i].lease_expires_at = expires_at;
                (true, true)
            }
            _ => (false, false),
        })
    }

    fn count(&self, category: &str) -> Result<usize, StoreError> {
        self.transact(|doc| {
            let count = doc.locks.iter().filter(|row| row.category == category).count();
            (count, false)
        })
    }

    fn keys(&self, category: &str) -> Result<BTreeSet<String>, StoreError> {
        self.transact(|doc| {
            let keys = doc
                .locks
                .iter()
                .filter(|row| row.category == category)
                .map(|row| row.key.clone())
                .collect();
            (keys, false)
        })
    }

    fn expired(&self, now: DateTime<Utc>) -> Result<Vec<LockRecord>, StoreError> {
        self.transact(|doc| {
            let rows = doc
                .locks
                .iter()
                .filter(|row| row.is_expired(now))
                .cloned()
                .collect();
            (rows, false)
        })
    }

    fn owned_by(&self, owner: &str) -> Result<Vec<LockRecord>, StoreError> {
        self.transact(|doc| {
            let rows = doc
                .locks
                .iter()
                .filter(|row| row.owner == owner)
                .cloned()
                .collect();
            (rows, false)
        })
    }

    fn delete_all_owned_by(&self, owner: &str) -> Result<usize, StoreError> {
        self.transact(|doc| {
            let before = doc.locks.len();
            doc.locks.retain(|row| row.owner != owner);
            let removed = before - doc.locks.len();
            (removed, removed > 0)
        })
    }
}

#[cfg(test)]
#[path = "table_tests.rs"]
mod tests;
