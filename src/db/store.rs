//! Embedded KV store wrapper
//!
//! Thin layer over sled. Keys are ASCII strings; values opaque bytes.
//! Durability is whatever sled provides; the mining path treats the store
//! as a cache of chain state and re-populates it on start.

use std::path::Path;

use sled::Batch;

use crate::error::Result;

/// Handle to the embedded store
#[derive(Clone)]
pub struct Store {
    db: sled::Db,
}

impl Store {
    /// Open (or create) the store at `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let db = sled::open(path)?;
        Ok(Self { db })
    }

    /// Delete any existing store at `path`, then open a fresh one
    ///
    /// The mine command starts from an empty store so stale snapshots from a
    /// previous run can never gate a submission.
    pub fn wipe_and_open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            std::fs::remove_dir_all(path)?;
        }
        Self::open(path)
    }

    /// Read one key
    pub fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.db.get(key.as_bytes())?.map(|v| v.to_vec()))
    }

    /// Write one key
    pub fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        self.db.insert(key.as_bytes(), value)?;
        Ok(())
    }

    /// Write a batch of pairs atomically
    pub fn batch_put(&self, keys: &[String], values: &[Vec<u8>]) -> Result<()> {
        let mut batch = Batch::default();
        for (key, value) in keys.iter().zip(values.iter()) {
            batch.insert(key.as_bytes(), value.as_slice());
        }
        self.db.apply_batch(batch)?;
        Ok(())
    }

    /// Flush pending writes to disk
    pub fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }
}
