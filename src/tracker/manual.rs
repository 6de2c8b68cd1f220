//! Tracker for manually pinned oracle values
//!
//! Reads a JSON file mapping request ids to values and writes them into the
//! `qv_{id}` namespace, scaled to the contract's fixed-point granularity.
//! Operators use this to pin values for feeds without a live fetcher; the
//! file is re-read every cycle so edits take effect without a restart.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::db::{keys, Store};
use crate::error::{Error, Result};
use crate::tracker::{Tracker, VALUE_GRANULARITY};

#[derive(Debug, Deserialize)]
struct ManualEntry {
    value: f64,
}

/// Writes values from the manual data file
pub struct ManualDataTracker {
    store: Arc<Store>,
    path: String,
}

impl ManualDataTracker {
    /// Create the tracker over the given file path
    pub fn new(store: Arc<Store>, path: String) -> Self {
        Self { store, path }
    }
}

#[async_trait]
impl Tracker for ManualDataTracker {
    fn name(&self) -> &'static str {
        "manualData"
    }

    async fn poll(&self) -> Result<()> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path, "no manual data file, skipping");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };
        let entries: HashMap<String, ManualEntry> = serde_json::from_str(&raw)?;

        let mut kv_keys = Vec::with_capacity(entries.len());
        let mut kv_values = Vec::with_capacity(entries.len());
        for (id, entry) in entries {
            let request_id: u64 = id
                .parse()
                .map_err(|_| Error::config(format!("manual data has non-numeric id \"{id}\"")))?;
            let scaled = (entry.value * VALUE_GRANULARITY as f64).round() as u64;
            kv_keys.push(keys::oracle_value(request_id));
            kv_values.push(scaled.to_string().into_bytes());
        }
        self.store.batch_put(&kv_keys, &kv_values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn test_manual_values_written_scaled() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(Store::open(dir.path().join("db")).unwrap());
        let file = dir.path().join("manualData.json");
        let mut f = std::fs::File::create(&file).unwrap();
        write!(f, "{{\"50\": {{\"value\": 1234.5}}, \"2\": {{\"value\": 0.25}}}}").unwrap();

        let tracker = ManualDataTracker::new(store.clone(), file.display().to_string());
        tracker.poll().await.unwrap();

        assert_eq!(store.get("qv_50").unwrap().unwrap(), b"1234500000");
        assert_eq!(store.get("qv_2").unwrap().unwrap(), b"250000");
    }

    #[tokio::test]
    async fn test_missing_file_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(Store::open(dir.path().join("db")).unwrap());
        let tracker = ManualDataTracker::new(store, "does/not/exist.json".to_string());
        assert!(tracker.poll().await.is_ok());
    }

    #[tokio::test]
    async fn test_bad_id_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(Store::open(dir.path().join("db")).unwrap());
        let file = dir.path().join("manualData.json");
        std::fs::write(&file, "{\"abc\": {\"value\": 1.0}}").unwrap();
        let tracker = ManualDataTracker::new(store, file.display().to_string());
        assert!(tracker.poll().await.is_err());
    }
}
