//! In-process proxy over the embedded store
//!
//! Used when the miner and the data server share a process. Mirrors the
//! remote proxy's behavior so the mining side cannot tell them apart,
//! including the address prefixing of scratch writes.

use std::collections::HashMap;
use std::sync::Arc;

use alloy_primitives::Address;
use async_trait::async_trait;

use crate::crypto::address_hex;
use crate::db::{DataProxy, Store};
use crate::error::Result;

/// Direct proxy over a local [`Store`]
#[derive(Clone)]
pub struct LocalProxy {
    store: Arc<Store>,
    address: Address,
}

impl LocalProxy {
    /// Wrap a store, prefixing writes with the given miner address
    pub fn new(store: Arc<Store>, address: Address) -> Self {
        Self { store, address }
    }

    fn prefixed(&self, key: &str) -> String {
        let prefix = address_hex(self.address);
        if key.starts_with(&prefix) {
            key.to_string()
        } else {
            format!("{prefix}-{key}")
        }
    }
}

#[async_trait]
impl DataProxy for LocalProxy {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.store.get(key)
    }

    async fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        self.store.put(&self.prefixed(key), value)
    }

    async fn batch_get(&self, keys: &[String]) -> Result<HashMap<String, Vec<u8>>> {
        let mut out = HashMap::with_capacity(keys.len());
        for key in keys {
            if let Some(value) = self.store.get(key)? {
                out.insert(key.clone(), value);
            }
        }
        Ok(out)
    }

    async fn batch_put(&self, keys: &[String], values: &[Vec<u8>]) -> Result<()> {
        let prefixed: Vec<String> = keys.iter().map(|k| self.prefixed(k)).collect();
        self.store.batch_put(&prefixed, values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::keys;

    fn proxy() -> (tempfile::TempDir, LocalProxy) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(Store::open(dir.path()).unwrap());
        let addr = Address::from_slice(&[0x42; 20]);
        (dir, LocalProxy::new(store, addr))
    }

    #[tokio::test]
    async fn test_get_reads_raw_keys() {
        let (_dir, proxy) = proxy();
        proxy.store.put(keys::GAS_PRICE, b"0x1").unwrap();
        assert_eq!(proxy.get(keys::GAS_PRICE).await.unwrap().unwrap(), b"0x1");
    }

    #[tokio::test]
    async fn test_put_prefixes_scratch_writes() {
        let (_dir, proxy) = proxy();
        proxy.put("last_submit", b"1700").await.unwrap();
        let addr = Address::from_slice(&[0x42; 20]);
        let stored = proxy.store.get(&keys::last_submit_for(addr)).unwrap();
        assert_eq!(stored.unwrap(), b"1700");
    }

    #[tokio::test]
    async fn test_put_keeps_existing_prefix() {
        let (_dir, proxy) = proxy();
        let addr = Address::from_slice(&[0x42; 20]);
        let key = keys::last_submit_for(addr);
        proxy.put(&key, b"1").await.unwrap();
        assert_eq!(proxy.store.get(&key).unwrap().unwrap(), b"1");
        // No double prefix was applied.
        let doubled = format!("{}-{}", address_hex(addr), key);
        assert_eq!(proxy.store.get(&doubled).unwrap(), None);
    }

    #[tokio::test]
    async fn test_batch_get_skips_missing() {
        let (_dir, proxy) = proxy();
        proxy.store.put("qv_1", b"100").unwrap();
        let keys = vec!["qv_1".to_string(), "qv_2".to_string()];
        let out = proxy.batch_get(&keys).await.unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out["qv_1"], b"100");
    }
}
