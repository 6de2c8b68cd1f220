//! Server side of the signed proxy protocol
//!
//! Proxies data requests from approved miner processes. Miner addresses are
//! whitelisted and a short history of request timestamps is retained per
//! address to reject replays. Every request must be signed so the signer
//! address can be recovered and checked. This component does NOT prevent
//! DDoS; operators exposing the endpoint publicly need their own protection.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::time::Duration;

use alloy_primitives::{keccak256, Address};
use lru::LruCache;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::crypto::{self, address_hex};
use crate::db::codec::{self, RequestPayload, ResponsePayload};
use crate::db::{keys, Store};
use crate::error::{Error, Result};
use crate::util;

/// How long a signed request stays valid. Semi-protection against replays;
/// the per-address timestamp history covers the window itself.
pub const VALIDITY_THRESHOLD: Duration = Duration::from_secs(2);

/// Timestamps remembered per whitelisted address
const HISTORY_CAPACITY: usize = 50;

/// Validates and executes incoming proxy requests
pub struct ProxyHandler {
    store: Arc<Store>,
    whitelist: Vec<Address>,
    history: Mutex<HashMap<Address, LruCache<i64, ()>>>,
    // Write batches must appear atomic to concurrent readers.
    access: RwLock<()>,
    validity: Duration,
}

impl ProxyHandler {
    /// Create a handler over the store for the given whitelist
    pub fn new(store: Arc<Store>, whitelist: Vec<Address>) -> Self {
        Self::with_validity(store, whitelist, VALIDITY_THRESHOLD)
    }

    /// Create a handler with a custom validity threshold (used by tests)
    pub fn with_validity(store: Arc<Store>, whitelist: Vec<Address>, validity: Duration) -> Self {
        let capacity = NonZeroUsize::new(HISTORY_CAPACITY).expect("nonzero capacity");
        let history = whitelist
            .iter()
            .map(|addr| (*addr, LruCache::new(capacity)))
            .collect();
        Self {
            store,
            whitelist,
            history: Mutex::new(history),
            access: RwLock::new(()),
            validity,
        }
    }

    /// Handle one raw request frame, always producing a response frame
    ///
    /// Validation failures become error payloads, never panics; the HTTP
    /// layer returns 200 either way.
    pub fn handle(&self, data: &[u8]) -> Vec<u8> {
        let response = match self.process(data, util::unix_now_i64()) {
            Ok(resp) => resp,
            Err(err) => {
                debug!(%err, "rejecting proxied request");
                ResponsePayload::from_error(err.to_string())
            }
        };
        codec::encode_response(&response)
    }

    /// Handle one request at an explicit `now`, for deterministic tests
    pub fn process(&self, data: &[u8], now: i64) -> Result<ResponsePayload> {
        let req = codec::decode_request(data)?;
        let signer = self.verify(&req, now)?;

        if !req.values.is_empty() {
            if req.values.len() != req.keys.len() {
                return Err(Error::proxy(
                    "keys and values must have the same array dimensions",
                ));
            }
            let prefix = address_hex(signer);
            for key in &req.keys {
                if !key.starts_with(&prefix) {
                    return Err(Error::proxy(
                        "all storage request keys must be prefixed with the miner public address",
                    ));
                }
            }
            let _write = self.access.write();
            self.store.batch_put(&req.keys, &req.values)?;
            self.read_keys(&req.keys)
        } else {
            for key in &req.keys {
                if !keys::is_known_key(key, &self.whitelist) {
                    return Err(Error::proxy(format!("invalid lookup key: {key}")));
                }
            }
            let _read = self.access.read();
            self.read_keys(&req.keys)
        }
    }

    fn read_keys(&self, request_keys: &[String]) -> Result<ResponsePayload> {
        let mut entries = Vec::with_capacity(request_keys.len());
        for key in request_keys {
            if let Some(value) = self.store.get(key)? {
                entries.push((key.clone(), value));
            }
        }
        Ok(ResponsePayload {
            entries,
            error: String::new(),
        })
    }

    /// Recover the signer and apply whitelist, replay and expiry checks
    fn verify(&self, req: &RequestPayload, now: i64) -> Result<Address> {
        let digest = keccak256(codec::encode_signed_portion(
            req.timestamp,
            &req.keys,
            &req.values,
        ));
        let signer = crypto::recover_address(digest, &req.signature)?;

        if !self.whitelist.contains(&signer) {
            warn!(address = %address_hex(signer), "unauthorized miner detected");
            return Err(Error::proxy("Unauthorized"));
        }

        let mut history = self.history.lock();
        let cache = history
            .get_mut(&signer)
            .ok_or_else(|| Error::proxy("no history found for address"))?;
        if cache.contains(&req.timestamp) {
            return Err(Error::proxy("request replayed"));
        }
        if now.saturating_sub(req.timestamp) > self.validity.as_secs() as i64 {
            return Err(Error::proxy("request expired"));
        }
        cache.put(req.timestamp, ());
        Ok(signer)
    }
}
