//! Client side of the signed proxy protocol
//!
//! Builds signed batch requests, posts them to the data server and decodes
//! the responses. Write keys are auto-prefixed with the signer address so
//! they pass the server's prefix rule. HTTP failures are retried inside a
//! deadline-bounded loop; a non-200 status is treated as transient.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::{keccak256, Address};
use async_trait::async_trait;
use k256::ecdsa::SigningKey;
use parking_lot::Mutex;
use reqwest::Client;
use tracing::debug;

use crate::crypto::{self, address_hex};
use crate::db::codec::{self, RequestPayload};
use crate::db::DataProxy;
use crate::error::{Error, Result};
use crate::util::{self, retry};

/// How long one proxied request may spend on retries before giving up
const REQUEST_DEADLINE: Duration = Duration::from_secs(10);

/// Proxy handle to a remote data server
pub struct RemoteProxy {
    signer: Arc<SigningKey>,
    address: Address,
    post_url: String,
    client: Client,
    retry_policy: retry::RetryPolicy,
    last_timestamp: Mutex<i64>,
}

impl RemoteProxy {
    /// Connect to the data server at `host:port`, signing with `signer`
    pub fn new(signer: SigningKey, host: &str, port: u16) -> Result<Self> {
        let address = crypto::address_of(&signer);
        let client = Client::builder()
            .timeout(REQUEST_DEADLINE)
            .build()
            .map_err(|e| Error::network(format!("building HTTP client: {e}")))?;
        debug!(host, port, "created remote data proxy connector");
        Ok(Self {
            signer: Arc::new(signer),
            address,
            post_url: format!("http://{host}:{port}/"),
            client,
            retry_policy: retry::RetryPolicy::with_deadline(REQUEST_DEADLINE),
            last_timestamp: Mutex::new(0),
        })
    }

    /// Address the proxy signs with
    pub fn address(&self) -> Address {
        self.address
    }

    /// Timestamps double as replay markers on the server, so two requests
    /// in the same second must not share one
    fn next_timestamp(&self) -> i64 {
        let now = util::unix_now_i64();
        let mut last = self.last_timestamp.lock();
        let timestamp = if now <= *last { *last + 1 } else { now };
        *last = timestamp;
        timestamp
    }

    fn build_request(&self, keys: Vec<String>, values: Vec<Vec<u8>>) -> Result<Vec<u8>> {
        let timestamp = self.next_timestamp();
        let digest = keccak256(codec::encode_signed_portion(timestamp, &keys, &values));
        let signature = crypto::sign_digest(&self.signer, digest)?.to_vec();
        codec::encode_request(&RequestPayload {
            timestamp,
            keys,
            values,
            signature,
        })
    }

    async fn round_trip(&self, frame: Vec<u8>) -> Result<HashMap<String, Vec<u8>>> {
        let body = retry::with_retries("data server request", self.retry_policy, || {
            let frame = frame.clone();
            async move {
                let response = self
                    .client
                    .post(&self.post_url)
                    .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
                    .body(frame)
                    .send()
                    .await?;
                let status = response.status();
                if !status.is_success() {
                    return Err(Error::network(format!(
                        "data server returned status {status}"
                    )));
                }
                Ok(response.bytes().await?)
            }
        })
        .await?;

        let decoded = codec::decode_response(&body)?;
        if !decoded.error.is_empty() {
            return Err(Error::proxy(decoded.error));
        }
        Ok(decoded.entries.into_iter().collect())
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
impl DataProxy for RemoteProxy {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut found = self.batch_get(std::slice::from_ref(&key.to_string())).await?;
        Ok(found.remove(key))
    }

    async fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        self.batch_put(&[key.to_string()], &[value.to_vec()]).await
    }

    async fn batch_get(&self, keys: &[String]) -> Result<HashMap<String, Vec<u8>>> {
        let frame = self.build_request(keys.to_vec(), Vec::new())?;
        self.round_trip(frame).await
    }

    async fn batch_put(&self, keys: &[String], values: &[Vec<u8>]) -> Result<()> {
        let prefixed: Vec<String> = keys.iter().map(|k| self.prefixed(k)).collect();
        let frame = self.build_request(prefixed, values.to_vec())?;
        self.round_trip(frame).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn proxy() -> RemoteProxy {
        let mut bytes = [0u8; 32];
        bytes[31] = 1;
        let signer = SigningKey::from_slice(&bytes).unwrap();
        RemoteProxy::new(signer, "localhost", 5000).unwrap()
    }

    #[test]
    fn test_request_signature_recovers_to_signer() {
        let proxy = proxy();
        let frame = proxy
            .build_request(vec!["gas_price".to_string()], Vec::new())
            .unwrap();
        let decoded = codec::decode_request(&frame).unwrap();
        let digest = keccak256(codec::encode_signed_portion(
            decoded.timestamp,
            &decoded.keys,
            &decoded.values,
        ));
        let recovered = crypto::recover_address(digest, &decoded.signature).unwrap();
        assert_eq!(recovered, proxy.address());
    }

    #[test]
    fn test_timestamps_never_repeat() {
        let proxy = proxy();
        let a = proxy.next_timestamp();
        let b = proxy.next_timestamp();
        let c = proxy.next_timestamp();
        assert!(a < b && b < c);
    }

    #[test]
    fn test_write_keys_prefixed_once() {
        let proxy = proxy();
        let prefix = address_hex(proxy.address());
        assert_eq!(proxy.prefixed("last_submit"), format!("{prefix}-last_submit"));
        let already = format!("{prefix}-last_submit");
        assert_eq!(proxy.prefixed(&already), already);
    }
}
