//! Pool-client hasher
//!
//! Delegates the nonce search to an upstream pool. The pool assigns the
//! actual hashing elsewhere; this client polls for candidates mined against
//! the current challenge, re-verifies each one locally with the same
//! predicate the CPU hashers use, and forwards the first one that checks
//! out. A candidate the pool got wrong is dropped, never trusted.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::core::Candidate;
use crate::crypto::address_hex;
use crate::error::{Error, Result};
use crate::hashers::{Hasher, SearchJob};

/// How often the upstream pool is polled for candidates
const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Per-request timeout against the pool
const POOL_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Deserialize)]
struct PoolCandidates {
    #[serde(default)]
    candidates: Vec<String>,
}

/// Hasher that forwards verified candidates from an upstream pool
pub struct PoolHasher {
    url: String,
    client: Client,
}

impl PoolHasher {
    /// Create a client for the pool at `url`
    pub fn new(url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(POOL_TIMEOUT)
            .build()
            .map_err(|e| Error::network(format!("building pool client: {e}")))?;
        Ok(Self {
            url: url.trim_end_matches('/').to_string(),
            client,
        })
    }

    async fn fetch_candidates(&self, job: &SearchJob) -> Result<Vec<String>> {
        let url = format!(
            "{}/candidates?challenge={}&address={}",
            self.url,
            job.work.challenge.to_hex(),
            address_hex(job.work.address),
        );
        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::network(format!("pool returned status {status}")));
        }
        let parsed: PoolCandidates = response.json().await?;
        Ok(parsed.candidates)
    }
}

#[async_trait]
impl Hasher for PoolHasher {
    fn name(&self) -> String {
        "pool-client".to_string()
    }

    async fn search(
        &self,
        job: SearchJob,
        found: mpsc::Sender<Candidate>,
        cancel: CancellationToken,
    ) -> Result<()> {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                _ = tokio::time::sleep(POLL_INTERVAL) => {}
            }
            let candidates = match self.fetch_candidates(&job).await {
                Ok(candidates) => candidates,
                Err(err) => {
                    // Pool outages are transient from the miner's view;
                    // keep polling until cancelled.
                    warn!(%err, "pool poll failed");
                    continue;
                }
            };
            for nonce in candidates {
                if job.work.accepts(&nonce) {
                    let _ = found
                        .send(Candidate {
                            nonce,
                            generation: job.work.generation,
                            hasher_id: job.hasher_id,
                        })
                        .await;
                    return Ok(());
                }
                debug!(%nonce, "dropping pool candidate that fails local verification");
            }
        }
    }

    fn hashrate(&self) -> u64 {
        // The hashing happens upstream; the pool's own reporting covers it.
        0
    }
}
