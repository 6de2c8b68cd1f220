//! Hasher implementations for the nonce search
//!
//! A hasher is single-shot per work item: each `search` call configures it
//! for one work item and runs until a candidate is sent, the token is
//! cancelled, or an error occurs. All variants validate candidates with the
//! same proof-of-work predicate before reporting them.

pub mod cpu;
pub mod pool;

pub use cpu::CpuHasher;
pub use pool::PoolHasher;

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::Config;
use crate::core::{Candidate, WorkItem};
use crate::error::Result;

/// One search assignment handed to a hasher
#[derive(Clone)]
pub struct SearchJob {
    /// The work item being solved
    pub work: Arc<WorkItem>,
    /// First nonce this hasher tries
    pub nonce_start: u64,
    /// Distance between consecutive nonces; equals the group size so
    /// sibling hashers cover disjoint residues
    pub nonce_stride: u64,
    /// Index of this hasher within its group
    pub hasher_id: usize,
}

/// Capability set shared by CPU, pool-client and future GPU hashers
#[async_trait]
pub trait Hasher: Send + Sync {
    /// Display name used in logs
    fn name(&self) -> String;

    /// Search the job's nonce sequence until a candidate is found or the
    /// token is cancelled. At most one candidate is sent per call. The
    /// implementation must notice cancellation within a bounded number of
    /// inner iterations.
    async fn search(
        &self,
        job: SearchJob,
        found: mpsc::Sender<Candidate>,
        cancel: CancellationToken,
    ) -> Result<()>;

    /// Most recent hashes-per-second estimate
    fn hashrate(&self) -> u64;
}

/// Build the hasher set from configuration: the pool client when pool mode
/// is on, otherwise one CPU hasher per configured processor
pub fn setup_hashers(cfg: &Config) -> Result<Vec<Arc<dyn Hasher>>> {
    if cfg.enable_pool_worker {
        info!(pool = %cfg.pool_url, "delegating hashing to upstream pool");
        let hasher = PoolHasher::new(&cfg.pool_url)?;
        return Ok(vec![Arc::new(hasher)]);
    }
    let count = if cfg.num_processors == 0 {
        num_cpus::get()
    } else {
        cfg.num_processors
    };
    info!(processors = count, "using CPU hashers");
    Ok((0..count)
        .map(|id| Arc::new(CpuHasher::new(id)) as Arc<dyn Hasher>)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setup_cpu_hashers_respects_count() {
        let mut cfg = Config::default();
        cfg.num_processors = 3;
        let hashers = setup_hashers(&cfg).unwrap();
        assert_eq!(hashers.len(), 3);
        assert_eq!(hashers[0].name(), "cpu-0");
    }

    #[test]
    fn test_setup_pool_hasher() {
        let mut cfg = Config::default();
        cfg.enable_pool_worker = true;
        cfg.pool_url = "http://pool:8080".to_string();
        let hashers = setup_hashers(&cfg).unwrap();
        assert_eq!(hashers.len(), 1);
        assert_eq!(hashers[0].name(), "pool-client");
    }
}
