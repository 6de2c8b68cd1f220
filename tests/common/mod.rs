//! Shared test fixtures: a mock chain client and KV helpers
#![allow(dead_code)]

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use alloy_primitives::{Address, B256, U256};
use async_trait::async_trait;
use parking_lot::Mutex;

use oracle_mining_client::chain::{Chain, CurrentVariables, DisputeInfo, StakerInfo};
use oracle_mining_client::core::{ChainSnapshot, Challenge};
use oracle_mining_client::db::{keys, Store};
use oracle_mining_client::error::{Error, Result};

/// A recorded solution submission
#[derive(Debug, Clone)]
pub struct Submission {
    pub nonce: String,
    pub request_ids: [u64; 5],
    pub values: [U256; 5],
    pub gas_price: U256,
}

/// In-memory chain double
pub struct MockChain {
    pub vars: Mutex<CurrentVariables>,
    pub staker_status: Mutex<U256>,
    pub gas: Mutex<U256>,
    pub submissions: Mutex<Vec<Submission>>,
    /// Number of leading submissions to reject as underpriced
    pub failing_submits: AtomicU32,
}

impl MockChain {
    pub fn new() -> Self {
        Self {
            vars: Mutex::new(CurrentVariables {
                challenge: Challenge::from_bytes([1; 32]),
                difficulty: U256::from(1000u64),
                request_ids: vec![1, 2],
                reward: U256::from(10u64).pow(U256::from(18u64)),
                slot_index: 0,
                ordered_fill: false,
            }),
            staker_status: Mutex::new(U256::from(1u64)),
            gas: Mutex::new(U256::from(1_000_000_000u64)),
            submissions: Mutex::new(Vec::new()),
            failing_submits: AtomicU32::new(0),
        }
    }

    pub fn submissions(&self) -> Vec<Submission> {
        self.submissions.lock().clone()
    }
}

impl Default for MockChain {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Chain for MockChain {
    async fn is_syncing(&self) -> Result<bool> {
        Ok(false)
    }

    async fn gas_price(&self) -> Result<U256> {
        Ok(*self.gas.lock())
    }

    async fn eth_balance(&self, _address: Address) -> Result<U256> {
        Ok(U256::from(10u64).pow(U256::from(18u64)))
    }

    async fn balance_of(&self, _address: Address) -> Result<U256> {
        Ok(U256::from(100u64) * U256::from(10u64).pow(U256::from(18u64)))
    }

    async fn current_variables(&self) -> Result<CurrentVariables> {
        Ok(self.vars.lock().clone())
    }

    async fn staker_info(&self, _address: Address) -> Result<StakerInfo> {
        Ok(StakerInfo {
            status: *self.staker_status.lock(),
            staked_at: 1_700_000_000,
        })
    }

    async fn last_new_value_time(&self) -> Result<u64> {
        Ok(1_700_000_000)
    }

    async fn submit_solution(
        &self,
        nonce: &str,
        request_ids: [u64; 5],
        values: [U256; 5],
        gas_price: U256,
    ) -> Result<B256> {
        if self.failing_submits.load(Ordering::SeqCst) > 0 {
            self.failing_submits.fetch_sub(1, Ordering::SeqCst);
            return Err(Error::chain("eth_sendRawTransaction: transaction underpriced"));
        }
        self.submissions.lock().push(Submission {
            nonce: nonce.to_string(),
            request_ids,
            values,
            gas_price,
        });
        Ok(B256::from_slice(&[0x42; 32]))
    }

    async fn deposit_stake(&self) -> Result<B256> {
        Ok(B256::ZERO)
    }

    async fn withdraw_stake(&self) -> Result<B256> {
        Ok(B256::ZERO)
    }

    async fn request_staking_withdraw(&self) -> Result<B256> {
        Ok(B256::ZERO)
    }

    async fn transfer(&self, _to: Address, _amount: U256) -> Result<B256> {
        Ok(B256::ZERO)
    }

    async fn approve(&self, _spender: Address, _amount: U256) -> Result<B256> {
        Ok(B256::ZERO)
    }

    async fn vote(&self, _dispute_id: u64, _supports: bool) -> Result<B256> {
        Ok(B256::ZERO)
    }

    async fn begin_dispute(
        &self,
        _request_id: u64,
        _timestamp: u64,
        _miner_index: u64,
    ) -> Result<B256> {
        Ok(B256::ZERO)
    }

    async fn dispute_count(&self) -> Result<u64> {
        Ok(0)
    }

    async fn dispute_info(&self, id: u64) -> Result<DisputeInfo> {
        Err(Error::chain(format!("no dispute {id}")))
    }
}

/// Current unix time in seconds
pub fn now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_secs()
}

/// Write a chain snapshot into the store the way the tracker would
pub fn write_snapshot(store: &Store, snapshot: &ChainSnapshot) {
    store
        .put(
            keys::CURRENT_VARIABLES,
            &serde_json::to_vec(snapshot).unwrap(),
        )
        .unwrap();
}

/// Populate the KV with everything the gate needs to submit
pub fn write_gate_inputs(store: &Store, gas_price: U256, values: &[(u64, u64)]) {
    store
        .put(keys::DISPUTE_STATUS, b"0x1")
        .unwrap();
    store
        .put(keys::GAS_PRICE, format!("{gas_price:#x}").as_bytes())
        .unwrap();
    for (id, value) in values {
        store
            .put(&keys::oracle_value(*id), value.to_string().as_bytes())
            .unwrap();
    }
}

/// A snapshot with the given challenge byte, difficulty and reward
pub fn snapshot(challenge_byte: u8, difficulty: u64, reward: U256) -> ChainSnapshot {
    ChainSnapshot {
        challenge: Challenge::from_bytes([challenge_byte; 32]),
        difficulty: U256::from(difficulty),
        request_ids: vec![1, 2],
        reward,
        slot_index: 0,
        ordered_fill: false,
        updated_at: now(),
    }
}

/// Arc the store, open at a temp dir
pub fn open_store(dir: &tempfile::TempDir) -> Arc<Store> {
    Arc::new(Store::open(dir.path().join("db")).unwrap())
}
