//! Chain access for the mining client
//!
//! The rest of the system sees the chain only through the [`Chain`] trait:
//! transaction submission plus the handful of contract reads the trackers
//! and the submission gate need. The provided implementation is a thin
//! JSON-RPC client with hand-rolled call encoding; there is no event
//! subscription, chain state is polled on the tracker heartbeat.

mod contract;
mod rpc;
mod tx;

pub use contract::{apply_gas_policy, ContractClient};
pub use rpc::RpcClient;
pub use tx::LegacyTx;

use alloy_primitives::{Address, B256, U256};
use async_trait::async_trait;

use crate::core::Challenge;
use crate::error::Result;

/// Current puzzle state read from the oracle contract
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentVariables {
    /// Active challenge
    pub challenge: Challenge,
    /// Current difficulty
    pub difficulty: U256,
    /// Request ids to be answered with the next solutions
    pub request_ids: Vec<u64>,
    /// Reward for the whole challenge round
    pub reward: U256,
    /// Next miner slot to be filled, 0..=4
    pub slot_index: u64,
    /// Whether the contract enforces ordered slot fill for this round
    pub ordered_fill: bool,
}

/// Staking state of one miner address
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StakerInfo {
    /// Contract status code; 1 means staked and eligible to mine
    pub status: U256,
    /// Unix seconds when the stake was deposited
    pub staked_at: u64,
}

/// Summary of one dispute, for the `dispute show` command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisputeInfo {
    /// Dispute id
    pub id: u64,
    /// Whether the vote has been tallied and executed
    pub executed: bool,
    /// Whether the dispute passed
    pub passed: bool,
    /// The miner whose value is disputed
    pub reported_miner: Address,
    /// Request id of the disputed value
    pub request_id: u64,
    /// Timestamp of the disputed value
    pub timestamp: u64,
    /// Slot the disputed value occupied
    pub miner_slot: u64,
    /// Raw vote tally
    pub tally: U256,
    /// Number of votes cast
    pub votes: u64,
}

/// Everything the miner needs from the chain
#[async_trait]
pub trait Chain: Send + Sync {
    /// Whether the node is still syncing; mining refuses to start if so
    async fn is_syncing(&self) -> Result<bool>;

    /// Node gas price in wei
    async fn gas_price(&self) -> Result<U256>;

    /// Native balance of an address in wei
    async fn eth_balance(&self, address: Address) -> Result<U256>;

    /// Oracle token balance of an address
    async fn balance_of(&self, address: Address) -> Result<U256>;

    /// Current challenge, difficulty, request ids, reward and slot state
    async fn current_variables(&self) -> Result<CurrentVariables>;

    /// Staking status of an address
    async fn staker_info(&self, address: Address) -> Result<StakerInfo>;

    /// Unix seconds of the last value the contract accepted
    async fn last_new_value_time(&self) -> Result<u64>;

    /// Submit a proof-of-work solution with its oracle values
    async fn submit_solution(
        &self,
        nonce: &str,
        request_ids: [u64; 5],
        values: [U256; 5],
        gas_price: U256,
    ) -> Result<B256>;

    /// Deposit the staking amount
    async fn deposit_stake(&self) -> Result<B256>;

    /// Withdraw a previously requested stake
    async fn withdraw_stake(&self) -> Result<B256>;

    /// Begin the staking withdrawal waiting period
    async fn request_staking_withdraw(&self) -> Result<B256>;

    /// Transfer oracle tokens
    async fn transfer(&self, to: Address, amount: U256) -> Result<B256>;

    /// Approve an oracle token allowance
    async fn approve(&self, spender: Address, amount: U256) -> Result<B256>;

    /// Vote on an open dispute
    async fn vote(&self, dispute_id: u64, supports: bool) -> Result<B256>;

    /// Open a new dispute against a submitted value
    async fn begin_dispute(&self, request_id: u64, timestamp: u64, miner_index: u64)
        -> Result<B256>;

    /// Number of disputes ever opened
    async fn dispute_count(&self) -> Result<u64>;

    /// Details of one dispute
    async fn dispute_info(&self, id: u64) -> Result<DisputeInfo>;
}
