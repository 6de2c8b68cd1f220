//! Oracle contract client over JSON-RPC
//!
//! Contract calls are encoded by hand: a 4-byte selector followed by
//! 32-byte ABI words. The contract surface is small enough that a full ABI
//! library would be dead weight.

use alloy_primitives::{keccak256, Address, B256, U256};
use async_trait::async_trait;
use k256::ecdsa::SigningKey;
use tracing::{debug, info};

use crate::chain::rpc::RpcClient;
use crate::chain::tx::LegacyTx;
use crate::chain::{Chain, CurrentVariables, DisputeInfo, StakerInfo};
use crate::core::constants::SUBMIT_GAS;
use crate::core::Challenge;
use crate::crypto;
use crate::error::{Error, Result};

/// Gas limit for non-mining writes (stake, transfer, dispute)
const DEFAULT_WRITE_GAS: u64 = 500_000;

/// Apply the configured multiplier and gwei ceiling to a base gas price
pub fn apply_gas_policy(base: U256, multiplier: f32, max_gwei: u64) -> U256 {
    // Multiplier has two decimal places of useful precision.
    let scaled = base * U256::from((multiplier * 100.0).round() as u64) / U256::from(100u64);
    let cap = U256::from(max_gwei) * U256::from(1_000_000_000u64);
    if cap.is_zero() {
        scaled
    } else {
        scaled.min(cap)
    }
}

/// ABI word encoding and decoding helpers
pub(crate) mod abi {
    use super::*;

    /// First four bytes of the keccak of the canonical signature
    pub fn selector(signature: &str) -> [u8; 4] {
        let digest = keccak256(signature.as_bytes());
        [digest[0], digest[1], digest[2], digest[3]]
    }

    pub fn word_u256(value: U256) -> [u8; 32] {
        value.to_be_bytes::<32>()
    }

    pub fn word_u64(value: u64) -> [u8; 32] {
        word_u256(U256::from(value))
    }

    pub fn word_address(value: Address) -> [u8; 32] {
        let mut out = [0u8; 32];
        out[12..].copy_from_slice(value.as_slice());
        out
    }

    pub fn word_bool(value: bool) -> [u8; 32] {
        word_u64(u64::from(value))
    }

    pub fn word_at(data: &[u8], index: usize) -> Result<U256> {
        let start = index * 32;
        if data.len() < start + 32 {
            return Err(Error::chain(format!(
                "call returned {} bytes, need word {index}",
                data.len()
            )));
        }
        let mut word = [0u8; 32];
        word.copy_from_slice(&data[start..start + 32]);
        Ok(U256::from_be_bytes(word))
    }

    pub fn u64_at(data: &[u8], index: usize) -> Result<u64> {
        word_at(data, index)?
            .try_into()
            .map_err(|_| Error::chain(format!("word {index} exceeds u64")))
    }

    pub fn bool_at(data: &[u8], index: usize) -> Result<bool> {
        Ok(!word_at(data, index)?.is_zero())
    }

    pub fn address_at(data: &[u8], index: usize) -> Result<Address> {
        let start = index * 32;
        if data.len() < start + 32 {
            return Err(Error::chain(format!(
                "call returned {} bytes, need word {index}",
                data.len()
            )));
        }
        Ok(Address::from_slice(&data[start + 12..start + 32]))
    }

}

/// Build the calldata for `submitMiningSolution(string,uint256[5],uint256[5])`
pub fn encode_submit_solution(nonce: &str, request_ids: [u64; 5], values: [U256; 5]) -> Vec<u8> {
    let mut data = Vec::new();
    data.extend_from_slice(&abi::selector(
        "submitMiningSolution(string,uint256[5],uint256[5])",
    ));
    // Head: offset of the dynamic string, then the two fixed arrays inline.
    data.extend_from_slice(&abi::word_u64(32 * 11));
    for id in request_ids {
        data.extend_from_slice(&abi::word_u64(id));
    }
    for value in values {
        data.extend_from_slice(&abi::word_u256(value));
    }
    // Tail: string length plus right-padded bytes.
    data.extend_from_slice(&abi::word_u64(nonce.len() as u64));
    data.extend_from_slice(nonce.as_bytes());
    let pad = (32 - nonce.len() % 32) % 32;
    data.extend_from_slice(&vec![0u8; pad]);
    data
}

/// Chain client bound to one oracle contract and one signing key
pub struct ContractClient {
    rpc: RpcClient,
    contract: Address,
    signer: SigningKey,
    address: Address,
    chain_id: u64,
    gas_multiplier: f32,
    gas_max_gwei: u64,
}

impl ContractClient {
    /// Connect to the node, resolve the chain id and bind the contract
    pub async fn connect(
        node_url: &str,
        timeout: std::time::Duration,
        contract: Address,
        signer: SigningKey,
        gas_multiplier: f32,
        gas_max_gwei: u64,
    ) -> Result<Self> {
        let rpc = RpcClient::new(node_url, timeout)?;
        let chain_id = rpc.chain_id().await?;
        let address = crypto::address_of(&signer);
        info!(
            chain_id,
            contract = %crypto::address_hex(contract),
            miner = %crypto::address_hex(address),
            "connected to chain node"
        );
        Ok(Self {
            rpc,
            contract,
            signer,
            address,
            chain_id,
            gas_multiplier,
            gas_max_gwei,
        })
    }

    /// The address derived from the signing key
    pub fn miner_address(&self) -> Address {
        self.address
    }

    async fn read(&self, data: Vec<u8>) -> Result<Vec<u8>> {
        self.rpc.eth_call(self.contract, &data).await
    }

    async fn get_uint_var(&self, name: &str) -> Result<U256> {
        let mut data = abi::selector("getUintVar(bytes32)").to_vec();
        data.extend_from_slice(keccak256(name.as_bytes()).as_slice());
        let out = self.read(data).await?;
        abi::word_at(&out, 0)
    }

    async fn send(&self, data: Vec<u8>, gas_limit: u64, gas_price: Option<U256>) -> Result<B256> {
        let nonce = self.rpc.transaction_count(self.address).await?;
        let gas_price = match gas_price {
            Some(price) => price,
            None => apply_gas_policy(
                self.rpc.gas_price().await?,
                self.gas_multiplier,
                self.gas_max_gwei,
            ),
        };
        let tx = LegacyTx {
            nonce,
            gas_price,
            gas_limit,
            to: self.contract,
            value: U256::ZERO,
            data,
        };
        let raw = tx.sign(&self.signer, self.chain_id)?;
        let hash = self.rpc.send_raw_transaction(&raw).await?;
        debug!(nonce, %gas_price, tx = %hash, "transaction sent");
        Ok(hash)
    }

    async fn send_simple(&self, signature: &str) -> Result<B256> {
        self.send(abi::selector(signature).to_vec(), DEFAULT_WRITE_GAS, None)
            .await
    }
}

#[async_trait]
impl Chain for ContractClient {
    async fn is_syncing(&self) -> Result<bool> {
        self.rpc.syncing().await
    }

    async fn gas_price(&self) -> Result<U256> {
        self.rpc.gas_price().await
    }

    async fn eth_balance(&self, address: Address) -> Result<U256> {
        self.rpc.balance(address).await
    }

    async fn balance_of(&self, address: Address) -> Result<U256> {
        let mut data = abi::selector("balanceOf(address)").to_vec();
        data.extend_from_slice(&abi::word_address(address));
        let out = self.read(data).await?;
        abi::word_at(&out, 0)
    }

    async fn current_variables(&self) -> Result<CurrentVariables> {
        let data = abi::selector("getNewCurrentVariables()").to_vec();
        let out = self.read(data).await?;
        // Layout: challenge, uint[5] request ids, difficulty, tip.
        let mut challenge = [0u8; 32];
        if out.len() < 32 * 8 {
            return Err(Error::chain(format!(
                "getNewCurrentVariables returned {} bytes",
                out.len()
            )));
        }
        challenge.copy_from_slice(&out[..32]);
        let mut request_ids = Vec::with_capacity(5);
        for i in 0..5 {
            let id = abi::u64_at(&out, 1 + i)?;
            if id != 0 {
                request_ids.push(id);
            }
        }
        let difficulty = abi::word_at(&out, 6)?;
        let reward = abi::word_at(&out, 7)?;
        let slot_index = self.get_uint_var("slotProgress").await?;
        let ordered_fill = !self.get_uint_var("slotOrder").await?.is_zero();
        Ok(CurrentVariables {
            challenge: Challenge::from_bytes(challenge),
            difficulty,
            request_ids,
            reward,
            slot_index: slot_index.try_into().unwrap_or(0),
            ordered_fill,
        })
    }

    async fn staker_info(&self, address: Address) -> Result<StakerInfo> {
        let mut data = abi::selector("getStakerInfo(address)").to_vec();
        data.extend_from_slice(&abi::word_address(address));
        let out = self.read(data).await?;
        Ok(StakerInfo {
            status: abi::word_at(&out, 0)?,
            staked_at: abi::u64_at(&out, 1)?,
        })
    }

    async fn last_new_value_time(&self) -> Result<u64> {
        let value = self.get_uint_var("timeOfLastNewValue").await?;
        value
            .try_into()
            .map_err(|_| Error::chain("timeOfLastNewValue exceeds u64"))
    }

    async fn submit_solution(
        &self,
        nonce: &str,
        request_ids: [u64; 5],
        values: [U256; 5],
        gas_price: U256,
    ) -> Result<B256> {
        let data = encode_submit_solution(nonce, request_ids, values);
        self.send(data, SUBMIT_GAS, Some(gas_price)).await
    }

    async fn deposit_stake(&self) -> Result<B256> {
        self.send_simple("depositStake()").await
    }

    async fn withdraw_stake(&self) -> Result<B256> {
        self.send_simple("withdrawStake()").await
    }

    async fn request_staking_withdraw(&self) -> Result<B256> {
        self.send_simple("requestStakingWithdraw()").await
    }

    async fn transfer(&self, to: Address, amount: U256) -> Result<B256> {
        let mut data = abi::selector("transfer(address,uint256)").to_vec();
        data.extend_from_slice(&abi::word_address(to));
        data.extend_from_slice(&abi::word_u256(amount));
        self.send(data, DEFAULT_WRITE_GAS, None).await
    }

    async fn approve(&self, spender: Address, amount: U256) -> Result<B256> {
        let mut data = abi::selector("approve(address,uint256)").to_vec();
        data.extend_from_slice(&abi::word_address(spender));
        data.extend_from_slice(&abi::word_u256(amount));
        self.send(data, DEFAULT_WRITE_GAS, None).await
    }

    async fn vote(&self, dispute_id: u64, supports: bool) -> Result<B256> {
        let mut data = abi::selector("vote(uint256,bool)").to_vec();
        data.extend_from_slice(&abi::word_u64(dispute_id));
        data.extend_from_slice(&abi::word_bool(supports));
        self.send(data, DEFAULT_WRITE_GAS, None).await
    }

    async fn begin_dispute(
        &self,
        request_id: u64,
        timestamp: u64,
        miner_index: u64,
    ) -> Result<B256> {
        let mut data = abi::selector("beginDispute(uint256,uint256,uint256)").to_vec();
        data.extend_from_slice(&abi::word_u64(request_id));
        data.extend_from_slice(&abi::word_u64(timestamp));
        data.extend_from_slice(&abi::word_u64(miner_index));
        self.send(data, DEFAULT_WRITE_GAS, None).await
    }

    async fn dispute_count(&self) -> Result<u64> {
        let value = self.get_uint_var("disputeCount").await?;
        value
            .try_into()
            .map_err(|_| Error::chain("disputeCount exceeds u64"))
    }

    async fn dispute_info(&self, id: u64) -> Result<DisputeInfo> {
        let mut data = abi::selector("getAllDisputeVars(uint256)").to_vec();
        data.extend_from_slice(&abi::word_u64(id));
        let out = self.read(data).await?;
        // Layout: hash, executed, passed, isPropFork, reportedMiner,
        // reportingParty, proposedFork, uint[9] dispute vars, int256 tally.
        Ok(DisputeInfo {
            id,
            executed: abi::bool_at(&out, 1)?,
            passed: abi::bool_at(&out, 2)?,
            reported_miner: abi::address_at(&out, 4)?,
            request_id: abi::u64_at(&out, 7)?,
            timestamp: abi::u64_at(&out, 8)?,
            votes: abi::u64_at(&out, 11)?,
            miner_slot: abi::u64_at(&out, 13)?,
            tally: abi::word_at(&out, 16)?,
        })
    }
}
