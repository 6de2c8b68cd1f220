//! Challenge value and the tracked chain snapshot

use std::fmt;

use alloy_primitives::U256;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::core::constants::CHALLENGE_SIZE;
use crate::error::{Error, Result};

/// 32-byte opaque challenge published by the oracle contract
///
/// A challenge gates the current proof-of-work round. It is immutable; a new
/// challenge replaces the prior one atomically on the chain side.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Challenge(pub [u8; CHALLENGE_SIZE]);

impl Challenge {
    /// Wrap raw challenge bytes
    pub fn from_bytes(bytes: [u8; CHALLENGE_SIZE]) -> Self {
        Self(bytes)
    }

    /// Parse from a hex string (an optional `0x` prefix is accepted)
    pub fn from_hex(s: &str) -> Result<Self> {
        let raw = hex::decode(s.trim().trim_start_matches("0x"))
            .map_err(|e| Error::invalid_state(format!("invalid challenge hex: {e}")))?;
        if raw.len() != CHALLENGE_SIZE {
            return Err(Error::invalid_state(format!(
                "expecting {CHALLENGE_SIZE} byte challenge, got {}",
                raw.len()
            )));
        }
        let mut bytes = [0u8; CHALLENGE_SIZE];
        bytes.copy_from_slice(&raw);
        Ok(Self(bytes))
    }

    /// Challenge bytes
    pub fn as_bytes(&self) -> &[u8; CHALLENGE_SIZE] {
        &self.0
    }

    /// Hex encoding with `0x` prefix
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

impl fmt::Display for Challenge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for Challenge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Short form keeps log lines readable.
        write!(f, "Challenge(0x{}..)", hex::encode(&self.0[..4]))
    }
}

impl Serialize for Challenge {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Challenge {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Challenge::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Serde helpers for `U256` as a decimal string
pub(crate) mod serde_u256_dec {
    use super::*;

    pub fn serialize<S: Serializer>(
        value: &U256,
        serializer: S,
    ) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<U256, D::Error> {
        let s = String::deserialize(deserializer)?;
        U256::from_str_radix(&s, 10).map_err(serde::de::Error::custom)
    }
}

/// Snapshot of the contract state written to the KV by the chain tracker
///
/// The work source polls this entity; the submission gate reads the slot
/// fields. `updated_at` lets readers detect a stalled tracker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainSnapshot {
    /// Current challenge
    pub challenge: Challenge,
    /// Current difficulty
    #[serde(with = "serde_u256_dec")]
    pub difficulty: U256,
    /// Pending request ids, at most five
    pub request_ids: Vec<u64>,
    /// Current mining reward for the whole challenge
    #[serde(with = "serde_u256_dec")]
    pub reward: U256,
    /// Next miner slot to be filled, 0..=4
    pub slot_index: u64,
    /// Whether the contract requires slots to be filled in order
    pub ordered_fill: bool,
    /// Unix seconds when the tracker produced this snapshot
    pub updated_at: u64,
}

impl ChainSnapshot {
    /// True when the puzzle portion (challenge, difficulty, request ids)
    /// differs from `other`
    pub fn puzzle_changed(&self, other: &ChainSnapshot) -> bool {
        self.challenge != other.challenge
            || self.difficulty != other.difficulty
            || self.request_ids != other.request_ids
    }

    /// True when the snapshot is older than `max_age` relative to `now`
    ///
    /// Timestamps have whole-second resolution, so the allowance never
    /// drops below one second even for sub-second heartbeats.
    pub fn is_stale(&self, now: u64, max_age: std::time::Duration) -> bool {
        now.saturating_sub(self.updated_at) > max_age.as_secs().max(1)
    }
}
