//! Configuration management for the mining client
//!
//! Configuration is a single JSON document (default `configs/config.json`)
//! merged over built-in defaults. Unknown fields are rejected so typos fail
//! loudly at startup. Secrets never live in the config file; they come from
//! the environment, optionally loaded from an `.env` file.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::time::Duration;

use alloy_primitives::Address;
use serde::de::{self, Deserializer};
use serde::Deserialize;

use crate::crypto;
use crate::error::{Error, Result};

/// Environment variable holding the node RPC endpoint
pub const NODE_URL_ENV: &str = "NODE_URL";

/// Environment variable holding the miner's private key (64 hex chars)
pub const PRIVATE_KEY_ENV: &str = "ETH_PRIVATE_KEY";

/// Oracle master contract on mainnet
pub const DEFAULT_CONTRACT_ADDRESS: &str = "0x0ba45a8b5d5575935b8158a88c631e9f9c95a2e5";

/// Duration that deserializes from either a bare number of seconds or a
/// human string such as `"15s"`, `"10m"`, `"1.5h"` or `"500ms"`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigDuration(pub Duration);

impl ConfigDuration {
    /// Underlying duration
    pub fn get(&self) -> Duration {
        self.0
    }
}

impl From<Duration> for ConfigDuration {
    fn from(d: Duration) -> Self {
        Self(d)
    }
}

impl fmt::Display for ConfigDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.0)
    }
}

fn parse_duration_str(s: &str) -> std::result::Result<Duration, String> {
    let s = s.trim();
    let unit_at = s
        .find(|c: char| c.is_ascii_alphabetic())
        .ok_or_else(|| format!("duration \"{s}\" has no unit"))?;
    let (num, unit) = s.split_at(unit_at);
    let value: f64 = num
        .parse()
        .map_err(|_| format!("invalid duration value \"{num}\""))?;
    if value < 0.0 {
        return Err(format!("negative duration \"{s}\""));
    }
    let secs = match unit {
        "ms" => value / 1000.0,
        "s" => value,
        "m" => value * 60.0,
        "h" => value * 3600.0,
        _ => return Err(format!("unknown duration unit \"{unit}\"")),
    };
    Ok(Duration::from_secs_f64(secs))
}

impl<'de> Deserialize<'de> for ConfigDuration {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Seconds(f64),
            Human(String),
        }
        match Raw::deserialize(deserializer)? {
            Raw::Seconds(secs) => {
                if secs < 0.0 {
                    return Err(de::Error::custom("negative duration"));
                }
                Ok(ConfigDuration(Duration::from_secs_f64(secs)))
            }
            Raw::Human(s) => parse_duration_str(&s)
                .map(ConfigDuration)
                .map_err(de::Error::custom),
        }
    }
}

/// Miner-loop settings
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct MineConfig {
    /// Remote data server to connect to in `mine --remote` mode
    #[serde(rename = "remoteDBHost")]
    pub remote_db_host: String,
    /// Remote data server port
    #[serde(rename = "remoteDBPort")]
    pub remote_db_port: u16,
    /// Host the miner-side listener binds to
    pub listen_host: String,
    /// Port the miner-side listener binds to
    pub listen_port: u16,
    /// Minimum percent of profit required before submitting a solution.
    /// With a tx cost of 0.01 and a reward of 0.02, a threshold of 200 or
    /// more waits; 199 or less submits.
    pub profit_threshold: u64,
    /// How often the work source polls the chain snapshot
    pub heartbeat: ConfigDuration,
    /// How often a deferred candidate is re-evaluated
    pub mining_interrupt_check_interval: ConfigDuration,
    /// Minimum wall-clock spacing between two submissions from this address
    pub min_submit_period: ConfigDuration,
}

impl Default for MineConfig {
    fn default() -> Self {
        Self {
            remote_db_host: "localhost".to_string(),
            remote_db_port: 5000,
            listen_host: "localhost".to_string(),
            listen_port: 9090,
            profit_threshold: 200,
            heartbeat: Duration::from_secs(15).into(),
            mining_interrupt_check_interval: Duration::from_secs(15).into(),
            min_submit_period: Duration::from_secs(15 * 60).into(),
        }
    }
}

/// Data server listener settings
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct DataServerConfig {
    /// Host the data server binds to
    pub listen_host: String,
    /// Port the data server binds to
    pub listen_port: u16,
}

impl Default for DataServerConfig {
    fn default() -> Self {
        Self {
            listen_host: "localhost".to_string(),
            listen_port: 5000,
        }
    }
}

/// Tracker scheduling and data-quality settings
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct TrackersConfig {
    /// Sleep between tracker refresh cycles
    pub sleep_cycle: ConfigDuration,
    /// Deadline for a single external fetch, retries included
    pub fetch_timeout: ConfigDuration,
    /// Minimum fraction of sources that must agree for a value to be written
    pub min_confidence: f64,
    /// Ignore data further than this away from the value being checked
    pub dispute_time_delta: ConfigDuration,
    /// Maximum allowed relative difference between observed and submitted value
    pub dispute_threshold: f64,
    /// Which trackers run; unknown names are ignored with a warning
    pub names: HashMap<String, bool>,
}

impl Default for TrackersConfig {
    fn default() -> Self {
        let names = [
            ("currentVariables", true),
            ("disputeStatus", true),
            ("gas", true),
            ("balance", true),
            ("manualData", true),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();
        Self {
            sleep_cycle: Duration::from_secs(30).into(),
            fetch_timeout: Duration::from_secs(30).into(),
            min_confidence: 0.2,
            dispute_time_delta: Duration::from_secs(5 * 60).into(),
            dispute_threshold: 0.01,
            names,
        }
    }
}

/// Global configuration derived from config.json
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct Config {
    /// Oracle master contract address
    pub contract_address: String,
    /// Miner public address, 40 hex characters; lowercased internally
    pub public_address: String,
    /// Chain RPC timeout in seconds
    pub eth_client_timeout: u64,
    /// Directory for the embedded KV store
    pub db_file: String,
    /// Multiplier applied to the tracked gas price when submitting
    pub gas_multiplier: f32,
    /// Hard gas-price ceiling in gwei
    pub gas_max: u64,
    /// CPU hashers to run; 0 means one per logical CPU
    pub num_processors: usize,
    /// Delegate hashing targets to an upstream pool instead of local CPUs
    pub enable_pool_worker: bool,
    /// Upstream pool endpoint for pool-client mode
    #[serde(rename = "poolURL")]
    pub pool_url: String,
    /// Addresses allowed to query the data server; defaults to the miner itself
    pub server_whitelist: Vec<String>,
    /// External price API definitions (fetchers are external collaborators)
    pub api_file: String,
    /// Manually pinned oracle values, written as-is into the KV
    pub manual_data_file: String,
    /// Per-component log levels
    pub logger: HashMap<String, String>,
    /// Location of the `.env` file with private details
    pub env_file: String,
    /// Tracker settings
    pub trackers: TrackersConfig,
    /// Miner settings
    pub mine: MineConfig,
    /// Data server settings
    pub data_server: DataServerConfig,
}

impl Default for Config {
    fn default() -> Self {
        let logger = [
            ("db", "info"),
            ("chain", "info"),
            ("dataServer", "info"),
            ("tracker", "info"),
            ("mining", "info"),
            ("ops", "info"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        Self {
            contract_address: DEFAULT_CONTRACT_ADDRESS.to_string(),
            public_address: String::new(),
            eth_client_timeout: 30,
            db_file: "db".to_string(),
            gas_multiplier: 1.0,
            gas_max: 10,
            num_processors: 0,
            enable_pool_worker: false,
            pool_url: String::new(),
            server_whitelist: Vec::new(),
            api_file: "configs/api.json".to_string(),
            manual_data_file: "configs/manualData.json".to_string(),
            logger,
            env_file: "configs/.env".to_string(),
            trackers: TrackersConfig::default(),
            mine: MineConfig::default(),
            data_server: DataServerConfig::default(),
        }
    }
}

impl Config {
    /// Parse configuration from a JSON file and normalize it
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            Error::config(format!(
                "open config file {}: {e}",
                path.as_ref().display()
            ))
        })?;
        Self::from_json(&raw)
    }

    /// Parse configuration from a JSON string and normalize it
    pub fn from_json(raw: &str) -> Result<Self> {
        let mut cfg: Config =
            serde_json::from_str(raw).map_err(|e| Error::config(format!("parse config json: {e}")))?;
        cfg.normalize();
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load the configured `.env` file; a missing file is not an error
    pub fn load_env(&self) -> Result<()> {
        match dotenvy::from_path(&self.env_file) {
            Ok(()) => Ok(()),
            Err(dotenvy::Error::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::config(format!("loading .env file: {e}"))),
        }
    }

    fn normalize(&mut self) {
        self.public_address = self
            .public_address
            .trim()
            .trim_start_matches("0x")
            .to_lowercase();
        self.contract_address = self.contract_address.trim().to_lowercase();
        if self.server_whitelist.is_empty() && !self.public_address.is_empty() {
            self.server_whitelist.push(format!("0x{}", self.public_address));
        }
    }

    /// Validate the file-backed portion of the configuration
    pub fn validate(&self) -> Result<()> {
        let decoded = hex::decode(&self.public_address)
            .map_err(|e| Error::config(format!("public address is not hex: {e}")))?;
        if decoded.len() != 20 {
            return Err(Error::config(format!(
                "expecting 40 hex character public address, got \"{}\"",
                self.public_address
            )));
        }
        crypto::parse_address(&self.contract_address)
            .map_err(|e| Error::config(format!("contract address: {e}")))?;
        if !(0.0..=20.0).contains(&self.gas_multiplier) {
            return Err(Error::config(format!(
                "gas multiplier out of range [0, 20]: {}",
                self.gas_multiplier
            )));
        }
        for entry in &self.server_whitelist {
            crypto::parse_address(entry)
                .map_err(|e| Error::config(format!("server whitelist entry \"{entry}\": {e}")))?;
        }
        if self.enable_pool_worker && self.pool_url.is_empty() {
            return Err(Error::config("enablePoolWorker is set but poolURL is empty"));
        }
        Ok(())
    }

    /// Validate the environment-backed portion (node URL and private key)
    pub fn validate_env(&self) -> Result<()> {
        if std::env::var(NODE_URL_ENV).unwrap_or_default().is_empty() {
            return Err(Error::config(format!(
                "missing node URL environment variable '{NODE_URL_ENV}'"
            )));
        }
        let key = std::env::var(PRIVATE_KEY_ENV).unwrap_or_default();
        crypto::parse_private_key(&key)
            .map_err(|e| Error::config(format!("{PRIVATE_KEY_ENV}: {e}")))?;
        Ok(())
    }

    /// The node RPC endpoint from the environment
    pub fn node_url(&self) -> Result<String> {
        std::env::var(NODE_URL_ENV)
            .map_err(|_| Error::config(format!("missing environment variable '{NODE_URL_ENV}'")))
    }

    /// The signing key from the environment
    pub fn private_key(&self) -> Result<k256::ecdsa::SigningKey> {
        let raw = std::env::var(PRIVATE_KEY_ENV)
            .map_err(|_| Error::config(format!("missing environment variable '{PRIVATE_KEY_ENV}'")))?;
        crypto::parse_private_key(&raw)
    }

    /// Miner public address as a typed value
    pub fn address(&self) -> Result<Address> {
        crypto::parse_address(&self.public_address)
    }

    /// Whitelist as typed addresses
    pub fn whitelist(&self) -> Result<Vec<Address>> {
        self.server_whitelist
            .iter()
            .map(|s| crypto::parse_address(s))
            .collect()
    }

    /// Chain RPC timeout
    pub fn eth_timeout(&self) -> Duration {
        Duration::from_secs(self.eth_client_timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ADDR: &str = "7e5f4552091a69125d5dfcb7b8c2659029395bdf";

    fn minimal_json() -> String {
        format!("{{\"publicAddress\": \"0x{ADDR}\"}}")
    }

    #[test]
    fn test_defaults_applied() {
        let cfg = Config::from_json(&minimal_json()).unwrap();
        assert_eq!(cfg.mine.heartbeat.get(), Duration::from_secs(15));
        assert_eq!(cfg.mine.min_submit_period.get(), Duration::from_secs(900));
        assert_eq!(cfg.data_server.listen_port, 5000);
        assert_eq!(cfg.gas_max, 10);
        assert!(cfg.trackers.names["currentVariables"]);
    }

    #[test]
    fn test_address_normalized_lowercase_no_prefix() {
        let json = format!("{{\"publicAddress\": \"0x{}\"}}", ADDR.to_uppercase());
        let cfg = Config::from_json(&json).unwrap();
        assert_eq!(cfg.public_address, ADDR);
    }

    #[test]
    fn test_whitelist_defaults_to_self() {
        let cfg = Config::from_json(&minimal_json()).unwrap();
        assert_eq!(cfg.server_whitelist, vec![format!("0x{ADDR}")]);
    }

    #[test]
    fn test_unknown_field_rejected() {
        let json = format!("{{\"publicAddress\": \"{ADDR}\", \"publcAddress\": \"typo\"}}");
        assert!(Config::from_json(&json).is_err());
    }

    #[test]
    fn test_duration_forms() {
        let json = format!(
            "{{\"publicAddress\": \"{ADDR}\", \"mine\": {{\"heartbeat\": \"30s\", \
             \"minSubmitPeriod\": \"10m\", \"miningInterruptCheckInterval\": 7.5}}}}"
        );
        let cfg = Config::from_json(&json).unwrap();
        assert_eq!(cfg.mine.heartbeat.get(), Duration::from_secs(30));
        assert_eq!(cfg.mine.min_submit_period.get(), Duration::from_secs(600));
        assert_eq!(
            cfg.mine.mining_interrupt_check_interval.get(),
            Duration::from_millis(7500)
        );
    }

    #[test]
    fn test_bad_duration_rejected() {
        let json = format!("{{\"publicAddress\": \"{ADDR}\", \"mine\": {{\"heartbeat\": \"15y\"}}}}");
        assert!(Config::from_json(&json).is_err());
    }

    #[test]
    fn test_gas_multiplier_range() {
        let json = format!("{{\"publicAddress\": \"{ADDR}\", \"gasMultiplier\": 25.0}}");
        assert!(Config::from_json(&json).is_err());
    }

    #[test]
    fn test_bad_address_rejected() {
        assert!(Config::from_json("{\"publicAddress\": \"zzzz\"}").is_err());
        assert!(Config::from_json("{\"publicAddress\": \"abcd\"}").is_err());
    }

    #[test]
    fn test_pool_mode_needs_url() {
        let json = format!("{{\"publicAddress\": \"{ADDR}\", \"enablePoolWorker\": true}}");
        assert!(Config::from_json(&json).is_err());
        let json = format!(
            "{{\"publicAddress\": \"{ADDR}\", \"enablePoolWorker\": true, \
             \"poolURL\": \"http://pool:8080\"}}"
        );
        assert!(Config::from_json(&json).is_ok());
    }
}
