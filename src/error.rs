//! Error handling for the oracle mining client
//!
//! A single flat error type covering config, chain, proxy and mining
//! operations, with a retryability classification that drives the
//! bounded retry loops.

use thiserror::Error;

/// Result type alias for mining-client operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the oracle mining client
#[derive(Error, Debug)]
pub enum Error {
    /// HTTP request errors
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Embedded KV store errors
    #[error("KV store error: {0}")]
    Store(#[from] sled::Error),

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Chain client errors (RPC, contract calls)
    #[error("Chain error: {message}")]
    Chain { message: String },

    /// Hasher errors
    #[error("Hasher error: {hasher}: {message}")]
    Hasher { hasher: String, message: String },

    /// Signed-proxy protocol errors (codec, signature, validation)
    #[error("Proxy error: {message}")]
    Proxy { message: String },

    /// Cryptographic errors
    #[error("Cryptographic error: {message}")]
    Crypto { message: String },

    /// The miner address is not eligible to mine (dispute or missing stake)
    #[error("miner is not able to mine with current status")]
    NotEligible,

    /// Solution submission rejected by the node after bounded retries
    #[error("Submission failed after {attempts} attempts: {message}")]
    SubmitFailed { attempts: u32, message: String },

    /// Candidate belongs to a superseded challenge generation
    #[error("Candidate is stale (generation {generation})")]
    StaleCandidate { generation: u64 },

    /// Network errors
    #[error("Network error: {message}")]
    Network { message: String },

    /// Timeout errors
    #[error("Operation timed out: {operation}")]
    Timeout { operation: String },

    /// Cancellation of an async operation
    #[error("Operation was cancelled: {operation}")]
    Cancelled { operation: String },

    /// Invalid state errors
    #[error("Invalid state: {message}")]
    InvalidState { message: String },
}

impl Error {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a chain error
    pub fn chain(message: impl Into<String>) -> Self {
        Self::Chain {
            message: message.into(),
        }
    }

    /// Create a hasher error
    pub fn hasher(hasher: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Hasher {
            hasher: hasher.into(),
            message: message.into(),
        }
    }

    /// Create a proxy error
    pub fn proxy(message: impl Into<String>) -> Self {
        Self::Proxy {
            message: message.into(),
        }
    }

    /// Create a crypto error
    pub fn crypto(message: impl Into<String>) -> Self {
        Self::Crypto {
            message: message.into(),
        }
    }

    /// Create a network error
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout(operation: impl Into<String>) -> Self {
        Self::Timeout {
            operation: operation.into(),
        }
    }

    /// Create a cancellation error
    pub fn cancelled(operation: impl Into<String>) -> Self {
        Self::Cancelled {
            operation: operation.into(),
        }
    }

    /// Create an invalid state error
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    /// Check if the error is transient and worth retrying
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Http(e) => {
                if let Some(status) = e.status() {
                    status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS
                } else {
                    e.is_timeout() || e.is_connect() || e.is_request()
                }
            }
            Error::Network { .. } => true,
            Error::Timeout { .. } => true,
            Error::Io(_) => true,
            _ => false,
        }
    }

    /// Errors that must take the whole miner down rather than be retried
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::Config { .. } | Error::NotEligible | Error::Store(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::config("missing public address");
        assert_eq!(
            err.to_string(),
            "Configuration error: missing public address"
        );

        let err = Error::NotEligible;
        assert_eq!(
            err.to_string(),
            "miner is not able to mine with current status"
        );
    }

    #[test]
    fn test_retryable_classification() {
        assert!(Error::network("connection reset").is_retryable());
        assert!(Error::timeout("gas fetch").is_retryable());
        assert!(!Error::config("bad address").is_retryable());
        assert!(!Error::NotEligible.is_retryable());
        assert!(!Error::StaleCandidate { generation: 3 }.is_retryable());
    }

    #[test]
    fn test_fatal_classification() {
        assert!(Error::NotEligible.is_fatal());
        assert!(Error::config("x").is_fatal());
        assert!(!Error::network("x").is_fatal());
    }
}
