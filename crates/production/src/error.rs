//! Runner errors.

use coinjoin_core::RoundError;
use coinjoin_provenance::ProvenanceError;
use thiserror::Error;

/// Errors from the blockchain backend.
#[derive(Debug, Clone, Error)]
pub enum BlockchainError {
    /// The backend could not be reached.
    #[error("Blockchain backend unavailable: {0}")]
    Unavailable(String),

    /// The backend refused the transaction.
    #[error("Transaction rejected: {0}")]
    Rejected(String),
}

/// Errors from the round store.
#[derive(Debug, Clone, Error)]
#[error("Round store error: {0}")]
pub struct StoreError(pub String);

/// Errors returned by [`Coordinator`](crate::Coordinator) requests.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error(transparent)]
    Round(#[from] RoundError),

    #[error(transparent)]
    Blockchain(#[from] BlockchainError),

    #[error(transparent)]
    Provenance(#[from] ProvenanceError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl CoordinatorError {
    /// The request-level error reported back to the client.
    ///
    /// Provenance failures are the client's fault; backend failures are not.
    pub fn to_round_error(&self) -> RoundError {
        match self {
            CoordinatorError::Round(e) => e.clone(),
            CoordinatorError::Provenance(e) => e.clone().into(),
            CoordinatorError::Blockchain(_) | CoordinatorError::Store(_) => RoundError::Internal,
        }
    }
}

/// Errors loading or validating the configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Invalid fee configuration: {0}")]
    Fees(#[from] ProvenanceError),
}
