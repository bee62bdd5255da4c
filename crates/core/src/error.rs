//! Request-level errors.

use thiserror::Error;

/// Reasons a client request is rejected.
///
/// The message is returned to the requester only.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoundError {
    /// The request targets a stale round or the wrong phase.
    #[error("Invalid round: {0}")]
    InvalidRound(String),

    /// The request itself is malformed or not acceptable.
    #[error("Bad input: {0}")]
    BadInput(String),

    /// The round already holds as many inputs as it accepts.
    #[error("Round is full, please wait for next round")]
    RoundFull,

    /// Unexpected server-side failure.
    #[error("Internal error")]
    Internal,
}

impl RoundError {
    pub fn invalid_round(reason: impl Into<String>) -> Self {
        RoundError::InvalidRound(reason.into())
    }

    pub fn bad_input(reason: impl Into<String>) -> Self {
        RoundError::BadInput(reason.into())
    }
}
