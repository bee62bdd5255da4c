use coinjoin_types::RoundResult;
use thiserror::Error;

/// Signal to abandon the current round.
///
/// Raised when a phase cannot be entered. The round is failed with
/// `result` and a fresh round takes its place.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Round aborted ({result}): {reason}")]
pub struct RoundAbort {
    pub result: RoundResult,
    pub reason: String,
}

impl RoundAbort {
    pub fn system(reason: impl Into<String>) -> Self {
        Self {
            result: RoundResult::FailSystem,
            reason: reason.into(),
        }
    }
}
