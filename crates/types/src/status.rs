//! Round phases and outcomes.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Phase of a mix round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoundStatus {
    RegisterInput,
    RegisterOutput,
    Signing,
    RevealOutputOrBlame,
    Success,
    Fail,
}

impl RoundStatus {
    /// Whether the round has concluded.
    pub fn is_terminal(&self) -> bool {
        matches!(self, RoundStatus::Success | RoundStatus::Fail)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RoundStatus::RegisterInput => "REGISTER_INPUT",
            RoundStatus::RegisterOutput => "REGISTER_OUTPUT",
            RoundStatus::Signing => "SIGNING",
            RoundStatus::RevealOutputOrBlame => "REVEAL_OUTPUT_OR_BLAME",
            RoundStatus::Success => "SUCCESS",
            RoundStatus::Fail => "FAIL",
        }
    }
}

impl fmt::Display for RoundStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Recorded outcome of a concluded round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoundResult {
    Success,
    Fail,
    FailBroadcast,
    FailRegisterOutput,
    FailSigning,
    FailRevealOutput,
    FailSystem,
}

impl RoundResult {
    pub fn is_success(&self) -> bool {
        matches!(self, RoundResult::Success)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RoundResult::Success => "SUCCESS",
            RoundResult::Fail => "FAIL",
            RoundResult::FailBroadcast => "FAIL_BROADCAST",
            RoundResult::FailRegisterOutput => "FAIL_REGISTER_OUTPUT",
            RoundResult::FailSigning => "FAIL_SIGNING",
            RoundResult::FailRevealOutput => "FAIL_REVEAL_OUTPUT",
            RoundResult::FailSystem => "FAIL_SYSTEM",
        }
    }
}

impl fmt::Display for RoundResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
