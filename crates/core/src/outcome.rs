//! Persistence hand-off for concluded rounds.

use coinjoin_types::bitcoin::Txid;
use coinjoin_types::{RoundId, RoundResult, RoundStatus};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Summary of a concluded round as handed to the round store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundOutcome {
    pub round_id: RoundId,
    pub status: RoundStatus,
    pub result: RoundResult,
    pub denomination: u64,
    pub miner_fee: u64,
    pub nb_must_mix: usize,
    pub nb_liquidities: usize,
    /// Mix transaction id, once assembled.
    pub txid: Option<Txid>,
    /// Time the round concluded.
    pub timestamp: Duration,
}

impl RoundOutcome {
    /// Same outcome with a different result.
    pub fn with_result(mut self, result: RoundResult) -> Self {
        self.result = result;
        self
    }
}
