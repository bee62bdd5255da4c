//! In-process collaborators for standalone runs.

use crate::{BlockchainClient, BlockchainError, RawTransaction, RoundStore, StoreError, Transport};
use async_trait::async_trait;
use bitcoin::{Transaction, Txid};
use coinjoin_core::{Notification, PrivateMessage, RoundOutcome};
use coinjoin_types::{RoundResult, Username};
use parking_lot::Mutex;
use tracing::{info, warn};

/// Round store kept in memory.
#[derive(Debug, Default)]
pub struct MemoryRoundStore {
    outcomes: Mutex<Vec<RoundOutcome>>,
}

impl MemoryRoundStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every outcome saved so far, oldest first.
    pub fn outcomes(&self) -> Vec<RoundOutcome> {
        self.outcomes.lock().clone()
    }
}

#[async_trait]
impl RoundStore for MemoryRoundStore {
    async fn save_round(&self, outcome: &RoundOutcome) -> Result<(), StoreError> {
        self.outcomes.lock().push(outcome.clone());
        Ok(())
    }

    async fn has_mix_txid(&self, txid: &Txid, denomination: u64) -> Result<bool, StoreError> {
        Ok(self.outcomes.lock().iter().any(|outcome| {
            outcome.result == RoundResult::Success
                && outcome.denomination == denomination
                && outcome.txid.as_ref() == Some(txid)
        }))
    }
}

/// Transport that writes every message to the log as JSON.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogTransport;

#[async_trait]
impl Transport for LogTransport {
    async fn broadcast(&self, notification: &Notification) {
        match serde_json::to_string(notification) {
            Ok(json) => info!(target: "coinjoin::notify", %json, "broadcast"),
            Err(e) => warn!(error = %e, "Unable to encode notification"),
        }
    }

    async fn send_private(&self, username: &Username, message: &PrivateMessage) {
        match serde_json::to_string(message) {
            Ok(json) => info!(target: "coinjoin::notify", %username, %json, "private"),
            Err(e) => warn!(error = %e, "Unable to encode private message"),
        }
    }
}

/// Blockchain backend without a node: knows no transaction and refuses
/// every broadcast.
#[derive(Debug, Default, Clone, Copy)]
pub struct OfflineBlockchain;

#[async_trait]
impl BlockchainClient for OfflineBlockchain {
    async fn get_raw_transaction(&self, _txid: &Txid) -> Result<Option<RawTransaction>, BlockchainError> {
        Ok(None)
    }

    async fn broadcast_transaction(&self, _tx: &Transaction) -> Result<Txid, BlockchainError> {
        Err(BlockchainError::Unavailable("no blockchain backend configured".into()))
    }
}
