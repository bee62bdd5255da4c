//! External services the coordinator depends on.

use crate::{BlockchainError, StoreError};
use async_trait::async_trait;
use bitcoin::{Transaction, Txid};
use coinjoin_core::{Notification, PrivateMessage, RoundOutcome};
use coinjoin_types::Username;

/// A transaction as returned by the blockchain backend.
#[derive(Debug, Clone)]
pub struct RawTransaction {
    pub tx: Transaction,
    /// Number of confirmations, 0 when unconfirmed.
    pub confirmations: u32,
    /// Block time in seconds since the Unix epoch, 0 when unconfirmed.
    pub block_time: u64,
}

/// Bitcoin node access.
#[async_trait]
pub trait BlockchainClient: Send + Sync {
    /// Look up a transaction by id.
    async fn get_raw_transaction(&self, txid: &Txid) -> Result<Option<RawTransaction>, BlockchainError>;

    /// Push a signed transaction to the network.
    async fn broadcast_transaction(&self, tx: &Transaction) -> Result<Txid, BlockchainError>;
}

/// Persistence of concluded rounds.
#[async_trait]
pub trait RoundStore: Send + Sync {
    async fn save_round(&self, outcome: &RoundOutcome) -> Result<(), StoreError>;

    /// Whether `txid` is a successful mix of `denomination` produced by
    /// this coordinator.
    async fn has_mix_txid(&self, txid: &Txid, denomination: u64) -> Result<bool, StoreError>;
}

/// Client messaging. Delivery is best-effort.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a notification to every subscribed client.
    async fn broadcast(&self, notification: &Notification);

    /// Send a message to a single client.
    async fn send_private(&self, username: &Username, message: &PrivateMessage);
}
