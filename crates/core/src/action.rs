//! Actions returned by the round engine.

use crate::{Notification, PrivateMessage, RoundOutcome};
use coinjoin_types::bitcoin::Transaction;
use coinjoin_types::Username;

/// Side effects requested by the round engine.
///
/// Actions are executed by the runner after the round lock is released, in
/// the order they were returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    // ═══════════════════════════════════════════════════════════════════════
    // Client Messaging
    // ═══════════════════════════════════════════════════════════════════════
    /// Phase notification for every connected client.
    Broadcast(Notification),

    /// Message for a single client.
    SendPrivate {
        username: Username,
        message: PrivateMessage,
    },

    // ═══════════════════════════════════════════════════════════════════════
    // Network & Persistence
    // ═══════════════════════════════════════════════════════════════════════
    /// Push the signed mix transaction to the network.
    ///
    /// `outcome` is persisted once the broadcast completes, with its result
    /// downgraded to `FailBroadcast` if the push fails.
    BroadcastTransaction {
        tx: Box<Transaction>,
        outcome: RoundOutcome,
    },

    /// Persist the outcome of a concluded round.
    SaveRound(RoundOutcome),
}

impl Action {
    /// Get a human-readable name for this action type.
    pub fn type_name(&self) -> &'static str {
        match self {
            Action::Broadcast(_) => "Broadcast",
            Action::SendPrivate { .. } => "SendPrivate",
            Action::BroadcastTransaction { .. } => "BroadcastTransaction",
            Action::SaveRound(_) => "SaveRound",
        }
    }

    /// Check if this action talks to clients.
    pub fn is_messaging(&self) -> bool {
        matches!(self, Action::Broadcast(_) | Action::SendPrivate { .. })
    }
}
