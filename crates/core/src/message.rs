//! Messages delivered to clients.

use coinjoin_types::{PaymentCode, RoundId, RoundStatus};
use serde::{Deserialize, Serialize};

/// Phase notifications broadcast to every connected client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Notification {
    /// The round accepts inputs.
    #[serde(rename_all = "camelCase")]
    RegisterInput {
        round_id: RoundId,
        /// Hex-encoded coordinator public key used to blind bordereaux.
        public_key: String,
        /// Network name (`bitcoin`, `testnet`, `regtest`, ...).
        network: String,
        denomination: u64,
        miner_fee: u64,
    },

    /// Outputs may be registered through the anonymous endpoint.
    #[serde(rename_all = "camelCase")]
    RegisterOutput {
        round_id: RoundId,
        register_output_url: String,
    },

    /// The unsigned transaction is ready for signing.
    #[serde(rename_all = "camelCase")]
    Signing {
        round_id: RoundId,
        #[serde(with = "hex_bytes")]
        transaction: Vec<u8>,
    },

    /// Participants must reveal their output or be blamed.
    #[serde(rename_all = "camelCase")]
    RevealOutputOrBlame { round_id: RoundId },

    /// The mix transaction was broadcast.
    #[serde(rename_all = "camelCase")]
    Success { round_id: RoundId },

    /// The round was abandoned.
    #[serde(rename_all = "camelCase")]
    Fail { round_id: RoundId },
}

impl Notification {
    /// Get a human-readable name for this notification type.
    pub fn type_name(&self) -> &'static str {
        match self {
            Notification::RegisterInput { .. } => "RegisterInput",
            Notification::RegisterOutput { .. } => "RegisterOutput",
            Notification::Signing { .. } => "Signing",
            Notification::RevealOutputOrBlame { .. } => "RevealOutputOrBlame",
            Notification::Success { .. } => "Success",
            Notification::Fail { .. } => "Fail",
        }
    }

    /// Round the notification belongs to.
    pub fn round_id(&self) -> RoundId {
        match self {
            Notification::RegisterInput { round_id, .. }
            | Notification::RegisterOutput { round_id, .. }
            | Notification::Signing { round_id, .. }
            | Notification::RevealOutputOrBlame { round_id }
            | Notification::Success { round_id }
            | Notification::Fail { round_id } => *round_id,
        }
    }

    /// Phase announced by this notification.
    pub fn status(&self) -> RoundStatus {
        match self {
            Notification::RegisterInput { .. } => RoundStatus::RegisterInput,
            Notification::RegisterOutput { .. } => RoundStatus::RegisterOutput,
            Notification::Signing { .. } => RoundStatus::Signing,
            Notification::RevealOutputOrBlame { .. } => RoundStatus::RevealOutputOrBlame,
            Notification::Success { .. } => RoundStatus::Success,
            Notification::Fail { .. } => RoundStatus::Fail,
        }
    }

    /// Check if this notification concludes the round.
    pub fn is_terminal(&self) -> bool {
        self.status().is_terminal()
    }
}

/// Messages addressed to a single participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PrivateMessage {
    /// Input accepted; echoes the payload supplied at registration.
    #[serde(rename_all = "camelCase")]
    RegisterInputAck {
        #[serde(with = "hex_bytes")]
        ack_payload: Vec<u8>,
    },

    /// Ring neighbours for the address exchange.
    #[serde(rename_all = "camelCase")]
    PeersPaymentCodes {
        from_peer: PaymentCode,
        to_peer: PaymentCode,
    },
}

impl PrivateMessage {
    pub fn type_name(&self) -> &'static str {
        match self {
            PrivateMessage::RegisterInputAck { .. } => "RegisterInputAck",
            PrivateMessage::PeersPaymentCodes { .. } => "PeersPaymentCodes",
        }
    }
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(s).map_err(serde::de::Error::custom)
    }
}
