//! Inputs admitted into a round.

use crate::{PaymentCode, TxOutPoint, Username};
use bitcoin::secp256k1::PublicKey;
use bitcoin::Witness;
use serde::{Deserialize, Serialize};

/// An input registered by a participant.
///
/// Immutable once created. The registry guarantees one input per username
/// and one input per outpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisteredInput {
    /// Authenticated identity of the owner.
    pub username: Username,
    /// The outpoint being spent.
    pub outpoint: TxOutPoint,
    /// Public key proven to own the outpoint.
    pub pubkey: PublicKey,
    /// Payment code used for the peer address exchange.
    pub payment_code: PaymentCode,
    /// Whether the input is a prior mix output re-entering as liquidity.
    pub is_liquidity: bool,
}

impl RegisteredInput {
    /// Value the round expects this input to carry.
    ///
    /// Liquidity pays exactly the denomination; fresh inputs also pay
    /// their share of the miner fee.
    pub fn expected_value(is_liquidity: bool, denomination: u64, miner_fee: u64) -> u64 {
        if is_liquidity {
            denomination
        } else {
            denomination + miner_fee
        }
    }
}

/// Liquidity waiting in the pool.
///
/// The acknowledgment payload is held until the liquidity is promoted into
/// a round, at which point it is echoed back to the owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisteredLiquidity {
    /// The input as it will be admitted.
    pub input: RegisteredInput,
    /// Payload to echo back on admission.
    pub ack_payload: Vec<u8>,
}

impl RegisteredLiquidity {
    pub fn new(input: RegisteredInput, ack_payload: Vec<u8>) -> Self {
        Self { input, ack_payload }
    }
}

/// Witness stack submitted by a participant for its input.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WitnessStack(pub Vec<Vec<u8>>);

impl WitnessStack {
    pub fn new(items: Vec<Vec<u8>>) -> Self {
        Self(items)
    }

    /// Number of stack items.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Consensus witness for this stack.
    pub fn to_witness(&self) -> Witness {
        Witness::from_slice(&self.0)
    }
}

impl From<&Witness> for WitnessStack {
    fn from(witness: &Witness) -> Self {
        Self(witness.iter().map(|item| item.to_vec()).collect())
    }
}
