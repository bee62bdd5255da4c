//! Transaction outpoints as seen by the coordinator.

use bitcoin::{OutPoint, Txid};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// A spendable output referenced by a participant.
///
/// Carries the value and, when known, the destination address of the output
/// being spent. Equality and hashing only consider `hash` and `index`: two
/// claims on the same physical output are the same outpoint whatever value
/// they advertise.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TxOutPoint {
    /// Transaction id of the funding transaction.
    pub hash: Txid,
    /// Output index within the funding transaction.
    pub index: u32,
    /// Output value in satoshis.
    pub value: u64,
    /// Address the output pays to, if resolved.
    pub to_address: Option<String>,
}

impl TxOutPoint {
    /// Create an outpoint without a resolved address.
    pub fn new(hash: Txid, index: u32, value: u64) -> Self {
        Self {
            hash,
            index,
            value,
            to_address: None,
        }
    }

    /// Attach the destination address.
    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.to_address = Some(address.into());
        self
    }

    /// The consensus outpoint (hash + index).
    pub fn outpoint(&self) -> OutPoint {
        OutPoint {
            txid: self.hash,
            vout: self.index,
        }
    }

    /// Txid bytes in display (big-endian) order, as used by BIP69.
    pub fn hash_display_bytes(&self) -> [u8; 32] {
        txid_display_bytes(&self.hash)
    }
}

/// Txid bytes in the order they are displayed (reverse of the internal order).
pub fn txid_display_bytes(txid: &Txid) -> [u8; 32] {
    use bitcoin::hashes::Hash as _;
    let mut bytes = txid.to_byte_array();
    bytes.reverse();
    bytes
}

/// BIP69 input ordering: txid in display order, then output index.
///
/// Value is only compared as a final tie-break so the ordering stays total
/// on inputs that claim the same outpoint.
pub fn bip69_input_cmp(a: &TxOutPoint, b: &TxOutPoint) -> Ordering {
    a.hash_display_bytes()
        .cmp(&b.hash_display_bytes())
        .then(a.index.cmp(&b.index))
        .then(a.value.cmp(&b.value))
}

impl PartialEq for TxOutPoint {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash && self.index == other.index
    }
}

impl Eq for TxOutPoint {}

impl Hash for TxOutPoint {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.hash.hash(state);
        self.index.hash(state);
    }
}

impl fmt::Display for TxOutPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{} ({} sats)", self.hash, self.index, self.value)
    }
}
