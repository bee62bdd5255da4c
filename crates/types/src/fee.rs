//! Pool fee schedule and decoded fee proofs.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Fee charged by the pool for a fresh (mustMix) entry.
///
/// `fee_accept` lists grandfathered lower fees: a payment of at least the
/// key value is accepted when the paying transaction's block time is not
/// later than the mapped timestamp (seconds since the epoch).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolFee {
    /// Current minimum fee in satoshis.
    pub fee_value: u64,
    /// Grandfathered fee value -> latest accepted payment time.
    #[serde(default)]
    pub fee_accept: BTreeMap<u64, u64>,
}

impl PoolFee {
    pub fn new(fee_value: u64) -> Self {
        Self {
            fee_value,
            fee_accept: BTreeMap::new(),
        }
    }

    /// Add a grandfathered fee value.
    pub fn with_accept(mut self, fee_value: u64, max_time: u64) -> Self {
        self.fee_accept.insert(fee_value, max_time);
        self
    }

    /// Check whether `paid` satisfies the schedule for a payment made at
    /// `tx_time`.
    pub fn is_paid(&self, paid: u64, tx_time: u64) -> bool {
        if paid >= self.fee_value {
            return true;
        }
        self.fee_accept
            .iter()
            .any(|(&value, &max_time)| paid >= value && tx_time <= max_time)
    }
}

/// Fee proof decoded from a funding transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeeData {
    /// Effective derivation index of the fee address.
    pub fee_indice: u32,
    /// Discount payload, if any.
    pub fee_payload: Option<Vec<u8>>,
    /// Encoding version.
    pub version: u8,
}
