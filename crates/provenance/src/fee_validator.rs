//! Pool fee validation for funding transactions.

use crate::{FeeDataCodec, ProvenanceError};
use bitcoin::bip32::{ChildNumber, Xpub};
use bitcoin::secp256k1::{Secp256k1, VerifyOnly};
use bitcoin::{Address, CompressedPublicKey, Network, ScriptBuf, Transaction};
use coinjoin_types::{FeeData, PoolFee};
use std::collections::HashSet;
use std::str::FromStr;
use tracing::{debug, warn};

/// Checks that a funding transaction paid the pool.
///
/// Fees are paid to addresses derived from the pool's extended public key
/// at the non-hardened child given by the fee index. Discount codes are
/// carried as a 2-byte big-endian payload and waive the address check.
pub struct FeeValidator {
    secp: Secp256k1<VerifyOnly>,
    xpub: Xpub,
    network: Network,
    codec: FeeDataCodec,
    discount_payloads: HashSet<[u8; 2]>,
}

impl FeeValidator {
    /// Create a validator from the pool's encoded xpub.
    pub fn new(
        xpub: &str,
        network: Network,
        codec: FeeDataCodec,
    ) -> Result<Self, ProvenanceError> {
        let xpub = Xpub::from_str(xpub).map_err(|e| ProvenanceError::InvalidXpub(e.to_string()))?;
        Ok(Self {
            secp: Secp256k1::verification_only(),
            xpub,
            network,
            codec,
            discount_payloads: HashSet::new(),
        })
    }

    /// Register a discount code value.
    pub fn with_discount_code(mut self, value: i16) -> Self {
        self.discount_payloads.insert(value.to_be_bytes());
        self
    }

    pub fn codec(&self) -> &FeeDataCodec {
        &self.codec
    }

    pub fn network(&self) -> Network {
        self.network
    }

    /// Decode the fee record of a funding transaction.
    pub fn decode_fee_data(&self, tx: &Transaction) -> Option<FeeData> {
        self.codec.decode(tx)
    }

    /// Output script of the fee address at `fee_indice`.
    pub fn fee_script(&self, fee_indice: u32) -> Result<ScriptBuf, ProvenanceError> {
        let child = ChildNumber::from_normal_idx(fee_indice)
            .map_err(|e| ProvenanceError::Derivation(e.to_string()))?;
        let derived = self
            .xpub
            .derive_pub(&self.secp, &[child])
            .map_err(|e| ProvenanceError::Derivation(e.to_string()))?;
        let wpkh = CompressedPublicKey(derived.public_key).wpubkey_hash();
        Ok(ScriptBuf::new_p2wpkh(&wpkh))
    }

    /// Fee address at `fee_indice`, encoded for the configured network.
    pub fn fee_address(&self, fee_indice: u32) -> Result<Address, ProvenanceError> {
        let script = self.fee_script(fee_indice)?;
        Address::from_script(&script, self.network)
            .map_err(|e| ProvenanceError::Derivation(e.to_string()))
    }

    /// Total amount `tx` pays to the fee address at `fee_indice`.
    pub fn compute_fee_paid(&self, tx: &Transaction, fee_indice: u32) -> Result<u64, ProvenanceError> {
        let script = self.fee_script(fee_indice)?;
        Ok(tx
            .output
            .iter()
            .filter(|out| out.script_pubkey == script)
            .map(|out| out.value.to_sat())
            .sum())
    }

    /// Whether `tx`, confirmed at `tx_time`, paid the pool fee at `fee_indice`.
    pub fn is_tx0_fee_paid(
        &self,
        tx: &Transaction,
        tx_time: u64,
        fee_indice: u32,
        pool_fee: &PoolFee,
    ) -> bool {
        match self.compute_fee_paid(tx, fee_indice) {
            Ok(paid) => {
                let accepted = pool_fee.is_paid(paid, tx_time);
                if !accepted {
                    debug!(
                        txid = %tx.compute_txid(),
                        fee_indice,
                        paid,
                        required = pool_fee.fee_value,
                        "Fee not paid"
                    );
                }
                accepted
            }
            Err(e) => {
                warn!(txid = %tx.compute_txid(), fee_indice, error = %e, "Fee address unavailable");
                false
            }
        }
    }

    /// Whether a discount payload is one of the configured codes.
    pub fn is_valid_payload(&self, payload: &[u8]) -> bool {
        <[u8; 2]>::try_from(payload)
            .map(|code| self.discount_payloads.contains(&code))
            .unwrap_or(false)
    }

    /// Whether the decoded fee record of `tx` is acceptable.
    pub fn is_valid_tx0(
        &self,
        tx: &Transaction,
        tx_time: u64,
        fee_data: &FeeData,
        pool_fee: &PoolFee,
    ) -> bool {
        match &fee_data.fee_payload {
            Some(payload) => self.is_valid_payload(payload),
            None => self.is_tx0_fee_paid(tx, tx_time, fee_data.fee_indice, pool_fee),
        }
    }
}
