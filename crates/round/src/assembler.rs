//! Canonical mix transaction construction and verification.

use crate::Round;
use bitcoin::hashes::Hash as _;
use bitcoin::secp256k1::{Message, Secp256k1, VerifyOnly};
use bitcoin::sighash::SighashCache;
use bitcoin::{
    absolute, transaction, Address, Amount, CompressedPublicKey, Network, ScriptBuf, Sequence,
    Transaction, TxIn, TxOut,
};
use coinjoin_types::{bip69_input_cmp, TxOutPoint, Username};
use std::str::FromStr;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssemblyError {
    #[error("Unable to create output for {0}")]
    InvalidReceiveAddress(String),

    #[error("Unable to parse input address {0}")]
    InvalidInputAddress(String),

    #[error("Transaction input not found for {0}")]
    MissingInput(String),

    #[error("Missing signature from {0}")]
    MissingSignature(Username),

    #[error("Invalid witness for input {index}: {reason}")]
    InvalidWitness { index: usize, reason: String },

    #[error("Signature verification failed for input {index}")]
    Verification { index: usize },
}

impl AssemblyError {
    /// Whether the error reveals an inconsistency of the coordinator rather
    /// than a bad client witness.
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            AssemblyError::InvalidReceiveAddress(_)
                | AssemblyError::InvalidInputAddress(_)
                | AssemblyError::MissingInput(_)
        )
    }
}

/// Builds the mix transaction of a round.
///
/// Inputs and outputs are sorted by BIP69 so that the transaction reveals
/// nothing about registration order.
pub struct TxAssembler {
    network: Network,
    secp: Secp256k1<VerifyOnly>,
}

impl TxAssembler {
    pub fn new(network: Network) -> Self {
        Self {
            network,
            secp: Secp256k1::verification_only(),
        }
    }

    /// Build the unsigned transaction for `round`.
    pub fn build_unsigned(&self, round: &Round) -> Result<Transaction, AssemblyError> {
        let denomination = Amount::from_sat(round.denomination());

        let mut output = round
            .receive_addresses()
            .map(|address| {
                Ok(TxOut {
                    value: denomination,
                    script_pubkey: self.parse_script(address)?,
                })
            })
            .collect::<Result<Vec<_>, AssemblyError>>()?;
        output.sort_by(|a, b| {
            a.value
                .cmp(&b.value)
                .then_with(|| a.script_pubkey.as_bytes().cmp(b.script_pubkey.as_bytes()))
        });

        let mut spent: Vec<TxOutPoint> = round
            .inputs()
            .map(|input| {
                let mut outpoint = input.outpoint.clone();
                outpoint.value = round.params().spend_value(input.is_liquidity);
                outpoint
            })
            .collect();
        spent.sort_by(bip69_input_cmp);

        let input = spent
            .iter()
            .map(|outpoint| TxIn {
                previous_output: outpoint.outpoint(),
                script_sig: ScriptBuf::new(),
                sequence: Sequence::MAX,
                witness: Default::default(),
            })
            .collect();

        Ok(Transaction {
            version: transaction::Version::ONE,
            lock_time: absolute::LockTime::ZERO,
            input,
            output,
        })
    }

    /// Attach every participant's witness to the round's transaction and
    /// verify the result.
    pub fn finalize(&self, round: &Round) -> Result<Transaction, AssemblyError> {
        let mut tx = match round.tx() {
            Some(tx) => tx.clone(),
            None => self.build_unsigned(round)?,
        };

        let mut prevouts = vec![None; tx.input.len()];
        for input in round.inputs() {
            let outpoint = input.outpoint.outpoint();
            let index = tx
                .input
                .iter()
                .position(|txin| txin.previous_output == outpoint)
                .ok_or_else(|| AssemblyError::MissingInput(input.outpoint.to_string()))?;
            let witness = round
                .signature(&input.username)
                .ok_or_else(|| AssemblyError::MissingSignature(input.username.clone()))?;
            tx.input[index].witness = witness.to_witness();

            let script = match &input.outpoint.to_address {
                Some(address) => self
                    .parse_script(address)
                    .map_err(|_| AssemblyError::InvalidInputAddress(address.clone()))?,
                None => ScriptBuf::new_p2wpkh(&CompressedPublicKey(input.pubkey).wpubkey_hash()),
            };
            let value = round.params().spend_value(input.is_liquidity);
            prevouts[index] = Some((script, value));
        }

        let prevouts = prevouts
            .into_iter()
            .enumerate()
            .map(|(index, prevout)| {
                prevout.ok_or_else(|| AssemblyError::MissingInput(format!("input #{index}")))
            })
            .collect::<Result<Vec<_>, _>>()?;

        self.verify(&tx, &prevouts)?;
        debug!(txid = %tx.compute_txid(), inputs = tx.input.len(), "Transaction verified");
        Ok(tx)
    }

    /// Verify P2WPKH witnesses of `tx` against the spent `(script, value)`
    /// of each input.
    pub fn verify(&self, tx: &Transaction, prevouts: &[(ScriptBuf, u64)]) -> Result<(), AssemblyError> {
        let mut cache = SighashCache::new(tx);
        for (index, (script, value)) in prevouts.iter().enumerate() {
            let witness = &tx.input[index].witness;
            let invalid = |reason: &str| AssemblyError::InvalidWitness {
                index,
                reason: reason.to_string(),
            };
            if witness.len() != 2 {
                return Err(invalid("expected [signature, pubkey]"));
            }

            let signature = witness
                .nth(0)
                .and_then(|bytes| bitcoin::ecdsa::Signature::from_slice(bytes).ok())
                .ok_or_else(|| invalid("bad signature encoding"))?;
            let pubkey = witness
                .nth(1)
                .and_then(|bytes| CompressedPublicKey::from_slice(bytes).ok())
                .ok_or_else(|| invalid("bad public key"))?;

            if ScriptBuf::new_p2wpkh(&pubkey.wpubkey_hash()) != *script {
                return Err(invalid("public key does not match spent script"));
            }

            let sighash = cache
                .p2wpkh_signature_hash(index, script, Amount::from_sat(*value), signature.sighash_type)
                .map_err(|e| invalid(&e.to_string()))?;
            let message = Message::from_digest(sighash.to_byte_array());
            self.secp
                .verify_ecdsa(&message, &signature.signature, &pubkey.0)
                .map_err(|_| AssemblyError::Verification { index })?;
        }
        Ok(())
    }

    fn parse_script(&self, address: &str) -> Result<ScriptBuf, AssemblyError> {
        Address::from_str(address)
            .ok()
            .and_then(|a| a.require_network(self.network).ok())
            .map(|a| a.script_pubkey())
            .ok_or_else(|| AssemblyError::InvalidReceiveAddress(address.to_string()))
    }
}
