//! Input provenance and ownership checks.

use crate::{FeeValidator, ProvenanceError};
use bitcoin::secp256k1::{All, PublicKey, Secp256k1};
use bitcoin::sign_message::{signed_msg_hash, MessageSignature};
use bitcoin::{Address, Transaction};
use coinjoin_types::{PoolFee, TxOutPoint};
use std::str::FromStr;
use tracing::{debug, warn};

/// Decides whether an input may enter a round, and in which class.
pub struct ProvenanceValidator {
    fee_validator: FeeValidator,
    secp: Secp256k1<All>,
    test_mode: bool,
}

impl ProvenanceValidator {
    pub fn new(fee_validator: FeeValidator) -> Self {
        Self {
            fee_validator,
            secp: Secp256k1::new(),
            test_mode: false,
        }
    }

    /// Allow clients to skip provenance checks. Never enable in production.
    pub fn with_test_mode(mut self, test_mode: bool) -> Self {
        self.test_mode = test_mode;
        self
    }

    pub fn fee_validator(&self) -> &FeeValidator {
        &self.fee_validator
    }

    /// Validate the provenance of `outpoint`, created by `tx` confirmed at
    /// `tx_time`.
    ///
    /// `is_prior_mix` tells whether `tx` is a mix transaction produced by
    /// this coordinator.
    #[allow(clippy::too_many_arguments)]
    pub fn validate_provenance(
        &self,
        outpoint: &TxOutPoint,
        tx: &Transaction,
        tx_time: u64,
        liquidity: bool,
        test_mode_requested: bool,
        pool_fee: &PoolFee,
        is_prior_mix: bool,
    ) -> Result<TxOutPoint, ProvenanceError> {
        if self.test_mode && test_mode_requested {
            warn!(outpoint = %outpoint, "Provenance checks skipped (test mode)");
            return Ok(outpoint.clone());
        }

        let is_liquidity = self.check_input_provenance(tx, tx_time, pool_fee, is_prior_mix)?;
        match (liquidity, is_liquidity) {
            (true, false) => Err(ProvenanceError::JoinedAsLiquidity),
            (false, true) => Err(ProvenanceError::JoinedAsMustMix),
            _ => Ok(outpoint.clone()),
        }
    }

    /// Derive the input class from its source transaction.
    ///
    /// Returns `true` for liquidity (prior mix output), `false` for a
    /// mustMix funded by a fee-paying transaction.
    pub fn check_input_provenance(
        &self,
        tx: &Transaction,
        tx_time: u64,
        pool_fee: &PoolFee,
        is_prior_mix: bool,
    ) -> Result<bool, ProvenanceError> {
        let txid = tx.compute_txid();
        match self.fee_validator.decode_fee_data(tx) {
            Some(fee_data) => {
                if !self
                    .fee_validator
                    .is_valid_tx0(tx, tx_time, &fee_data, pool_fee)
                {
                    return Err(ProvenanceError::InvalidFee {
                        txid,
                        fee_indice: fee_data.fee_indice,
                        payload: fee_data
                            .fee_payload
                            .as_deref()
                            .map(hex::encode)
                            .unwrap_or_else(|| "none".to_string()),
                    });
                }
                debug!(%txid, fee_indice = fee_data.fee_indice, "Valid tx0");
                Ok(false)
            }
            None if is_prior_mix => Ok(true),
            None => Err(ProvenanceError::NotPremixOrMix { txid }),
        }
    }

    /// Check that `signature` over `message` was made by the owner of
    /// `outpoint`, returning the signer's public key.
    pub fn validate_signature(
        &self,
        outpoint: &TxOutPoint,
        message: &str,
        signature: &str,
    ) -> Result<PublicKey, ProvenanceError> {
        let address = outpoint
            .to_address
            .as_deref()
            .ok_or(ProvenanceError::InvalidSignature)?;
        let address = Address::from_str(address)
            .ok()
            .and_then(|a| a.require_network(self.fee_validator.network()).ok())
            .ok_or(ProvenanceError::InvalidSignature)?;

        let signature =
            MessageSignature::from_base64(signature).map_err(|_| ProvenanceError::InvalidSignature)?;
        let pubkey = signature
            .recover_pubkey(&self.secp, signed_msg_hash(message))
            .map_err(|_| ProvenanceError::InvalidSignature)?;

        if !address.is_related_to_pubkey(&pubkey) {
            debug!(outpoint = %outpoint, "Signature does not match input address");
            return Err(ProvenanceError::InvalidSignature);
        }
        Ok(pubkey.inner)
    }
}
