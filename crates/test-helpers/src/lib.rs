//! Deterministic fixtures for tests.
//!
//! Keys, funding transactions and signatures are derived from small integer
//! seeds so tests can build realistic inputs without randomness.

use bitcoin::bip32::{Xpriv, Xpub};
use bitcoin::hashes::Hash as _;
use bitcoin::secp256k1::{All, Message, PublicKey, Secp256k1, SecretKey};
use bitcoin::sighash::{EcdsaSighashType, SighashCache};
use bitcoin::sign_message::{signed_msg_hash, MessageSignature};
use bitcoin::{
    absolute, transaction, Address, Amount, CompressedPublicKey, Network, OutPoint, ScriptBuf,
    Sequence, Transaction, TxIn, TxOut, Txid, Witness,
};
use coinjoin_types::{TxOutPoint, WitnessStack};

/// A secp256k1 key pair derived from a seed byte.
pub struct TestKey {
    secp: Secp256k1<All>,
    secret: SecretKey,
}

impl TestKey {
    /// Create the key for `seed`. Seed 0 is mapped to 1.
    pub fn new(seed: u8) -> Self {
        let secret = SecretKey::from_slice(&[seed.max(1); 32]).expect("valid scalar");
        Self {
            secp: Secp256k1::new(),
            secret,
        }
    }

    pub fn public_key(&self) -> PublicKey {
        self.secret.public_key(&self.secp)
    }

    pub fn compressed(&self) -> CompressedPublicKey {
        CompressedPublicKey(self.public_key())
    }

    /// P2WPKH output script for this key.
    pub fn p2wpkh_script(&self) -> ScriptBuf {
        ScriptBuf::new_p2wpkh(&self.compressed().wpubkey_hash())
    }

    /// P2WPKH address for this key.
    pub fn address(&self, network: Network) -> Address {
        Address::from_script(&self.p2wpkh_script(), network).expect("p2wpkh script")
    }

    /// Base64 compact message signature, as produced by wallets.
    pub fn sign_message(&self, message: &str) -> String {
        let digest = Message::from_digest(signed_msg_hash(message).to_byte_array());
        let signature = self.secp.sign_ecdsa_recoverable(&digest, &self.secret);
        MessageSignature::new(signature, true).to_base64()
    }

    /// Witness spending the P2WPKH output of this key at `index` of `tx`.
    pub fn sign_p2wpkh_input(&self, tx: &Transaction, index: usize, value: u64) -> WitnessStack {
        let mut cache = SighashCache::new(tx);
        let sighash = cache
            .p2wpkh_signature_hash(
                index,
                &self.p2wpkh_script(),
                Amount::from_sat(value),
                EcdsaSighashType::All,
            )
            .expect("sighash");
        let digest = Message::from_digest(sighash.to_byte_array());
        let signature = bitcoin::ecdsa::Signature {
            signature: self.secp.sign_ecdsa(&digest, &self.secret),
            sighash_type: EcdsaSighashType::All,
        };
        WitnessStack::new(vec![
            signature.to_vec(),
            self.public_key().serialize().to_vec(),
        ])
    }
}

/// Encoded extended public key of the test fee wallet.
pub fn fee_xpub() -> String {
    let secp = Secp256k1::new();
    let master = Xpriv::new_master(Network::Regtest, &[42u8; 32]).expect("master key");
    Xpub::from_priv(&secp, &master).to_string()
}

/// Outpoint spent by the first input of [`funding_tx`] for `seed`.
pub fn funding_outpoint(seed: u8) -> OutPoint {
    OutPoint {
        txid: Txid::from_byte_array([seed; 32]),
        vout: 0,
    }
}

/// A transaction with one input spending [`funding_outpoint`] and the given
/// `(script, value)` outputs.
pub fn funding_tx(outputs: &[(ScriptBuf, u64)], seed: u8) -> Transaction {
    Transaction {
        version: transaction::Version::TWO,
        lock_time: absolute::LockTime::ZERO,
        input: vec![TxIn {
            previous_output: funding_outpoint(seed),
            script_sig: ScriptBuf::new(),
            sequence: Sequence::MAX,
            witness: Witness::new(),
        }],
        output: outputs
            .iter()
            .map(|(script, value)| TxOut {
                value: Amount::from_sat(*value),
                script_pubkey: script.clone(),
            })
            .collect(),
    }
}

/// Outpoint for output `vout` of `tx`, owned by `key`.
pub fn outpoint_for(tx: &Transaction, vout: u32, key: &TestKey, network: Network) -> TxOutPoint {
    let value = tx.output[vout as usize].value.to_sat();
    TxOutPoint::new(tx.compute_txid(), vout, value).with_address(key.address(network).to_string())
}

/// Regtest receive address for `seed`.
pub fn receive_address(seed: u8) -> String {
    TestKey::new(seed).address(Network::Regtest).to_string()
}
