//! Fee record carried in the funding transaction.
//!
//! Layout of the `OP_RETURN` push:
//!
//! ```text
//! version: u8 | fee_indice: u32 BE | payload_len: u8 | payload
//! ```
//!
//! Everything after the version byte is XOR-masked with
//! `SHA256(secret || first input txid || first input vout LE)`, repeated as
//! needed, so only the pool and the payer can read it.

use bitcoin::hashes::Hash as _;
use bitcoin::script::{Instruction, PushBytesBuf};
use bitcoin::{OutPoint, ScriptBuf, Transaction};
use coinjoin_types::FeeData;
use sha2::{Digest, Sha256};

/// Current fee record version.
pub const FEE_DATA_VERSION: u8 = 1;

const HEADER_LEN: usize = 1 + 4 + 1;

/// Encrypts and decrypts fee records with the pool secret.
#[derive(Clone)]
pub struct FeeDataCodec {
    secret: Vec<u8>,
}

impl std::fmt::Debug for FeeDataCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeeDataCodec").finish_non_exhaustive()
    }
}

impl FeeDataCodec {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    /// Build the `OP_RETURN` script for a funding transaction whose first
    /// input spends `first_input`.
    ///
    /// Returns `None` if the payload does not fit the one-byte length field.
    pub fn encode(
        &self,
        fee_indice: u32,
        payload: Option<&[u8]>,
        first_input: &OutPoint,
    ) -> Option<ScriptBuf> {
        let payload = payload.unwrap_or_default();
        let payload_len = u8::try_from(payload.len()).ok()?;

        let mut body = Vec::with_capacity(HEADER_LEN - 1 + payload.len());
        body.extend_from_slice(&fee_indice.to_be_bytes());
        body.push(payload_len);
        body.extend_from_slice(payload);
        self.apply_mask(&mut body, first_input);

        let mut data = Vec::with_capacity(1 + body.len());
        data.push(FEE_DATA_VERSION);
        data.extend_from_slice(&body);

        let push = PushBytesBuf::try_from(data).ok()?;
        Some(ScriptBuf::new_op_return(push))
    }

    /// Decode the fee record of `tx`, if it carries one.
    ///
    /// When a payload is present the effective fee index is 0 whatever
    /// index was embedded.
    pub fn decode(&self, tx: &Transaction) -> Option<FeeData> {
        let first_input = tx.input.first()?.previous_output;
        tx.output
            .iter()
            .filter(|out| out.script_pubkey.is_op_return())
            .find_map(|out| self.decode_script(&out.script_pubkey, &first_input))
    }

    fn decode_script(&self, script: &ScriptBuf, first_input: &OutPoint) -> Option<FeeData> {
        let mut instructions = script.instructions();
        // skip OP_RETURN
        instructions.next()?.ok()?;
        let data = match instructions.next()?.ok()? {
            Instruction::PushBytes(bytes) => bytes.as_bytes().to_vec(),
            Instruction::Op(_) => return None,
        };
        if instructions.next().is_some() {
            return None;
        }

        if data.len() < HEADER_LEN || data[0] != FEE_DATA_VERSION {
            return None;
        }

        let mut body = data[1..].to_vec();
        self.apply_mask(&mut body, first_input);

        let fee_indice = u32::from_be_bytes([body[0], body[1], body[2], body[3]]);
        let payload_len = body[4] as usize;
        if body.len() != HEADER_LEN - 1 + payload_len {
            return None;
        }

        let fee_payload = (payload_len > 0).then(|| body[5..].to_vec());
        Some(FeeData {
            fee_indice: if fee_payload.is_some() { 0 } else { fee_indice },
            fee_payload,
            version: FEE_DATA_VERSION,
        })
    }

    fn apply_mask(&self, body: &mut [u8], first_input: &OutPoint) {
        let mut hasher = Sha256::new();
        hasher.update(&self.secret);
        hasher.update(first_input.txid.to_byte_array());
        hasher.update(first_input.vout.to_le_bytes());
        let mask = hasher.finalize();

        for (byte, m) in body.iter_mut().zip(mask.iter().cycle()) {
            *byte ^= m;
        }
    }
}
