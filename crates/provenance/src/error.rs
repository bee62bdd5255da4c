use coinjoin_core::RoundError;
use coinjoin_types::bitcoin::Txid;
use thiserror::Error;

/// Reasons an input's provenance is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProvenanceError {
    #[error("Input rejected (invalid fee for tx0={txid}, x={fee_indice}, payload={payload})")]
    InvalidFee {
        txid: Txid,
        fee_indice: u32,
        payload: String,
    },

    #[error("Input rejected (not a premix or mix input): {txid}")]
    NotPremixOrMix { txid: Txid },

    #[error("Input rejected: joined as liquidity but is a mustMix")]
    JoinedAsLiquidity,

    #[error("Input rejected: joined as mustMix but is a liquidity")]
    JoinedAsMustMix,

    #[error("Invalid signature")]
    InvalidSignature,

    #[error("Invalid fee xpub: {0}")]
    InvalidXpub(String),

    #[error("Fee address derivation failed: {0}")]
    Derivation(String),
}

impl From<ProvenanceError> for RoundError {
    fn from(err: ProvenanceError) -> Self {
        RoundError::BadInput(err.to_string())
    }
}
