//! Provenance validation for round inputs.
//!
//! Every input must prove where it comes from before it is admitted:
//!
//! - A fresh (mustMix) input spends an output of a funding transaction
//!   that paid the pool fee. The fee proof is an encrypted record carried
//!   in an `OP_RETURN` output of that transaction.
//! - A liquidity input spends an output of a previous mix transaction.
//!
//! The owner also proves control of the input by signing the round id.

mod error;
mod fee_data;
mod fee_validator;
mod validator;

pub use error::ProvenanceError;
pub use fee_data::{FeeDataCodec, FEE_DATA_VERSION};
pub use fee_validator::FeeValidator;
pub use validator::ProvenanceValidator;
