//! Value types shared by the round coordinator crates.

mod fee;
mod identifiers;
mod input;
mod outpoint;
mod status;

pub use bitcoin;

pub use fee::{FeeData, PoolFee};
pub use identifiers::{Bordereau, HexError, PaymentCode, RoundId, Username};
pub use input::{RegisteredInput, RegisteredLiquidity, WitnessStack};
pub use outpoint::{bip69_input_cmp, txid_display_bytes, TxOutPoint};
pub use status::{RoundResult, RoundStatus};
