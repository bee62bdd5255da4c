//! Round coordination state machine.
//!
//! A [`RoundEngine`] owns the single active [`Round`] and the
//! [`LiquidityPool`](coinjoin_liquidity::LiquidityPool). Requests are
//! processed synchronously:
//!
//! - `register_input` → admit a mustMix, or queue a liquidity
//! - `register_output` → record an output, move to SIGNING once complete
//! - `register_signature` → collect witnesses, verify, broadcast
//! - `reveal_output` → collect reveals, hand over to the limits policy
//! - `on_tick` → timeouts, liquidity growth and promotion
//!
//! All I/O is performed by the runner via returned `Action`s.

mod assembler;
mod config;
mod engine;
mod error;
mod limits;
mod matcher;
mod round;

pub use assembler::{AssemblyError, TxAssembler};
pub use config::RoundConfig;
pub use engine::RoundEngine;
pub use error::RoundAbort;
pub use limits::{LimitsDecision, NoLimits, RoundLimits};
pub use matcher::{PeerAssignment, PeerMatcher};
pub use round::{RegisteredOutput, Round, RoundParams};
