//! Default limits policy for the round engine.
//!
//! - Liquidity growth: the round expects one more liquidity for every
//!   `liquidity_interval` without admission, up to the liquidity ratio.
//! - MustMix adjustment: the target is lowered by one for every
//!   `must_mix_adjust_timeout` without admission, down to `min_must_mix`.
//! - Phase timeouts: REGISTER_OUTPUT and SIGNING fall back to
//!   REVEAL_OUTPUT_OR_BLAME; an unanswered reveal fails the round.
//! - Blame: participants that did not reveal are banned for `ban_duration`.

mod ban;
mod config;
mod manager;

pub use ban::BanRegistry;
pub use config::LimitsConfig;
pub use manager::DefaultRoundLimits;
