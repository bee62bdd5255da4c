//! Liquidity pool.
//!
//! Prior mix outputs re-entering as liquidity are queued here until the
//! current round has room for them. The pool outlives rounds.

mod pool;

pub use pool::{LiquidityError, LiquidityPool};
