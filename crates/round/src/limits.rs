//! Pluggable limits and blame policy.

use crate::Round;
use bitcoin::OutPoint;
use coinjoin_liquidity::LiquidityPool;
use coinjoin_types::RoundResult;
use std::time::Duration;

/// Decision returned by the limits policy, applied by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LimitsDecision {
    /// Abandon REGISTER_OUTPUT or SIGNING and ask for reveals.
    GoRevealOutputOrBlame,
    /// Fail the round with the given result.
    Fail(RoundResult),
    /// Lower the mustMix target of the current round.
    AdjustTargetMustMix(usize),
    /// Outpoints banned by the policy. Informational.
    Ban(Vec<OutPoint>),
}

/// Timeouts, liquidity growth and ban bookkeeping around a round.
///
/// The engine informs the policy of every admission and phase change and
/// asks it how much liquidity the round expects. Forced transitions are
/// returned as [`LimitsDecision`]s rather than applied directly, so the
/// policy never re-enters the engine.
pub trait RoundLimits: Send {
    /// Set the current time. Called by the engine from its own `set_time`.
    fn set_time(&mut self, now: Duration);

    /// A round became the active round.
    fn manage(&mut self, round: &Round);

    /// A round is being replaced.
    fn unmanage(&mut self, round: &Round);

    /// An input was admitted into `round`.
    fn on_input_registered(&mut self, round: &Round);

    /// `round` entered a new status.
    fn on_round_status_change(&mut self, round: &Round);

    /// Number of liquidity inputs `round` currently expects.
    fn expected_liquidity(&self, round: &Round) -> usize;

    /// Whether `outpoint` is currently banned.
    fn is_banned(&self, outpoint: &OutPoint) -> bool;

    /// Every participant of `round` revealed its output.
    fn on_reveal_complete(&mut self, round: &Round) -> Vec<LimitsDecision>;

    /// Periodic check of timeouts and liquidity growth.
    fn on_tick(&mut self, round: &Round, pool: &LiquidityPool) -> Vec<LimitsDecision>;
}

/// Policy without timeouts, liquidity or bans.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoLimits;

impl RoundLimits for NoLimits {
    fn set_time(&mut self, _now: Duration) {}

    fn manage(&mut self, _round: &Round) {}

    fn unmanage(&mut self, _round: &Round) {}

    fn on_input_registered(&mut self, _round: &Round) {}

    fn on_round_status_change(&mut self, _round: &Round) {}

    fn expected_liquidity(&self, _round: &Round) -> usize {
        0
    }

    fn is_banned(&self, _outpoint: &OutPoint) -> bool {
        false
    }

    fn on_reveal_complete(&mut self, _round: &Round) -> Vec<LimitsDecision> {
        vec![LimitsDecision::Fail(RoundResult::FailRevealOutput)]
    }

    fn on_tick(&mut self, _round: &Round, _pool: &LiquidityPool) -> Vec<LimitsDecision> {
        vec![]
    }
}
