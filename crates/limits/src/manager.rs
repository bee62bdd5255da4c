//! Default limits policy.

use crate::{BanRegistry, LimitsConfig};
use bitcoin::OutPoint;
use coinjoin_liquidity::LiquidityPool;
use coinjoin_round::{LimitsDecision, Round, RoundLimits};
use coinjoin_types::{RoundId, RoundResult, RoundStatus};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Per-round bookkeeping.
#[derive(Debug)]
struct ManagedRound {
    round_id: RoundId,
    /// Time of the last admission (or round creation).
    last_admission: Duration,
    /// Liquidity the round currently expects. Never decreases.
    expected_liquidity: usize,
    /// Time of the last liquidity growth.
    last_growth: Duration,
    /// Time of the last mustMix target adjustment.
    last_adjust: Duration,
}

impl ManagedRound {
    fn new(round_id: RoundId, now: Duration) -> Self {
        Self {
            round_id,
            last_admission: now,
            expected_liquidity: 0,
            last_growth: now,
            last_adjust: now,
        }
    }
}

/// Timeouts, liquidity growth, target adjustment and bans.
pub struct DefaultRoundLimits {
    config: LimitsConfig,
    bans: BanRegistry,
    managed: Option<ManagedRound>,
    now: Duration,
}

impl DefaultRoundLimits {
    pub fn new(config: LimitsConfig) -> Self {
        Self {
            config,
            bans: BanRegistry::new(),
            managed: None,
            now: Duration::ZERO,
        }
    }

    pub fn bans(&self) -> &BanRegistry {
        &self.bans
    }

    fn managed_for(&mut self, round: &Round) -> Option<&mut ManagedRound> {
        self.managed
            .as_mut()
            .filter(|managed| managed.round_id == round.id())
    }

    /// Liquidity cap of a round.
    fn max_liquidity(round: &Round) -> usize {
        let params = round.params();
        (params.target_must_mix as f64 * params.liquidity_ratio).floor() as usize
    }

    fn tick_register_input(&mut self, round: &Round, pool: &LiquidityPool) -> Vec<LimitsDecision> {
        let now = self.now;
        let interval = self.config.liquidity_interval();
        let max_liquidity = Self::max_liquidity(round);
        let Some(managed) = self.managed_for(round) else {
            return vec![];
        };

        if pool.has_liquidity() && managed.expected_liquidity < max_liquidity {
            let since = managed.last_admission.max(managed.last_growth);
            if now.saturating_sub(since) >= interval {
                managed.expected_liquidity += 1;
                managed.last_growth = now;
                info!(
                    round_id = %round.id(),
                    expected = managed.expected_liquidity,
                    max = max_liquidity,
                    "Expecting one more liquidity"
                );
            }
        }

        let mut decisions = Vec::new();
        let adjust_timeout = round.params().must_mix_adjust_timeout;
        let since = managed.last_admission.max(managed.last_adjust);
        if !adjust_timeout.is_zero() && now.saturating_sub(since) >= adjust_timeout {
            let floor = round
                .params()
                .min_must_mix
                .max(round.nb_inputs().saturating_sub(managed.expected_liquidity));
            let target = round.target_must_mix();
            if target > floor {
                managed.last_adjust = now;
                debug!(round_id = %round.id(), from = target, to = target - 1, "Lowering mustMix target");
                decisions.push(LimitsDecision::AdjustTargetMustMix(target - 1));
            }
        }
        decisions
    }

    /// Ban every participant that did not reveal and fail the round.
    fn blame(&mut self, round: &Round) -> Vec<LimitsDecision> {
        let blamed: Vec<OutPoint> = round
            .unrevealed_inputs()
            .map(|input| input.outpoint.outpoint())
            .collect();
        for outpoint in &blamed {
            self.bans
                .ban(*outpoint, self.now, self.config.ban_duration(), "Output not revealed");
        }
        if !blamed.is_empty() {
            warn!(round_id = %round.id(), blamed = blamed.len(), "Blaming participants");
        }

        let mut decisions = Vec::new();
        if !blamed.is_empty() {
            decisions.push(LimitsDecision::Ban(blamed));
        }
        decisions.push(LimitsDecision::Fail(RoundResult::FailRevealOutput));
        decisions
    }
}

impl RoundLimits for DefaultRoundLimits {
    fn set_time(&mut self, now: Duration) {
        self.now = now;
    }

    fn manage(&mut self, round: &Round) {
        self.bans.maybe_cleanup(self.now);
        self.managed = Some(ManagedRound::new(round.id(), self.now));
    }

    fn unmanage(&mut self, round: &Round) {
        if self.managed_for(round).is_some() {
            self.managed = None;
        }
    }

    fn on_input_registered(&mut self, round: &Round) {
        let now = self.now;
        if let Some(managed) = self.managed_for(round) {
            managed.last_admission = now;
        }
    }

    fn on_round_status_change(&mut self, round: &Round) {
        debug!(round_id = %round.id(), status = %round.status(), "Limits: status change");
    }

    fn expected_liquidity(&self, round: &Round) -> usize {
        self.managed
            .as_ref()
            .filter(|managed| managed.round_id == round.id())
            .map(|managed| managed.expected_liquidity)
            .unwrap_or(0)
    }

    fn is_banned(&self, outpoint: &OutPoint) -> bool {
        self.bans.is_banned(outpoint, self.now)
    }

    fn on_reveal_complete(&mut self, round: &Round) -> Vec<LimitsDecision> {
        self.blame(round)
    }

    fn on_tick(&mut self, round: &Round, pool: &LiquidityPool) -> Vec<LimitsDecision> {
        let elapsed = self.now.saturating_sub(round.status_time());
        match round.status() {
            RoundStatus::RegisterInput => self.tick_register_input(round, pool),
            RoundStatus::RegisterOutput if elapsed >= self.config.register_output_timeout() => {
                info!(round_id = %round.id(), "REGISTER_OUTPUT timed out");
                vec![LimitsDecision::GoRevealOutputOrBlame]
            }
            RoundStatus::Signing if elapsed >= self.config.signing_timeout() => {
                info!(round_id = %round.id(), "SIGNING timed out");
                vec![LimitsDecision::GoRevealOutputOrBlame]
            }
            RoundStatus::RevealOutputOrBlame if elapsed >= self.config.reveal_output_timeout() => {
                info!(round_id = %round.id(), "REVEAL_OUTPUT_OR_BLAME timed out");
                self.blame(round)
            }
            _ => vec![],
        }
    }
}
