//! Round engine state machine.

use crate::{
    LimitsDecision, PeerMatcher, Round, RoundAbort, RoundConfig, RoundLimits, TxAssembler,
};
use bitcoin::consensus::encode::serialize;
use coinjoin_core::{Action, Notification, PrivateMessage, RoundError};
use coinjoin_liquidity::LiquidityPool;
use coinjoin_types::{
    Bordereau, RegisteredInput, RegisteredLiquidity, RoundId, RoundResult, RoundStatus, Username,
    WitnessStack,
};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Owns the active round and drives it through its phases.
///
/// The engine is synchronous and deterministic for a given seed and
/// sequence of `set_time()` values. It performs no I/O: every operation
/// returns the [`Action`]s the runner must execute.
pub struct RoundEngine {
    config: RoundConfig,

    /// The single active round.
    round: Round,

    /// Liquidity waiting for room, carried across rounds.
    pool: LiquidityPool,

    limits: Box<dyn RoundLimits>,
    matcher: PeerMatcher,
    assembler: TxAssembler,

    /// Round ids, liquidity draws and peer shuffling.
    rng: ChaCha8Rng,

    now: Duration,
}

impl RoundEngine {
    /// Create an engine with a first round in REGISTER_INPUT.
    pub fn new(config: RoundConfig, mut limits: Box<dyn RoundLimits>, seed: u64, now: Duration) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        limits.set_time(now);
        let round = Round::new(RoundId::random(&mut rng), config.round_params(), now);
        limits.manage(&round);
        info!(round_id = %round.id(), denomination = config.denomination, "First round");

        Self {
            matcher: PeerMatcher::new(config.deterministic_pairing),
            assembler: TxAssembler::new(config.network),
            config,
            round,
            pool: LiquidityPool::new(),
            limits,
            rng,
            now,
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Accessors
    // ═══════════════════════════════════════════════════════════════════════════

    /// Set the current time.
    pub fn set_time(&mut self, now: Duration) {
        self.now = now;
        self.limits.set_time(now);
    }

    pub fn now(&self) -> Duration {
        self.now
    }

    pub fn config(&self) -> &RoundConfig {
        &self.config
    }

    pub fn round(&self) -> &Round {
        &self.round
    }

    pub fn current_round_id(&self) -> RoundId {
        self.round.id()
    }

    pub fn pool(&self) -> &LiquidityPool {
        &self.pool
    }

    /// Liquidity the current round expects, as decided by the limits policy.
    pub fn expected_liquidity(&self) -> usize {
        self.limits.expected_liquidity(&self.round)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Requests
    // ═══════════════════════════════════════════════════════════════════════════

    /// Register an input. MustMix inputs are admitted immediately,
    /// liquidity is queued until the round has room for it.
    pub fn register_input(
        &mut self,
        round_id: &RoundId,
        input: RegisteredInput,
        ack_payload: Vec<u8>,
    ) -> Result<Vec<Action>, RoundError> {
        self.check_status(round_id, RoundStatus::RegisterInput)?;

        let expected = self.round.params().spend_value(input.is_liquidity);
        if input.outpoint.value != expected {
            return Err(RoundError::bad_input(
                "Input balance should match denomination+fees",
            ));
        }
        if self.limits.is_banned(&input.outpoint.outpoint()) {
            warn!(username = %input.username, outpoint = %input.outpoint, "Rejecting banned input");
            return Err(RoundError::bad_input(
                "Banned from mixing, please retry later",
            ));
        }

        if input.is_liquidity {
            self.queue_liquidity(input, ack_payload)?;
            return Ok(vec![]);
        }

        let mut actions = vec![self.admit(input, ack_payload)?];
        actions.extend(self.after_admission());
        Ok(actions)
    }

    /// Drop the queued liquidity of a disconnected client.
    pub fn unregister_liquidity(&mut self, username: &Username) -> bool {
        let removed = self.pool.remove_by_username(username).is_some();
        if removed {
            debug!(%username, "Queued liquidity removed");
        }
        removed
    }

    /// Register an output through the anonymous endpoint.
    pub fn register_output(
        &mut self,
        round_id: &RoundId,
        send_address: String,
        receive_address: String,
        bordereau: Bordereau,
    ) -> Result<Vec<Action>, RoundError> {
        self.check_status(round_id, RoundStatus::RegisterOutput)?;
        self.round
            .register_output(send_address, receive_address, bordereau)?;
        info!(
            round_id = %self.round.id(),
            outputs = self.round.nb_outputs(),
            inputs = self.round.nb_inputs(),
            "Output registered"
        );

        if self.round.nb_outputs() < self.round.nb_inputs() {
            return Ok(vec![]);
        }
        if !self.round.outputs_match() {
            error!(
                round_id = %self.round.id(),
                send = ?self.round.send_addresses().collect::<Vec<_>>(),
                receive = ?self.round.receive_addresses().collect::<Vec<_>>(),
                "Send addresses don't match receive addresses"
            );
            return Ok(self.fail(RoundResult::FailRegisterOutput));
        }
        Ok(self.transition(RoundStatus::Signing))
    }

    /// Reveal the output registered with `bordereau`.
    pub fn reveal_output(
        &mut self,
        round_id: &RoundId,
        username: Username,
        bordereau: Bordereau,
    ) -> Result<Vec<Action>, RoundError> {
        self.check_status(round_id, RoundStatus::RevealOutputOrBlame)?;
        if self.round.is_bordereau_revealed(&bordereau) {
            warn!(%username, %bordereau, "Rejecting already revealed bordereau");
        }
        self.round.reveal_output(username, bordereau)?;

        if self.round.nb_revealed() < self.round.nb_inputs() {
            return Ok(vec![]);
        }
        info!(round_id = %self.round.id(), "All outputs revealed");
        let decisions = self.limits.on_reveal_complete(&self.round);
        Ok(self.apply_decisions(decisions))
    }

    /// Register the witness of `username`'s input.
    pub fn register_signature(
        &mut self,
        round_id: &RoundId,
        username: Username,
        witness: WitnessStack,
    ) -> Result<Vec<Action>, RoundError> {
        self.check_status(round_id, RoundStatus::Signing)?;
        self.round.set_signature(username.clone(), witness)?;
        debug!(round_id = %self.round.id(), %username, signatures = self.round.nb_signatures(), "Signature registered");

        if self.round.nb_signatures() < self.round.nb_inputs() {
            return Ok(vec![]);
        }

        match self.assembler.finalize(&self.round) {
            Ok(tx) => {
                info!(round_id = %self.round.id(), txid = %tx.compute_txid(), "Transaction signed");
                self.round.set_signed_tx(tx.clone());
                let outcome = self
                    .round
                    .outcome(RoundStatus::Success, RoundResult::Success, self.now);
                let mut actions = vec![Action::BroadcastTransaction {
                    tx: Box::new(tx),
                    outcome,
                }];
                actions.extend(self.transition(RoundStatus::Success));
                Ok(actions)
            }
            Err(e) if e.is_internal() => Ok(self.abandon(RoundAbort::system(e.to_string()))),
            Err(e) => {
                error!(round_id = %self.round.id(), error = %e, "Transaction verification failed");
                Ok(self.fail(RoundResult::FailSigning))
            }
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Status
    // ═══════════════════════════════════════════════════════════════════════════

    /// Move the round to `status`, running the phase-entry side effects.
    pub fn change_round_status(
        &mut self,
        round_id: &RoundId,
        status: RoundStatus,
    ) -> Result<Vec<Action>, RoundError> {
        self.check_round(round_id)?;
        if status == RoundStatus::RegisterInput {
            return Err(RoundError::invalid_round(
                "Cannot return to REGISTER_INPUT",
            ));
        }
        Ok(self.transition(status))
    }

    /// Ask participants to reveal their output.
    pub fn go_reveal_output_or_blame(&mut self, round_id: &RoundId) -> Result<Vec<Action>, RoundError> {
        self.change_round_status(round_id, RoundStatus::RevealOutputOrBlame)
    }

    /// Fail the round with `result`.
    pub fn go_fail(&mut self, round_id: &RoundId, result: RoundResult) -> Result<Vec<Action>, RoundError> {
        self.check_round(round_id)?;
        Ok(self.fail(result))
    }

    /// Notification describing the current phase.
    pub fn current_round_status_notification(&self) -> Result<Notification, RoundError> {
        self.notification().map_err(|abort| {
            error!(round_id = %self.round.id(), error = %abort, "Unable to build notification");
            RoundError::Internal
        })
    }

    /// Periodic driver: limits timeouts, liquidity growth and promotion.
    pub fn on_tick(&mut self) -> Vec<Action> {
        let decisions = self.limits.on_tick(&self.round, &self.pool);
        let mut actions = self.apply_decisions(decisions);
        if self.round.status() == RoundStatus::RegisterInput {
            actions.extend(self.after_admission());
        }
        actions
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Admission
    // ═══════════════════════════════════════════════════════════════════════════

    fn queue_liquidity(&mut self, input: RegisteredInput, ack_payload: Vec<u8>) -> Result<(), RoundError> {
        if self.round.has_input(&input.outpoint.outpoint()) || self.round.has_username(&input.username) {
            return Err(RoundError::bad_input("Input already registered for this round"));
        }
        let username = input.username.clone();
        self.pool
            .register_liquidity(RegisteredLiquidity::new(input, ack_payload))
            .map_err(|e| RoundError::bad_input(e.to_string()))?;
        info!(%username, queued = self.pool.len(), "Liquidity queued");
        Ok(())
    }

    /// Insert an input into the round. Returns the acknowledgment.
    fn admit(&mut self, input: RegisteredInput, ack_payload: Vec<u8>) -> Result<Action, RoundError> {
        let capacity = self.round.target_must_mix() + self.expected_liquidity();
        if self.round.nb_inputs() >= capacity {
            return Err(RoundError::RoundFull);
        }

        let username = input.username.clone();
        let is_liquidity = input.is_liquidity;
        self.round.register_input(input)?;
        self.limits.on_input_registered(&self.round);
        info!(
            round_id = %self.round.id(),
            %username,
            is_liquidity,
            inputs = self.round.nb_inputs(),
            capacity,
            "Input admitted"
        );

        Ok(Action::SendPrivate {
            username,
            message: PrivateMessage::RegisterInputAck { ack_payload },
        })
    }

    /// Promote queued liquidity while the round has liquidity slots.
    fn promote_liquidities(&mut self) -> Vec<Action> {
        let mut actions = Vec::new();
        while self.round.status() == RoundStatus::RegisterInput {
            let expected = self.expected_liquidity();
            if self.round.nb_liquidities() >= expected
                || self.round.nb_inputs() >= self.round.target_must_mix() + expected
            {
                break;
            }
            let Some(liquidity) = self.pool.take_random(&mut self.rng) else {
                break;
            };

            if self.limits.is_banned(&liquidity.input.outpoint.outpoint()) {
                debug!(username = %liquidity.input.username, "Dropping banned liquidity");
                continue;
            }
            match self.admit(liquidity.input, liquidity.ack_payload) {
                Ok(ack) => actions.push(ack),
                Err(e) => warn!(error = %e, "Liquidity not admitted"),
            }
        }
        actions
    }

    fn after_admission(&mut self) -> Vec<Action> {
        let mut actions = self.promote_liquidities();
        if self.is_register_input_ready() {
            actions.extend(self.transition(RoundStatus::RegisterOutput));
        }
        actions
    }

    fn is_register_input_ready(&self) -> bool {
        let nb_inputs = self.round.nb_inputs();
        self.round.status() == RoundStatus::RegisterInput
            && nb_inputs > 0
            && nb_inputs == self.round.target_must_mix() + self.expected_liquidity()
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Transitions
    // ═══════════════════════════════════════════════════════════════════════════

    fn fail(&mut self, result: RoundResult) -> Vec<Action> {
        self.round.set_fail_reason(result);
        self.transition(RoundStatus::Fail)
    }

    fn transition(&mut self, status: RoundStatus) -> Vec<Action> {
        match self.enter(status) {
            Ok(actions) => actions,
            Err(abort) => self.abandon(abort),
        }
    }

    fn enter(&mut self, status: RoundStatus) -> Result<Vec<Action>, RoundAbort> {
        info!(
            round_id = %self.round.id(),
            from = %self.round.status(),
            to = %status,
            "Round status change"
        );

        let mut actions = Vec::new();
        match status {
            RoundStatus::RegisterOutput => actions.extend(self.pair_peers()),
            RoundStatus::Signing => {
                let tx = self
                    .assembler
                    .build_unsigned(&self.round)
                    .map_err(|e| RoundAbort::system(e.to_string()))?;
                debug!(round_id = %self.round.id(), txid = %tx.compute_txid(), "Transaction to sign");
                self.round.set_tx(tx);
            }
            _ => {}
        }

        self.round.set_status(status, self.now);
        self.limits.on_round_status_change(&self.round);
        actions.push(Action::Broadcast(self.notification()?));

        match status {
            RoundStatus::Success => {
                // signed rounds are persisted once the broadcast completes
                if !self.round.is_signed() {
                    actions.push(Action::SaveRound(self.round.outcome(
                        status,
                        RoundResult::Success,
                        self.now,
                    )));
                }
                self.next_round();
            }
            RoundStatus::Fail => {
                let result = self.round.fail_reason().unwrap_or(RoundResult::Fail);
                actions.push(Action::SaveRound(self.round.outcome(status, result, self.now)));
                self.next_round();
            }
            _ => {}
        }
        Ok(actions)
    }

    /// Fail the round after a phase could not be entered.
    fn abandon(&mut self, abort: RoundAbort) -> Vec<Action> {
        error!(round_id = %self.round.id(), result = %abort.result, reason = %abort.reason, "Abandoning round");
        self.round.set_fail_reason(abort.result);
        self.round.set_status(RoundStatus::Fail, self.now);
        self.limits.on_round_status_change(&self.round);

        let actions = vec![
            Action::Broadcast(Notification::Fail {
                round_id: self.round.id(),
            }),
            Action::SaveRound(self.round.outcome(RoundStatus::Fail, abort.result, self.now)),
        ];
        self.next_round();
        actions
    }

    fn next_round(&mut self) {
        self.limits.unmanage(&self.round);
        let round = Round::new(
            RoundId::random(&mut self.rng),
            self.config.round_params(),
            self.now,
        );
        let previous = std::mem::replace(&mut self.round, round);
        info!(
            round_id = %self.round.id(),
            previous = %previous.id(),
            liquidities_queued = self.pool.len(),
            "New round"
        );
        self.limits.manage(&self.round);
    }

    fn pair_peers(&mut self) -> Vec<Action> {
        let participants = self
            .round
            .inputs()
            .map(|i| (i.username.clone(), i.payment_code.clone()))
            .collect();
        if self.config.deterministic_pairing {
            warn!("Deterministic peer pairing enabled (use it for tests only!)");
        }
        self.matcher
            .pair(participants, &mut self.rng)
            .into_iter()
            .map(|assignment| Action::SendPrivate {
                username: assignment.username,
                message: PrivateMessage::PeersPaymentCodes {
                    from_peer: assignment.from_peer,
                    to_peer: assignment.to_peer,
                },
            })
            .collect()
    }

    fn apply_decisions(&mut self, decisions: Vec<LimitsDecision>) -> Vec<Action> {
        let round_id = self.round.id();
        let mut actions = Vec::new();
        for decision in decisions {
            if self.round.id() != round_id {
                debug!(%round_id, ?decision, "Round replaced, skipping decision");
                continue;
            }
            match decision {
                LimitsDecision::GoRevealOutputOrBlame => {
                    if matches!(
                        self.round.status(),
                        RoundStatus::RegisterOutput | RoundStatus::Signing
                    ) {
                        actions.extend(self.transition(RoundStatus::RevealOutputOrBlame));
                    }
                }
                LimitsDecision::Fail(result) => actions.extend(self.fail(result)),
                LimitsDecision::AdjustTargetMustMix(target) => {
                    if self.round.status() == RoundStatus::RegisterInput {
                        let previous = self.round.target_must_mix();
                        self.round.set_target_must_mix(target);
                        info!(
                            %round_id,
                            previous,
                            target = self.round.target_must_mix(),
                            "MustMix target adjusted"
                        );
                    }
                }
                LimitsDecision::Ban(outpoints) => {
                    warn!(%round_id, count = outpoints.len(), ?outpoints, "Outpoints banned");
                }
            }
        }
        actions
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Helpers
    // ═══════════════════════════════════════════════════════════════════════════

    fn check_round(&self, round_id: &RoundId) -> Result<(), RoundError> {
        if *round_id != self.round.id() {
            return Err(RoundError::invalid_round("Invalid roundId"));
        }
        Ok(())
    }

    fn check_status(&self, round_id: &RoundId, status: RoundStatus) -> Result<(), RoundError> {
        self.check_round(round_id)?;
        if self.round.status() != status {
            return Err(RoundError::invalid_round(
                "Operation not permitted for current round status",
            ));
        }
        Ok(())
    }

    fn notification(&self) -> Result<Notification, RoundAbort> {
        let round_id = self.round.id();
        Ok(match self.round.status() {
            RoundStatus::RegisterInput => Notification::RegisterInput {
                round_id,
                public_key: self.config.server_public_key.clone(),
                network: self.config.network.to_string(),
                denomination: self.round.denomination(),
                miner_fee: self.round.miner_fee(),
            },
            RoundStatus::RegisterOutput => Notification::RegisterOutput {
                round_id,
                register_output_url: self.config.register_output_url.clone(),
            },
            RoundStatus::Signing => {
                let tx = self
                    .round
                    .tx()
                    .ok_or_else(|| RoundAbort::system("No transaction to sign"))?;
                Notification::Signing {
                    round_id,
                    transaction: serialize(tx),
                }
            }
            RoundStatus::RevealOutputOrBlame => Notification::RevealOutputOrBlame { round_id },
            RoundStatus::Success => Notification::Success { round_id },
            RoundStatus::Fail => Notification::Fail { round_id },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::NoLimits;
    use bitcoin::{Network, OutPoint};
    use coinjoin_core::RoundOutcome;
    use coinjoin_test_helpers::{funding_tx, outpoint_for, receive_address, TestKey};
    use coinjoin_types::PaymentCode;
    use std::collections::HashSet;
    use std::sync::{Arc, Mutex};
    use tracing_test::traced_test;

    const DENOMINATION: u64 = 1_000_000;
    const MINER_FEE: u64 = 5_000;

    // ═══════════════════════════════════════════════════════════════════════════
    // Fixtures
    // ═══════════════════════════════════════════════════════════════════════════

    #[derive(Default)]
    struct ScriptedState {
        expected: usize,
        banned: HashSet<OutPoint>,
        on_tick: Vec<LimitsDecision>,
        statuses: Vec<RoundStatus>,
        admissions: usize,
        managed: Vec<RoundId>,
    }

    /// Limits policy driven by the test.
    #[derive(Clone, Default)]
    struct ScriptedLimits(Arc<Mutex<ScriptedState>>);

    impl ScriptedLimits {
        fn state(&self) -> std::sync::MutexGuard<'_, ScriptedState> {
            self.0.lock().unwrap()
        }
    }

    impl RoundLimits for ScriptedLimits {
        fn set_time(&mut self, _now: Duration) {}

        fn manage(&mut self, round: &Round) {
            self.state().managed.push(round.id());
        }

        fn unmanage(&mut self, _round: &Round) {}

        fn on_input_registered(&mut self, _round: &Round) {
            self.state().admissions += 1;
        }

        fn on_round_status_change(&mut self, round: &Round) {
            self.state().statuses.push(round.status());
        }

        fn expected_liquidity(&self, _round: &Round) -> usize {
            self.state().expected
        }

        fn is_banned(&self, outpoint: &OutPoint) -> bool {
            self.state().banned.contains(outpoint)
        }

        fn on_reveal_complete(&mut self, round: &Round) -> Vec<LimitsDecision> {
            let blamed: Vec<_> = round.unrevealed_inputs().map(|i| i.outpoint.outpoint()).collect();
            vec![
                LimitsDecision::Ban(blamed),
                LimitsDecision::Fail(RoundResult::FailRevealOutput),
            ]
        }

        fn on_tick(&mut self, _round: &Round, _pool: &LiquidityPool) -> Vec<LimitsDecision> {
            std::mem::take(&mut self.state().on_tick)
        }
    }

    struct Client {
        key: TestKey,
        input: RegisteredInput,
    }

    fn client(seed: u8, is_liquidity: bool) -> Client {
        client_with_value(
            seed,
            is_liquidity,
            RegisteredInput::expected_value(is_liquidity, DENOMINATION, MINER_FEE),
        )
    }

    fn client_with_value(seed: u8, is_liquidity: bool, value: u64) -> Client {
        let key = TestKey::new(seed);
        let tx = funding_tx(&[(key.p2wpkh_script(), value)], seed);
        Client {
            input: RegisteredInput {
                username: Username::new(format!("user{seed}")),
                outpoint: outpoint_for(&tx, 0, &key, Network::Regtest),
                pubkey: key.public_key(),
                payment_code: PaymentCode::new(format!("pc{seed}")),
                is_liquidity,
            },
            key,
        }
    }

    fn engine(target: usize, limits: impl RoundLimits + 'static) -> RoundEngine {
        let config = RoundConfig::new(DENOMINATION, MINER_FEE)
            .with_target_must_mix(target)
            .with_min_must_mix(1)
            .with_network(Network::Regtest)
            .with_server_public_key("02ab")
            .with_deterministic_pairing(true);
        RoundEngine::new(config, Box::new(limits), 42, Duration::from_secs(1_000))
    }

    fn register(engine: &mut RoundEngine, client: &Client) -> Result<Vec<Action>, RoundError> {
        let round_id = engine.current_round_id();
        engine.register_input(&round_id, client.input.clone(), client.input.username.as_str().as_bytes().to_vec())
    }

    /// Register ring outputs: client i sends to address i+1 and receives at i.
    fn register_outputs(engine: &mut RoundEngine, clients: &[&Client]) -> Vec<Action> {
        let round_id = engine.current_round_id();
        let n = clients.len();
        let mut actions = Vec::new();
        for (i, client) in clients.iter().enumerate() {
            actions = engine
                .register_output(
                    &round_id,
                    receive_address(100 + ((i + 1) % n) as u8),
                    receive_address(100 + i as u8),
                    Bordereau::new(format!("b-{}", client.input.username)),
                )
                .unwrap();
        }
        actions
    }

    fn sign_all(engine: &mut RoundEngine, clients: &[&Client]) -> Vec<Action> {
        let round_id = engine.current_round_id();
        let tx = engine.round().tx().unwrap().clone();
        let mut actions = Vec::new();
        for client in clients {
            let index = tx
                .input
                .iter()
                .position(|i| i.previous_output == client.input.outpoint.outpoint())
                .unwrap();
            let value = RegisteredInput::expected_value(client.input.is_liquidity, DENOMINATION, MINER_FEE);
            let witness = client.key.sign_p2wpkh_input(&tx, index, value);
            actions = engine
                .register_signature(&round_id, client.input.username.clone(), witness)
                .unwrap();
        }
        actions
    }

    fn broadcast_statuses(actions: &[Action]) -> Vec<RoundStatus> {
        actions
            .iter()
            .filter_map(|a| match a {
                Action::Broadcast(n) => Some(n.status()),
                _ => None,
            })
            .collect()
    }

    fn saved(actions: &[Action]) -> Option<&RoundOutcome> {
        actions.iter().find_map(|a| match a {
            Action::SaveRound(outcome) => Some(outcome),
            _ => None,
        })
    }

    fn acks(actions: &[Action]) -> Vec<&Username> {
        actions
            .iter()
            .filter_map(|a| match a {
                Action::SendPrivate {
                    username,
                    message: PrivateMessage::RegisterInputAck { .. },
                } => Some(username),
                _ => None,
            })
            .collect()
    }

    /// Drive a round with `clients` (all mustMix) to SIGNING.
    fn to_signing(engine: &mut RoundEngine, clients: &[&Client]) {
        for c in clients {
            register(engine, c).unwrap();
        }
        register_outputs(engine, clients);
        assert_eq!(engine.round().status(), RoundStatus::Signing);
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Admission
    // ═══════════════════════════════════════════════════════════════════════════

    #[traced_test]
    #[test]
    fn test_two_must_mix_reach_register_output_on_second_admission() {
        let mut engine = engine(2, NoLimits);
        let (a, b) = (client(1, false), client(2, false));

        let actions = register(&mut engine, &a).unwrap();
        assert_eq!(acks(&actions), vec![&a.input.username]);
        assert!(broadcast_statuses(&actions).is_empty());
        assert_eq!(engine.round().status(), RoundStatus::RegisterInput);

        let actions = register(&mut engine, &b).unwrap();
        assert_eq!(engine.round().status(), RoundStatus::RegisterOutput);
        assert_eq!(broadcast_statuses(&actions), vec![RoundStatus::RegisterOutput]);

        let peers: Vec<_> = actions
            .iter()
            .filter_map(|a| match a {
                Action::SendPrivate {
                    username,
                    message: PrivateMessage::PeersPaymentCodes { from_peer, to_peer },
                } => Some((username.as_str(), from_peer.as_str(), to_peer.as_str())),
                _ => None,
            })
            .collect();
        assert_eq!(peers, vec![("user1", "pc2", "pc2"), ("user2", "pc1", "pc1")]);

        // ack is echoed with the supplied payload
        assert!(matches!(
            &actions[0],
            Action::SendPrivate { message: PrivateMessage::RegisterInputAck { ack_payload }, .. }
                if ack_payload == b"user2"
        ));
    }

    #[traced_test]
    #[test]
    fn test_value_must_match_exactly() {
        let mut engine = engine(2, NoLimits);

        let overpay = client_with_value(1, false, DENOMINATION + MINER_FEE + 1);
        assert!(matches!(register(&mut engine, &overpay), Err(RoundError::BadInput(_))));

        // a liquidity must not pay the miner fee
        let liquidity = client_with_value(2, true, DENOMINATION + MINER_FEE);
        assert!(matches!(register(&mut engine, &liquidity), Err(RoundError::BadInput(_))));

        assert_eq!(engine.round().nb_inputs(), 0);
        assert!(engine.pool().is_empty());
    }

    #[traced_test]
    #[test]
    fn test_duplicates_rejected() {
        let mut engine = engine(3, NoLimits);
        let a = client(1, false);
        register(&mut engine, &a).unwrap();

        assert!(matches!(register(&mut engine, &a), Err(RoundError::BadInput(_))));

        let mut same_user = client(2, false);
        same_user.input.username = a.input.username.clone();
        assert!(matches!(register(&mut engine, &same_user), Err(RoundError::BadInput(_))));
        assert_eq!(engine.round().nb_inputs(), 1);
    }

    #[traced_test]
    #[test]
    fn test_stale_round_and_wrong_phase() {
        let mut engine = engine(2, NoLimits);
        let a = client(1, false);

        let stale = RoundId::from_bytes([0; 16]);
        assert!(matches!(
            engine.register_input(&stale, a.input.clone(), vec![]),
            Err(RoundError::InvalidRound(_))
        ));

        let round_id = engine.current_round_id();
        assert!(matches!(
            engine.register_output(&round_id, "a".into(), "b".into(), Bordereau::new("x")),
            Err(RoundError::InvalidRound(_))
        ));
        assert!(matches!(
            engine.register_signature(&round_id, a.input.username.clone(), WitnessStack::default()),
            Err(RoundError::InvalidRound(_))
        ));
        assert!(matches!(
            engine.change_round_status(&round_id, RoundStatus::RegisterInput),
            Err(RoundError::InvalidRound(_))
        ));
    }

    #[traced_test]
    #[test]
    fn test_banned_outpoint_rejected() {
        let limits = ScriptedLimits::default();
        let mut engine = engine(2, limits.clone());
        let a = client(1, false);
        limits.state().banned.insert(a.input.outpoint.outpoint());

        assert!(matches!(register(&mut engine, &a), Err(RoundError::BadInput(_))));
        assert_eq!(limits.state().admissions, 0);
    }

    #[traced_test]
    #[test]
    fn test_capacity_checked_before_insertion() {
        let limits = ScriptedLimits::default();
        limits.state().expected = 1;
        let mut engine = engine(2, limits.clone());

        register(&mut engine, &client(1, false)).unwrap();
        register(&mut engine, &client(2, false)).unwrap();
        // 2 inputs, 3 expected: not ready
        assert_eq!(engine.round().status(), RoundStatus::RegisterInput);

        limits.state().expected = 0;
        assert_eq!(register(&mut engine, &client(3, false)), Err(RoundError::RoundFull));
        assert_eq!(engine.round().nb_inputs(), 2);
    }

    #[traced_test]
    #[test]
    fn test_liquidity_queued_then_promoted() {
        let limits = ScriptedLimits::default();
        let mut engine = engine(2, limits.clone());
        let (a, b, l) = (client(1, false), client(2, false), client(3, true));

        assert!(register(&mut engine, &l).unwrap().is_empty());
        assert_eq!(engine.pool().len(), 1);
        assert!(matches!(register(&mut engine, &l), Err(RoundError::BadInput(_))));

        register(&mut engine, &a).unwrap();
        // no liquidity expected yet
        assert_eq!(engine.round().nb_liquidities(), 0);

        limits.state().expected = 1;
        let actions = engine.on_tick();
        assert_eq!(acks(&actions), vec![&l.input.username]);
        assert_eq!(engine.round().nb_liquidities(), 1);
        assert!(engine.pool().is_empty());
        assert_eq!(engine.round().status(), RoundStatus::RegisterInput);

        let actions = register(&mut engine, &b).unwrap();
        assert_eq!(broadcast_statuses(&actions), vec![RoundStatus::RegisterOutput]);
        assert_eq!(engine.round().nb_inputs(), 3);
    }

    #[traced_test]
    #[test]
    fn test_liquidity_survives_round_change_and_unregister() {
        let mut engine = engine(1, NoLimits);
        let l = client(3, true);
        register(&mut engine, &l).unwrap();

        let round_id = engine.current_round_id();
        engine.go_fail(&round_id, RoundResult::Fail).unwrap();
        assert_ne!(engine.current_round_id(), round_id);
        assert_eq!(engine.pool().len(), 1);

        assert!(engine.unregister_liquidity(&l.input.username));
        assert!(!engine.unregister_liquidity(&l.input.username));
    }

    #[traced_test]
    #[test]
    fn test_target_adjustment_unblocks_round() {
        let limits = ScriptedLimits::default();
        let mut engine = engine(3, limits.clone());
        register(&mut engine, &client(1, false)).unwrap();
        register(&mut engine, &client(2, false)).unwrap();

        limits.state().on_tick = vec![LimitsDecision::AdjustTargetMustMix(2)];
        let actions = engine.on_tick();
        assert_eq!(engine.round().target_must_mix(), 2);
        assert_eq!(broadcast_statuses(&actions), vec![RoundStatus::RegisterOutput]);
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Outputs, signing
    // ═══════════════════════════════════════════════════════════════════════════

    #[traced_test]
    #[test]
    fn test_full_round_success() {
        let limits = ScriptedLimits::default();
        let mut engine = engine(2, limits.clone());
        let (a, b) = (client(1, false), client(2, false));
        let first_round = engine.current_round_id();

        register(&mut engine, &a).unwrap();
        register(&mut engine, &b).unwrap();
        let actions = register_outputs(&mut engine, &[&a, &b]);
        assert_eq!(broadcast_statuses(&actions), vec![RoundStatus::Signing]);
        let unsigned = engine.round().tx().unwrap().clone();
        assert!(matches!(
            &actions[0],
            Action::Broadcast(Notification::Signing { transaction, .. }) if *transaction == serialize(&unsigned)
        ));

        let actions = sign_all(&mut engine, &[&a, &b]);
        match &actions[0] {
            Action::BroadcastTransaction { tx, outcome } => {
                assert_eq!(tx.compute_txid(), unsigned.compute_txid());
                assert_eq!(outcome.result, RoundResult::Success);
                assert_eq!(outcome.round_id, first_round);
                assert_eq!(outcome.nb_must_mix, 2);
                assert_eq!(outcome.txid, Some(unsigned.compute_txid()));
            }
            other => panic!("unexpected action {other:?}"),
        }
        assert_eq!(broadcast_statuses(&actions), vec![RoundStatus::Success]);
        assert!(saved(&actions).is_none());

        // a fresh round took over
        assert_ne!(engine.current_round_id(), first_round);
        assert_eq!(engine.round().status(), RoundStatus::RegisterInput);
        assert_eq!(engine.round().nb_inputs(), 0);
        assert_eq!(limits.state().managed.len(), 2);
        assert_eq!(
            limits.state().statuses,
            vec![RoundStatus::RegisterOutput, RoundStatus::Signing, RoundStatus::Success]
        );

        assert!(register(&mut engine, &a).is_ok());
        assert!(matches!(
            engine.register_signature(&first_round, a.input.username.clone(), WitnessStack::default()),
            Err(RoundError::InvalidRound(_))
        ));
    }

    #[traced_test]
    #[test]
    fn test_output_mismatch_fails_round() {
        let mut engine = engine(2, NoLimits);
        let (a, b) = (client(1, false), client(2, false));
        register(&mut engine, &a).unwrap();
        register(&mut engine, &b).unwrap();
        let round_id = engine.current_round_id();

        engine
            .register_output(&round_id, receive_address(101), receive_address(100), Bordereau::new("x"))
            .unwrap();
        // sends to an address nobody receives at
        let actions = engine
            .register_output(&round_id, receive_address(150), receive_address(101), Bordereau::new("y"))
            .unwrap();

        assert_eq!(broadcast_statuses(&actions), vec![RoundStatus::Fail]);
        assert_eq!(saved(&actions).unwrap().result, RoundResult::FailRegisterOutput);
        assert_ne!(engine.current_round_id(), round_id);
    }

    #[traced_test]
    #[test]
    fn test_bad_witness_fails_round() {
        let mut engine = engine(2, NoLimits);
        let (a, b) = (client(1, false), client(2, false));
        to_signing(&mut engine, &[&a, &b]);
        let round_id = engine.current_round_id();

        let tx = engine.round().tx().unwrap().clone();
        engine
            .register_signature(&round_id, a.input.username.clone(), WitnessStack::default())
            .unwrap();
        assert!(matches!(
            engine.register_signature(&round_id, a.input.username.clone(), WitnessStack::default()),
            Err(RoundError::BadInput(_))
        ));
        let index = tx
            .input
            .iter()
            .position(|i| i.previous_output == b.input.outpoint.outpoint())
            .unwrap();
        let witness = b.key.sign_p2wpkh_input(&tx, index, DENOMINATION + MINER_FEE);
        let actions = engine
            .register_signature(&round_id, b.input.username.clone(), witness)
            .unwrap();

        assert!(!actions.iter().any(|a| matches!(a, Action::BroadcastTransaction { .. })));
        assert_eq!(saved(&actions).unwrap().result, RoundResult::FailSigning);
        assert_ne!(engine.current_round_id(), round_id);
    }

    #[traced_test]
    #[test]
    fn test_unbuildable_transaction_abandons_round() {
        let mut engine = engine(1, NoLimits);
        let a = client(1, false);
        register(&mut engine, &a).unwrap();
        let round_id = engine.current_round_id();

        let actions = engine
            .register_output(&round_id, "garbage".into(), "garbage".into(), Bordereau::new("x"))
            .unwrap();

        assert_eq!(broadcast_statuses(&actions), vec![RoundStatus::Fail]);
        assert_eq!(saved(&actions).unwrap().result, RoundResult::FailSystem);
        assert_ne!(engine.current_round_id(), round_id);
        assert_eq!(engine.round().status(), RoundStatus::RegisterInput);
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Reveal
    // ═══════════════════════════════════════════════════════════════════════════

    #[traced_test]
    #[test]
    fn test_reveal_completion_defers_to_limits() {
        let mut engine = engine(2, ScriptedLimits::default());
        let (a, b) = (client(1, false), client(2, false));
        to_signing(&mut engine, &[&a, &b]);
        let round_id = engine.current_round_id();

        let actions = engine.go_reveal_output_or_blame(&round_id).unwrap();
        assert_eq!(broadcast_statuses(&actions), vec![RoundStatus::RevealOutputOrBlame]);

        let bordereau_a = Bordereau::new("b-user1");
        assert!(matches!(
            engine.reveal_output(&round_id, a.input.username.clone(), Bordereau::new("unknown")),
            Err(RoundError::BadInput(_))
        ));
        assert!(engine
            .reveal_output(&round_id, a.input.username.clone(), bordereau_a.clone())
            .unwrap()
            .is_empty());
        assert!(matches!(
            engine.reveal_output(&round_id, b.input.username.clone(), bordereau_a),
            Err(RoundError::BadInput(_))
        ));

        let actions = engine
            .reveal_output(&round_id, b.input.username.clone(), Bordereau::new("b-user2"))
            .unwrap();
        assert_eq!(saved(&actions).unwrap().result, RoundResult::FailRevealOutput);
        assert_ne!(engine.current_round_id(), round_id);
    }

    #[traced_test]
    #[test]
    fn test_timeout_decision_moves_to_reveal() {
        let limits = ScriptedLimits::default();
        let mut engine = engine(2, limits.clone());
        let (a, b) = (client(1, false), client(2, false));
        register(&mut engine, &a).unwrap();
        register(&mut engine, &b).unwrap();

        limits.state().on_tick = vec![
            LimitsDecision::GoRevealOutputOrBlame,
            LimitsDecision::Fail(RoundResult::FailRevealOutput),
            LimitsDecision::GoRevealOutputOrBlame,
        ];
        let actions = engine.on_tick();
        // the last decision targets the replaced round and is skipped
        assert_eq!(
            broadcast_statuses(&actions),
            vec![RoundStatus::RevealOutputOrBlame, RoundStatus::Fail]
        );
        assert_eq!(engine.round().status(), RoundStatus::RegisterInput);
    }

    #[test]
    fn test_current_notification_and_determinism() {
        let engine1 = engine(2, NoLimits);
        let engine2 = engine(2, NoLimits);
        assert_eq!(engine1.current_round_id(), engine2.current_round_id());

        match engine1.current_round_status_notification().unwrap() {
            Notification::RegisterInput {
                round_id,
                public_key,
                network,
                denomination,
                miner_fee,
            } => {
                assert_eq!(round_id, engine1.current_round_id());
                assert_eq!(public_key, "02ab");
                assert_eq!(network, "regtest");
                assert_eq!(denomination, DENOMINATION);
                assert_eq!(miner_fee, MINER_FEE);
            }
            other => panic!("unexpected notification {other:?}"),
        }
    }
}
