//! Async façade over the round engine.

use crate::{
    BlockchainClient, ConfigError, CoordinatorConfig, CoordinatorError, NotificationDispatcher,
    RoundStore, Transport,
};
use bitcoin::{Address, Network, OutPoint};
use coinjoin_core::{Action, Clock, Notification, RoundError, RoundOutcome};
use coinjoin_limits::DefaultRoundLimits;
use coinjoin_provenance::ProvenanceValidator;
use coinjoin_round::RoundEngine;
use coinjoin_types::{
    Bordereau, PaymentCode, PoolFee, RegisteredInput, RoundId, RoundResult, RoundStatus,
    TxOutPoint, Username, WitnessStack,
};
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// An input registration as received from an authenticated client.
#[derive(Debug, Clone)]
pub struct RegisterInputRequest {
    pub round_id: RoundId,
    pub username: Username,
    pub outpoint: OutPoint,
    /// Base64 message signature of the round id by the input owner.
    pub signature: String,
    pub payment_code: PaymentCode,
    /// Echoed back in the acknowledgment once the input is admitted.
    pub ack_payload: Vec<u8>,
    pub liquidity: bool,
    /// Ask to skip provenance checks. Honored in test mode only.
    pub test_mode: bool,
}

/// Coordinates mix rounds for one pool.
///
/// Blockchain lookups and provenance checks run without the round lock.
/// Engine calls run under it and never await; the actions they return are
/// executed after the lock is released.
pub struct Coordinator {
    engine: Mutex<RoundEngine>,
    validator: ProvenanceValidator,
    pool_fee: PoolFee,
    network: Network,
    min_confirmations_must_mix: u32,
    min_confirmations_liquidity: u32,

    blockchain: Arc<dyn BlockchainClient>,
    store: Arc<dyn RoundStore>,
    dispatcher: NotificationDispatcher,
    clock: Arc<dyn Clock>,
}

impl Coordinator {
    /// Build a coordinator and its dispatch task.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(
        config: &CoordinatorConfig,
        blockchain: Arc<dyn BlockchainClient>,
        store: Arc<dyn RoundStore>,
        transport: Arc<dyn Transport>,
        clock: Arc<dyn Clock>,
    ) -> Result<Arc<Self>, ConfigError> {
        config.validate()?;
        let validator = config.provenance_validator()?;
        let seed = config.server.rng_seed.unwrap_or_else(rand::random);
        let limits = DefaultRoundLimits::new(config.limits.clone());
        let engine = RoundEngine::new(config.round_config(), Box::new(limits), seed, clock.now());
        let (dispatcher, _handle) = NotificationDispatcher::spawn(transport);

        info!(
            network = %config.server.network,
            denomination = config.round.denomination,
            target_must_mix = config.round.target_must_mix,
            test_mode = config.server.test_mode,
            "Coordinator started"
        );
        if config.server.test_mode {
            warn!("Test mode enabled, clients may skip provenance checks");
        }

        Ok(Arc::new(Self {
            engine: Mutex::new(engine),
            validator,
            pool_fee: config.pool_fee(),
            network: config.server.network,
            min_confirmations_must_mix: config.server.min_confirmations_must_mix,
            min_confirmations_liquidity: config.server.min_confirmations_liquidity,
            blockchain,
            store,
            dispatcher,
            clock,
        }))
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Client requests
    // ═══════════════════════════════════════════════════════════════════════════

    /// Validate and register an input.
    pub async fn register_input(&self, request: RegisterInputRequest) -> Result<(), CoordinatorError> {
        let denomination = self.with_engine(|engine| {
            if engine.current_round_id() != request.round_id {
                return Err(RoundError::invalid_round("Invalid roundId"));
            }
            Ok(engine.config().denomination)
        })?;

        let txid = request.outpoint.txid;
        let raw = self
            .blockchain
            .get_raw_transaction(&txid)
            .await?
            .ok_or_else(|| RoundError::bad_input("UTXO not found"))?;
        let txout = raw
            .tx
            .output
            .get(request.outpoint.vout as usize)
            .ok_or_else(|| RoundError::bad_input("UTXO not found"))?;

        let min_confirmations = if request.liquidity {
            self.min_confirmations_liquidity
        } else {
            self.min_confirmations_must_mix
        };
        if raw.confirmations < min_confirmations {
            debug!(
                outpoint = %request.outpoint,
                confirmations = raw.confirmations,
                min_confirmations,
                "Input not confirmed"
            );
            return Err(RoundError::bad_input("Input is not confirmed").into());
        }

        let mut outpoint = TxOutPoint::new(txid, request.outpoint.vout, txout.value.to_sat());
        if let Ok(address) = Address::from_script(&txout.script_pubkey, self.network) {
            outpoint = outpoint.with_address(address.to_string());
        }

        let pubkey = self.validator.validate_signature(
            &outpoint,
            &request.round_id.to_hex(),
            &request.signature,
        )?;
        let is_prior_mix = self.store.has_mix_txid(&txid, denomination).await?;
        let outpoint = self.validator.validate_provenance(
            &outpoint,
            &raw.tx,
            raw.block_time,
            request.liquidity,
            request.test_mode,
            &self.pool_fee,
            is_prior_mix,
        )?;

        let input = RegisteredInput {
            username: request.username,
            outpoint,
            pubkey,
            payment_code: request.payment_code,
            is_liquidity: request.liquidity,
        };
        let actions = self.with_engine(|engine| {
            engine.register_input(&request.round_id, input, request.ack_payload)
        })?;
        self.execute(actions).await;
        Ok(())
    }

    /// Drop the queued liquidity of a disconnected client.
    pub fn unregister_liquidity(&self, username: &Username) -> bool {
        self.with_engine(|engine| engine.unregister_liquidity(username))
    }

    /// Register an output through the anonymous endpoint.
    pub async fn register_output(
        &self,
        round_id: &RoundId,
        send_address: String,
        receive_address: String,
        bordereau: Bordereau,
    ) -> Result<(), CoordinatorError> {
        let actions = self.with_engine(|engine| {
            engine.register_output(round_id, send_address, receive_address, bordereau)
        })?;
        self.execute(actions).await;
        Ok(())
    }

    pub async fn reveal_output(
        &self,
        round_id: &RoundId,
        username: Username,
        bordereau: Bordereau,
    ) -> Result<(), CoordinatorError> {
        let actions =
            self.with_engine(|engine| engine.reveal_output(round_id, username, bordereau))?;
        self.execute(actions).await;
        Ok(())
    }

    pub async fn register_signature(
        &self,
        round_id: &RoundId,
        username: Username,
        witness: WitnessStack,
    ) -> Result<(), CoordinatorError> {
        let actions =
            self.with_engine(|engine| engine.register_signature(round_id, username, witness))?;
        self.execute(actions).await;
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Operator & status
    // ═══════════════════════════════════════════════════════════════════════════

    pub async fn change_round_status(
        &self,
        round_id: &RoundId,
        status: RoundStatus,
    ) -> Result<(), CoordinatorError> {
        let actions = self.with_engine(|engine| engine.change_round_status(round_id, status))?;
        self.execute(actions).await;
        Ok(())
    }

    pub async fn go_reveal_output_or_blame(&self, round_id: &RoundId) -> Result<(), CoordinatorError> {
        self.change_round_status(round_id, RoundStatus::RevealOutputOrBlame)
            .await
    }

    pub async fn go_fail(&self, round_id: &RoundId, result: RoundResult) -> Result<(), CoordinatorError> {
        let actions = self.with_engine(|engine| engine.go_fail(round_id, result))?;
        self.execute(actions).await;
        Ok(())
    }

    /// Notification describing the current phase, for new subscribers.
    pub fn current_round_status_notification(&self) -> Result<Notification, CoordinatorError> {
        Ok(self.with_engine(|engine| engine.current_round_status_notification())?)
    }

    pub fn current_round_id(&self) -> RoundId {
        self.engine.lock().current_round_id()
    }

    /// Read engine state under the round lock.
    pub fn inspect<T>(&self, f: impl FnOnce(&RoundEngine) -> T) -> T {
        f(&self.engine.lock())
    }

    /// Run the limits policy once.
    pub async fn tick(&self) {
        let actions = self.with_engine(|engine| engine.on_tick());
        self.execute(actions).await;
    }

    /// Tick every `interval` until the coordinator is dropped.
    pub fn spawn_ticker(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let coordinator: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(coordinator) = coordinator.upgrade() else {
                    debug!("Coordinator dropped, ticker stopped");
                    return;
                };
                coordinator.tick().await;
            }
        })
    }

    /// Wait until every queued notification reached the transport.
    pub async fn flush_notifications(&self) {
        self.dispatcher.flush().await;
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Action execution
    // ═══════════════════════════════════════════════════════════════════════════

    fn with_engine<T>(&self, f: impl FnOnce(&mut RoundEngine) -> T) -> T {
        let mut engine = self.engine.lock();
        engine.set_time(self.clock.now());
        f(&mut engine)
    }

    async fn execute(&self, actions: Vec<Action>) {
        for action in actions {
            match action {
                Action::Broadcast(notification) => self.dispatcher.broadcast(notification),
                Action::SendPrivate { username, message } => {
                    self.dispatcher.send_private(username, message)
                }
                Action::BroadcastTransaction { tx, outcome } => {
                    let outcome = match self.blockchain.broadcast_transaction(&tx).await {
                        Ok(txid) => {
                            info!(round_id = %outcome.round_id, %txid, "Mix transaction broadcast");
                            outcome
                        }
                        Err(e) => {
                            error!(
                                round_id = %outcome.round_id,
                                txid = %tx.compute_txid(),
                                error = %e,
                                "Unable to broadcast mix transaction"
                            );
                            outcome.with_result(RoundResult::FailBroadcast)
                        }
                    };
                    self.save(outcome).await;
                }
                Action::SaveRound(outcome) => self.save(outcome).await,
            }
        }
    }

    async fn save(&self, outcome: RoundOutcome) {
        match self.store.save_round(&outcome).await {
            Ok(()) => debug!(round_id = %outcome.round_id, result = %outcome.result, "Round saved"),
            Err(e) => warn!(round_id = %outcome.round_id, error = %e, "Unable to save round"),
        }
    }
}
