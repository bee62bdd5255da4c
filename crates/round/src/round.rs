//! The round aggregate: registered inputs, outputs, reveals and signatures.

use bitcoin::{OutPoint, Transaction};
use coinjoin_core::{RoundError, RoundOutcome};
use coinjoin_types::{
    Bordereau, RegisteredInput, RoundId, RoundResult, RoundStatus, Username, WitnessStack,
};
use indexmap::IndexMap;
use std::collections::{HashMap, HashSet};
use std::time::Duration;

/// Immutable parameters of a round.
#[derive(Debug, Clone, PartialEq)]
pub struct RoundParams {
    pub denomination: u64,
    pub miner_fee: u64,
    pub target_must_mix: usize,
    pub min_must_mix: usize,
    pub liquidity_ratio: f64,
    pub must_mix_adjust_timeout: Duration,
}

impl RoundParams {
    /// Value an input of the given class must carry.
    pub fn spend_value(&self, is_liquidity: bool) -> u64 {
        RegisteredInput::expected_value(is_liquidity, self.denomination, self.miner_fee)
    }
}

/// Output declared during REGISTER_OUTPUT.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisteredOutput {
    pub send_address: String,
    pub receive_address: String,
}

/// State of one mix cycle.
#[derive(Debug)]
pub struct Round {
    id: RoundId,
    params: RoundParams,

    /// Current mustMix target. Starts at `params.target_must_mix`.
    target_must_mix: usize,

    status: RoundStatus,
    status_time: Duration,
    created_at: Duration,

    /// Admitted inputs in registration order.
    inputs: IndexMap<OutPoint, RegisteredInput>,
    /// Reverse index: username -> outpoint
    inputs_by_username: HashMap<Username, OutPoint>,

    outputs: IndexMap<Bordereau, RegisteredOutput>,
    receive_addresses: HashSet<String>,

    /// bordereau -> revealing user
    revealed: IndexMap<Bordereau, Username>,
    revealed_users: HashSet<Username>,

    signatures: HashMap<Username, WitnessStack>,

    /// Unsigned from SIGNING on, then signed once every witness verified.
    tx: Option<Transaction>,
    signed: bool,

    fail_reason: Option<RoundResult>,
}

impl Round {
    /// Create a round in REGISTER_INPUT.
    pub fn new(id: RoundId, params: RoundParams, now: Duration) -> Self {
        Self {
            id,
            target_must_mix: params.target_must_mix,
            params,
            status: RoundStatus::RegisterInput,
            status_time: now,
            created_at: now,
            inputs: IndexMap::new(),
            inputs_by_username: HashMap::new(),
            outputs: IndexMap::new(),
            receive_addresses: HashSet::new(),
            revealed: IndexMap::new(),
            revealed_users: HashSet::new(),
            signatures: HashMap::new(),
            tx: None,
            signed: false,
            fail_reason: None,
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Accessors
    // ═══════════════════════════════════════════════════════════════════════════

    pub fn id(&self) -> RoundId {
        self.id
    }

    pub fn params(&self) -> &RoundParams {
        &self.params
    }

    pub fn denomination(&self) -> u64 {
        self.params.denomination
    }

    pub fn miner_fee(&self) -> u64 {
        self.params.miner_fee
    }

    pub fn status(&self) -> RoundStatus {
        self.status
    }

    /// Time the current status was entered.
    pub fn status_time(&self) -> Duration {
        self.status_time
    }

    pub fn created_at(&self) -> Duration {
        self.created_at
    }

    pub fn target_must_mix(&self) -> usize {
        self.target_must_mix
    }

    /// Lower (or restore) the mustMix target.
    ///
    /// Clamped to `min_must_mix` and to the configured target.
    pub fn set_target_must_mix(&mut self, target: usize) {
        self.target_must_mix = target
            .max(self.params.min_must_mix)
            .min(self.params.target_must_mix);
    }

    pub(crate) fn set_status(&mut self, status: RoundStatus, now: Duration) {
        self.status = status;
        self.status_time = now;
    }

    pub fn tx(&self) -> Option<&Transaction> {
        self.tx.as_ref()
    }

    pub(crate) fn set_tx(&mut self, tx: Transaction) {
        self.tx = Some(tx);
        self.signed = false;
    }

    pub(crate) fn set_signed_tx(&mut self, tx: Transaction) {
        self.tx = Some(tx);
        self.signed = true;
    }

    /// Whether the transaction carries verified witnesses.
    pub fn is_signed(&self) -> bool {
        self.signed
    }

    pub fn fail_reason(&self) -> Option<RoundResult> {
        self.fail_reason
    }

    pub(crate) fn set_fail_reason(&mut self, result: RoundResult) {
        self.fail_reason = Some(result);
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Inputs
    // ═══════════════════════════════════════════════════════════════════════════

    /// Admit an input. Capacity is the caller's concern.
    pub fn register_input(&mut self, input: RegisteredInput) -> Result<(), RoundError> {
        let outpoint = input.outpoint.outpoint();
        if self.inputs.contains_key(&outpoint) {
            return Err(RoundError::bad_input("Input already registered for this round"));
        }
        if self.inputs_by_username.contains_key(&input.username) {
            return Err(RoundError::bad_input(
                "Username already registered an input for this round",
            ));
        }
        self.inputs_by_username
            .insert(input.username.clone(), outpoint);
        self.inputs.insert(outpoint, input);
        Ok(())
    }

    pub fn inputs(&self) -> impl Iterator<Item = &RegisteredInput> {
        self.inputs.values()
    }

    pub fn has_input(&self, outpoint: &OutPoint) -> bool {
        self.inputs.contains_key(outpoint)
    }

    pub fn has_username(&self, username: &Username) -> bool {
        self.inputs_by_username.contains_key(username)
    }

    pub fn input_by_username(&self, username: &Username) -> Option<&RegisteredInput> {
        self.inputs_by_username
            .get(username)
            .and_then(|outpoint| self.inputs.get(outpoint))
    }

    pub fn nb_inputs(&self) -> usize {
        self.inputs.len()
    }

    pub fn nb_must_mix(&self) -> usize {
        self.inputs.values().filter(|i| !i.is_liquidity).count()
    }

    pub fn nb_liquidities(&self) -> usize {
        self.inputs.values().filter(|i| i.is_liquidity).count()
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Outputs
    // ═══════════════════════════════════════════════════════════════════════════

    /// Record an output.
    pub fn register_output(
        &mut self,
        send_address: String,
        receive_address: String,
        bordereau: Bordereau,
    ) -> Result<(), RoundError> {
        if self.outputs.contains_key(&bordereau) {
            return Err(RoundError::bad_input("Bordereau already registered"));
        }
        if self.receive_addresses.contains(&receive_address) {
            return Err(RoundError::bad_input("Receive address already registered"));
        }
        self.receive_addresses.insert(receive_address.clone());
        self.outputs.insert(
            bordereau,
            RegisteredOutput {
                send_address,
                receive_address,
            },
        );
        Ok(())
    }

    pub fn nb_outputs(&self) -> usize {
        self.outputs.len()
    }

    pub fn has_bordereau(&self, bordereau: &Bordereau) -> bool {
        self.outputs.contains_key(bordereau)
    }

    pub fn send_addresses(&self) -> impl Iterator<Item = &str> {
        self.outputs.values().map(|o| o.send_address.as_str())
    }

    /// Receive addresses in registration order.
    pub fn receive_addresses(&self) -> impl Iterator<Item = &str> {
        self.outputs.values().map(|o| o.receive_address.as_str())
    }

    /// Whether declared send addresses equal receive addresses as multisets.
    pub fn outputs_match(&self) -> bool {
        let mut send: Vec<&str> = self.send_addresses().collect();
        let mut receive: Vec<&str> = self.receive_addresses().collect();
        send.sort_unstable();
        receive.sort_unstable();
        send == receive
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Reveal
    // ═══════════════════════════════════════════════════════════════════════════

    /// Record that `username` revealed `bordereau`.
    pub fn reveal_output(&mut self, username: Username, bordereau: Bordereau) -> Result<(), RoundError> {
        if !self.outputs.contains_key(&bordereau) {
            return Err(RoundError::bad_input("Invalid bordereau"));
        }
        if self.revealed.contains_key(&bordereau) {
            return Err(RoundError::bad_input("Bordereau already revealed"));
        }
        if !self.has_username(&username) {
            return Err(RoundError::bad_input("User is not a participant of this round"));
        }
        if self.revealed_users.contains(&username) {
            return Err(RoundError::bad_input("User already revealed an output"));
        }
        self.revealed_users.insert(username.clone());
        self.revealed.insert(bordereau, username);
        Ok(())
    }

    pub fn nb_revealed(&self) -> usize {
        self.revealed.len()
    }

    pub fn has_revealed(&self, username: &Username) -> bool {
        self.revealed_users.contains(username)
    }

    pub fn is_bordereau_revealed(&self, bordereau: &Bordereau) -> bool {
        self.revealed.contains_key(bordereau)
    }

    /// Inputs whose owner has not revealed.
    pub fn unrevealed_inputs(&self) -> impl Iterator<Item = &RegisteredInput> {
        self.inputs
            .values()
            .filter(|i| !self.revealed_users.contains(&i.username))
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Signatures
    // ═══════════════════════════════════════════════════════════════════════════

    /// Record the witness of `username`.
    pub fn set_signature(&mut self, username: Username, witness: WitnessStack) -> Result<(), RoundError> {
        if !self.has_username(&username) {
            return Err(RoundError::bad_input("User is not a participant of this round"));
        }
        if self.signatures.contains_key(&username) {
            return Err(RoundError::bad_input("User already signed"));
        }
        self.signatures.insert(username, witness);
        Ok(())
    }

    pub fn signature(&self, username: &Username) -> Option<&WitnessStack> {
        self.signatures.get(username)
    }

    pub fn nb_signatures(&self) -> usize {
        self.signatures.len()
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Outcome
    // ═══════════════════════════════════════════════════════════════════════════

    /// Outcome record for persistence.
    pub fn outcome(&self, status: RoundStatus, result: RoundResult, now: Duration) -> RoundOutcome {
        RoundOutcome {
            round_id: self.id,
            status,
            result,
            denomination: self.params.denomination,
            miner_fee: self.params.miner_fee,
            nb_must_mix: self.nb_must_mix(),
            nb_liquidities: self.nb_liquidities(),
            txid: self.tx.as_ref().map(|tx| tx.compute_txid()),
            timestamp: now,
        }
    }
}
