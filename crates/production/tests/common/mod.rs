//! Shared fixtures for coordinator tests.

#![allow(dead_code)]

use async_trait::async_trait;
use bitcoin::{Network, OutPoint, Transaction, Txid};
use coinjoin_core::{Clock, Notification, PrivateMessage, RoundOutcome};
use coinjoin_production::memory::MemoryRoundStore;
use coinjoin_production::{
    BlockchainClient, BlockchainError, Coordinator, CoordinatorConfig, RawTransaction,
    RegisterInputRequest, RoundStore, Transport,
};
use coinjoin_provenance::{FeeDataCodec, FeeValidator};
use coinjoin_test_helpers::{fee_xpub, funding_outpoint, funding_tx, TestKey};
use coinjoin_types::{
    PaymentCode, RoundId, RoundResult, RoundStatus, Username, WitnessStack,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const DENOMINATION: u64 = 1_000_000;
pub const MINER_FEE: u64 = 5_000;
pub const POOL_FEE: u64 = 50_000;
pub const SECRET: &str = "fee-secret";
pub const START: Duration = Duration::from_secs(1_700_000_000);

// ═══════════════════════════════════════════════════════════════════════════
// Collaborators
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Default)]
pub struct MockBlockchain {
    txs: Mutex<HashMap<Txid, RawTransaction>>,
    broadcasts: Mutex<Vec<Transaction>>,
    reject_broadcast: AtomicBool,
}

impl MockBlockchain {
    pub fn add(&self, tx: Transaction, confirmations: u32) {
        self.txs.lock().insert(
            tx.compute_txid(),
            RawTransaction {
                tx,
                confirmations,
                block_time: START.as_secs(),
            },
        );
    }

    pub fn set_confirmations(&self, txid: &Txid, confirmations: u32) {
        if let Some(raw) = self.txs.lock().get_mut(txid) {
            raw.confirmations = confirmations;
        }
    }

    pub fn reject_broadcasts(&self) {
        self.reject_broadcast.store(true, Ordering::SeqCst);
    }

    pub fn broadcasts(&self) -> Vec<Transaction> {
        self.broadcasts.lock().clone()
    }
}

#[async_trait]
impl BlockchainClient for MockBlockchain {
    async fn get_raw_transaction(&self, txid: &Txid) -> Result<Option<RawTransaction>, BlockchainError> {
        Ok(self.txs.lock().get(txid).cloned())
    }

    async fn broadcast_transaction(&self, tx: &Transaction) -> Result<Txid, BlockchainError> {
        if self.reject_broadcast.load(Ordering::SeqCst) {
            return Err(BlockchainError::Rejected("missing inputs".into()));
        }
        self.broadcasts.lock().push(tx.clone());
        Ok(tx.compute_txid())
    }
}

#[derive(Default)]
pub struct RecordingTransport {
    notifications: Mutex<Vec<Notification>>,
    private: Mutex<Vec<(Username, PrivateMessage)>>,
}

impl RecordingTransport {
    pub fn notifications(&self) -> Vec<Notification> {
        self.notifications.lock().clone()
    }

    pub fn statuses(&self) -> Vec<RoundStatus> {
        self.notifications().iter().map(Notification::status).collect()
    }

    pub fn private_for(&self, username: &Username) -> Vec<PrivateMessage> {
        self.private
            .lock()
            .iter()
            .filter(|(u, _)| u == username)
            .map(|(_, m)| m.clone())
            .collect()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn broadcast(&self, notification: &Notification) {
        self.notifications.lock().push(notification.clone());
    }

    async fn send_private(&self, username: &Username, message: &PrivateMessage) {
        self.private.lock().push((username.clone(), message.clone()));
    }
}

pub struct ManualClock(Mutex<Duration>);

impl ManualClock {
    pub fn advance(&self, by: Duration) {
        *self.0.lock() += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        *self.0.lock()
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Harness
// ═══════════════════════════════════════════════════════════════════════════

pub struct Client {
    pub key: TestKey,
    pub username: Username,
    pub outpoint: OutPoint,
    pub liquidity: bool,
}

impl Client {
    pub fn value(&self) -> u64 {
        if self.liquidity {
            DENOMINATION
        } else {
            DENOMINATION + MINER_FEE
        }
    }
}

pub struct Harness {
    pub coordinator: Arc<Coordinator>,
    pub blockchain: Arc<MockBlockchain>,
    pub store: Arc<MemoryRoundStore>,
    pub transport: Arc<RecordingTransport>,
    pub clock: Arc<ManualClock>,
    fee_validator: FeeValidator,
}

pub fn config() -> CoordinatorConfig {
    let mut config = CoordinatorConfig::default()
        .with_fees(fee_xpub(), SECRET)
        .with_denomination(DENOMINATION, MINER_FEE)
        .with_must_mix(2, 1)
        .with_rng_seed(7);
    config.fees.fee_value = POOL_FEE;
    config.round.deterministic_pairing = true;
    config
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(config())
    }

    pub fn with_config(config: CoordinatorConfig) -> Self {
        let blockchain = Arc::new(MockBlockchain::default());
        let store = Arc::new(MemoryRoundStore::new());
        let transport = Arc::new(RecordingTransport::default());
        let clock = Arc::new(ManualClock(Mutex::new(START)));
        let coordinator = Coordinator::new(
            &config,
            blockchain.clone(),
            store.clone(),
            transport.clone(),
            clock.clone(),
        )
        .unwrap();
        let fee_validator = FeeValidator::new(
            &fee_xpub(),
            Network::Regtest,
            FeeDataCodec::new(SECRET),
        )
        .unwrap();

        Self {
            coordinator,
            blockchain,
            store,
            transport,
            clock,
            fee_validator,
        }
    }

    /// A confirmed input funded by a tx0 paying `fee` to the pool.
    pub fn must_mix_paying(&self, seed: u8, fee: u64) -> Client {
        let key = TestKey::new(seed);
        let fee_indice = seed as u32;
        let op_return = self
            .fee_validator
            .codec()
            .encode(fee_indice, None, &funding_outpoint(seed))
            .unwrap();
        let tx = funding_tx(
            &[
                (key.p2wpkh_script(), DENOMINATION + MINER_FEE),
                (self.fee_validator.fee_script(fee_indice).unwrap(), fee),
                (op_return, 0),
            ],
            seed,
        );
        let outpoint = OutPoint {
            txid: tx.compute_txid(),
            vout: 0,
        };
        self.blockchain.add(tx, 1);
        Client {
            key,
            username: Username::new(format!("user{seed}")),
            outpoint,
            liquidity: false,
        }
    }

    pub fn must_mix(&self, seed: u8) -> Client {
        self.must_mix_paying(seed, POOL_FEE)
    }

    /// A confirmed output of a transaction without fee record.
    pub fn plain_input(&self, seed: u8, value: u64) -> Client {
        let key = TestKey::new(seed);
        let tx = funding_tx(&[(key.p2wpkh_script(), value)], seed);
        let outpoint = OutPoint {
            txid: tx.compute_txid(),
            vout: 0,
        };
        self.blockchain.add(tx, 1);
        Client {
            key,
            username: Username::new(format!("user{seed}")),
            outpoint,
            liquidity: true,
        }
    }

    /// A liquidity input spending an output of a recorded successful mix.
    pub async fn liquidity(&self, seed: u8) -> Client {
        let client = self.plain_input(seed, DENOMINATION);
        let outcome = RoundOutcome {
            round_id: RoundId::from_bytes([seed; 16]),
            status: RoundStatus::Success,
            result: RoundResult::Success,
            denomination: DENOMINATION,
            miner_fee: MINER_FEE,
            nb_must_mix: 2,
            nb_liquidities: 0,
            txid: Some(client.outpoint.txid),
            timestamp: START,
        };
        self.store.save_round(&outcome).await.unwrap();
        client
    }

    pub fn request(&self, client: &Client) -> RegisterInputRequest {
        let round_id = self.coordinator.current_round_id();
        RegisterInputRequest {
            round_id,
            username: client.username.clone(),
            outpoint: client.outpoint,
            signature: client.key.sign_message(&round_id.to_hex()),
            payment_code: PaymentCode::new(format!("pc-{}", client.username)),
            ack_payload: client.username.as_str().as_bytes().to_vec(),
            liquidity: client.liquidity,
            test_mode: false,
        }
    }

    pub fn round_status(&self) -> RoundStatus {
        self.coordinator.inspect(|engine| engine.round().status())
    }

    /// Witness of `client` for the current round transaction.
    pub fn sign(&self, client: &Client) -> WitnessStack {
        let tx = self
            .coordinator
            .inspect(|engine| engine.round().tx().cloned())
            .unwrap();
        let index = tx
            .input
            .iter()
            .position(|input| input.previous_output == client.outpoint)
            .unwrap();
        client.key.sign_p2wpkh_input(&tx, index, client.value())
    }

    pub fn advance(&self, secs: u64) {
        self.clock.advance(Duration::from_secs(secs));
    }
}
