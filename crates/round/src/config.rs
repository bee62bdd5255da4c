//! Round engine configuration.

use crate::RoundParams;
use bitcoin::Network;
use std::time::Duration;

/// Configuration for the round engine.
///
/// Round parameters are copied into every new round; later rounds start
/// from these values again whatever adjustments were made to the previous
/// one.
#[derive(Debug, Clone)]
pub struct RoundConfig {
    /// Value of every mix output, in satoshis.
    pub denomination: u64,

    /// Miner fee contribution of each mustMix input, in satoshis.
    pub miner_fee: u64,

    /// Number of mustMix inputs the round waits for.
    pub target_must_mix: usize,

    /// Floor for target adjustments.
    pub min_must_mix: usize,

    /// Maximum share of liquidity relative to `target_must_mix`.
    pub liquidity_ratio: f64,

    /// Idle time after which the mustMix target may be lowered.
    pub must_mix_adjust_timeout: Duration,

    /// Network for address parsing and client notifications.
    pub network: Network,

    /// Hex-encoded coordinator public key announced to clients.
    pub server_public_key: String,

    /// Anonymous endpoint for output registration.
    pub register_output_url: String,

    /// Pair peers in payment-code order instead of shuffling. Tests only.
    pub deterministic_pairing: bool,
}

impl RoundConfig {
    /// Create a configuration for the given denomination and miner fee.
    pub fn new(denomination: u64, miner_fee: u64) -> Self {
        Self {
            denomination,
            miner_fee,
            ..Default::default()
        }
    }

    /// Set the mustMix target.
    pub fn with_target_must_mix(mut self, target: usize) -> Self {
        self.target_must_mix = target;
        self
    }

    /// Set the mustMix floor.
    pub fn with_min_must_mix(mut self, min: usize) -> Self {
        self.min_must_mix = min;
        self
    }

    /// Set the liquidity ratio.
    pub fn with_liquidity_ratio(mut self, ratio: f64) -> Self {
        self.liquidity_ratio = ratio.max(0.0);
        self
    }

    /// Set the target adjustment timeout.
    pub fn with_must_mix_adjust_timeout(mut self, timeout: Duration) -> Self {
        self.must_mix_adjust_timeout = timeout;
        self
    }

    /// Set the network.
    pub fn with_network(mut self, network: Network) -> Self {
        self.network = network;
        self
    }

    /// Set the announced coordinator public key.
    pub fn with_server_public_key(mut self, key: impl Into<String>) -> Self {
        self.server_public_key = key.into();
        self
    }

    /// Set the output registration endpoint.
    pub fn with_register_output_url(mut self, url: impl Into<String>) -> Self {
        self.register_output_url = url.into();
        self
    }

    /// Enable payment-code ordered pairing.
    pub fn with_deterministic_pairing(mut self, enabled: bool) -> Self {
        self.deterministic_pairing = enabled;
        self
    }

    /// Parameters for a new round.
    pub fn round_params(&self) -> RoundParams {
        RoundParams {
            denomination: self.denomination,
            miner_fee: self.miner_fee,
            target_must_mix: self.target_must_mix,
            min_must_mix: self.min_must_mix,
            liquidity_ratio: self.liquidity_ratio,
            must_mix_adjust_timeout: self.must_mix_adjust_timeout,
        }
    }
}

impl Default for RoundConfig {
    fn default() -> Self {
        Self {
            denomination: 1_000_000,
            miner_fee: 5_000,
            target_must_mix: 5,
            min_must_mix: 2,
            liquidity_ratio: 1.0,
            must_mix_adjust_timeout: Duration::from_secs(600),
            network: Network::Regtest,
            server_public_key: String::new(),
            register_output_url: "/registerOutput".to_string(),
            deterministic_pairing: false,
        }
    }
}
