//! Coordinator configuration file.
//!
//! ```toml
//! [server]
//! network = "regtest"
//! public_key = "02..."
//!
//! [round]
//! denomination = 1000000
//! miner_fee = 5000
//! target_must_mix = 5
//!
//! [fees]
//! xpub = "tpub..."
//! secret = "..."
//! fee_value = 50000
//!
//! [limits]
//! ban_duration_secs = 7200
//! ```

use crate::ConfigError;
use bitcoin::Network;
use coinjoin_limits::LimitsConfig;
use coinjoin_provenance::{FeeDataCodec, FeeValidator, ProvenanceValidator};
use coinjoin_round::RoundConfig;
use coinjoin_types::PoolFee;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Top-level coordinator configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    pub server: ServerConfig,
    pub round: RoundSection,
    pub fees: FeesConfig,
    pub limits: LimitsConfig,
}

/// Process-level settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub network: Network,

    /// Public key clients use to blind their outputs.
    pub public_key: String,

    /// Anonymous output registration endpoint announced to clients.
    pub register_output_url: String,

    /// Let clients skip provenance checks. Never enable in production.
    pub test_mode: bool,

    /// Interval between limits ticks, in milliseconds.
    pub tick_interval_ms: u64,

    /// Seed of the engine RNG. Random when unset.
    pub rng_seed: Option<u64>,

    pub min_confirmations_must_mix: u32,
    pub min_confirmations_liquidity: u32,

    /// Default log filter, overridden by `RUST_LOG`.
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            network: Network::Regtest,
            public_key: String::new(),
            register_output_url: "/registerOutput".to_string(),
            test_mode: false,
            tick_interval_ms: 1_000,
            rng_seed: None,
            min_confirmations_must_mix: 1,
            min_confirmations_liquidity: 1,
            log_level: "info".to_string(),
        }
    }
}

/// Round parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoundSection {
    pub denomination: u64,
    pub miner_fee: u64,
    pub target_must_mix: usize,
    pub min_must_mix: usize,
    pub liquidity_ratio: f64,
    pub must_mix_adjust_timeout_secs: u64,
    pub deterministic_pairing: bool,
}

impl Default for RoundSection {
    fn default() -> Self {
        let defaults = RoundConfig::default();
        Self {
            denomination: defaults.denomination,
            miner_fee: defaults.miner_fee,
            target_must_mix: defaults.target_must_mix,
            min_must_mix: defaults.min_must_mix,
            liquidity_ratio: defaults.liquidity_ratio,
            must_mix_adjust_timeout_secs: defaults.must_mix_adjust_timeout.as_secs(),
            deterministic_pairing: false,
        }
    }
}

/// A grandfathered fee value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeAccept {
    pub fee_value: u64,
    /// Latest accepted block time for this value, seconds since the epoch.
    pub max_time: u64,
}

/// A discount code and the payload value it maps to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscountCode {
    pub code: String,
    pub value: i16,
}

/// Pool fee settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeesConfig {
    /// Extended public key the fee addresses derive from.
    pub xpub: String,

    /// Secret masking the fee records.
    pub secret: String,

    pub fee_value: u64,

    #[serde(rename = "accept")]
    pub fee_accept: Vec<FeeAccept>,

    pub discount_codes: Vec<DiscountCode>,
}

impl Default for FeesConfig {
    fn default() -> Self {
        Self {
            xpub: String::new(),
            secret: String::new(),
            fee_value: 50_000,
            fee_accept: Vec::new(),
            discount_codes: Vec::new(),
        }
    }
}

impl CoordinatorConfig {
    /// Read and validate a TOML configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config: Self = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Set the fee xpub and masking secret.
    pub fn with_fees(mut self, xpub: impl Into<String>, secret: impl Into<String>) -> Self {
        self.fees.xpub = xpub.into();
        self.fees.secret = secret.into();
        self
    }

    /// Set the round denomination and miner fee.
    pub fn with_denomination(mut self, denomination: u64, miner_fee: u64) -> Self {
        self.round.denomination = denomination;
        self.round.miner_fee = miner_fee;
        self
    }

    /// Set the mustMix target and minimum.
    pub fn with_must_mix(mut self, target: usize, min: usize) -> Self {
        self.round.target_must_mix = target;
        self.round.min_must_mix = min;
        self
    }

    /// Set the limits policy configuration.
    pub fn with_limits(mut self, limits: LimitsConfig) -> Self {
        self.limits = limits;
        self
    }

    /// Enable or disable test mode.
    pub fn with_test_mode(mut self, test_mode: bool) -> Self {
        self.server.test_mode = test_mode;
        self
    }

    /// Set the engine RNG seed.
    pub fn with_rng_seed(mut self, seed: u64) -> Self {
        self.server.rng_seed = Some(seed);
        self
    }

    /// Check the values the engine relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let round = &self.round;
        if round.denomination == 0 {
            return Err(ConfigError::Invalid("round.denomination must be positive".into()));
        }
        if round.min_must_mix == 0 {
            return Err(ConfigError::Invalid("round.min_must_mix must be at least 1".into()));
        }
        if round.target_must_mix < round.min_must_mix {
            return Err(ConfigError::Invalid(format!(
                "round.target_must_mix ({}) is below round.min_must_mix ({})",
                round.target_must_mix, round.min_must_mix
            )));
        }
        if !round.liquidity_ratio.is_finite() || round.liquidity_ratio < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "round.liquidity_ratio must be a non-negative number, got {}",
                round.liquidity_ratio
            )));
        }
        if self.server.tick_interval_ms == 0 {
            return Err(ConfigError::Invalid("server.tick_interval_ms must be positive".into()));
        }
        if self.fees.xpub.is_empty() {
            return Err(ConfigError::Invalid("fees.xpub is required".into()));
        }
        if self.fees.secret.is_empty() {
            return Err(ConfigError::Invalid("fees.secret is required".into()));
        }
        Ok(())
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.server.tick_interval_ms)
    }

    /// Engine configuration.
    pub fn round_config(&self) -> RoundConfig {
        let round = &self.round;
        RoundConfig::new(round.denomination, round.miner_fee)
            .with_target_must_mix(round.target_must_mix)
            .with_min_must_mix(round.min_must_mix)
            .with_liquidity_ratio(round.liquidity_ratio)
            .with_must_mix_adjust_timeout(Duration::from_secs(round.must_mix_adjust_timeout_secs))
            .with_network(self.server.network)
            .with_server_public_key(self.server.public_key.clone())
            .with_register_output_url(self.server.register_output_url.clone())
            .with_deterministic_pairing(round.deterministic_pairing)
    }

    pub fn pool_fee(&self) -> PoolFee {
        self.fees
            .fee_accept
            .iter()
            .fold(PoolFee::new(self.fees.fee_value), |fee, accept| {
                fee.with_accept(accept.fee_value, accept.max_time)
            })
    }

    /// Build the provenance validator from the fee settings.
    pub fn provenance_validator(&self) -> Result<ProvenanceValidator, ConfigError> {
        let codec = FeeDataCodec::new(self.fees.secret.as_bytes());
        let fee_validator = self
            .fees
            .discount_codes
            .iter()
            .fold(
                FeeValidator::new(&self.fees.xpub, self.server.network, codec)?,
                |validator, discount| validator.with_discount_code(discount.value),
            );
        Ok(ProvenanceValidator::new(fee_validator).with_test_mode(self.server.test_mode))
    }
}
