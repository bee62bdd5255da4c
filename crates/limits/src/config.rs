//! Limits policy configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Timeouts and ban duration of the default limits policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Idle time after which one more liquidity is expected, in seconds.
    pub liquidity_interval_secs: u64,

    /// Maximum time in REGISTER_OUTPUT, in seconds.
    pub register_output_timeout_secs: u64,

    /// Maximum time in SIGNING, in seconds.
    pub signing_timeout_secs: u64,

    /// Maximum time in REVEAL_OUTPUT_OR_BLAME, in seconds.
    pub reveal_output_timeout_secs: u64,

    /// How long a blamed outpoint stays banned, in seconds.
    pub ban_duration_secs: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            liquidity_interval_secs: 30,
            register_output_timeout_secs: 60,
            signing_timeout_secs: 60,
            reveal_output_timeout_secs: 60,
            ban_duration_secs: 2 * 60 * 60,
        }
    }
}

impl LimitsConfig {
    pub fn liquidity_interval(&self) -> Duration {
        Duration::from_secs(self.liquidity_interval_secs)
    }

    pub fn register_output_timeout(&self) -> Duration {
        Duration::from_secs(self.register_output_timeout_secs)
    }

    pub fn signing_timeout(&self) -> Duration {
        Duration::from_secs(self.signing_timeout_secs)
    }

    pub fn reveal_output_timeout(&self) -> Duration {
        Duration::from_secs(self.reveal_output_timeout_secs)
    }

    pub fn ban_duration(&self) -> Duration {
        Duration::from_secs(self.ban_duration_secs)
    }

    /// Set the liquidity interval.
    pub fn with_liquidity_interval(mut self, interval: Duration) -> Self {
        self.liquidity_interval_secs = interval.as_secs();
        self
    }

    /// Set the REGISTER_OUTPUT and SIGNING timeouts.
    pub fn with_phase_timeout(mut self, timeout: Duration) -> Self {
        self.register_output_timeout_secs = timeout.as_secs();
        self.signing_timeout_secs = timeout.as_secs();
        self
    }

    /// Set the reveal timeout.
    pub fn with_reveal_output_timeout(mut self, timeout: Duration) -> Self {
        self.reveal_output_timeout_secs = timeout.as_secs();
        self
    }

    /// Set the ban duration.
    pub fn with_ban_duration(mut self, duration: Duration) -> Self {
        self.ban_duration_secs = duration.as_secs();
        self
    }
}
