//! Time source for the runner.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Source of the current time.
///
/// The round engine never reads the clock itself. The runner reads a
/// `Clock` and passes the value to `set_time()` before every call, so tests
/// can drive time explicitly.
pub trait Clock: Send + Sync {
    /// Current time as a duration since the Unix epoch.
    fn now(&self) -> Duration;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO)
    }
}
