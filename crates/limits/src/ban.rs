//! Temporary bans of blamed outpoints.

use bitcoin::OutPoint;
use std::collections::HashMap;
use std::time::Duration;

const CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

/// Ban state for a single outpoint.
#[derive(Debug, Clone)]
struct BanEntry {
    /// Time after which the ban no longer applies.
    expires_at: Duration,
    /// Why the outpoint was banned.
    reason: String,
}

/// Outpoints excluded from mixing until their ban expires.
///
/// Time is supplied by the caller.
#[derive(Debug, Default)]
pub struct BanRegistry {
    bans: HashMap<OutPoint, BanEntry>,
    /// Last cleanup time.
    last_cleanup: Duration,
}

impl BanRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ban `outpoint` until `now + duration`. An existing ban is extended,
    /// never shortened.
    pub fn ban(&mut self, outpoint: OutPoint, now: Duration, duration: Duration, reason: impl Into<String>) {
        let expires_at = now + duration;
        let reason = reason.into();
        self.bans
            .entry(outpoint)
            .and_modify(|entry| {
                if expires_at > entry.expires_at {
                    entry.expires_at = expires_at;
                    entry.reason = reason.clone();
                }
            })
            .or_insert(BanEntry { expires_at, reason });
    }

    /// Check if `outpoint` is banned at `now`.
    pub fn is_banned(&self, outpoint: &OutPoint, now: Duration) -> bool {
        self.bans
            .get(outpoint)
            .is_some_and(|entry| now < entry.expires_at)
    }

    /// Reason of an active ban.
    pub fn reason(&self, outpoint: &OutPoint, now: Duration) -> Option<&str> {
        self.bans
            .get(outpoint)
            .filter(|entry| now < entry.expires_at)
            .map(|entry| entry.reason.as_str())
    }

    /// Drop expired bans, at most once per cleanup interval.
    pub fn maybe_cleanup(&mut self, now: Duration) {
        if now.saturating_sub(self.last_cleanup) < CLEANUP_INTERVAL {
            return;
        }
        self.bans.retain(|_, entry| now < entry.expires_at);
        self.last_cleanup = now;
    }

    /// Get the number of tracked bans, expired or not.
    pub fn len(&self) -> usize {
        self.bans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bans.is_empty()
    }
}
