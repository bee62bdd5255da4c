use coinjoin_types::bitcoin::OutPoint;
use coinjoin_types::{RegisteredLiquidity, Username};
use indexmap::IndexMap;
use rand::Rng;
use std::collections::HashMap;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LiquidityError {
    #[error("Liquidity already registered for this outpoint")]
    AlreadyQueued,

    #[error("Liquidity already registered for this user")]
    UsernameQueued,
}

/// Queued liquidity, indexed by outpoint and by owner.
///
/// Insertion order is preserved so that draws are reproducible for a given
/// RNG seed.
#[derive(Debug, Default)]
pub struct LiquidityPool {
    /// outpoint -> queued liquidity
    by_outpoint: IndexMap<OutPoint, RegisteredLiquidity>,
    /// Reverse index: username -> outpoint
    by_username: HashMap<Username, OutPoint>,
}

impl LiquidityPool {
    /// Create a new empty pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a liquidity.
    ///
    /// An outpoint or username may only be queued once.
    pub fn register_liquidity(&mut self, liquidity: RegisteredLiquidity) -> Result<(), LiquidityError> {
        let outpoint = liquidity.input.outpoint.outpoint();
        if self.by_outpoint.contains_key(&outpoint) {
            return Err(LiquidityError::AlreadyQueued);
        }
        if self.by_username.contains_key(&liquidity.input.username) {
            return Err(LiquidityError::UsernameQueued);
        }

        debug!(
            username = %liquidity.input.username,
            outpoint = %liquidity.input.outpoint,
            queued = self.by_outpoint.len() + 1,
            "Liquidity queued"
        );
        self.by_username
            .insert(liquidity.input.username.clone(), outpoint);
        self.by_outpoint.insert(outpoint, liquidity);
        Ok(())
    }

    /// Remove and return a random queued liquidity.
    pub fn take_random<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Option<RegisteredLiquidity> {
        if self.by_outpoint.is_empty() {
            return None;
        }
        let index = rng.gen_range(0..self.by_outpoint.len());
        let (_, liquidity) = self.by_outpoint.shift_remove_index(index)?;
        self.by_username.remove(&liquidity.input.username);
        Some(liquidity)
    }

    /// Remove the liquidity queued for `outpoint`.
    pub fn remove(&mut self, outpoint: &OutPoint) -> Option<RegisteredLiquidity> {
        let liquidity = self.by_outpoint.shift_remove(outpoint)?;
        self.by_username.remove(&liquidity.input.username);
        Some(liquidity)
    }

    /// Remove the liquidity queued by `username` (client disconnected).
    pub fn remove_by_username(&mut self, username: &Username) -> Option<RegisteredLiquidity> {
        let outpoint = self.by_username.get(username).copied()?;
        self.remove(&outpoint)
    }

    /// Check if an outpoint is queued.
    pub fn contains(&self, outpoint: &OutPoint) -> bool {
        self.by_outpoint.contains_key(outpoint)
    }

    /// Check if a user has queued liquidity.
    pub fn contains_username(&self, username: &Username) -> bool {
        self.by_username.contains_key(username)
    }

    /// Check if at least one liquidity is queued.
    pub fn has_liquidity(&self) -> bool {
        !self.by_outpoint.is_empty()
    }

    /// Get the number of queued liquidities.
    pub fn len(&self) -> usize {
        self.by_outpoint.len()
    }

    /// Check if the pool is empty.
    pub fn is_empty(&self) -> bool {
        self.by_outpoint.is_empty()
    }
}
