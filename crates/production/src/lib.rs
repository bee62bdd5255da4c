//! Production runner for the mix round coordinator.
//!
//! Wraps the synchronous [`RoundEngine`](coinjoin_round::RoundEngine) in an
//! async [`Coordinator`] that:
//!
//! - fetches source transactions and validates provenance outside the
//!   round lock,
//! - serializes every engine call behind a single lock,
//! - delivers notifications on a separate task,
//! - broadcasts mix transactions and persists round outcomes.

mod collaborators;
mod config;
mod coordinator;
mod dispatcher;
mod error;
pub mod memory;
pub mod telemetry;

pub use collaborators::{BlockchainClient, RawTransaction, RoundStore, Transport};
pub use config::{CoordinatorConfig, DiscountCode, FeeAccept, FeesConfig, RoundSection, ServerConfig};
pub use coordinator::{Coordinator, RegisterInputRequest};
pub use dispatcher::NotificationDispatcher;
pub use error::{BlockchainError, ConfigError, CoordinatorError, StoreError};
