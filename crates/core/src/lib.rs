//! Core types for the round coordinator.
//!
//! The round engine is a synchronous state machine. It never performs I/O;
//! instead every call returns a list of [`Action`]s which the runner executes:
//!
//! - `Action::Broadcast` → phase notification to every connected client
//! - `Action::SendPrivate` → message to one authenticated client
//! - `Action::BroadcastTransaction` → push the mix transaction to the network
//! - `Action::SaveRound` → persist the outcome of a concluded round

mod action;
mod error;
mod message;
mod outcome;
mod traits;

pub use action::Action;
pub use error::RoundError;
pub use message::{Notification, PrivateMessage};
pub use outcome::RoundOutcome;
pub use traits::{Clock, SystemClock};
