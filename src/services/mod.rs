//! Business logic services.
//!
//! The engine and its two storage seams (membership directory and pull
//! request ledger) live here, next to the team/user services and the HTTP
//! layer that exposes them.
//!
//! Services are designed to be testable and independent of the HTTP layer.

pub mod api;
pub mod engine;
pub mod ledger;
pub mod membership;
pub mod memory;
pub mod server;
pub mod teams;
pub mod users;

pub use engine::ReviewerEngine;
pub use ledger::{PullRequestLedger, SqliteLedger};
pub use membership::{MembershipDirectory, SqliteDirectory};
