//! Shared vocabulary for the warehouse realtime subsystem.
//!
//! These types describe what the hosted change feed delivers (topics, event kinds,
//! change events, channel status) and what the client-side query cache is keyed by
//! (cache domains). They carry no behavior beyond parsing and display.

pub mod change;
pub mod domain;
pub mod error;
pub mod topic;

pub use change::*;
pub use domain::*;
pub use error::*;
pub use topic::*;
