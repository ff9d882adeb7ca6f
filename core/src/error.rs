use thiserror::Error;

use crate::state::ConnectionState;
use crate::transport::ConnectionId;

/// Failure to start a subscription attempt. Treated by the manager exactly like a
/// `channel_error` status for that attempt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),
    #[error("transport unavailable: {0}")]
    Unavailable(String),
}

/// A connection-state transition the lifecycle refused to make.
///
/// These never reach UI consumers; the manager logs and drops them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("callback for superseded connection {stale} (current {current:?})")]
    Stale { stale: ConnectionId, current: Option<ConnectionId> },
    #[error("invalid transition {from} -> {to}")]
    Invalid { from: ConnectionState, to: ConnectionState },
    #[error("automatic retries exhausted")]
    Exhausted,
}
