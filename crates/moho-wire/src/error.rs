//! Error kinds surfaced by the middleware core.
//!
//! Library components signal errors to their caller; the service layer
//! converts everything at the reply boundary into a typed return code so the
//! client always receives a reply.

use thiserror::Error;

/// Errors surfaced across the packet cache core.
#[derive(Debug, Error)]
pub enum Error {
    /// Bad input at a public API boundary.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// Operation on an object missing required state.
    #[error("invalid state: {0}")]
    InvalidState(String),
    /// Queried channel is not in the cache.
    #[error("unknown sensor: {0}")]
    UnknownSensor(String),
    /// Channel naming mismatch across a response's packets.
    #[error("inconsistent packets: {0}")]
    InconsistentPackets(String),
    /// A wire message failed to decode.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
    /// Unexpected internal error while serving a valid request.
    #[error("algorithmic failure: {0}")]
    AlgorithmicFailure(String),
    /// Transport-layer failure in a feeder or reply loop.
    #[error("transport failure: {0}")]
    TransportFailure(String),
    /// No packets available.
    #[error("no packets")]
    Empty,
    /// Sampling rate outside the classifiable range.
    #[error("cannot classify sampling rate: {0} Hz")]
    UnknownRate(i32),
    /// Requested window starts after the available data ends.
    #[error("out of range: {0}")]
    OutOfRange(String),
}

/// Convenience alias used across the workspace.
pub type Result<T> = std::result::Result<T, Error>;
