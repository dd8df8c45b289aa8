//! Error types.

use std::fmt;

/// Transport-level failure. From the engine's point of view every variant
/// means the same thing: the reply never arrived, and the next tick retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportError {
    /// No route to the target peer.
    Unreachable,
    /// The message (or its reply) was dropped in flight.
    Dropped,
    /// No reply within the call timeout.
    Timeout,
    /// Failed to establish a connection.
    Connect,
    /// Failed to accept an inbound connection.
    Accept,
    /// Failed to write the request frame.
    Send,
    /// Failed to read the reply frame.
    Recv,
    /// The target peer's engine has shut down.
    Closed,
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::Unreachable => f.write_str("peer unreachable"),
            TransportError::Dropped => f.write_str("message dropped"),
            TransportError::Timeout => f.write_str("call timed out"),
            TransportError::Connect => f.write_str("connection failed"),
            TransportError::Accept => f.write_str("accept failed"),
            TransportError::Send => f.write_str("sending request failed"),
            TransportError::Recv => f.write_str("receiving reply failed"),
            TransportError::Closed => f.write_str("peer engine shut down"),
        }
    }
}

impl std::error::Error for TransportError {}

/// The engine is no longer running; its queues are gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineError {
    Closed,
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::Closed => f.write_str("engine shut down"),
        }
    }
}

impl std::error::Error for EngineError {}
