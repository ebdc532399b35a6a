//! Error types for the BGAPI serial handler.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use bgapi_protocol::{PacketKey, ProtocolError};
use thiserror::Error;

/// Errors surfaced to callers of the handler and to lifecycle listeners.
///
/// `Clone` so a single fatal cause can complete every waiting transaction.
#[derive(Error, Debug, Clone)]
pub enum TransportError {
    /// Reading or writing the serial stream failed.
    #[error("I/O error: {0}")]
    Io(Arc<io::Error>),

    /// The handler was closed or the input stream ended.
    #[error("Connection closed")]
    ConnectionClosed,

    /// No response arrived within the transaction timeout.
    #[error("Transaction timed out after {0:?}")]
    Timeout(Duration),

    /// The command is never answered, so it cannot be correlated.
    #[error("Command {0} has no response")]
    NoResponseExpected(PacketKey),

    /// The worker runtime could not be started or a worker failed.
    #[error("Runtime error: {0}")]
    Runtime(String),

    /// A frame could not be framed or decoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

impl From<io::Error> for TransportError {
    fn from(e: io::Error) -> Self {
        TransportError::Io(Arc::new(e))
    }
}

impl TransportError {
    /// True for errors that mean the link is gone.
    pub fn is_connection_error(&self) -> bool {
        matches!(self, TransportError::Io(_) | TransportError::ConnectionClosed)
    }
}
