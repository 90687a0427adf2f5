use std::time::Duration;

use seedfeed_protocol::ProtocolError;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed frame, record, command reply or catalog.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("could not connect to {addr} within {after:?}")]
    ConnectTimeout { addr: String, after: Duration },

    /// Nothing arrived from the server within the network timeout.
    #[error("no data from server for {0:?}")]
    ReadTimeout(Duration),

    /// EOF on the socket.
    #[error("disconnected")]
    Disconnected,

    /// The server answered `ERROR`.
    #[error("server error: {0}")]
    ServerError(String),

    /// Call not allowed in the current client state, e.g. `station` after
    /// `end_stream`.
    #[error("invalid state: expected {expected}, actual {actual}")]
    InvalidState {
        expected: &'static str,
        actual: &'static str,
    },

    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),

    /// A line of a saved connection state blob could not be read.
    #[error("invalid connection state at line {line}: {reason}")]
    InvalidConnectionState { line: usize, reason: String },
}

pub type Result<T> = std::result::Result<T, ClientError>;
