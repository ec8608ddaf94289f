use std::io;
use thiserror::Error;

/// Top-level error returned by [`crate::Client::execute`].
///
/// Each variant wraps the error of one call phase, so callers can tell a
/// failed connection attempt apart from a failed transmission or a failure
/// while assembling the response.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("connect error: {source}")]
    Connect {
        #[from]
        source: ConnectError,
    },

    #[error("transmit error: {source}")]
    Transmit {
        #[from]
        source: TransmitError,
    },

    #[error("receive error: {source}")]
    Receive {
        #[from]
        source: ReceiveError,
    },
}

/// Errors raised while establishing (or reusing) a connection.
#[derive(Error, Debug)]
pub enum ConnectError {
    #[error("engine refused to open connection: {source}")]
    Engine {
        #[from]
        source: EngineError,
    },

    #[error("invalid target uri: {reason}")]
    InvalidTarget { reason: String },

    #[error("proxy tunnel rejected with status {status}")]
    TunnelRejected { status: u16 },

    #[error("timed out waiting for connection")]
    Timeout,
}

impl ConnectError {
    pub fn invalid_target<S: ToString>(reason: S) -> Self {
        Self::InvalidTarget { reason: reason.to_string() }
    }

    pub fn tunnel_rejected(status: u16) -> Self {
        Self::TunnelRejected { status }
    }
}

/// Errors raised while sending the request head or body chunks.
#[derive(Error, Debug)]
pub enum TransmitError {
    #[error("engine rejected send: {source}")]
    Engine {
        #[from]
        source: EngineError,
    },
}

/// Errors raised while waiting for and assembling the response.
#[derive(Error, Debug)]
pub enum ReceiveError {
    #[error("timed out waiting for response notification")]
    Timeout,

    #[error("response body exceeds limit, allowed: {limit}, received: {size}")]
    BodyTooLarge { limit: usize, size: usize },

    #[error("connection closed: {reason}")]
    ConnectionClosed { reason: String },

    #[error("engine reported error: {reason}")]
    Engine { reason: String },
}

impl ReceiveError {
    pub fn body_too_large(limit: usize, size: usize) -> Self {
        Self::BodyTooLarge { limit, size }
    }

    pub fn connection_closed<S: ToString>(reason: S) -> Self {
        Self::ConnectionClosed { reason: reason.to_string() }
    }

    pub fn engine<S: ToString>(reason: S) -> Self {
        Self::Engine { reason: reason.to_string() }
    }
}

/// Failure type of the backend [`crate::engine::Engine`] itself.
///
/// `BadOption` is special: when `open` rejects the split transport-options
/// shape by naming `tcp_opts` or `tls_opts`, the connection manager retries
/// once with the legacy combined shape (the only automatic retry in the
/// crate). Every other variant is terminal.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("unsupported option: {key}")]
    BadOption { key: String },

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },

    #[error("connection refused: {reason}")]
    Refused { reason: String },

    #[error("connection already closed")]
    Closed,
}

impl EngineError {
    pub fn bad_option<S: ToString>(key: S) -> Self {
        Self::BadOption { key: key.to_string() }
    }

    pub fn refused<S: ToString>(reason: S) -> Self {
        Self::Refused { reason: reason.to_string() }
    }

    pub fn io<E: Into<io::Error>>(e: E) -> Self {
        Self::Io { source: e.into() }
    }

    /// True when this is the split-options rejection that triggers the
    /// combined-shape fallback during connection open.
    pub fn is_split_options_rejection(&self) -> bool {
        matches!(self, Self::BadOption { key } if key == "tcp_opts" || key == "tls_opts")
    }
}
