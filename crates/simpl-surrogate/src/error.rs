use std::path::PathBuf;
use std::time::Duration;

use simpl_sry::SryError;
use simpl_transport::TransportError;
use simpl_wire::WireError;

/// Errors raised by surrogate stations and sessions.
#[derive(Debug, thiserror::Error)]
pub enum SurrogateError {
    /// Local messaging failure.
    #[error("sry error: {0}")]
    Sry(#[from] SryError),

    /// Framing failure on the link.
    #[error("wire error: {0}")]
    Wire(#[from] WireError),

    /// FIFO or poll failure.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Could not reach the remote surrogate.
    #[error("cannot connect to {host}:{port}: {source}")]
    Connect {
        host: String,
        port: u16,
        source: std::io::Error,
    },

    /// Could not bind the listening socket.
    #[error("cannot listen on port {port}: {source}")]
    Listen { port: u16, source: std::io::Error },

    /// Could not open or configure the serial device.
    #[error("serial device {device}: {source}")]
    Serial {
        device: PathBuf,
        source: std::io::Error,
    },

    /// A frame arrived that the session state does not allow.
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// A session request was refused (message size above the limit).
    #[error("session refused: {0}")]
    Refused(String),

    /// The peer went quiet for longer than the keep-alive allows.
    #[error("peer silent for {0:?}")]
    KeepAliveExpired(Duration),

    /// Generic I/O failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SurrogateError>;
