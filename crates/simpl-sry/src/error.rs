use std::path::PathBuf;
use std::time::Duration;

use simpl_transport::TransportError;
use simpl_wire::WireError;

/// Errors returned by SRY messaging operations.
#[derive(Debug, thiserror::Error)]
pub enum SryError {
    /// The operation needs a registered identity.
    #[error("not registered")]
    NotRegistered,

    /// This handle is already registered.
    #[error("already registered as {0}")]
    AlreadyActive(String),

    /// The name cannot be used as a registration or locate target.
    #[error("invalid name {name:?}: {reason}")]
    InvalidName { name: String, reason: &'static str },

    /// Another live process holds the name.
    #[error("name {name} is held by live process {pid}")]
    NameConflict { name: String, pid: u32 },

    /// The FIFO directory cannot be used.
    #[error("no transport path at {path}: {source}")]
    NoTransportPath {
        path: PathBuf,
        source: std::io::Error,
    },

    /// No live receiver with that name.
    #[error("{name} not found{}", host.as_deref().map(|h| format!(" on {h}")).unwrap_or_default())]
    NotFound { name: String, host: Option<String> },

    /// FIFO or shared-memory failure; the transport is presumed dead.
    #[error("transport error: {0}")]
    Transport(TransportError),

    /// Surrogate framing failure.
    #[error("wire error: {0}")]
    Wire(#[from] WireError),

    /// A buffer cannot hold the message or reply.
    #[error("buffer too small: need {needed} bytes, have {capacity}")]
    BufferTooSmall { needed: usize, capacity: usize },

    /// The reply exceeds what the sender declared it would accept.
    #[error("reply of {len} bytes exceeds sender's capacity of {capacity}")]
    ReplyTooLarge { len: usize, capacity: usize },

    /// The receiver answered with the error signal.
    #[error("receiver replied with an error")]
    ReplyFailed,

    /// No answer within the negotiation window.
    #[error("no response within {0:?}")]
    RemoteTimeout(Duration),

    /// Unexpected signal, record or token.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// A proxy value outside the encodable range, or a non-proxy passed to
    /// the decoder.
    #[error("invalid proxy value {0}")]
    InvalidProxy(i64),

    /// A bounded bookkeeping table is full.
    #[error("{table} table is full ({capacity} entries)")]
    TableFull {
        table: &'static str,
        capacity: usize,
    },
}

impl From<TransportError> for SryError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::NoFifoDir { path, source } => SryError::NoTransportPath { path, source },
            other => SryError::Transport(other),
        }
    }
}

impl SryError {
    /// True for failures that mean "nobody answered", which callers are
    /// expected to handle quietly.
    pub fn is_not_found(&self) -> bool {
        matches!(self, SryError::NotFound { .. } | SryError::RemoteTimeout(_))
    }
}

pub type Result<T> = std::result::Result<T, SryError>;
