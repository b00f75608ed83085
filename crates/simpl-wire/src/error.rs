/// Errors that can occur while framing surrogate traffic.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    /// A header or body field is not an ASCII decimal number.
    #[error("invalid {field} field: {raw:?}")]
    InvalidField { field: &'static str, raw: String },

    /// The token field does not name a known message.
    #[error("unknown token {0}")]
    UnknownToken(i64),

    /// A value does not fit its fixed-width field.
    #[error("{field} value {value} does not fit a {width}-byte field")]
    FieldOverflow {
        field: &'static str,
        value: String,
        width: usize,
    },

    /// Payload exceeds the negotiated maximum.
    #[error("payload too large: {size} bytes (max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// A message body has the wrong length for its kind.
    #[error("{kind} body must be {expected} bytes, got {actual}")]
    BodyLength {
        kind: &'static str,
        expected: usize,
        actual: usize,
    },

    /// An I/O error on the underlying link.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The link was closed (EOF).
    #[error("connection closed")]
    ConnectionClosed,
}

pub type Result<T> = std::result::Result<T, WireError>;
