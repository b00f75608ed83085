use std::fmt;
use std::io;

use simpl_sry::SryError;
use simpl_surrogate::SurrogateError;
use simpl_transport::TransportError;
use simpl_wire::WireError;

// Exit code constants aligned with rsfulmen/DDR-0002 semantics.
pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const HEALTH_CHECK_FAILED: i32 = 30;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::ConnectionRefused | io::ErrorKind::NotFound => FAILURE,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    match err {
        TransportError::NoFifoDir { ref source, .. }
        | TransportError::CreateFifo { ref source, .. }
        | TransportError::OpenFifo { ref source, .. }
            if source.kind() == io::ErrorKind::PermissionDenied =>
        {
            CliError::new(PERMISSION_DENIED, format!("{context}: {err}"))
        }
        TransportError::Io(source) => io_error(context, source),
        other => CliError::new(TRANSPORT_ERROR, format!("{context}: {other}")),
    }
}

pub fn wire_error(context: &str, err: WireError) -> CliError {
    match err {
        WireError::Io(source) => io_error(context, source),
        WireError::ConnectionClosed => CliError::new(FAILURE, format!("{context}: {err}")),
        other => CliError::new(DATA_INVALID, format!("{context}: {other}")),
    }
}

pub fn sry_error(context: &str, err: SryError) -> CliError {
    match err {
        SryError::Transport(err) => transport_error(context, err),
        SryError::Wire(err) => wire_error(context, err),
        SryError::NoTransportPath { ref source, .. } => {
            let code = if source.kind() == io::ErrorKind::PermissionDenied {
                PERMISSION_DENIED
            } else {
                TRANSPORT_ERROR
            };
            CliError::new(code, format!("{context}: {err}"))
        }
        SryError::NotFound { .. } | SryError::ReplyFailed | SryError::ProtocolViolation(_) => {
            CliError::new(FAILURE, format!("{context}: {err}"))
        }
        SryError::RemoteTimeout(_) => CliError::new(TIMEOUT, format!("{context}: {err}")),
        SryError::InvalidName { .. }
        | SryError::NameConflict { .. }
        | SryError::AlreadyActive(_)
        | SryError::InvalidProxy(_) => CliError::new(USAGE, format!("{context}: {err}")),
        SryError::BufferTooSmall { .. } | SryError::ReplyTooLarge { .. } => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        other => CliError::new(INTERNAL, format!("{context}: {other}")),
    }
}

pub fn surrogate_error(context: &str, err: SurrogateError) -> CliError {
    match err {
        SurrogateError::Sry(err) => sry_error(context, err),
        SurrogateError::Wire(err) => wire_error(context, err),
        SurrogateError::Transport(err) => transport_error(context, err),
        SurrogateError::Listen { source, .. }
        | SurrogateError::Connect { source, .. }
        | SurrogateError::Serial { source, .. }
        | SurrogateError::Io(source) => io_error(context, source),
        SurrogateError::KeepAliveExpired(_) => CliError::new(TIMEOUT, format!("{context}: {err}")),
        other => CliError::new(FAILURE, format!("{context}: {other}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_maps_to_failure() {
        let err = sry_error(
            "locate",
            SryError::NotFound {
                name: "x".to_string(),
                host: None,
            },
        );
        assert_eq!(err.code, FAILURE);
        assert!(err.message.starts_with("locate: "));
    }

    #[test]
    fn remote_timeout_maps_to_timeout() {
        let err = sry_error("locate", SryError::RemoteTimeout(std::time::Duration::from_secs(1)));
        assert_eq!(err.code, TIMEOUT);
    }

    #[test]
    fn name_conflict_is_usage() {
        let err = sry_error(
            "register",
            SryError::NameConflict {
                name: "x".to_string(),
                pid: 1,
            },
        );
        assert_eq!(err.code, USAGE);
    }

    #[test]
    fn permission_denied_on_fifo_dir() {
        let err = transport_error(
            "register",
            TransportError::NoFifoDir {
                path: "/nope".into(),
                source: io::Error::from(io::ErrorKind::PermissionDenied),
            },
        );
        assert_eq!(err.code, PERMISSION_DENIED);
    }

    #[test]
    fn surrogate_listen_failure_uses_io_mapping() {
        let err = surrogate_error(
            "listen",
            SurrogateError::Listen {
                port: 1,
                source: io::Error::from(io::ErrorKind::PermissionDenied),
            },
        );
        assert_eq!(err.code, PERMISSION_DENIED);
    }
}
