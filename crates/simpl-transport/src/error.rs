use std::path::PathBuf;

/// Errors that can occur in FIFO, shared-memory and registry operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to create a named pipe.
    #[error("failed to create fifo {path}: {source}")]
    CreateFifo {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to open a named pipe.
    #[error("failed to open fifo {path}: {source}")]
    OpenFifo {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The FIFO directory does not exist or is not accessible.
    #[error("fifo directory {path} is not accessible: {source}")]
    NoFifoDir {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A FIFO path would exceed the supported length.
    #[error("fifo path too long ({len} bytes, max {max}): {path}")]
    PathTooLong {
        path: PathBuf,
        len: usize,
        max: usize,
    },

    /// An I/O error occurred on a FIFO.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A signal record could not be read completely.
    #[error("short signal record: read {read} of {expected} bytes")]
    ShortRecord { read: usize, expected: usize },

    /// The peer end of the FIFO is gone, or the descriptor was invalidated.
    #[error("fifo closed")]
    Closed,

    /// A shared-memory system call failed.
    #[error("shared memory {op} failed: {source}")]
    Shm {
        op: &'static str,
        source: std::io::Error,
    },

    /// A segment is too small for the requested record.
    #[error("segment too small ({size} bytes, need {needed})")]
    SegmentTooSmall { size: usize, needed: usize },
}

pub type Result<T> = std::result::Result<T, TransportError>;
