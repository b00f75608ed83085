//! Local transport primitives for SIMPL messaging.
//!
//! - [`fifo`]: the per-process receive/reply FIFO pair and signal I/O
//! - [`signal`]: the one-word trigger record and proxy encoding
//! - [`shm`]: SysV shared-memory segments holding in-flight messages
//! - [`registry`]: name discovery and liveness over the FIFO directory
//! - [`poll`]: readiness selection for event loops

pub mod error;
pub mod fifo;
pub mod liveness;
pub mod poll;
pub mod registry;
pub mod shm;
pub mod signal;

pub use error::{Result, TransportError};
pub use fifo::{open_writer, read_signal, signal_path, write_signal, FifoPair, FifoPaths};
pub use liveness::{ExistenceProbe, LivenessProbe, ProcfsProbe};
pub use poll::{wait_readable, Readiness};
pub use registry::{Entry, FifoKind, Registry};
pub use shm::{page_align, page_size, PeerSegment, Segment};
pub use signal::{
    encode_proxy, return_proxy, SegmentHandle, Signal, MAX_PROXY, PROXY_SHUTDOWN, SIGNAL_SIZE,
};
