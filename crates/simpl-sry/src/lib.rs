//! Synchronous send/receive/reply messaging between named processes.
//!
//! A process registers a name with [`Sry::open`], locates a peer with
//! [`Sry::locate`] and exchanges messages with [`Sry::send`] /
//! [`Sry::receive`] / [`Sry::reply`]. Messages travel through the sender's
//! shared-memory segment; the FIFOs only carry one-word signals. Receivers on
//! other hosts are reached transparently through surrogate sessions.
//!
//! ```no_run
//! use simpl_sry::{Received, Sry};
//!
//! let mut receiver = Sry::open("receiver")?;
//! if let Received::Message(msg) = receiver.receive()? {
//!     let mut reply = msg.payload().to_vec();
//!     reply.reverse();
//!     receiver.reply(msg, &reply)?;
//! }
//! # Ok::<(), simpl_sry::SryError>(())
//! ```

pub mod config;
pub mod error;
pub mod handle;
pub mod lifecycle;
pub mod locate;
pub mod record;
pub mod sry;
pub mod tables;

pub use config::{
    validate_name, SryConfig, DEFAULT_FIFO_DIR, DEFAULT_LOCATE_TIMEOUT, FIFO_PATH_ENV,
    MAX_NAME_LEN, TABLE_CAPACITY,
};
pub use error::{Result, SryError};
pub use handle::{Attachment, Handle};
pub use lifecycle::{install_signal_teardown, release_all, Ledger};
pub use locate::Protocol;
pub use record::{RecordHeader, RECORD_HEADER_SIZE};
pub use sry::{return_proxy, Received, Sry};
pub use simpl_transport::{encode_proxy, PROXY_SHUTDOWN};
