//! Synchronous send/receive/reply messaging between processes and hosts.
//!
//! A process registers a name, peers locate it by name, and every message is
//! answered by exactly one reply. Receivers on other hosts are reached
//! through surrogate sessions over TCP or a serial line.
//!
//! # Crate Structure
//!
//! - [`transport`]: FIFOs, shared-memory segments and the name registry
//! - [`wire`]: the surrogate wire format
//! - [`sry`]: the send/receive/reply runtime
//! - [`surrogate`]: TCP and serial surrogates (behind `surrogate` feature)

/// Re-export transport types.
pub mod transport {
    pub use simpl_transport::*;
}

/// Re-export wire types.
pub mod wire {
    pub use simpl_wire::*;
}

/// Re-export runtime types.
pub mod sry {
    pub use simpl_sry::*;
}

/// Re-export surrogate types (requires `surrogate` feature).
#[cfg(feature = "surrogate")]
pub mod surrogate {
    pub use simpl_surrogate::*;
}
