//! Surrogates carry SIMPL messaging between hosts.
//!
//! A surrogate process runs a station under a well-known name. A local
//! sender asking to reach a remote receiver is handed an outbound session,
//! which carries its traffic over a TCP connection or a shared serial line
//! to an inbound session on the far host. The inbound session then talks to
//! the real receiver as an ordinary local sender.
//!
//! ```no_run
//! use simpl_sry::SryConfig;
//! use simpl_surrogate::{SurrogateConfig, TcpSurrogate};
//!
//! let surrogate = TcpSurrogate::start(SurrogateConfig::default(), SryConfig::from_env())?;
//! surrogate.wait()?;
//! # Ok::<(), simpl_surrogate::SurrogateError>(())
//! ```

pub mod config;
pub mod error;
pub mod inbound;
pub mod keepalive;
pub mod link;
pub mod outbound;
pub mod serial;
pub mod session;
pub mod station;
pub mod tcp;

pub use config::{SurrogateConfig, DEFAULT_BAUD, DEFAULT_PORT, DEFAULT_SERIAL_DEVICE};
pub use error::{Result, SurrogateError};
pub use inbound::Inbound;
pub use keepalive::{Idle, KeepAlive};
pub use link::{Connector, Link, TcpConnector, TcpLink};
pub use outbound::{parse_name_locate, Outbound};
pub use serial::{open_serial, SerialConnector, SerialLink, SerialMux, SerialSurrogate};
pub use session::{next_session_id, register_session, session_name, SessionState};
pub use station::{stop_station, Station};
pub use tcp::TcpSurrogate;
