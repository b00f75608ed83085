//! Session identity and the pieces shared by both session directions.

use std::sync::atomic::{AtomicU32, Ordering};
use std::thread::{self, JoinHandle};

use simpl_sry::{Sry, SryConfig};
use simpl_transport::wait_readable;
use simpl_wire::Frame;
use tracing::{debug, info, warn};

use crate::error::{Result, SurrogateError};
use crate::link::Link;

static NEXT_SESSION: AtomicU32 = AtomicU32::new(1);

/// Lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Waiting for, or performing, the name-locate handshake.
    Negotiating,
    /// Relaying traffic.
    Active,
    /// Finished; the registration is being released.
    Closing,
}

/// Allocate a process-unique session id. Ids double as routing tags on
/// multiplexed links.
pub fn next_session_id() -> u32 {
    NEXT_SESSION.fetch_add(1, Ordering::Relaxed)
}

/// `<prefix><pid>_<id>`.
pub fn session_name(prefix: &str, id: u32) -> String {
    format!("{prefix}{}_{id}", std::process::id())
}

/// Register a fresh session identity under `prefix`.
pub fn register_session(prefix: &str, config: &SryConfig) -> Result<(u32, Sry)> {
    let id = next_session_id();
    let name = session_name(prefix, id);
    let sry = Sry::open_with_config(&name, config.clone())?;
    debug!(session = %name, id, "registered session");
    Ok((id, sry))
}

/// Readiness of a session's sources after one wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Wake {
    Local,
    Link,
    Idle,
}

/// Wait on a local FIFO and the link, preferring frames already buffered.
pub(crate) fn wait_local_or_link(
    local: std::os::fd::BorrowedFd<'_>,
    link: &dyn Link,
    timeout: std::time::Duration,
) -> Result<Wake> {
    if link.has_buffered_frame() {
        return Ok(Wake::Link);
    }
    let ready = wait_readable(&[local, link.poll_fd()], Some(timeout))?;
    Ok(if ready.is_ready(0) {
        Wake::Local
    } else if ready.is_ready(1) {
        Wake::Link
    } else {
        Wake::Idle
    })
}

/// Run a session body on its own named thread, logging how it ended.
pub(crate) fn spawn_session(
    kind: &'static str,
    id: u32,
    body: impl FnOnce() -> Result<()> + Send + 'static,
) -> Result<JoinHandle<()>> {
    let handle = thread::Builder::new()
        .name(format!("{kind}-{id}"))
        .spawn(move || match body() {
            Ok(()) => debug!(kind, id, "session ended"),
            Err(err @ SurrogateError::KeepAliveExpired(_)) => info!(kind, id, error = %err, "session expired"),
            Err(err) => warn!(kind, id, error = %err, "session failed"),
        })?;
    Ok(handle)
}

/// Best-effort send of a final frame before a session ends.
pub(crate) fn send_final(link: &mut dyn Link, frame: Frame) {
    if let Err(err) = link.write_frame(&frame) {
        debug!(token = %frame.token, error = %err, "could not deliver final frame");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_unique_and_names_carry_pid() {
        let a = next_session_id();
        let b = next_session_id();
        assert_ne!(a, b);
        let name = session_name("_TCP_surrogate_r", 7);
        assert_eq!(name, format!("_TCP_surrogate_r{}_7", std::process::id()));
        assert!(simpl_sry::validate_name(&name).is_ok());
    }
}
