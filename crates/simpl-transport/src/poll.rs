//! Readiness selection over a small fixed set of descriptors.

use std::os::fd::{AsRawFd, BorrowedFd};
use std::time::{Duration, Instant};

use crate::error::{Result, TransportError};

/// Which of the polled descriptors became readable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Readiness {
    ready: Vec<bool>,
}

impl Readiness {
    /// True if descriptor `index` (in the order passed to [`wait_readable`])
    /// is readable, hung up or in error.
    pub fn is_ready(&self, index: usize) -> bool {
        self.ready.get(index).copied().unwrap_or(false)
    }

    /// True if the wait timed out with nothing ready.
    pub fn is_empty(&self) -> bool {
        !self.ready.iter().any(|r| *r)
    }
}

/// Wait until at least one descriptor is readable or `timeout` elapses.
///
/// `None` waits indefinitely. Hang-up and error conditions count as ready so
/// the subsequent read surfaces the failure.
pub fn wait_readable(fds: &[BorrowedFd<'_>], timeout: Option<Duration>) -> Result<Readiness> {
    let mut pollfds: Vec<libc::pollfd> = fds
        .iter()
        .map(|fd| libc::pollfd {
            fd: fd.as_raw_fd(),
            events: libc::POLLIN,
            revents: 0,
        })
        .collect();
    let deadline = timeout.map(|t| Instant::now() + t);

    loop {
        let millis = match deadline {
            None => -1,
            Some(deadline) => {
                let left = deadline.saturating_duration_since(Instant::now());
                left.as_millis().min(i32::MAX as u128) as libc::c_int
            }
        };

        // SAFETY: `pollfds` is a valid, exclusively borrowed array of
        // `pollfds.len()` entries whose descriptors outlive the call.
        let rc = unsafe {
            libc::poll(
                pollfds.as_mut_ptr(),
                pollfds.len() as libc::nfds_t,
                millis,
            )
        };

        if rc < 0 {
            let err = std::io::Error::last_os_error();
            if err.kind() == std::io::ErrorKind::Interrupted {
                continue;
            }
            return Err(TransportError::Io(err));
        }

        let ready = pollfds
            .iter()
            .map(|p| p.revents & (libc::POLLIN | libc::POLLHUP | libc::POLLERR) != 0)
            .collect();
        return Ok(Readiness { ready });
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::os::fd::AsFd;
    use std::os::unix::net::UnixStream;

    use super::*;

    #[test]
    fn test_times_out_when_idle() {
        let (left, _right) = UnixStream::pair().unwrap();
        let start = Instant::now();
        let ready = wait_readable(&[left.as_fd()], Some(Duration::from_millis(30))).unwrap();
        assert!(ready.is_empty());
        assert!(start.elapsed() >= Duration::from_millis(25));
    }

    #[test]
    fn test_reports_the_ready_descriptor() {
        let (a, mut a_peer) = UnixStream::pair().unwrap();
        let (b, _b_peer) = UnixStream::pair().unwrap();
        a_peer.write_all(b"x").unwrap();

        let ready = wait_readable(&[b.as_fd(), a.as_fd()], Some(Duration::from_secs(1))).unwrap();
        assert!(!ready.is_ready(0));
        assert!(ready.is_ready(1));
        assert!(!ready.is_empty());
    }

    #[test]
    fn test_hangup_counts_as_ready() {
        let (a, a_peer) = UnixStream::pair().unwrap();
        drop(a_peer);
        let ready = wait_readable(&[a.as_fd()], Some(Duration::from_secs(1))).unwrap();
        assert!(ready.is_ready(0));
    }
}
