use std::path::PathBuf;
use std::time::Duration;

use simpl_wire::{NameLocateRequest, HEADER_SIZE};

/// Default TCP port of the surrogate listener.
pub const DEFAULT_PORT: u16 = 50001;
/// Default serial device.
pub const DEFAULT_SERIAL_DEVICE: &str = "/dev/ttyS0";
/// Default serial line speed.
pub const DEFAULT_BAUD: u32 = 9600;

/// Tuning shared by every station and session of one surrogate.
#[derive(Debug, Clone)]
pub struct SurrogateConfig {
    /// TCP port the listener binds and outbound sessions connect to.
    pub port: u16,
    /// Address the TCP listener binds.
    pub bind_host: String,
    /// How long an outbound session waits for the far side to answer a
    /// name locate.
    pub nameloc_timeout: Duration,
    /// Idle interval after which sessions check peer liveness and send a
    /// keep-alive probe.
    pub check_interval: Duration,
    /// Unanswered probes tolerated before a session gives up.
    pub fail_limit: u32,
    /// Whether sessions probe an idle link at all.
    pub keepalive: bool,
    /// Ceiling on header plus message bytes a session will carry.
    pub max_msg_mem: usize,
    /// Serial device path.
    pub device: PathBuf,
    /// Serial line speed.
    pub baud: u32,
}

impl Default for SurrogateConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            bind_host: "::".to_string(),
            nameloc_timeout: Duration::from_secs(60),
            check_interval: Duration::from_secs(60),
            fail_limit: 3,
            keepalive: true,
            max_msg_mem: 8192,
            device: PathBuf::from(DEFAULT_SERIAL_DEVICE),
            baud: DEFAULT_BAUD,
        }
    }
}

impl SurrogateConfig {
    /// Defaults suited to a serial line: a 10 s probe interval.
    pub fn serial() -> Self {
        Self {
            check_interval: Duration::from_secs(10),
            ..Self::default()
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_bind_host(mut self, host: impl Into<String>) -> Self {
        self.bind_host = host.into();
        self
    }

    pub fn with_nameloc_timeout(mut self, timeout: Duration) -> Self {
        self.nameloc_timeout = timeout;
        self
    }

    pub fn with_check_interval(mut self, interval: Duration) -> Self {
        self.check_interval = interval;
        self
    }

    pub fn with_fail_limit(mut self, limit: u32) -> Self {
        self.fail_limit = limit;
        self
    }

    pub fn with_keepalive(mut self, enabled: bool) -> Self {
        self.keepalive = enabled;
        self
    }

    pub fn with_max_msg_mem(mut self, bytes: usize) -> Self {
        self.max_msg_mem = bytes;
        self
    }

    pub fn with_device(mut self, device: impl Into<PathBuf>, baud: u32) -> Self {
        self.device = device.into();
        self.baud = baud;
        self
    }

    /// Whether a session carrying messages of up to `max_size` bytes fits
    /// under the memory ceiling.
    pub fn admits(&self, max_size: usize) -> bool {
        max_size.saturating_add(HEADER_SIZE) <= self.max_msg_mem
    }

    /// Largest frame payload a link accepts: any admitted message, and
    /// always the name-locate handshake.
    pub fn max_frame_payload(&self) -> usize {
        self.max_msg_mem.max(NameLocateRequest::SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SurrogateConfig::default();
        assert_eq!(config.port, 50001);
        assert_eq!(config.nameloc_timeout, Duration::from_secs(60));
        assert_eq!(config.check_interval, Duration::from_secs(60));
        assert_eq!(config.fail_limit, 3);
        assert!(config.keepalive);
        assert_eq!(config.max_msg_mem, 8192);
        assert_eq!(SurrogateConfig::serial().check_interval, Duration::from_secs(10));
    }

    #[test]
    fn test_admits_counts_header() {
        let config = SurrogateConfig::default().with_max_msg_mem(HEADER_SIZE + 100);
        assert!(config.admits(100));
        assert!(!config.admits(101));
        assert!(!config.admits(usize::MAX));
    }

    #[test]
    fn test_frame_limit_fits_handshake() {
        let config = SurrogateConfig::default().with_max_msg_mem(64);
        assert_eq!(config.max_frame_payload(), NameLocateRequest::SIZE);
    }
}
