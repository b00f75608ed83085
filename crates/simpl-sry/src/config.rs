use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use simpl_transport::{ExistenceProbe, LivenessProbe, Registry};

/// Environment variable overriding the FIFO directory.
pub const FIFO_PATH_ENV: &str = "SIM_FIFO_PATH";
/// FIFO directory used when the environment does not name one.
pub const DEFAULT_FIFO_DIR: &str = "/var/tmp";
/// Longest accepted process name in bytes.
pub const MAX_NAME_LEN: usize = 100;
/// Capacity of the pending-reply and remote-receiver tables.
pub const TABLE_CAPACITY: usize = 100;
/// How long a remote locate waits for its session to answer. Longer than
/// the surrogate's own name-locate timeout so its verdict arrives first.
pub const DEFAULT_LOCATE_TIMEOUT: Duration = Duration::from_secs(75);

/// Runtime configuration for one [`Sry`](crate::Sry) handle.
#[derive(Debug, Clone)]
pub struct SryConfig {
    /// Directory holding every process's FIFO pair.
    pub fifo_dir: PathBuf,
    /// How the registry decides whether a FIFO's owner still runs.
    pub probe: Arc<dyn LivenessProbe>,
    /// Upper bound on a remote locate.
    pub locate_timeout: Duration,
    /// Capacity of the pending-reply and remote-receiver tables.
    pub table_capacity: usize,
}

impl Default for SryConfig {
    fn default() -> Self {
        Self {
            fifo_dir: PathBuf::from(DEFAULT_FIFO_DIR),
            probe: Arc::new(ExistenceProbe),
            locate_timeout: DEFAULT_LOCATE_TIMEOUT,
            table_capacity: TABLE_CAPACITY,
        }
    }
}

impl SryConfig {
    /// Defaults, with the FIFO directory taken from `SIM_FIFO_PATH` when set.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(dir) = std::env::var_os(FIFO_PATH_ENV).filter(|v| !v.is_empty()) {
            config.fifo_dir = PathBuf::from(dir);
        }
        config
    }

    pub fn with_fifo_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.fifo_dir = dir.into();
        self
    }

    pub fn with_probe(mut self, probe: Arc<dyn LivenessProbe>) -> Self {
        self.probe = probe;
        self
    }

    pub fn with_locate_timeout(mut self, timeout: Duration) -> Self {
        self.locate_timeout = timeout;
        self
    }

    /// Registry view over this configuration's FIFO directory.
    pub fn registry(&self) -> Registry {
        Registry::with_probe(self.fifo_dir.clone(), Arc::clone(&self.probe))
    }
}

/// Check a registration or locate name.
///
/// Names are 1..=100 bytes and may not contain `/`, `.` or NUL, which would
/// break the `R_<name>.<pid>` convention.
pub fn validate_name(name: &str) -> crate::Result<()> {
    let reason = if name.is_empty() {
        "empty"
    } else if name.len() > MAX_NAME_LEN {
        "longer than 100 bytes"
    } else if name.contains(['/', '.', '\0']) {
        "contains '/', '.' or NUL"
    } else {
        return Ok(());
    };
    Err(crate::SryError::InvalidName {
        name: name.to_string(),
        reason,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SryConfig::default();
        assert_eq!(config.fifo_dir, PathBuf::from("/var/tmp"));
        assert_eq!(config.table_capacity, 100);
        assert_eq!(config.probe.name(), "kill");
    }

    #[test]
    fn test_builder() {
        let config = SryConfig::default()
            .with_fifo_dir("/tmp/x")
            .with_locate_timeout(Duration::from_secs(3));
        assert_eq!(config.fifo_dir, PathBuf::from("/tmp/x"));
        assert_eq!(config.locate_timeout, Duration::from_secs(3));
        assert_eq!(config.registry().dir(), std::path::Path::new("/tmp/x"));
    }

    #[test]
    fn test_validate_name() {
        assert!(validate_name("receiver").is_ok());
        assert!(validate_name("_TCP_surrogate_r12_3").is_ok());
        assert!(validate_name(&"n".repeat(MAX_NAME_LEN)).is_ok());
        assert!(validate_name("").is_err());
        assert!(validate_name(&"n".repeat(MAX_NAME_LEN + 1)).is_err());
        assert!(validate_name("a.b").is_err());
        assert!(validate_name("a/b").is_err());
    }
}
