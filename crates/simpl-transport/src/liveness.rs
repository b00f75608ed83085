//! Process existence checks.
//!
//! The registry never trusts a FIFO on disk by itself: a name is only taken
//! while the pid encoded in its FIFO is still running. The check sits behind
//! [`LivenessProbe`] so it can be swapped per platform or faked in tests.

use std::path::PathBuf;

/// Answers "is this process still running?".
pub trait LivenessProbe: Send + Sync + std::fmt::Debug {
    fn is_alive(&self, pid: u32) -> bool;

    /// Short identifier for diagnostics.
    fn name(&self) -> &'static str;
}

/// `kill(pid, 0)`: alive unless the kernel reports `ESRCH`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExistenceProbe;

impl LivenessProbe for ExistenceProbe {
    fn is_alive(&self, pid: u32) -> bool {
        let Ok(pid) = libc::pid_t::try_from(pid) else {
            return false;
        };
        if pid <= 0 {
            return false;
        }
        // SAFETY: signal 0 performs permission and existence checks only.
        let rc = unsafe { libc::kill(pid, 0) };
        if rc == 0 {
            return true;
        }
        std::io::Error::last_os_error().raw_os_error() != Some(libc::ESRCH)
    }

    fn name(&self) -> &'static str {
        "kill"
    }
}

/// Checks for `/proc/<pid>`; only meaningful where procfs is mounted.
#[derive(Debug, Clone)]
pub struct ProcfsProbe {
    root: PathBuf,
}

impl Default for ProcfsProbe {
    fn default() -> Self {
        Self {
            root: PathBuf::from("/proc"),
        }
    }
}

impl LivenessProbe for ProcfsProbe {
    fn is_alive(&self, pid: u32) -> bool {
        pid != 0 && self.root.join(pid.to_string()).exists()
    }

    fn name(&self) -> &'static str {
        "procfs"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dead_pid() -> u32 {
        let mut child = std::process::Command::new("true")
            .spawn()
            .expect("true should spawn");
        let pid = child.id();
        child.wait().expect("child should exit");
        pid
    }

    #[test]
    fn test_existence_probe_sees_self() {
        assert!(ExistenceProbe.is_alive(std::process::id()));
    }

    #[test]
    fn test_existence_probe_sees_reaped_child_as_dead() {
        assert!(!ExistenceProbe.is_alive(dead_pid()));
    }

    #[test]
    fn test_existence_probe_rejects_invalid_pids() {
        assert!(!ExistenceProbe.is_alive(0));
        assert!(!ExistenceProbe.is_alive(u32::MAX));
    }

    #[test]
    #[cfg(target_os = "linux")]
    fn test_procfs_probe() {
        let probe = ProcfsProbe::default();
        assert!(probe.is_alive(std::process::id()));
        assert!(!probe.is_alive(dead_pid()));
    }
}
