use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::{Result, TransportError};
use crate::fifo::{open_writer, FifoPaths, RECEIVE_PREFIX, REPLY_PREFIX};
use crate::liveness::{ExistenceProbe, LivenessProbe};

/// One FIFO-visible registration: `<name>` held by `<pid>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub name: String,
    pub pid: u32,
}

impl Entry {
    pub fn paths(&self, dir: &Path) -> FifoPaths {
        FifoPaths::new(dir, &self.name, self.pid)
    }
}

/// Which FIFO of a pair a directory entry is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FifoKind {
    Receive,
    Reply,
}

/// Name discovery over the FIFO directory.
///
/// A name is held by whichever live process owns an `R_<name>.<pid>` FIFO.
/// Lookups that run into FIFOs of dead processes delete them on the way.
#[derive(Debug, Clone)]
pub struct Registry {
    dir: PathBuf,
    probe: Arc<dyn LivenessProbe>,
}

impl Registry {
    /// Registry over `dir` using the default process-existence probe.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self::with_probe(dir, Arc::new(ExistenceProbe))
    }

    pub fn with_probe(dir: impl Into<PathBuf>, probe: Arc<dyn LivenessProbe>) -> Self {
        Self {
            dir: dir.into(),
            probe,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn probe(&self) -> &dyn LivenessProbe {
        self.probe.as_ref()
    }

    /// Fail unless the FIFO directory exists and is readable, writable and
    /// searchable by this process.
    pub fn check_dir(&self) -> Result<()> {
        let no_dir = |source| TransportError::NoFifoDir {
            path: self.dir.clone(),
            source,
        };
        let meta = std::fs::metadata(&self.dir).map_err(no_dir)?;
        if !meta.is_dir() {
            return Err(no_dir(std::io::Error::new(
                std::io::ErrorKind::NotADirectory,
                "not a directory",
            )));
        }

        let c_path = std::ffi::CString::new(std::os::unix::ffi::OsStrExt::as_bytes(
            self.dir.as_os_str(),
        ))
        .map_err(|_| {
            no_dir(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "path contains NUL byte",
            ))
        })?;
        // SAFETY: `c_path` is a valid NUL-terminated string.
        let rc = unsafe { libc::access(c_path.as_ptr(), libc::R_OK | libc::W_OK | libc::X_OK) };
        if rc != 0 {
            return Err(no_dir(std::io::Error::last_os_error()));
        }
        Ok(())
    }

    /// Every FIFO in the directory that follows the naming convention.
    pub fn scan_fifos(&self) -> Result<Vec<(FifoKind, Entry)>> {
        let read_dir = std::fs::read_dir(&self.dir).map_err(|source| TransportError::NoFifoDir {
            path: self.dir.clone(),
            source,
        })?;

        let mut found = Vec::new();
        for dirent in read_dir {
            let dirent = dirent?;
            let file_name = dirent.file_name();
            let Some(file_name) = file_name.to_str() else {
                continue;
            };
            if let Some(parsed) = parse_fifo_name(file_name) {
                found.push(parsed);
            }
        }
        Ok(found)
    }

    /// All registrations (receive FIFOs), live or not.
    pub fn scan(&self) -> Result<Vec<Entry>> {
        let mut entries: Vec<Entry> = self
            .scan_fifos()?
            .into_iter()
            .filter(|(kind, _)| *kind == FifoKind::Receive)
            .map(|(_, entry)| entry)
            .collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name).then(a.pid.cmp(&b.pid)));
        Ok(entries)
    }

    /// Registrations of `name`, live or not.
    pub fn find(&self, name: &str) -> Result<Vec<Entry>> {
        Ok(self
            .scan()?
            .into_iter()
            .filter(|entry| entry.name == name)
            .collect())
    }

    /// Whether `pid` is running. A dead owner's FIFOs under `name` are
    /// removed before returning `false`.
    pub fn is_alive(&self, name: &str, pid: u32) -> bool {
        if self.probe.is_alive(pid) {
            return true;
        }
        debug!(name, pid, "registration owner is gone; removing its fifos");
        FifoPaths::new(&self.dir, name, pid).remove();
        false
    }

    /// The live process holding `name`, if any, after clearing stale
    /// registrations of that name.
    pub fn live_holder(&self, name: &str) -> Result<Option<Entry>> {
        self.first_live(name, |_| true)
    }

    /// A live holder of `name` other than `pid`.
    pub fn live_rival(&self, name: &str, pid: u32) -> Result<Option<Entry>> {
        self.first_live(name, |entry| entry.pid != pid)
    }

    fn first_live(&self, name: &str, keep: impl Fn(&Entry) -> bool) -> Result<Option<Entry>> {
        for entry in self.find(name)? {
            if keep(&entry) && self.is_alive(&entry.name, entry.pid) {
                return Ok(Some(entry));
            }
        }
        Ok(None)
    }

    /// Find the live holder of `name` and open its receive FIFO for writing.
    pub fn resolve(&self, name: &str) -> Result<Option<(Entry, File)>> {
        let Some(entry) = self.live_holder(name)? else {
            return Ok(None);
        };
        let file = open_writer(&entry.paths(&self.dir).receive)?;
        debug!(name, pid = entry.pid, "resolved receiver");
        Ok(Some((entry, file)))
    }

    /// Remove every FIFO whose owner is no longer running.
    ///
    /// Returns the distinct registrations that were cleared.
    pub fn sweep(&self) -> Result<Vec<Entry>> {
        let mut removed: Vec<Entry> = Vec::new();
        for (_, entry) in self.scan_fifos()? {
            if removed.contains(&entry) || self.probe.is_alive(entry.pid) {
                continue;
            }
            entry.paths(&self.dir).remove();
            info!(name = %entry.name, pid = entry.pid, "swept orphaned fifos");
            removed.push(entry);
        }
        Ok(removed)
    }

    /// Send `SIGTERM` to every process registered as `name` and remove their
    /// FIFOs.
    pub fn slay(&self, name: &str) -> Result<Vec<Entry>> {
        let entries = self.find(name)?;
        for entry in &entries {
            if let Ok(pid) = libc::pid_t::try_from(entry.pid) {
                // SAFETY: plain system call with scalar arguments.
                let rc = unsafe { libc::kill(pid, libc::SIGTERM) };
                if rc != 0 {
                    warn!(
                        name,
                        pid = entry.pid,
                        error = %std::io::Error::last_os_error(),
                        "failed to signal process"
                    );
                }
            }
            entry.paths(&self.dir).remove();
            info!(name, pid = entry.pid, "slayed registration");
        }
        Ok(entries)
    }
}

/// Parse `R_<name>.<pid>` / `Y_<name>.<pid>`.
pub fn parse_fifo_name(file_name: &str) -> Option<(FifoKind, Entry)> {
    let (kind, rest) = if let Some(rest) = file_name.strip_prefix(RECEIVE_PREFIX) {
        (FifoKind::Receive, rest)
    } else if let Some(rest) = file_name.strip_prefix(REPLY_PREFIX) {
        (FifoKind::Reply, rest)
    } else {
        return None;
    };

    let (name, pid) = rest.rsplit_once('.')?;
    if name.is_empty() || pid.is_empty() || !pid.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let pid = pid.parse().ok()?;
    Some((
        kind,
        Entry {
            name: name.to_string(),
            pid,
        },
    ))
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::fifo::FifoPair;

    fn unique_temp_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "simpl-registry-{tag}-{}-{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .expect("time should be after epoch")
                .as_nanos()
        ));
        std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
        dir
    }

    #[derive(Debug, Default)]
    struct FakeProbe {
        alive: Mutex<Vec<u32>>,
    }

    impl FakeProbe {
        fn with_alive(pids: &[u32]) -> Arc<Self> {
            Arc::new(Self {
                alive: Mutex::new(pids.to_vec()),
            })
        }
    }

    impl LivenessProbe for FakeProbe {
        fn is_alive(&self, pid: u32) -> bool {
            self.alive.lock().unwrap().contains(&pid)
        }

        fn name(&self) -> &'static str {
            "fake"
        }
    }

    #[test]
    fn test_parse_fifo_name() {
        assert_eq!(
            parse_fifo_name("R_receiver.1234"),
            Some((
                FifoKind::Receive,
                Entry {
                    name: "receiver".into(),
                    pid: 1234
                }
            ))
        );
        assert_eq!(
            parse_fifo_name("Y__TCP_surrogate_R.99").map(|(k, e)| (k, e.name)),
            Some((FifoKind::Reply, "_TCP_surrogate_R".into()))
        );
        assert!(parse_fifo_name("R_.12").is_none());
        assert!(parse_fifo_name("R_name.").is_none());
        assert!(parse_fifo_name("R_name.12a").is_none());
        assert!(parse_fifo_name("X_name.12").is_none());
        assert!(parse_fifo_name("sry.log").is_none());
    }

    #[test]
    fn test_live_holder_and_self_heal() {
        let dir = unique_temp_dir("heal");
        let probe = FakeProbe::with_alive(&[10]);
        let registry = Registry::with_probe(&dir, probe.clone());

        let live = FifoPair::create(&dir, "svc", 10).unwrap();
        let stale = FifoPair::create(&dir, "svc", 11).unwrap();
        let stale_paths = stale.paths().clone();
        drop(stale);

        let holder = registry.live_holder("svc").unwrap().unwrap();
        assert_eq!(holder.pid, 10);

        probe.alive.lock().unwrap().clear();
        assert_eq!(registry.live_holder("svc").unwrap(), None);
        assert!(registry.find("svc").unwrap().is_empty());
        assert!(!stale_paths.receive.exists());
        assert!(!stale_paths.reply.exists());

        drop(live);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_live_rival_ignores_own_pid() {
        let dir = unique_temp_dir("rival");
        let probe = FakeProbe::with_alive(&[20, 21]);
        let registry = Registry::with_probe(&dir, probe.clone());

        let mine = FifoPair::create(&dir, "svc", 20).unwrap();
        assert_eq!(registry.live_rival("svc", 20).unwrap(), None);

        let theirs = FifoPair::create(&dir, "svc", 21).unwrap();
        assert_eq!(registry.live_rival("svc", 20).unwrap().map(|e| e.pid), Some(21));
        assert_eq!(registry.live_rival("svc", 21).unwrap().map(|e| e.pid), Some(20));

        // A dead rival is cleared rather than reported.
        probe.alive.lock().unwrap().retain(|pid| *pid == 20);
        let theirs_paths = theirs.paths().clone();
        drop(theirs);
        assert_eq!(registry.live_rival("svc", 20).unwrap(), None);
        assert!(!theirs_paths.receive.exists());

        mine.remove();
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_resolve_opens_live_receive_fifo() {
        let dir = unique_temp_dir("resolve");
        let registry = Registry::new(&dir);
        let pid = std::process::id();
        let mut pair = FifoPair::create(&dir, "target", pid).unwrap();

        let (entry, mut file) = registry.resolve("target").unwrap().unwrap();
        assert_eq!(entry.pid, pid);
        crate::fifo::write_signal(&mut file, crate::signal::Signal::Proxy(3)).unwrap();
        assert_eq!(
            pair.read_request().unwrap(),
            crate::signal::Signal::Proxy(3)
        );

        assert!(registry.resolve("missing").unwrap().is_none());
        pair.remove();
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_sweep_removes_only_dead_owners() {
        let dir = unique_temp_dir("sweep");
        let registry = Registry::with_probe(&dir, FakeProbe::with_alive(&[1]));
        let keep = FifoPair::create(&dir, "alive", 1).unwrap();
        drop(FifoPair::create(&dir, "dead", 2).unwrap());
        // Reply FIFO left behind without its receive half.
        drop(FifoPair::create(&dir, "half", 3).unwrap());
        std::fs::remove_file(dir.join("R_half.3")).unwrap();

        let mut removed: Vec<String> = registry
            .sweep()
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();
        removed.sort();
        assert_eq!(removed, vec!["dead".to_string(), "half".to_string()]);
        assert_eq!(
            registry.scan().unwrap(),
            vec![Entry {
                name: "alive".into(),
                pid: 1
            }]
        );
        assert!(!dir.join("Y_half.3").exists());

        keep.remove();
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_check_dir() {
        let dir = unique_temp_dir("check");
        assert!(Registry::new(&dir).check_dir().is_ok());
        let missing = dir.join("nope");
        assert!(matches!(
            Registry::new(&missing).check_dir(),
            Err(TransportError::NoFifoDir { .. })
        ));
        let _ = std::fs::remove_dir_all(&dir);
    }
}
