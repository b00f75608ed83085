use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Write};
use std::os::fd::{AsFd, AsRawFd, BorrowedFd};
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::{Result, TransportError};
use crate::poll::wait_readable;
use crate::signal::{Signal, SIGNAL_SIZE};

/// Prefix of a process's receive FIFO.
pub const RECEIVE_PREFIX: &str = "R_";
/// Prefix of a process's reply FIFO.
pub const REPLY_PREFIX: &str = "Y_";
/// Mode requested for freshly created FIFOs, before the process umask.
pub const FIFO_MODE: u32 = 0o666;
/// Maximum length of a FIFO path.
pub const MAX_FIFO_PATH_LEN: usize = 1024;
/// Attempts made to complete a partially read signal record.
pub const MAX_READ_ATTEMPTS: usize = 10;

/// Filesystem locations of one process's FIFO pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FifoPaths {
    pub receive: PathBuf,
    pub reply: PathBuf,
}

impl FifoPaths {
    /// `R_<name>.<pid>` and `Y_<name>.<pid>` under `dir`.
    pub fn new(dir: &Path, name: &str, pid: u32) -> Self {
        Self {
            receive: dir.join(format!("{RECEIVE_PREFIX}{name}.{pid}")),
            reply: dir.join(format!("{REPLY_PREFIX}{name}.{pid}")),
        }
    }

    fn check_len(&self) -> Result<()> {
        for path in [&self.receive, &self.reply] {
            let len = path.as_os_str().len();
            if len > MAX_FIFO_PATH_LEN {
                return Err(TransportError::PathTooLong {
                    path: path.clone(),
                    len,
                    max: MAX_FIFO_PATH_LEN,
                });
            }
        }
        Ok(())
    }

    /// Unlink both FIFOs. Missing entries are not an error; other failures
    /// are logged and otherwise ignored.
    pub fn remove(&self) {
        for path in [&self.receive, &self.reply] {
            match std::fs::remove_file(path) {
                Ok(()) => debug!(?path, "removed fifo"),
                Err(err) if err.kind() == ErrorKind::NotFound => {}
                Err(err) => warn!(?path, error = %err, "failed to remove fifo"),
            }
        }
    }
}

/// The receive and reply FIFOs owned by a registered process.
///
/// Both ends are opened read/write so the owner never sees EOF while it is
/// alive and can block or poll on either one.
#[derive(Debug)]
pub struct FifoPair {
    paths: FifoPaths,
    receive: Option<File>,
    reply: Option<File>,
}

impl FifoPair {
    /// Create and open the FIFO pair for `name`/`pid` under `dir`.
    pub fn create(dir: &Path, name: &str, pid: u32) -> Result<Self> {
        let paths = FifoPaths::new(dir, name, pid);
        paths.check_len()?;

        make_fifo(&paths.receive)?;
        if let Err(err) = make_fifo(&paths.reply) {
            paths.remove();
            return Err(err);
        }

        let opened = open_rw(&paths.receive).and_then(|r| Ok((r, open_rw(&paths.reply)?)));
        let (receive, reply) = match opened {
            Ok(files) => files,
            Err(err) => {
                paths.remove();
                return Err(err);
            }
        };

        debug!(receive = ?paths.receive, reply = ?paths.reply, "created fifo pair");
        Ok(Self {
            paths,
            receive: Some(receive),
            reply: Some(reply),
        })
    }

    pub fn paths(&self) -> &FifoPaths {
        &self.paths
    }

    /// Descriptor of the receive FIFO, for readiness selection.
    pub fn receive_fd(&self) -> Option<BorrowedFd<'_>> {
        self.receive.as_ref().map(|f| f.as_fd())
    }

    /// Descriptor of the reply FIFO, for readiness selection.
    pub fn reply_fd(&self) -> Option<BorrowedFd<'_>> {
        self.reply.as_ref().map(|f| f.as_fd())
    }

    /// Block until a signal arrives on the receive FIFO.
    ///
    /// A failed read closes the descriptor; later reads return
    /// [`TransportError::Closed`].
    pub fn read_request(&mut self) -> Result<Signal> {
        read_or_invalidate(&mut self.receive, "receive")
    }

    /// Block until a signal arrives on the reply FIFO.
    pub fn read_reply(&mut self) -> Result<Signal> {
        read_or_invalidate(&mut self.reply, "reply")
    }

    /// Discard any signals already queued on the reply FIFO.
    ///
    /// Returns how many were dropped.
    pub fn drain_replies(&mut self) -> Result<usize> {
        let mut dropped = 0;
        loop {
            let ready = match self.reply.as_ref() {
                Some(file) => wait_readable(&[file.as_fd()], Some(Duration::ZERO))?,
                None => return Err(TransportError::Closed),
            };
            if ready.is_empty() {
                return Ok(dropped);
            }
            let stale = self.read_reply()?;
            debug!(?stale, "discarded stale reply signal");
            dropped += 1;
        }
    }

    /// Close both descriptors and unlink the FIFOs.
    pub fn remove(mut self) {
        self.receive.take();
        self.reply.take();
        self.paths.remove();
    }
}

fn read_or_invalidate(slot: &mut Option<File>, which: &'static str) -> Result<Signal> {
    let file = slot.as_mut().ok_or(TransportError::Closed)?;
    match read_signal(file) {
        Ok(signal) => Ok(signal),
        Err(err) => {
            warn!(fifo = which, error = %err, "fifo read failed; closing descriptor");
            slot.take();
            Err(err)
        }
    }
}

/// Read one signal record, retrying partial reads a bounded number of times.
pub fn read_signal(src: &mut impl Read) -> Result<Signal> {
    let mut buf = [0u8; SIGNAL_SIZE];
    let mut filled = 0usize;
    let mut attempts = 0usize;

    while filled < SIGNAL_SIZE {
        if attempts == MAX_READ_ATTEMPTS {
            return Err(TransportError::ShortRecord {
                read: filled,
                expected: SIGNAL_SIZE,
            });
        }
        match src.read(&mut buf[filled..]) {
            Ok(0) => return Err(TransportError::Closed),
            Ok(n) => {
                filled += n;
                attempts += 1;
            }
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(TransportError::Io(err)),
        }
    }

    Ok(Signal::from_bytes(buf))
}

/// Write one signal record.
pub fn write_signal(dst: &mut impl Write, signal: Signal) -> Result<()> {
    let bytes = signal.to_bytes();
    loop {
        match dst.write_all(&bytes) {
            Ok(()) => return Ok(()),
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) if err.kind() == ErrorKind::BrokenPipe => return Err(TransportError::Closed),
            Err(err) => return Err(TransportError::Io(err)),
        }
    }
}

/// Open another process's FIFO for writing.
///
/// The open is non-blocking so a FIFO without a reader fails with `ENXIO`
/// instead of hanging; the descriptor is switched back to blocking mode
/// before it is returned.
pub fn open_writer(path: &Path) -> Result<File> {
    let file = OpenOptions::new()
        .write(true)
        .custom_flags(libc::O_NONBLOCK)
        .open(path)
        .map_err(|source| TransportError::OpenFifo {
            path: path.to_path_buf(),
            source,
        })?;

    let fd = file.as_raw_fd();
    // SAFETY: `fd` is an open descriptor owned by `file` for the duration of
    // both calls.
    let rc = unsafe {
        let flags = libc::fcntl(fd, libc::F_GETFL);
        if flags < 0 {
            flags
        } else {
            libc::fcntl(fd, libc::F_SETFL, flags & !libc::O_NONBLOCK)
        }
    };
    if rc < 0 {
        return Err(TransportError::OpenFifo {
            path: path.to_path_buf(),
            source: std::io::Error::last_os_error(),
        });
    }

    Ok(file)
}

/// Open a peer FIFO, write a single signal and close it again.
pub fn signal_path(path: &Path, signal: Signal) -> Result<()> {
    let mut file = open_writer(path)?;
    write_signal(&mut file, signal)
}

fn make_fifo(path: &Path) -> Result<()> {
    let c_path = std::ffi::CString::new(path.as_os_str().as_bytes()).map_err(|_| {
        TransportError::CreateFifo {
            path: path.to_path_buf(),
            source: std::io::Error::new(ErrorKind::InvalidInput, "path contains NUL byte"),
        }
    })?;

    // SAFETY: `c_path` is a valid NUL-terminated string that outlives the call.
    let rc = unsafe { libc::mkfifo(c_path.as_ptr(), FIFO_MODE as libc::mode_t) };
    if rc != 0 {
        return Err(TransportError::CreateFifo {
            path: path.to_path_buf(),
            source: std::io::Error::last_os_error(),
        });
    }
    Ok(())
}

fn open_rw(path: &Path) -> Result<File> {
    OpenOptions::new()
        .read(true)
        .write(true)
        .open(path)
        .map_err(|source| TransportError::OpenFifo {
            path: path.to_path_buf(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::os::unix::fs::{FileTypeExt, PermissionsExt};

    use super::*;
    use crate::signal::{SegmentHandle, PROXY_SHUTDOWN};

    fn unique_temp_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "simpl-fifo-{tag}-{}-{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .expect("time should be after epoch")
                .as_nanos()
        ));
        std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
        dir
    }

    #[test]
    fn test_paths_follow_naming_convention() {
        let paths = FifoPaths::new(Path::new("/var/tmp"), "receiver", 4321);
        assert_eq!(paths.receive, PathBuf::from("/var/tmp/R_receiver.4321"));
        assert_eq!(paths.reply, PathBuf::from("/var/tmp/Y_receiver.4321"));
    }

    /// Process umask from procfs. `umask(2)` would have to change it to read it.
    fn current_umask() -> Option<u32> {
        let status = std::fs::read_to_string("/proc/self/status").ok()?;
        let line = status.lines().find(|line| line.starts_with("Umask:"))?;
        u32::from_str_radix(line["Umask:".len()..].trim(), 8).ok()
    }

    #[test]
    fn test_create_and_remove_pair() {
        let dir = unique_temp_dir("create");
        let pair = FifoPair::create(&dir, "alpha", 77).unwrap();
        let paths = pair.paths().clone();

        for path in [&paths.receive, &paths.reply] {
            let meta = std::fs::metadata(path).unwrap();
            assert!(meta.file_type().is_fifo());
            let mode = meta.permissions().mode() & 0o777;
            assert_eq!(mode & !FIFO_MODE, 0);
            if let Some(umask) = current_umask() {
                assert_eq!(mode, FIFO_MODE & !umask);
            }
        }

        pair.remove();
        assert!(!paths.receive.exists());
        assert!(!paths.reply.exists());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_create_fails_when_name_taken() {
        let dir = unique_temp_dir("taken");
        let first = FifoPair::create(&dir, "dup", 5).unwrap();
        let err = FifoPair::create(&dir, "dup", 5).unwrap_err();
        assert!(matches!(err, TransportError::CreateFifo { .. }));
        first.remove();
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_signal_through_fifo() {
        let dir = unique_temp_dir("signal");
        let mut pair = FifoPair::create(&dir, "sig", 9).unwrap();

        signal_path(&pair.paths().receive, Signal::Proxy(PROXY_SHUTDOWN)).unwrap();
        assert_eq!(pair.read_request().unwrap(), Signal::Proxy(PROXY_SHUTDOWN));

        let handle = SegmentHandle::new(12).unwrap();
        signal_path(&pair.paths().reply, Signal::Message(handle)).unwrap();
        assert_eq!(pair.read_reply().unwrap(), Signal::Message(handle));

        pair.remove();
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_drain_replies_discards_queued_signals() {
        let dir = unique_temp_dir("drain");
        let mut pair = FifoPair::create(&dir, "drain", 3).unwrap();

        signal_path(&pair.paths().reply, Signal::ReplyError).unwrap();
        signal_path(&pair.paths().reply, Signal::ReplyError).unwrap();
        assert_eq!(pair.drain_replies().unwrap(), 2);
        assert_eq!(pair.drain_replies().unwrap(), 0);

        pair.remove();
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_open_writer_without_reader_fails() {
        let dir = unique_temp_dir("noreader");
        let path = dir.join("R_ghost.1");
        make_fifo(&path).unwrap();

        let err = open_writer(&path).unwrap_err();
        assert!(matches!(err, TransportError::OpenFifo { .. }));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_read_signal_eof_is_closed() {
        let err = read_signal(&mut Cursor::new(Vec::<u8>::new())).unwrap_err();
        assert!(matches!(err, TransportError::Closed));
    }

    #[test]
    fn test_read_signal_handles_partial_reads() {
        let bytes = Signal::Proxy(5).to_bytes().to_vec();
        let mut reader = ByteByByteReader { bytes, pos: 0 };
        assert_eq!(read_signal(&mut reader).unwrap(), Signal::Proxy(5));
    }

    struct ByteByByteReader {
        bytes: Vec<u8>,
        pos: usize,
    }

    impl Read for ByteByByteReader {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.pos >= self.bytes.len() || buf.is_empty() {
                return Ok(0);
            }
            buf[0] = self.bytes[self.pos];
            self.pos += 1;
            Ok(1)
        }
    }
}
