use std::ptr::NonNull;

use tracing::debug;

use crate::error::{Result, TransportError};
use crate::signal::SegmentHandle;

const SEGMENT_MODE: libc::c_int = 0o777;

/// System page size in bytes.
pub fn page_size() -> usize {
    // SAFETY: sysconf has no memory-safety preconditions.
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if size > 0 {
        size as usize
    } else {
        4096
    }
}

/// Round `bytes` up to a whole number of pages (at least one page).
pub fn page_align(bytes: usize) -> usize {
    let page = page_size();
    bytes.max(1).div_ceil(page) * page
}

/// A shared-memory segment created and exclusively owned by this process.
///
/// The segment is marked for removal as soon as it is attached, so the kernel
/// reclaims it once the last attachment goes away, even if the owner dies
/// without cleaning up.
#[derive(Debug)]
pub struct Segment {
    handle: SegmentHandle,
    base: NonNull<u8>,
    size: usize,
}

// SAFETY: the mapping is owned by this value alone; moving it to another
// thread moves the only access path with it.
unsafe impl Send for Segment {}

impl Segment {
    /// Create a segment of at least `min_bytes`, rounded up to the page size.
    pub fn allocate(min_bytes: usize) -> Result<Self> {
        let size = page_align(min_bytes);

        // SAFETY: plain system call with scalar arguments.
        let id = unsafe { libc::shmget(libc::IPC_PRIVATE, size, libc::IPC_CREAT | SEGMENT_MODE) };
        let handle = SegmentHandle::new(id).ok_or_else(|| shm_error("shmget"))?;

        let base = match attach_raw(id) {
            Ok(base) => base,
            Err(err) => {
                mark_removed(id);
                return Err(err);
            }
        };
        mark_removed(id);

        debug!(shmid = id, size, "allocated shared memory segment");
        Ok(Self {
            handle,
            base,
            size,
        })
    }

    /// Make sure `slot` holds a segment of at least `min_bytes`.
    ///
    /// An existing segment that is large enough is kept. Otherwise the old
    /// segment is released first and a new one is allocated.
    pub fn grow(slot: &mut Option<Segment>, min_bytes: usize) -> Result<&mut Segment> {
        let segment = match slot.take() {
            Some(existing) if existing.size >= min_bytes => existing,
            old => {
                if let Some(old) = old {
                    debug!(shmid = old.handle.raw(), old = old.size, min_bytes, "growing segment");
                    drop(old);
                }
                Segment::allocate(min_bytes)?
            }
        };
        Ok(slot.insert(segment))
    }

    pub fn handle(&self) -> SegmentHandle {
        self.handle
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: `base` points to `size` bytes mapped for as long as `self`
        // lives; peers only touch the region while this process is blocked
        // waiting for their signal.
        unsafe { std::slice::from_raw_parts(self.base.as_ptr(), self.size) }
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: as in `as_slice`, and `&mut self` guarantees exclusive
        // access from this process.
        unsafe { std::slice::from_raw_parts_mut(self.base.as_ptr(), self.size) }
    }
}

impl Drop for Segment {
    fn drop(&mut self) {
        detach_raw(self.base);
        debug!(shmid = self.handle.raw(), "released shared memory segment");
    }
}

/// Another process's segment, attached for the duration of one exchange.
#[derive(Debug)]
pub struct PeerSegment {
    handle: SegmentHandle,
    base: NonNull<u8>,
    size: usize,
}

// SAFETY: see `Segment`.
unsafe impl Send for PeerSegment {}

impl PeerSegment {
    /// Attach the segment identified by `handle`.
    pub fn attach(handle: SegmentHandle) -> Result<Self> {
        let base = attach_raw(handle.raw())?;

        // SAFETY: `shmid_ds` is plain old data; zeroed is a valid value.
        let mut stat: libc::shmid_ds = unsafe { std::mem::zeroed() };
        // SAFETY: `stat` is a valid, writable `shmid_ds`.
        let rc = unsafe { libc::shmctl(handle.raw(), libc::IPC_STAT, &mut stat) };
        if rc < 0 {
            let err = shm_error("shmctl(IPC_STAT)");
            detach_raw(base);
            return Err(err);
        }

        Ok(Self {
            handle,
            base,
            size: stat.shm_segsz as usize,
        })
    }

    pub fn handle(&self) -> SegmentHandle {
        self.handle
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: `base` maps `size` bytes until drop; the owner is blocked
        // on its reply FIFO while we hold the attachment.
        unsafe { std::slice::from_raw_parts(self.base.as_ptr(), self.size) }
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: as in `as_slice`.
        unsafe { std::slice::from_raw_parts_mut(self.base.as_ptr(), self.size) }
    }
}

impl Drop for PeerSegment {
    fn drop(&mut self) {
        detach_raw(self.base);
    }
}

fn attach_raw(id: libc::c_int) -> Result<NonNull<u8>> {
    // SAFETY: a null address lets the kernel pick the mapping location.
    let addr = unsafe { libc::shmat(id, std::ptr::null(), 0) };
    if addr as isize == -1 {
        return Err(shm_error("shmat"));
    }
    NonNull::new(addr.cast::<u8>()).ok_or_else(|| shm_error("shmat"))
}

fn detach_raw(base: NonNull<u8>) {
    // SAFETY: `base` came from a successful shmat and is detached once.
    unsafe {
        libc::shmdt(base.as_ptr().cast());
    }
}

fn mark_removed(id: libc::c_int) {
    // SAFETY: IPC_RMID ignores the buffer argument.
    unsafe {
        libc::shmctl(id, libc::IPC_RMID, std::ptr::null_mut());
    }
}

fn shm_error(op: &'static str) -> TransportError {
    TransportError::Shm {
        op,
        source: std::io::Error::last_os_error(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_align_rounds_up() {
        let page = page_size();
        assert_eq!(page_align(0), page);
        assert_eq!(page_align(1), page);
        assert_eq!(page_align(page), page);
        assert_eq!(page_align(page + 1), 2 * page);
    }

    #[test]
    fn test_allocate_is_page_aligned() {
        let segment = Segment::allocate(100).unwrap();
        assert_eq!(segment.size(), page_size());
        assert!(segment.as_slice().len() == segment.size());
    }

    #[test]
    fn test_grow_keeps_large_enough_segment() {
        let mut slot = None;
        let first = Segment::grow(&mut slot, 64).unwrap().handle();
        let second = Segment::grow(&mut slot, 128).unwrap().handle();
        assert_eq!(first, second);
    }

    #[test]
    fn test_grow_replaces_small_segment() {
        let mut slot = None;
        Segment::grow(&mut slot, 64).unwrap();
        let bigger = page_size() * 3 + 1;
        let segment = Segment::grow(&mut slot, bigger).unwrap();
        assert_eq!(segment.size(), page_size() * 4);
    }

    #[test]
    fn test_peer_sees_owner_writes() {
        let mut segment = Segment::allocate(32).unwrap();
        segment.as_mut_slice()[..5].copy_from_slice(b"hello");

        let mut peer = PeerSegment::attach(segment.handle()).unwrap();
        assert_eq!(peer.size(), segment.size());
        assert_eq!(&peer.as_slice()[..5], b"hello");

        peer.as_mut_slice()[..5].copy_from_slice(b"world");
        drop(peer);
        assert_eq!(&segment.as_slice()[..5], b"world");
    }

    #[test]
    fn test_attach_unknown_handle_fails() {
        let segment = Segment::allocate(16).unwrap();
        let handle = segment.handle();
        drop(segment);
        let err = PeerSegment::attach(handle).unwrap_err();
        assert!(matches!(err, TransportError::Shm { .. }));
    }
}
