use std::fs::File;
use std::path::{Path, PathBuf};

use simpl_transport::{write_signal, FifoPaths, PeerSegment, SegmentHandle, Signal};

use crate::error::{Result, SryError};
use crate::record::{self, RecordHeader, RECORD_HEADER_SIZE};
use crate::tables::PendingSender;

/// A located receiver: its identity and an open write end of its receive
/// FIFO.
///
/// For a remote receiver the handle points at the local surrogate session
/// that relays to it.
#[derive(Debug)]
pub struct Handle {
    name: String,
    pid: u32,
    path: PathBuf,
    fifo: File,
    remote: bool,
}

impl Handle {
    pub(crate) fn new(name: String, pid: u32, path: PathBuf, fifo: File, remote: bool) -> Self {
        Self {
            name,
            pid,
            path,
            fifo,
            remote,
        }
    }

    pub(crate) fn remote(mut session: Handle) -> Self {
        session.remote = true;
        session
    }

    /// Registered name of the process behind the handle.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// The receive FIFO this handle writes to.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the handle reaches its receiver through a surrogate session.
    pub fn is_remote(&self) -> bool {
        self.remote
    }

    pub(crate) fn signal(&self, signal: Signal) -> Result<()> {
        write_signal(&mut &self.fifo, signal)?;
        Ok(())
    }
}

/// A received message, attached from the sender's segment.
///
/// The attachment is the receiver's only way to reach the sender's memory
/// and is consumed by [`Sry::reply`](crate::Sry::reply),
/// [`Sry::reply_error`](crate::Sry::reply_error) or
/// [`Sry::relay`](crate::Sry::relay). Dropping it without answering detaches
/// but leaves the sender blocked until this registration is torn down.
#[derive(Debug)]
pub struct Attachment {
    segment: PeerSegment,
    header: RecordHeader,
    reply_path: PathBuf,
}

impl Attachment {
    pub(crate) fn attach(handle: SegmentHandle, fifo_dir: &Path) -> Result<Self> {
        let segment = PeerSegment::attach(handle)?;
        let header = RecordHeader::read_from(segment.as_slice())?;
        let body = segment.size().saturating_sub(RECORD_HEADER_SIZE);
        if header.nbytes as usize > body {
            return Err(SryError::ProtocolViolation(format!(
                "message of {} bytes overruns a {body}-byte segment body",
                header.nbytes
            )));
        }
        let reply_path = FifoPaths::new(fifo_dir, &header.sender, header.pid).reply;
        Ok(Self {
            segment,
            header,
            reply_path,
        })
    }

    /// Name the sender registered under.
    pub fn sender_name(&self) -> &str {
        &self.header.sender
    }

    pub fn sender_pid(&self) -> u32 {
        self.header.pid
    }

    /// Size of the sender's whole segment.
    pub fn segment_size(&self) -> usize {
        self.segment.size()
    }

    /// Length of the incoming message.
    pub fn len(&self) -> usize {
        self.header.nbytes as usize
    }

    pub fn is_empty(&self) -> bool {
        self.header.nbytes == 0
    }

    /// Largest reply the sender will accept.
    pub fn reply_capacity(&self) -> usize {
        self.header.ybytes as usize
    }

    /// The message bytes, read in place from the sender's segment.
    pub fn payload(&self) -> &[u8] {
        &self.segment.as_slice()[RECORD_HEADER_SIZE..RECORD_HEADER_SIZE + self.len()]
    }

    /// Copy the message into `buf`, returning its length.
    pub fn copy_to(&self, buf: &mut [u8]) -> Result<usize> {
        let len = self.len();
        let capacity = buf.len();
        let dst = buf.get_mut(..len).ok_or(SryError::BufferTooSmall {
            needed: len,
            capacity,
        })?;
        dst.copy_from_slice(self.payload());
        Ok(len)
    }

    /// Shared-memory handle of the sender's segment.
    pub fn handle(&self) -> SegmentHandle {
        self.segment.handle()
    }

    pub(crate) fn reply_path(&self) -> &Path {
        &self.reply_path
    }

    pub(crate) fn pending_entry(&self) -> PendingSender {
        PendingSender {
            name: self.header.sender.clone(),
            pid: self.header.pid,
            segment: self.segment.handle(),
            reply_path: self.reply_path.clone(),
        }
    }

    /// Write `reply` into the sender's segment and record its length.
    pub(crate) fn write_reply(&mut self, reply: &[u8]) -> Result<()> {
        let slice = self.segment.as_mut_slice();
        let room = slice.len().saturating_sub(RECORD_HEADER_SIZE);
        let dst = slice
            .get_mut(RECORD_HEADER_SIZE..RECORD_HEADER_SIZE + reply.len())
            .ok_or(SryError::ReplyTooLarge {
                len: reply.len(),
                capacity: room,
            })?;
        dst.copy_from_slice(reply);
        record::set_nbytes(slice, reply.len() as u32);
        Ok(())
    }
}
