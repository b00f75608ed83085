//! The message record at the start of a sender's shared-memory segment.
//!
//! Layout, little-endian:
//!
//! ```text
//! 0   name_len  u16
//! 2   name      [u8; 100]
//! 102 (pad)     [u8; 2]
//! 104 pid       u32
//! 108 shm_size  u32
//! 112 nbytes    u32
//! 116 ybytes    u32
//! 120 payload...
//! ```
//!
//! `nbytes` is the outgoing message length until the receiver replies, after
//! which it holds the reply length.

use bytes::{Buf, BufMut};

use crate::config::MAX_NAME_LEN;
use crate::error::{Result, SryError};

/// Bytes in front of the payload.
pub const RECORD_HEADER_SIZE: usize = 120;

const NAME_OFFSET: usize = 2;
const PID_OFFSET: usize = 104;

/// Sender identity and byte counts of one in-flight message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordHeader {
    pub sender: String,
    pub pid: u32,
    pub shm_size: u32,
    pub nbytes: u32,
    pub ybytes: u32,
}

impl RecordHeader {
    /// Serialize into the first [`RECORD_HEADER_SIZE`] bytes of `dst`.
    pub fn write_to(&self, dst: &mut [u8]) -> Result<()> {
        if dst.len() < RECORD_HEADER_SIZE {
            return Err(SryError::BufferTooSmall {
                needed: RECORD_HEADER_SIZE,
                capacity: dst.len(),
            });
        }
        let name = self.sender.as_bytes();
        if name.len() > MAX_NAME_LEN {
            return Err(SryError::InvalidName {
                name: self.sender.clone(),
                reason: "longer than 100 bytes",
            });
        }

        let mut head = &mut dst[..RECORD_HEADER_SIZE];
        head.put_u16_le(name.len() as u16);
        head.put_slice(name);
        head.put_bytes(0, PID_OFFSET - NAME_OFFSET - name.len());
        head.put_u32_le(self.pid);
        head.put_u32_le(self.shm_size);
        head.put_u32_le(self.nbytes);
        head.put_u32_le(self.ybytes);
        Ok(())
    }

    /// Parse the header at the start of `src`.
    pub fn read_from(src: &[u8]) -> Result<Self> {
        if src.len() < RECORD_HEADER_SIZE {
            return Err(SryError::ProtocolViolation(format!(
                "segment of {} bytes cannot hold a message record",
                src.len()
            )));
        }
        let mut head = &src[..RECORD_HEADER_SIZE];
        let name_len = usize::from(head.get_u16_le());
        if name_len > MAX_NAME_LEN {
            return Err(SryError::ProtocolViolation(format!(
                "sender name length {name_len} exceeds {MAX_NAME_LEN}"
            )));
        }
        let sender = String::from_utf8_lossy(&head[..name_len]).into_owned();
        head.advance(PID_OFFSET - NAME_OFFSET);
        Ok(Self {
            sender,
            pid: head.get_u32_le(),
            shm_size: head.get_u32_le(),
            nbytes: head.get_u32_le(),
            ybytes: head.get_u32_le(),
        })
    }
}

/// Overwrite only the `nbytes` field, as a receiver does when replying.
pub fn set_nbytes(dst: &mut [u8], nbytes: u32) {
    dst[112..116].copy_from_slice(&nbytes.to_le_bytes());
}

/// Payload region following the header, clipped to `len` bytes.
pub fn payload(segment: &[u8], len: usize) -> Result<&[u8]> {
    segment
        .get(RECORD_HEADER_SIZE..RECORD_HEADER_SIZE + len)
        .ok_or_else(|| {
            SryError::ProtocolViolation(format!(
                "record claims {len} payload bytes but the segment holds {}",
                segment.len().saturating_sub(RECORD_HEADER_SIZE)
            ))
        })
}
