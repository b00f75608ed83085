use std::io::{ErrorKind, Read};

use bytes::{Buf, BytesMut};

use crate::codec::{could_start_header, decode_frame, parse_header, Frame, HEADER_SIZE};
use crate::error::{Result, WireError};

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;
const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Reads complete frames from a link.
///
/// Partial reads are buffered; callers always get whole frames. A header
/// that fails to decode stays in the buffer until the caller either gives
/// up on the link or calls [`discard_to_next_header`](Self::discard_to_next_header).
pub struct FrameReader<T> {
    inner: T,
    buf: BytesMut,
    max_payload: usize,
}

impl<T: Read> FrameReader<T> {
    /// Reader refusing frames whose payload exceeds `max_payload`.
    pub fn new(inner: T, max_payload: usize) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            max_payload,
        }
    }

    /// Read the next complete frame (blocking).
    ///
    /// Returns `Err(WireError::ConnectionClosed)` when EOF is reached.
    pub fn read_frame(&mut self) -> Result<Frame> {
        loop {
            if let Some(frame) = decode_frame(&mut self.buf, self.max_payload)? {
                return Ok(frame);
            }

            let mut chunk = [0u8; READ_CHUNK_SIZE];
            let read = match self.inner.read(&mut chunk) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(WireError::Io(err)),
            };

            if read == 0 {
                return Err(WireError::ConnectionClosed);
            }

            self.buf.extend_from_slice(&chunk[..read]);
        }
    }

    /// True when a complete frame (or an undecodable header) is already
    /// buffered, so a readiness check on the descriptor would miss it.
    pub fn has_buffered_frame(&self) -> bool {
        if self.buf.len() < HEADER_SIZE {
            return false;
        }
        match parse_header(&self.buf[..HEADER_SIZE]) {
            Ok(header) => {
                header.nbytes > self.max_payload || self.buf.len() >= HEADER_SIZE + header.nbytes
            }
            Err(_) => true,
        }
    }

    /// Drop buffered bytes up to the next offset where a header could
    /// start, skipping at least one byte. Returns how many were dropped.
    ///
    /// Used after a decode error on a line that cannot be reopened.
    pub fn discard_to_next_header(&mut self) -> usize {
        let skip = (1..self.buf.len())
            .find(|&at| could_start_header(&self.buf[at..], self.max_payload))
            .unwrap_or(self.buf.len());
        self.buf.advance(skip);
        skip
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }
}
