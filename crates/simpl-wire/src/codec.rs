use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{Result, WireError};
use crate::token::Token;

/// Width of every numeric field in bytes.
pub const FIELD_WIDTH: usize = 12;

/// Header: token + nbytes + ybytes + remote id, 12 bytes each.
pub const HEADER_SIZE: usize = 4 * FIELD_WIDTH;

/// One surrogate message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub token: Token,
    /// Reply capacity the sender declared (`Send`), otherwise informational.
    pub ybytes: usize,
    /// Session id of the addressee on the receiving side of the link.
    pub remote_id: u32,
    pub payload: Bytes,
}

impl Frame {
    pub fn new(token: Token, remote_id: u32, payload: impl Into<Bytes>) -> Self {
        Self {
            token,
            ybytes: 0,
            remote_id,
            payload: payload.into(),
        }
    }

    /// A payload-less control frame (`Close`, `Error`, `Alive`, ...).
    pub fn control(token: Token, remote_id: u32) -> Self {
        Self::new(token, remote_id, Bytes::new())
    }

    pub fn with_ybytes(mut self, ybytes: usize) -> Self {
        self.ybytes = ybytes;
        self
    }

    /// The total wire size of this frame (header + payload).
    pub fn wire_size(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }
}

/// Encode a frame into the wire format.
///
/// ```text
/// ┌────────────┬────────────┬────────────┬────────────┬──────────────┐
/// │ token (12) │ nbytes (12)│ ybytes (12)│ remote (12)│ payload      │
/// │ ASCII dec, NUL padded                             │ nbytes bytes │
/// └────────────┴────────────┴────────────┴────────────┴──────────────┘
/// ```
pub fn encode_frame(frame: &Frame, dst: &mut BytesMut) -> Result<()> {
    dst.reserve(frame.wire_size());
    put_field(dst, "token", frame.token.code())?;
    put_field(dst, "nbytes", len_to_i64(frame.payload.len()))?;
    put_field(dst, "ybytes", len_to_i64(frame.ybytes))?;
    put_field(dst, "remote_id", i64::from(frame.remote_id))?;
    dst.put_slice(&frame.payload);
    Ok(())
}

/// Decode a frame from a buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete frame yet.
/// On success, consumes the frame bytes from the buffer.
pub fn decode_frame(src: &mut BytesMut, max_payload: usize) -> Result<Option<Frame>> {
    if src.len() < HEADER_SIZE {
        return Ok(None);
    }

    let header = parse_header(&src[..HEADER_SIZE])?;
    if header.nbytes > max_payload {
        return Err(WireError::PayloadTooLarge {
            size: header.nbytes,
            max: max_payload,
        });
    }

    if src.len() < HEADER_SIZE + header.nbytes {
        return Ok(None);
    }

    src.advance(HEADER_SIZE);
    let payload = src.split_to(header.nbytes).freeze();

    Ok(Some(Frame {
        token: header.token,
        ybytes: header.ybytes,
        remote_id: header.remote_id,
        payload,
    }))
}

/// The four header fields, before the payload is read.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Header {
    pub token: Token,
    pub nbytes: usize,
    pub ybytes: usize,
    pub remote_id: u32,
}

pub(crate) fn parse_header(raw: &[u8]) -> Result<Header> {
    Ok(Header {
        token: Token::from_code(parse_field("token", &raw[..FIELD_WIDTH])?)?,
        nbytes: parse_len("nbytes", &raw[FIELD_WIDTH..2 * FIELD_WIDTH])?,
        ybytes: parse_len("ybytes", &raw[2 * FIELD_WIDTH..3 * FIELD_WIDTH])?,
        remote_id: parse_id("remote_id", &raw[3 * FIELD_WIDTH..HEADER_SIZE])?,
    })
}

/// Whether a frame header could start at the front of `src`.
///
/// A complete header must parse and fit `max_payload`. Fewer bytes than a
/// header only have to open like a token field: one digit, then NUL.
pub(crate) fn could_start_header(src: &[u8], max_payload: usize) -> bool {
    if src.len() >= HEADER_SIZE {
        return parse_header(&src[..HEADER_SIZE]).is_ok_and(|h| h.nbytes <= max_payload);
    }
    match src {
        [] => false,
        [digit] => digit.is_ascii_digit(),
        [digit, next, ..] => digit.is_ascii_digit() && *next == 0,
    }
}

/// Write `value` as a left-aligned ASCII decimal, NUL padded to
/// [`FIELD_WIDTH`]. At least one NUL always terminates the digits.
pub fn put_field(dst: &mut impl BufMut, field: &'static str, value: i64) -> Result<()> {
    put_text(dst, field, &value.to_string(), FIELD_WIDTH)
}

/// Write a NUL-terminated string into a fixed-width slot.
pub fn put_text(dst: &mut impl BufMut, field: &'static str, text: &str, width: usize) -> Result<()> {
    let bytes = text.as_bytes();
    if bytes.len() >= width || bytes.contains(&0) {
        return Err(WireError::FieldOverflow {
            field,
            value: text.to_string(),
            width,
        });
    }
    dst.put_slice(bytes);
    dst.put_bytes(0, width - bytes.len());
    Ok(())
}

/// Read a NUL-terminated string from a fixed-width slot.
pub fn parse_text(field: &'static str, raw: &[u8]) -> Result<String> {
    let end = raw.iter().position(|b| *b == 0).unwrap_or(raw.len());
    std::str::from_utf8(&raw[..end])
        .map(str::to_string)
        .map_err(|_| WireError::InvalidField {
            field,
            raw: String::from_utf8_lossy(raw).into_owned(),
        })
}

/// Parse a fixed-width ASCII decimal field.
pub fn parse_field(field: &'static str, raw: &[u8]) -> Result<i64> {
    let invalid = || WireError::InvalidField {
        field,
        raw: String::from_utf8_lossy(raw).into_owned(),
    };
    let text = parse_text(field, raw)?;
    let text = text.trim();
    if text.is_empty() {
        return Err(invalid());
    }
    text.parse().map_err(|_| invalid())
}

fn parse_len(field: &'static str, raw: &[u8]) -> Result<usize> {
    let value = parse_field(field, raw)?;
    usize::try_from(value).map_err(|_| WireError::InvalidField {
        field,
        raw: value.to_string(),
    })
}

fn parse_id(field: &'static str, raw: &[u8]) -> Result<u32> {
    let value = parse_field(field, raw)?;
    u32::try_from(value).map_err(|_| WireError::InvalidField {
        field,
        raw: value.to_string(),
    })
}

fn len_to_i64(len: usize) -> i64 {
    i64::try_from(len).unwrap_or(i64::MAX)
}
