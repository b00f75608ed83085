//! The one-word trigger record carried over a FIFO.
//!
//! On the wire a signal is a single native-endian `i32`:
//!
//! ```text
//!   x >= 0   segment handle (request line) / reply ok (reply line)
//!   x == -1  reply failed
//!   x <= -2  proxy with value abs(x + 1)
//! ```
//!
//! The integer form only exists at the FIFO boundary; everything above it
//! works with [`Signal`].

/// Size of one signal record in bytes.
pub const SIGNAL_SIZE: usize = std::mem::size_of::<i32>();

/// Proxy value that asks a receiver to shut down in an orderly way.
pub const PROXY_SHUTDOWN: u32 = 0x7FFF_FFF1;

/// Largest proxy value that can be encoded.
pub const MAX_PROXY: u32 = (i32::MAX - 1) as u32;

const REPLY_ERROR: i32 = -1;

/// Identifier of a SysV shared-memory segment (`shmid`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SegmentHandle(i32);

impl SegmentHandle {
    /// Wrap a raw segment id. Negative ids are not segment handles.
    pub fn new(raw: i32) -> Option<Self> {
        (raw >= 0).then_some(Self(raw))
    }

    /// The raw `shmid`.
    pub fn raw(self) -> i32 {
        self.0
    }
}

/// A decoded trigger record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// A message waiting in the named segment, or a successful reply.
    Message(SegmentHandle),
    /// The receiver could not complete the exchange.
    ReplyError,
    /// A fire-and-forget notification.
    Proxy(u32),
}

impl Signal {
    /// Encode into the integer wire form.
    ///
    /// Proxy values must lie in `1..=MAX_PROXY`; use [`encode_proxy`] to
    /// validate user input first.
    pub fn to_raw(self) -> i32 {
        match self {
            Signal::Message(handle) => handle.raw(),
            Signal::ReplyError => REPLY_ERROR,
            Signal::Proxy(value) => encode_proxy(value).unwrap_or(REPLY_ERROR),
        }
    }

    /// Decode the integer wire form.
    pub fn from_raw(raw: i32) -> Self {
        if raw >= 0 {
            Signal::Message(SegmentHandle(raw))
        } else if raw == REPLY_ERROR {
            Signal::ReplyError
        } else {
            Signal::Proxy(raw.unsigned_abs() - 1)
        }
    }

    pub fn to_bytes(self) -> [u8; SIGNAL_SIZE] {
        self.to_raw().to_ne_bytes()
    }

    pub fn from_bytes(bytes: [u8; SIGNAL_SIZE]) -> Self {
        Self::from_raw(i32::from_ne_bytes(bytes))
    }
}

/// Encode a proxy value as `-(value + 1)`.
///
/// Returns `None` for `0` and for values above [`MAX_PROXY`].
pub fn encode_proxy(value: u32) -> Option<i32> {
    if value == 0 || value > MAX_PROXY {
        return None;
    }
    Some(-(value as i32) - 1)
}

/// Decode an encoded proxy: `abs(encoded + 1)`; `None` when `encoded > -2`.
pub fn return_proxy(encoded: i32) -> Option<u32> {
    if encoded > -2 {
        return None;
    }
    Some((encoded + 1).unsigned_abs())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_proxy_encoding_avoids_handle_and_error_domain() {
        for value in [1, 2, 3, 17, 4096, PROXY_SHUTDOWN, MAX_PROXY] {
            let encoded = encode_proxy(value).unwrap();
            assert!(encoded <= -2, "{value} encoded to {encoded}");
            assert_eq!(return_proxy(encoded), Some(value));
        }
    }

    #[test]
    fn test_encode_proxy_rejects_out_of_range() {
        assert_eq!(encode_proxy(0), None);
        assert_eq!(encode_proxy(MAX_PROXY + 1), None);
        assert_eq!(encode_proxy(u32::MAX), None);
    }

    #[test]
    fn test_return_proxy_rejects_non_proxies() {
        assert_eq!(return_proxy(-1), None);
        assert_eq!(return_proxy(0), None);
        assert_eq!(return_proxy(42), None);
        assert_eq!(return_proxy(-2), Some(1));
    }

    #[test]
    fn test_signal_decode_partitions_integer_line() {
        assert_eq!(
            Signal::from_raw(0),
            Signal::Message(SegmentHandle::new(0).unwrap())
        );
        assert_eq!(Signal::from_raw(-1), Signal::ReplyError);
        assert_eq!(Signal::from_raw(-2), Signal::Proxy(1));
        assert_eq!(Signal::from_raw(i32::MIN + 1), Signal::Proxy(MAX_PROXY));
    }

    #[test]
    fn test_signal_bytes_roundtrip() {
        let signals = [
            Signal::Message(SegmentHandle::new(98_310).unwrap()),
            Signal::ReplyError,
            Signal::Proxy(PROXY_SHUTDOWN),
        ];
        for signal in signals {
            assert_eq!(Signal::from_bytes(signal.to_bytes()), signal);
        }
    }

    #[test]
    fn test_segment_handle_rejects_negative() {
        assert!(SegmentHandle::new(-5).is_none());
        assert_eq!(SegmentHandle::new(7).map(SegmentHandle::raw), Some(7));
    }
}
