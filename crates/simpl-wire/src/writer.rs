use std::io::{ErrorKind, Write};

use bytes::BytesMut;

use crate::codec::{encode_frame, Frame};
use crate::error::{Result, WireError};

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;

/// Writes whole frames to a link.
///
/// Header and payload go out from one buffer, so sessions sharing a line
/// behind a lock never interleave mid-frame.
pub struct FrameWriter<T> {
    inner: T,
    buf: BytesMut,
}

impl<T: Write> FrameWriter<T> {
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
        }
    }

    /// Write a complete frame (blocking) and flush it.
    pub fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        self.buf.clear();
        encode_frame(frame, &mut self.buf)?;

        let mut offset = 0usize;
        while offset < self.buf.len() {
            match self.inner.write(&self.buf[offset..]) {
                Ok(0) => return Err(WireError::ConnectionClosed),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::BrokenPipe => {
                    return Err(WireError::ConnectionClosed)
                }
                Err(err) => return Err(WireError::Io(err)),
            }
        }

        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(WireError::Io(err)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use super::*;
    use crate::codec::decode_frame;
    use crate::token::Token;

    #[test]
    fn write_single_frame() {
        let mut out = Vec::new();
        FrameWriter::new(&mut out)
            .write_frame(&Frame::new(Token::Reply, 1, "hello"))
            .unwrap();

        let mut wire = BytesMut::from(out.as_slice());
        let frame = decode_frame(&mut wire, usize::MAX).unwrap().unwrap();
        assert_eq!(frame.token, Token::Reply);
        assert_eq!(frame.payload.as_ref(), b"hello");
    }

    #[test]
    fn consecutive_frames_stay_whole() {
        let mut out = Vec::new();
        let mut writer = FrameWriter::new(&mut out);
        writer
            .write_frame(&Frame::new(Token::Send, 4, "first").with_ybytes(16))
            .unwrap();
        writer.write_frame(&Frame::control(Token::Close, 4)).unwrap();
        drop(writer);

        let mut wire = BytesMut::from(out.as_slice());
        let first = decode_frame(&mut wire, usize::MAX).unwrap().unwrap();
        assert_eq!(first.payload.as_ref(), b"first");
        assert_eq!(first.ybytes, 16);
        let second = decode_frame(&mut wire, usize::MAX).unwrap().unwrap();
        assert_eq!(second.token, Token::Close);
        assert!(wire.is_empty());
    }

    #[test]
    fn flush_propagates() {
        let sink = FlushTrackingWriter::default();
        let flag = Arc::clone(&sink.flushed);
        let mut writer = FrameWriter::new(sink);

        writer.write_frame(&Frame::control(Token::Alive, 0)).unwrap();

        assert!(flag.load(Ordering::SeqCst));
    }

    #[test]
    fn connection_closed_when_write_returns_zero() {
        let mut writer = FrameWriter::new(ZeroWriter);
        let err = writer
            .write_frame(&Frame::control(Token::Alive, 0))
            .unwrap_err();
        assert!(matches!(err, WireError::ConnectionClosed));
    }

    #[test]
    fn broken_pipe_is_connection_closed() {
        let (a, b) = std::os::unix::net::UnixStream::pair().unwrap();
        drop(b);
        let mut writer = FrameWriter::new(a);
        let err = writer
            .write_frame(&Frame::control(Token::Close, 2))
            .unwrap_err();
        assert!(matches!(err, WireError::ConnectionClosed));
    }

    #[test]
    fn handles_interrupted_write() {
        let mut sink = InterruptedOnce {
            tripped: false,
            data: Vec::new(),
        };
        FrameWriter::new(&mut sink)
            .write_frame(&Frame::new(Token::Send, 5, "retry"))
            .unwrap();
        assert!(sink.tripped);
        assert!(!sink.data.is_empty());
    }

    #[derive(Default)]
    struct FlushTrackingWriter {
        flushed: Arc<AtomicBool>,
    }

    impl Write for FlushTrackingWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            self.flushed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    struct ZeroWriter;

    impl Write for ZeroWriter {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Ok(0)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    struct InterruptedOnce {
        tripped: bool,
        data: Vec<u8>,
    }

    impl Write for InterruptedOnce {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            if !self.tripped {
                self.tripped = true;
                return Err(std::io::Error::from(ErrorKind::Interrupted));
            }
            self.data.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }
}
