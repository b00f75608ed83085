//! The byte links surrogate sessions talk over.

use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::os::fd::{AsFd, BorrowedFd};
use std::sync::Arc;
use std::time::Duration;

use simpl_wire::{Frame, FrameReader, FrameWriter};
use tracing::debug;

use crate::config::SurrogateConfig;
use crate::error::{Result, SurrogateError};

/// A framed, bidirectional link owned by one session.
pub trait Link: Send {
    /// Descriptor to poll for incoming frames.
    fn poll_fd(&self) -> BorrowedFd<'_>;

    /// Block until the next frame arrives.
    fn read_frame(&mut self) -> Result<Frame>;

    fn write_frame(&mut self, frame: &Frame) -> Result<()>;

    /// Whether a complete frame is already buffered and a poll would miss
    /// it.
    fn has_buffered_frame(&self) -> bool;
}

/// Opens the link an outbound session negotiates over.
pub trait Connector: Send + Sync {
    /// Reach the surrogate listener on `host` for session `session_id`.
    fn connect(&self, host: &str, session_id: u32) -> Result<Box<dyn Link>>;
}

/// A session's TCP connection.
pub struct TcpLink {
    reader: FrameReader<TcpStream>,
    writer: FrameWriter<TcpStream>,
    peer: Option<SocketAddr>,
}

impl TcpLink {
    pub fn new(stream: TcpStream, config: &SurrogateConfig) -> Result<Self> {
        stream.set_nodelay(true)?;
        let peer = stream.peer_addr().ok();
        let reader = FrameReader::new(stream.try_clone()?, config.max_frame_payload());
        let writer = FrameWriter::new(stream);
        Ok(Self {
            reader,
            writer,
            peer,
        })
    }

    /// Block for the next frame for at most `timeout`.
    pub fn read_frame_within(&mut self, timeout: Duration) -> Result<Frame> {
        self.reader.get_ref().set_read_timeout(Some(timeout))?;
        let frame = self.reader.read_frame();
        self.reader.get_ref().set_read_timeout(None)?;
        Ok(frame?)
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer
    }
}

impl Link for TcpLink {
    fn poll_fd(&self) -> BorrowedFd<'_> {
        self.reader.get_ref().as_fd()
    }

    fn read_frame(&mut self) -> Result<Frame> {
        Ok(self.reader.read_frame()?)
    }

    fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        Ok(self.writer.write_frame(frame)?)
    }

    fn has_buffered_frame(&self) -> bool {
        self.reader.has_buffered_frame()
    }
}

/// Connects outbound sessions to the TCP surrogate on the target host.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    config: Arc<SurrogateConfig>,
}

impl TcpConnector {
    pub fn new(config: Arc<SurrogateConfig>) -> Self {
        Self { config }
    }
}

impl Connector for TcpConnector {
    fn connect(&self, host: &str, session_id: u32) -> Result<Box<dyn Link>> {
        let port = self.config.port;
        let connect_err = |source| SurrogateError::Connect {
            host: host.to_string(),
            port,
            source,
        };
        let addrs: Vec<_> = (host, port)
            .to_socket_addrs()
            .map_err(connect_err)?
            .collect();

        let mut last_err = None;
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, self.config.nameloc_timeout) {
                Ok(stream) => {
                    debug!(session_id, %addr, "connected to remote surrogate");
                    return Ok(Box::new(TcpLink::new(stream, &self.config)?));
                }
                Err(err) => last_err = Some(err),
            }
        }
        Err(connect_err(last_err.unwrap_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::NotFound, "host resolved to no address")
        })))
    }
}
