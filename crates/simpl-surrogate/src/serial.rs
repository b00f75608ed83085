//! Serial-line surrogate plumbing.
//!
//! One serial line carries every session between two hosts. A single
//! reader thread owns the receive side and routes each frame to its session
//! by `remote_id`; NAME_LOCATE frames start a new inbound session instead.
//! Sessions share the write side under a lock so frames never interleave.
//!
//! Line noise that breaks a header is skipped up to the next plausible
//! header. When the line itself goes away every route is closed and the
//! serial station is stopped.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::os::fd::{AsFd, AsRawFd, BorrowedFd};
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

use bytes::BytesMut;
use simpl_sry::{Protocol, Sry, SryConfig};
use simpl_wire::{encode_frame, Frame, FrameReader, FrameWriter, NameLocateRequest, Token, WireError};
use tracing::{debug, info, warn};

use crate::config::SurrogateConfig;
use crate::error::{Result, SurrogateError};
use crate::inbound::Inbound;
use crate::link::{Connector, Link};
use crate::session::{register_session, spawn_session};
use crate::station::{stop_station, Station};

/// Open `device` as a raw 8N1 line with hardware flow control.
pub fn open_serial(device: &Path, baud: u32) -> Result<File> {
    let serial_err = |source| SurrogateError::Serial {
        device: device.to_path_buf(),
        source,
    };
    let speed = baud_constant(baud).ok_or_else(|| {
        serial_err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("unsupported baud rate {baud}"),
        ))
    })?;

    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .custom_flags(libc::O_NOCTTY)
        .open(device)
        .map_err(serial_err)?;
    let fd = file.as_raw_fd();

    // SAFETY: `termios` is plain old data; zeroed is a valid value.
    let mut tio: libc::termios = unsafe { std::mem::zeroed() };
    tio.c_cflag = libc::CS8 | libc::CLOCAL | libc::CREAD | libc::CRTSCTS;
    tio.c_iflag = libc::IGNPAR;
    tio.c_oflag = 0;
    tio.c_lflag = 0;
    tio.c_cc[libc::VMIN] = 1;
    tio.c_cc[libc::VTIME] = 0;

    // SAFETY: `tio` is a valid termios and `fd` stays open for these calls.
    let rc = unsafe {
        if libc::cfsetispeed(&mut tio, speed) < 0 || libc::cfsetospeed(&mut tio, speed) < 0 {
            -1
        } else {
            libc::tcflush(fd, libc::TCIFLUSH);
            libc::tcsetattr(fd, libc::TCSANOW, &tio)
        }
    };
    if rc < 0 {
        return Err(serial_err(std::io::Error::last_os_error()));
    }

    info!(device = %device.display(), baud, "serial line configured");
    Ok(file)
}

fn baud_constant(baud: u32) -> Option<libc::speed_t> {
    Some(match baud {
        1200 => libc::B1200,
        2400 => libc::B2400,
        4800 => libc::B4800,
        9600 => libc::B9600,
        19200 => libc::B19200,
        38400 => libc::B38400,
        57600 => libc::B57600,
        115200 => libc::B115200,
        _ => return None,
    })
}

type SharedWriter = Arc<Mutex<FrameWriter<Box<dyn Write + Send>>>>;

/// Demultiplexes one serial line into per-session links.
pub struct SerialMux {
    writer: SharedWriter,
    routes: Mutex<HashMap<u32, Arc<UnixStream>>>,
    line_down: AtomicBool,
    config: Arc<SurrogateConfig>,
    sry_config: SryConfig,
}

impl SerialMux {
    /// Start routing frames read from `reader`. Frames sessions write go to
    /// `writer`.
    pub fn start(
        reader: impl Read + Send + 'static,
        writer: impl Write + Send + 'static,
        config: Arc<SurrogateConfig>,
        sry_config: SryConfig,
    ) -> Result<Arc<Self>> {
        let writer: Box<dyn Write + Send> = Box::new(writer);
        let mux = Arc::new(Self {
            writer: Arc::new(Mutex::new(FrameWriter::new(writer))),
            routes: Mutex::new(HashMap::new()),
            line_down: AtomicBool::new(false),
            sry_config,
            config,
        });

        let reader = FrameReader::new(reader, mux.config.max_frame_payload());
        let pump = Arc::clone(&mux);
        thread::Builder::new()
            .name("serial-demux".to_string())
            .spawn(move || pump.pump(reader))?;
        Ok(mux)
    }

    /// Open the link for session `id`.
    pub fn open_route(self: &Arc<Self>, id: u32) -> Result<SerialLink> {
        let (session_end, mux_end) = UnixStream::pair()?;
        lock(&self.routes).insert(id, Arc::new(mux_end));
        Ok(SerialLink {
            reader: FrameReader::new(session_end, self.config.max_frame_payload()),
            writer: Arc::clone(&self.writer),
            mux: Arc::clone(self),
            id,
        })
    }

    /// Number of sessions currently routed.
    pub fn route_count(&self) -> usize {
        lock(&self.routes).len()
    }

    /// Whether the pump has stopped because the line is gone.
    pub fn is_line_down(&self) -> bool {
        self.line_down.load(Ordering::SeqCst)
    }

    fn close_route(&self, id: u32) {
        lock(&self.routes).remove(&id);
    }

    fn pump<R: Read>(self: Arc<Self>, mut reader: FrameReader<R>) {
        loop {
            let frame = match reader.read_frame() {
                Ok(frame) => frame,
                Err(WireError::ConnectionClosed) => {
                    info!("serial line closed");
                    break;
                }
                Err(err @ WireError::Io(_)) => {
                    warn!(error = %err, "serial line unreadable");
                    break;
                }
                Err(err) => {
                    let dropped = reader.discard_to_next_header();
                    warn!(error = %err, dropped, "skipped corrupt bytes on the serial line");
                    continue;
                }
            };
            if frame.token == Token::NameLocate {
                if let Err(err) = self.accept(frame) {
                    warn!(error = %err, "could not start inbound session");
                }
            } else {
                self.route(frame);
            }
        }
        self.line_down.store(true, Ordering::SeqCst);
        // Dropping the mux ends of every route shows each session EOF.
        lock(&self.routes).clear();
        if let Err(err) = stop_station(Protocol::Serial, &self.sry_config) {
            debug!(error = %err, "no serial station to stop");
        }
    }

    fn accept(self: &Arc<Self>, frame: Frame) -> Result<()> {
        let request = NameLocateRequest::decode(&frame.payload)?;
        let requester = frame.remote_id;
        let (id, sry) = register_session(Protocol::Serial.inbound_prefix(), &self.sry_config)?;
        let link = self.open_route(id)?;
        let session = Inbound::new(id, sry, Box::new(link), Arc::clone(&self.config));
        spawn_session("inbound", id, move || session.run(request, requester))?;
        Ok(())
    }

    fn route(&self, frame: Frame) {
        let Some(stream) = lock(&self.routes).get(&frame.remote_id).cloned() else {
            debug!(remote_id = frame.remote_id, token = %frame.token, "frame for unknown session");
            return;
        };
        // Written outside the routes lock.
        let mut encoded = BytesMut::with_capacity(frame.wire_size());
        let delivered = encode_frame(&frame, &mut encoded)
            .map_err(SurrogateError::from)
            .and_then(|()| Ok((&*stream).write_all(&encoded)?));
        if let Err(err) = delivered {
            debug!(remote_id = frame.remote_id, error = %err, "session route gone");
            let mut routes = lock(&self.routes);
            if routes
                .get(&frame.remote_id)
                .is_some_and(|current| Arc::ptr_eq(current, &stream))
            {
                routes.remove(&frame.remote_id);
            }
        }
    }
}

/// One session's view of the shared serial line.
pub struct SerialLink {
    reader: FrameReader<UnixStream>,
    writer: SharedWriter,
    mux: Arc<SerialMux>,
    id: u32,
}

impl SerialLink {
    pub fn id(&self) -> u32 {
        self.id
    }
}

impl Link for SerialLink {
    fn poll_fd(&self) -> BorrowedFd<'_> {
        self.reader.get_ref().as_fd()
    }

    fn read_frame(&mut self) -> Result<Frame> {
        Ok(self.reader.read_frame()?)
    }

    fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        Ok(lock(&self.writer).write_frame(frame)?)
    }

    fn has_buffered_frame(&self) -> bool {
        self.reader.has_buffered_frame()
    }
}

impl Drop for SerialLink {
    fn drop(&mut self) {
        self.mux.close_route(self.id);
    }
}

/// Opens outbound sessions on the serial line. The line is point to point,
/// so the host name only labels the session.
pub struct SerialConnector {
    mux: Arc<SerialMux>,
}

impl SerialConnector {
    pub fn new(mux: Arc<SerialMux>) -> Self {
        Self { mux }
    }
}

impl Connector for SerialConnector {
    fn connect(&self, host: &str, session_id: u32) -> Result<Box<dyn Link>> {
        if self.mux.is_line_down() {
            return Err(SurrogateError::Io(std::io::Error::new(
                std::io::ErrorKind::NotConnected,
                "serial line is down",
            )));
        }
        debug!(host, session_id, "opening serial route");
        Ok(Box::new(self.mux.open_route(session_id)?))
    }
}

/// A running serial surrogate.
pub struct SerialSurrogate {
    mux: Arc<SerialMux>,
    presence: Sry,
    sry_config: SryConfig,
    station: Option<JoinHandle<Result<()>>>,
}

impl SerialSurrogate {
    /// Open the configured device and serve it.
    pub fn start(config: SurrogateConfig, sry_config: SryConfig) -> Result<Self> {
        let port = open_serial(&config.device, config.baud)?;
        let reader = port.try_clone().map_err(|source| SurrogateError::Serial {
            device: config.device.clone(),
            source,
        })?;
        Self::over(reader, port, config, sry_config)
    }

    /// Serve an already open line.
    pub fn over(
        reader: impl Read + Send + 'static,
        writer: impl Write + Send + 'static,
        config: SurrogateConfig,
        sry_config: SryConfig,
    ) -> Result<Self> {
        let presence = Sry::open_with_config(Protocol::Serial.listener(), sry_config.clone())?;
        let config = Arc::new(config);
        let mux = SerialMux::start(reader, writer, Arc::clone(&config), sry_config.clone())?;
        let station = Station::open(
            Protocol::Serial,
            Arc::new(SerialConnector::new(Arc::clone(&mux))),
            config,
            sry_config.clone(),
        )?;
        let station = thread::Builder::new()
            .name("serial-station".to_string())
            .spawn(move || station.run())?;
        Ok(Self {
            mux,
            presence,
            sry_config,
            station: Some(station),
        })
    }

    pub fn mux(&self) -> &Arc<SerialMux> {
        &self.mux
    }

    /// Block until the station shuts down.
    pub fn wait(mut self) -> Result<()> {
        self.join_station()
    }

    /// Stop the station.
    pub fn shutdown(mut self) -> Result<()> {
        if let Err(err) = stop_station(Protocol::Serial, &self.sry_config) {
            debug!(error = %err, "station already stopped");
        }
        self.join_station()
    }

    fn join_station(&mut self) -> Result<()> {
        let result = match self.station.take().map(JoinHandle::join) {
            Some(Ok(result)) => result,
            Some(Err(_)) => Err(SurrogateError::Protocol("station thread panicked".to_string())),
            None => Ok(()),
        };
        if let Err(err) = self.presence.close() {
            debug!(error = %err, "listener name already released");
        }
        result
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
