//! The TCP surrogate: a listener that starts inbound sessions plus the
//! station that hands out outbound ones.

use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use simpl_sry::{Protocol, Sry, SryConfig};
use simpl_wire::{NameLocateRequest, Token};
use tracing::{debug, info, warn};

use crate::config::SurrogateConfig;
use crate::error::{Result, SurrogateError};
use crate::inbound::Inbound;
use crate::link::{TcpConnector, TcpLink};
use crate::session::{register_session, spawn_session};
use crate::station::{stop_station, Station};

/// A running TCP surrogate. The listener name is held for as long as it
/// runs, so a second surrogate on the same host is refused.
pub struct TcpSurrogate {
    addr: SocketAddr,
    presence: Sry,
    sry_config: SryConfig,
    stop: Arc<AtomicBool>,
    station: Option<JoinHandle<Result<()>>>,
    listener: Option<JoinHandle<()>>,
}

impl TcpSurrogate {
    /// Bind the listener and register the station.
    ///
    /// Port 0 binds an ephemeral port; outbound sessions then dial that same
    /// port, which suits loopback use.
    pub fn start(config: SurrogateConfig, sry_config: SryConfig) -> Result<Self> {
        let presence = Sry::open_with_config(Protocol::Tcp.listener(), sry_config.clone())?;
        let listener = bind(&config)?;
        let addr = listener.local_addr()?;
        let config = Arc::new(config.with_port(addr.port()));

        let station = Station::open(
            Protocol::Tcp,
            Arc::new(TcpConnector::new(Arc::clone(&config))),
            Arc::clone(&config),
            sry_config.clone(),
        )?;
        let station = thread::Builder::new()
            .name("tcp-station".to_string())
            .spawn(move || station.run())?;

        let stop = Arc::new(AtomicBool::new(false));
        let listener = {
            let stop = Arc::clone(&stop);
            let sry_config = sry_config.clone();
            thread::Builder::new()
                .name("tcp-listener".to_string())
                .spawn(move || accept_loop(listener, &stop, &config, &sry_config))?
        };

        info!(%addr, "tcp surrogate listening");
        Ok(Self {
            addr,
            presence,
            sry_config,
            stop,
            station: Some(station),
            listener: Some(listener),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Block until the station shuts down, then stop listening.
    pub fn wait(mut self) -> Result<()> {
        let result = self.join_station();
        self.stop_listener();
        result
    }

    /// Stop the station and the listener.
    pub fn shutdown(mut self) -> Result<()> {
        if let Err(err) = stop_station(Protocol::Tcp, &self.sry_config) {
            debug!(error = %err, "station already stopped");
        }
        let result = self.join_station();
        self.stop_listener();
        result
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

    fn stop_listener(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        let mut wake = self.addr;
        if wake.ip().is_unspecified() {
            wake.set_ip(if wake.is_ipv6() {
                std::net::Ipv6Addr::LOCALHOST.into()
            } else {
                std::net::Ipv4Addr::LOCALHOST.into()
            });
        }
        // Unblock accept so the loop sees the flag.
        let _ = TcpStream::connect(wake);
        if let Some(listener) = self.listener.take() {
            let _ = listener.join();
        }
    }
}

fn bind(config: &SurrogateConfig) -> Result<TcpListener> {
    match TcpListener::bind((config.bind_host.as_str(), config.port)) {
        Ok(listener) => Ok(listener),
        Err(err) if config.bind_host == "::" => {
            debug!(error = %err, "no IPv6, falling back to IPv4");
            TcpListener::bind(("0.0.0.0", config.port)).map_err(|source| SurrogateError::Listen {
                port: config.port,
                source,
            })
        }
        Err(source) => Err(SurrogateError::Listen {
            port: config.port,
            source,
        }),
    }
}

fn accept_loop(
    listener: TcpListener,
    stop: &AtomicBool,
    config: &Arc<SurrogateConfig>,
    sry_config: &SryConfig,
) {
    for stream in listener.incoming() {
        if stop.load(Ordering::SeqCst) {
            break;
        }
        let stream = match stream {
            Ok(stream) => stream,
            Err(err) => {
                warn!(error = %err, "accept failed");
                continue;
            }
        };
        let config = Arc::clone(config);
        let sry_config = sry_config.clone();
        let spawned = thread::Builder::new()
            .name("tcp-accept".to_string())
            .spawn(move || {
                if let Err(err) = accept_session(stream, config, &sry_config) {
                    warn!(error = %err, "rejected inbound connection");
                }
            });
        if let Err(err) = spawned {
            warn!(error = %err, "could not spawn connection handler");
        }
    }
    debug!("tcp listener stopped");
}

/// Read the opening NAME_LOCATE of a new connection and start its session.
fn accept_session(stream: TcpStream, config: Arc<SurrogateConfig>, sry_config: &SryConfig) -> Result<()> {
    let mut link = TcpLink::new(stream, &config)?;
    let peer = link.peer_addr();
    let frame = link.read_frame_within(config.nameloc_timeout)?;
    if frame.token != Token::NameLocate {
        return Err(SurrogateError::Protocol(format!(
            "connection opened with {} instead of NAME_LOCATE",
            frame.token
        )));
    }
    let request = NameLocateRequest::decode(&frame.payload)?;
    let (id, sry) = register_session(Protocol::Tcp.inbound_prefix(), sry_config)?;
    debug!(?peer, id, name = %request.name, "inbound connection");
    let session = Inbound::new(id, sry, Box::new(link), config);
    spawn_session("inbound", id, move || session.run(request, frame.remote_id))?;
    Ok(())
}
