//! Locating receivers, locally or on another host through a surrogate.

use std::fmt;
use std::str::FromStr;

use bytes::BytesMut;
use simpl_wire::{encode_frame, encode_token_body, Frame, NameLocateReply, NameLocateRequest, Token};
use tracing::debug;

use crate::config::MAX_NAME_LEN;
use crate::error::{Result, SryError};
use crate::handle::Handle;
use crate::sry::Sry;
use crate::tables::RemoteReceiver;

/// Station of the TCP surrogate that hands out outbound sessions.
pub const TCP_STATION: &str = "_TCP_surrogate_R";
/// Station of the TCP surrogate that accepts inbound connections.
pub const TCP_LISTENER: &str = "_TCP_surrogate_S";
/// Name prefix of outbound TCP sessions.
pub const TCP_OUTBOUND_PREFIX: &str = "_TCP_surrogate_r";
/// Name prefix of inbound TCP sessions.
pub const TCP_INBOUND_PREFIX: &str = "_TCP_surrogate_s";

pub const SERIAL_STATION: &str = "_RS232_surrogate_R";
pub const SERIAL_LISTENER: &str = "_RS232_surrogate_S";
pub const SERIAL_OUTBOUND_PREFIX: &str = "_RS232_surrogate_r";
pub const SERIAL_INBOUND_PREFIX: &str = "_RS232_surrogate_s";

/// How a remote receiver is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Protocol {
    /// Same host. With a host name given, remote lookups go over TCP.
    #[default]
    Local,
    Tcp,
    Serial,
}

impl Protocol {
    /// Name of the station that hands out outbound sessions.
    pub fn station(self) -> &'static str {
        match self {
            Protocol::Serial => SERIAL_STATION,
            Protocol::Local | Protocol::Tcp => TCP_STATION,
        }
    }

    pub fn listener(self) -> &'static str {
        match self {
            Protocol::Serial => SERIAL_LISTENER,
            Protocol::Local | Protocol::Tcp => TCP_LISTENER,
        }
    }

    pub fn outbound_prefix(self) -> &'static str {
        match self {
            Protocol::Serial => SERIAL_OUTBOUND_PREFIX,
            Protocol::Local | Protocol::Tcp => TCP_OUTBOUND_PREFIX,
        }
    }

    pub fn inbound_prefix(self) -> &'static str {
        match self {
            Protocol::Serial => SERIAL_INBOUND_PREFIX,
            Protocol::Local | Protocol::Tcp => TCP_INBOUND_PREFIX,
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Protocol::Local => "local",
            Protocol::Tcp => "tcp",
            Protocol::Serial => "serial",
        })
    }
}

impl FromStr for Protocol {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "local" => Ok(Protocol::Local),
            "tcp" => Ok(Protocol::Tcp),
            "serial" | "rs232" => Ok(Protocol::Serial),
            other => Err(format!("unknown protocol '{other}'")),
        }
    }
}

impl Sry {
    /// Locate `name` on `host`.
    ///
    /// An empty host is a local lookup. Otherwise the protocol's surrogate
    /// station provides a fresh session, which negotiates with the remote
    /// host; `max_reply` is the largest message size the caller intends to
    /// exchange. Requires a registration.
    ///
    /// A remote lookup that gets no answer within the configured window is
    /// reported as [`SryError::RemoteTimeout`], a negative answer as
    /// [`SryError::NotFound`].
    pub fn locate(
        &mut self,
        host: &str,
        name: &str,
        max_reply: usize,
        protocol: Protocol,
    ) -> Result<Handle> {
        if host.is_empty() {
            return self.locate_local(name);
        }
        crate::config::validate_name(name)?;
        if !self.is_registered() {
            return Err(SryError::NotRegistered);
        }

        let station = self.locate_local(protocol.station())?;
        let request = encode_token_body(Token::Request.code())?;
        let mut session_name = [0u8; MAX_NAME_LEN];
        let len = self.send(&station, &request, &mut session_name)?;
        let session_name = std::str::from_utf8(&session_name[..len])
            .map_err(|_| SryError::ProtocolViolation("session name is not utf-8".into()))?
            .to_string();
        debug!(station = protocol.station(), session = %session_name, "obtained surrogate session");

        let session = self.locate_local(&session_name)?;
        let body = NameLocateRequest {
            host: host.to_string(),
            name: name.to_string(),
            max_size: max_reply,
        }
        .encode()?;
        let mut message = BytesMut::new();
        encode_frame(&Frame::new(Token::NameLocate, 0, body), &mut message)?;

        self.post_message(&session, &message, NameLocateReply::SIZE)?;
        let timeout = self.config().locate_timeout;
        if !self.reply_ready(Some(timeout))? {
            debug!(host, name, ?timeout, "remote locate timed out");
            return Err(SryError::RemoteTimeout(timeout));
        }
        self.wait_reply()?;
        let answer = NameLocateReply::decode(self.reply_payload()?)?;
        if answer.session.is_none() {
            debug!(host, name, "remote receiver not found");
            return Err(SryError::NotFound {
                name: name.to_string(),
                host: Some(host.to_string()),
            });
        }

        self.track_remote(RemoteReceiver {
            name: session.name().to_string(),
            pid: session.pid(),
            receive_path: session.path().to_path_buf(),
        })?;
        debug!(host, name, session = session.name(), "located remote receiver");
        Ok(Handle::remote(session))
    }
}
