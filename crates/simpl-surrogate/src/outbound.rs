//! Outbound sessions: a local sender's conduit to a receiver on another
//! host.

use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use simpl_sry::{Attachment, Received, Sry, PROXY_SHUTDOWN};
use simpl_transport::wait_readable;
use simpl_wire::{
    decode_frame, encode_proxy_body, encode_token_body, Frame, NameLocateReply,
    NameLocateRequest, Token,
};
use tracing::{debug, info, warn};

use crate::config::SurrogateConfig;
use crate::error::{Result, SurrogateError};
use crate::keepalive::{Idle, KeepAlive};
use crate::link::{Connector, Link};
use crate::session::{send_final, wait_local_or_link, SessionState, Wake};

/// One outbound session, registered and waiting for its locator.
pub struct Outbound {
    id: u32,
    sry: Sry,
    connector: Arc<dyn Connector>,
    config: Arc<SurrogateConfig>,
    state: SessionState,
}

/// The locator this session serves, kept for liveness checks.
struct Locator {
    name: String,
    pid: u32,
}

impl Outbound {
    pub fn new(
        id: u32,
        sry: Sry,
        connector: Arc<dyn Connector>,
        config: Arc<SurrogateConfig>,
    ) -> Self {
        Self {
            id,
            sry,
            connector,
            config,
            state: SessionState::Negotiating,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Negotiate, then relay until either side goes away.
    pub fn run(mut self) -> Result<()> {
        let name = self.sry.name().unwrap_or_default().to_string();
        let result = match self.negotiate() {
            Ok(Some((link, remote, locator))) => {
                self.state = SessionState::Active;
                info!(session = %name, remote, "outbound session active");
                self.relay(link, remote, locator)
            }
            Ok(None) => Ok(()),
            Err(err) => Err(err),
        };
        self.state = SessionState::Closing;
        debug!(session = %name, ok = result.is_ok(), "outbound session finished");
        result
    }

    /// Wait for the locator's NAME_LOCATE and carry it to the far side.
    ///
    /// Returns `None` when the session has nothing further to do.
    fn negotiate(&mut self) -> Result<Option<(Box<dyn Link>, u32, Locator)>> {
        let msg = loop {
            match self.sry.receive()? {
                Received::Proxy(PROXY_SHUTDOWN) => return Ok(None),
                Received::Proxy(value) => debug!(value, "ignoring proxy before negotiation"),
                Received::Message(msg) => break msg,
            }
        };

        let request = match parse_name_locate(msg.payload()) {
            Ok(request) => request,
            Err(err) => {
                self.refuse(msg)?;
                return Err(err);
            }
        };
        if !self.config.admits(request.max_size) {
            self.refuse(msg)?;
            return Err(SurrogateError::Refused(format!(
                "{} bytes exceeds the {}-byte message limit",
                request.max_size, self.config.max_msg_mem
            )));
        }

        let locator = Locator {
            name: msg.sender_name().to_string(),
            pid: msg.sender_pid(),
        };
        let mut link = match self.connector.connect(&request.host, self.id) {
            Ok(link) => link,
            Err(err) => {
                debug!(host = %request.host, error = %err, "remote surrogate unreachable");
                self.refuse(msg)?;
                return Ok(None);
            }
        };

        let hello = Frame::new(Token::NameLocate, self.id, request.encode()?);
        if let Err(err) = link.write_frame(&hello) {
            self.refuse(msg)?;
            return Err(err);
        }

        let answered = link.has_buffered_frame()
            || !wait_readable(&[link.poll_fd()], Some(self.config.nameloc_timeout))?.is_empty();
        if !answered {
            debug!(host = %request.host, name = %request.name, "name locate timed out");
            self.refuse(msg)?;
            return Ok(None);
        }

        let answer = match link.read_frame() {
            Ok(frame) if frame.token == Token::Reply => NameLocateReply::decode(&frame.payload)?,
            Ok(frame) => {
                self.refuse(msg)?;
                return Err(SurrogateError::Protocol(format!(
                    "expected REPLY to NAME_LOCATE, got {}",
                    frame.token
                )));
            }
            Err(err) => {
                self.refuse(msg)?;
                return Err(err);
            }
        };

        self.sry.reply(msg, &answer.encode()?)?;
        Ok(answer
            .session
            .map(|remote| (link, remote, locator)))
    }

    fn refuse(&mut self, msg: Attachment) -> Result<()> {
        self.sry.reply(msg, &NameLocateReply::not_found().encode()?)?;
        Ok(())
    }

    fn relay(&mut self, mut link: Box<dyn Link>, remote: u32, locator: Locator) -> Result<()> {
        let mut keepalive = KeepAlive::from_config(&self.config);
        let mut waiting: Option<Attachment> = None;

        loop {
            let wake = wait_local_or_link(self.sry.receive_fd()?, link.as_ref(), keepalive.interval())?;
            match wake {
                Wake::Idle => {
                    if !self.sry.receiver_alive(&locator.name, locator.pid) {
                        info!(locator = %locator.name, "local sender is gone; closing");
                        send_final(link.as_mut(), Frame::control(Token::Close, remote));
                        return Ok(());
                    }
                    match keepalive.on_idle() {
                        Idle::Probe => {
                            let probe =
                                Frame::new(Token::Alive, remote, encode_token_body(i64::from(self.id))?);
                            link.write_frame(&probe)?;
                        }
                        Idle::Expired => {
                            warn!(remote, missed = keepalive.missed(), "keep-alive expired");
                            send_final(link.as_mut(), Frame::control(Token::Close, remote));
                            if let Some(msg) = waiting.take() {
                                self.sry.reply_error(msg)?;
                            }
                            return Err(SurrogateError::KeepAliveExpired(keepalive.window()));
                        }
                        Idle::Disabled => {}
                    }
                }
                Wake::Local => match self.sry.receive()? {
                    Received::Proxy(PROXY_SHUTDOWN) => {
                        send_final(link.as_mut(), Frame::control(Token::Close, remote));
                        return Ok(());
                    }
                    Received::Proxy(value) => {
                        link.write_frame(&Frame::new(Token::Proxy, remote, encode_proxy_body(value)?))?;
                    }
                    Received::Message(msg) => {
                        if waiting.is_some() {
                            warn!(sender = msg.sender_name(), "session busy; refusing message");
                            self.sry.reply_error(msg)?;
                            continue;
                        }
                        let limit = self.config.max_msg_mem;
                        if !self.config.admits(msg.len()) || !self.config.admits(msg.reply_capacity()) {
                            debug!(len = msg.len(), limit, "message exceeds session limit");
                            self.sry.reply_error(msg)?;
                            continue;
                        }
                        let frame = Frame::new(Token::Send, remote, Bytes::copy_from_slice(msg.payload()))
                            .with_ybytes(msg.reply_capacity());
                        if let Err(err) = link.write_frame(&frame) {
                            self.sry.reply_error(msg)?;
                            return Err(err);
                        }
                        waiting = Some(msg);
                    }
                },
                Wake::Link => {
                    let frame = link.read_frame()?;
                    match frame.token {
                        Token::Reply => {
                            keepalive.on_reply();
                            match waiting.take() {
                                Some(msg) => {
                                    if let Err(err) = self.sry.reply(msg, &frame.payload) {
                                        warn!(error = %err, "could not deliver remote reply");
                                    }
                                }
                                None => warn!("reply with no message in flight"),
                            }
                        }
                        Token::AliveReply => keepalive.on_reply(),
                        Token::Close => {
                            debug!(remote, "remote closed the session");
                            return Ok(());
                        }
                        Token::Error => {
                            if let Some(msg) = waiting.take() {
                                self.sry.reply_error(msg)?;
                            }
                            return Err(SurrogateError::Protocol("remote session reported an error".into()));
                        }
                        other => {
                            send_final(link.as_mut(), Frame::control(Token::Error, remote));
                            return Err(SurrogateError::Protocol(format!(
                                "unexpected {other} on an outbound session"
                            )));
                        }
                    }
                }
            }
        }
    }
}

/// Decode the locator's local NAME_LOCATE message (header plus body).
pub fn parse_name_locate(payload: &[u8]) -> Result<NameLocateRequest> {
    let mut raw = BytesMut::from(payload);
    let frame = decode_frame(&mut raw, payload.len())?
        .ok_or_else(|| SurrogateError::Protocol("truncated NAME_LOCATE message".into()))?;
    if frame.token != Token::NameLocate {
        return Err(SurrogateError::Protocol(format!(
            "expected NAME_LOCATE, got {}",
            frame.token
        )));
    }
    Ok(NameLocateRequest::decode(&frame.payload)?)
}

#[cfg(test)]
mod tests {
    use simpl_wire::encode_frame;

    use super::*;

    #[test]
    fn test_parse_name_locate() {
        let request = NameLocateRequest {
            host: "far".into(),
            name: "receiver".into(),
            max_size: 1024,
        };
        let mut buf = BytesMut::new();
        encode_frame(
            &Frame::new(Token::NameLocate, 0, request.encode().unwrap()),
            &mut buf,
        )
        .unwrap();
        assert_eq!(parse_name_locate(&buf).unwrap(), request);
    }

    #[test]
    fn test_parse_name_locate_rejects_other_tokens() {
        let mut buf = BytesMut::new();
        encode_frame(&Frame::control(Token::Close, 0), &mut buf).unwrap();
        assert!(matches!(
            parse_name_locate(&buf),
            Err(SurrogateError::Protocol(_))
        ));
        assert!(parse_name_locate(b"garbage").is_err());
    }
}
