//! Inbound sessions: deliver a remote sender's traffic to a local receiver.

use std::sync::Arc;

use bytes::Bytes;
use simpl_sry::{Handle, Sry, SryError};
use simpl_transport::wait_readable;
use simpl_wire::{decode_proxy_body, encode_token_body, Frame, NameLocateReply, NameLocateRequest, Token};
use tracing::{debug, info};

use crate::config::SurrogateConfig;
use crate::error::{Result, SurrogateError};
use crate::link::Link;
use crate::session::{send_final, wait_local_or_link, SessionState, Wake};

/// One inbound session, created for a NAME_LOCATE that arrived on a link.
pub struct Inbound {
    id: u32,
    sry: Sry,
    link: Box<dyn Link>,
    config: Arc<SurrogateConfig>,
    state: SessionState,
}

enum Outcome {
    Continue,
    Done,
}

impl Inbound {
    pub fn new(id: u32, sry: Sry, link: Box<dyn Link>, config: Arc<SurrogateConfig>) -> Self {
        Self {
            id,
            sry,
            link,
            config,
            state: SessionState::Negotiating,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Answer the name locate from `requester` and, if the receiver exists,
    /// relay until either side goes away.
    pub fn run(mut self, request: NameLocateRequest, requester: u32) -> Result<()> {
        let receiver = self.negotiate(&request, requester)?;
        let result = match receiver {
            Some(receiver) => {
                self.state = SessionState::Active;
                info!(receiver = receiver.name(), requester, "inbound session active");
                self.relay(&receiver, requester)
            }
            None => Ok(()),
        };
        self.state = SessionState::Closing;
        debug!(id = self.id, ok = result.is_ok(), "inbound session finished");
        result
    }

    fn negotiate(&mut self, request: &NameLocateRequest, requester: u32) -> Result<Option<Handle>> {
        let receiver = if !self.config.admits(request.max_size) {
            debug!(max_size = request.max_size, "refusing oversized session");
            None
        } else {
            match self.sry.locate_local(&request.name) {
                Ok(handle) => Some(handle),
                Err(err) if err.is_not_found() => None,
                Err(SryError::InvalidName { name, reason }) => {
                    debug!(%name, reason, "remote asked for an invalid name");
                    None
                }
                Err(err) => return Err(err.into()),
            }
        };

        let answer = match receiver {
            Some(_) => NameLocateReply::found(self.id),
            None => NameLocateReply::not_found(),
        };
        self.link
            .write_frame(&Frame::new(Token::Reply, requester, answer.encode()?))?;
        Ok(receiver)
    }

    /// Relay until the remote closes or the local receiver disappears.
    /// Probing the link is left to the outbound side, so a quiet link alone
    /// never ends this session.
    fn relay(&mut self, receiver: &Handle, remote: u32) -> Result<()> {
        loop {
            let ready = self.link.has_buffered_frame()
                || !wait_readable(&[self.link.poll_fd()], Some(self.config.check_interval))?
                    .is_empty();

            if !ready {
                if !self.receiver_alive(receiver) {
                    info!(receiver = receiver.name(), "local receiver is gone; closing");
                    send_final(self.link.as_mut(), Frame::control(Token::Close, remote));
                    return Ok(());
                }
                continue;
            }

            let frame = self.link.read_frame()?;
            match self.handle_frame(frame, receiver, remote)? {
                Outcome::Continue => {}
                Outcome::Done => return Ok(()),
            }
        }
    }

    fn handle_frame(&mut self, frame: Frame, receiver: &Handle, remote: u32) -> Result<Outcome> {
        match frame.token {
            Token::Send => self.deliver(frame, receiver, remote),
            Token::Proxy => {
                let value = decode_proxy_body(&frame.payload)?;
                self.sry.trigger(receiver, value)?;
                Ok(Outcome::Continue)
            }
            Token::Alive => {
                let answer = Frame::new(Token::AliveReply, remote, encode_token_body(0)?);
                self.link.write_frame(&answer)?;
                Ok(Outcome::Continue)
            }
            Token::Close => {
                debug!(remote, "remote closed the session");
                Ok(Outcome::Done)
            }
            other => {
                send_final(self.link.as_mut(), Frame::control(Token::Error, remote));
                Err(SurrogateError::Protocol(format!(
                    "unexpected {other} on an inbound session"
                )))
            }
        }
    }

    /// Post a SEND to the local receiver and answer over the link once it
    /// replies, servicing link traffic in the meantime.
    fn deliver(&mut self, frame: Frame, receiver: &Handle, remote: u32) -> Result<Outcome> {
        if !self.config.admits(frame.payload.len()) || !self.config.admits(frame.ybytes) {
            send_final(self.link.as_mut(), Frame::control(Token::Error, remote));
            return Err(SurrogateError::Refused(format!(
                "SEND of {} bytes (reply {}) exceeds the session limit",
                frame.payload.len(),
                frame.ybytes
            )));
        }
        if let Err(err) = self.sry.post_message(receiver, &frame.payload, frame.ybytes) {
            send_final(self.link.as_mut(), Frame::control(Token::Error, remote));
            return Err(err.into());
        }

        loop {
            let wake = wait_local_or_link(self.sry.reply_fd()?, self.link.as_ref(), self.config.check_interval)?;
            match wake {
                Wake::Local => {
                    return match self.sry.wait_reply() {
                        Ok(_) => {
                            let reply = Bytes::copy_from_slice(self.sry.reply_payload()?);
                            self.link.write_frame(&Frame::new(Token::Reply, remote, reply))?;
                            Ok(Outcome::Continue)
                        }
                        Err(SryError::ReplyFailed) => {
                            send_final(self.link.as_mut(), Frame::control(Token::Error, remote));
                            Err(SurrogateError::Protocol("local receiver replied with an error".into()))
                        }
                        Err(err) => {
                            send_final(self.link.as_mut(), Frame::control(Token::Error, remote));
                            Err(err.into())
                        }
                    };
                }
                Wake::Link => {
                    let frame = self.link.read_frame()?;
                    match frame.token {
                        Token::Send => {
                            send_final(self.link.as_mut(), Frame::control(Token::Error, remote));
                            return Err(SurrogateError::Protocol(
                                "SEND while a message is in flight".into(),
                            ));
                        }
                        _ => {
                            if let Outcome::Done = self.handle_frame(frame, receiver, remote)? {
                                return Ok(Outcome::Done);
                            }
                        }
                    }
                }
                Wake::Idle => {
                    if !self.receiver_alive(receiver) {
                        send_final(self.link.as_mut(), Frame::control(Token::Error, remote));
                        return Err(SurrogateError::Protocol(format!(
                            "receiver {} died before replying",
                            receiver.name()
                        )));
                    }
                }
            }
        }
    }

    fn receiver_alive(&self, receiver: &Handle) -> bool {
        self.sry.receiver_alive(receiver.name(), receiver.pid())
    }
}
