use std::os::fd::BorrowedFd;
use std::sync::Arc;
use std::time::Duration;

use simpl_transport::{
    encode_proxy, signal_path, wait_readable, FifoPair, Registry, Segment, Signal,
};
use tracing::{debug, info, warn};

use crate::config::{validate_name, SryConfig};
use crate::error::{Result, SryError};
use crate::handle::{Attachment, Handle};
use crate::lifecycle::Ledger;
use crate::record::{self, RecordHeader, RECORD_HEADER_SIZE};

/// What [`Sry::receive`] delivered.
#[derive(Debug)]
pub enum Received {
    /// A message; the sender stays blocked until the attachment is answered.
    Message(Attachment),
    /// A proxy notification. Nothing was attached and no reply is expected.
    Proxy(u32),
}

#[derive(Debug)]
struct Active {
    name: String,
    pid: u32,
    fifos: FifoPair,
    segment: Option<Segment>,
    reply_len: Option<usize>,
    ledger: Arc<Ledger>,
}

/// One SIMPL identity: a registered name with its FIFO pair and message
/// segment.
///
/// All messaging goes through this handle. A process may own several
/// handles, each under its own name, but every handle holds at most one
/// registration at a time.
#[derive(Debug)]
pub struct Sry {
    config: SryConfig,
    registry: Registry,
    active: Option<Active>,
}

impl Sry {
    /// An unregistered handle. Only locating and triggering work until
    /// [`register`](Self::register) succeeds.
    pub fn new(config: SryConfig) -> Self {
        let registry = config.registry();
        Self {
            config,
            registry,
            active: None,
        }
    }

    /// Register `name` using the environment's FIFO directory.
    pub fn open(name: &str) -> Result<Self> {
        Self::open_with_config(name, SryConfig::from_env())
    }

    pub fn open_with_config(name: &str, config: SryConfig) -> Result<Self> {
        let mut sry = Self::new(config);
        sry.register(name)?;
        Ok(sry)
    }

    /// Claim `name` for this process and create its FIFO pair.
    ///
    /// Stale registrations of `name` left by dead processes are removed; a
    /// live holder makes this fail with [`SryError::NameConflict`]. Two
    /// processes registering the same name at once may both be refused,
    /// never both admitted.
    pub fn register(&mut self, name: &str) -> Result<()> {
        if let Some(active) = &self.active {
            return Err(SryError::AlreadyActive(active.name.clone()));
        }
        validate_name(name)?;
        self.registry.check_dir()?;

        if let Some(holder) = self.registry.live_holder(name)? {
            return Err(SryError::NameConflict {
                name: name.to_string(),
                pid: holder.pid,
            });
        }

        let pid = std::process::id();
        let fifos = FifoPair::create(self.registry.dir(), name, pid)?;
        // Two processes can both pass the check above before either FIFO
        // exists. Each looks again once its own pair is in place and backs
        // out on seeing the other, so at most one registration survives.
        let rival = match self.registry.live_rival(name, pid) {
            Ok(rival) => rival,
            Err(err) => {
                fifos.remove();
                return Err(err.into());
            }
        };
        if let Some(rival) = rival {
            fifos.remove();
            return Err(SryError::NameConflict {
                name: name.to_string(),
                pid: rival.pid,
            });
        }
        let ledger = Ledger::register(name, fifos.paths().clone(), self.config.table_capacity);
        info!(name, pid, dir = ?self.registry.dir(), "registered");

        self.active = Some(Active {
            name: name.to_string(),
            pid,
            fifos,
            segment: None,
            reply_len: None,
            ledger,
        });
        Ok(())
    }

    /// Tear the registration down: unblock pending senders, shut down remote
    /// sessions, release the segment and remove the FIFOs.
    ///
    /// A second call returns [`SryError::NotRegistered`] and touches nothing.
    pub fn close(&mut self) -> Result<()> {
        let active = self.active.take().ok_or(SryError::NotRegistered)?;
        let Active {
            name,
            fifos,
            segment,
            ledger,
            ..
        } = active;
        let mut resources = Some((segment, fifos));
        ledger.release_with(|| drop(resources.take()));
        if let Some((segment, fifos)) = resources {
            drop(segment);
            fifos.remove();
        }
        debug!(name, "closed");
        Ok(())
    }

    pub fn is_registered(&self) -> bool {
        self.active.is_some()
    }

    /// Registered name, if any.
    pub fn name(&self) -> Option<&str> {
        self.active.as_ref().map(|a| a.name.as_str())
    }

    pub fn config(&self) -> &SryConfig {
        &self.config
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Teardown bookkeeping of the current registration.
    pub fn ledger(&self) -> Option<&Ledger> {
        self.active.as_ref().map(|a| a.ledger.as_ref())
    }

    fn active(&self) -> Result<&Active> {
        self.active.as_ref().ok_or(SryError::NotRegistered)
    }

    fn active_mut(&mut self) -> Result<&mut Active> {
        self.active.as_mut().ok_or(SryError::NotRegistered)
    }

    /// Resolve a receiver on this host.
    pub fn locate_local(&self, name: &str) -> Result<Handle> {
        validate_name(name)?;
        match self.registry.resolve(name)? {
            Some((entry, fifo)) => {
                let path = entry.paths(self.registry.dir()).receive;
                Ok(Handle::new(entry.name, entry.pid, path, fifo, false))
            }
            None => Err(SryError::NotFound {
                name: name.to_string(),
                host: None,
            }),
        }
    }

    /// Send `out` and block until the receiver answers.
    ///
    /// The reply is copied into `reply_buf`, whose length is also the
    /// largest reply the receiver may send. Returns the reply length.
    pub fn send(&mut self, to: &Handle, out: &[u8], reply_buf: &mut [u8]) -> Result<usize> {
        self.post_message(to, out, reply_buf.len())?;
        self.read_reply(reply_buf)
    }

    /// Write `out` into the segment and signal `to` without waiting.
    ///
    /// Pair with [`read_reply`](Self::read_reply) once the reply FIFO is
    /// readable.
    pub fn post_message(&mut self, to: &Handle, out: &[u8], reply_capacity: usize) -> Result<()> {
        let active = self.active_mut()?;
        let nbytes = to_u32(out.len())?;
        let ybytes = to_u32(reply_capacity)?;
        let needed = RECORD_HEADER_SIZE + out.len().max(reply_capacity);

        let segment = Segment::grow(&mut active.segment, needed)?;
        let header = RecordHeader {
            sender: active.name.clone(),
            pid: active.pid,
            shm_size: to_u32(segment.size())?,
            nbytes,
            ybytes,
        };
        let slice = segment.as_mut_slice();
        header.write_to(slice)?;
        slice[RECORD_HEADER_SIZE..RECORD_HEADER_SIZE + out.len()].copy_from_slice(out);
        let handle = segment.handle();

        let stale = active.fifos.drain_replies()?;
        if stale > 0 {
            debug!(stale, "dropped reply signals from an abandoned exchange");
        }
        active.reply_len = None;

        to.signal(Signal::Message(handle))?;
        debug!(to = to.name(), nbytes, ybytes, "posted message");
        Ok(())
    }

    /// Block until the reply to the last posted message arrives and return
    /// its length. The bytes stay readable through
    /// [`reply_payload`](Self::reply_payload).
    pub fn wait_reply(&mut self) -> Result<usize> {
        let active = self.active_mut()?;
        match active.fifos.read_reply()? {
            Signal::ReplyError => Err(SryError::ReplyFailed),
            Signal::Proxy(value) => Err(SryError::ProtocolViolation(format!(
                "proxy {value} arrived on the reply fifo"
            ))),
            Signal::Message(_) => {
                let segment = active.segment.as_ref().ok_or_else(|| {
                    SryError::ProtocolViolation("reply without a posted message".into())
                })?;
                let header = RecordHeader::read_from(segment.as_slice())?;
                let len = header.nbytes as usize;
                record::payload(segment.as_slice(), len)?;
                active.reply_len = Some(len);
                Ok(len)
            }
        }
    }

    /// Block for the reply and copy it into `buf`.
    pub fn read_reply(&mut self, buf: &mut [u8]) -> Result<usize> {
        let len = self.wait_reply()?;
        let reply = self.reply_payload()?;
        let capacity = buf.len();
        let dst = buf.get_mut(..len).ok_or(SryError::BufferTooSmall {
            needed: len,
            capacity,
        })?;
        dst.copy_from_slice(reply);
        Ok(len)
    }

    /// The most recent reply, read in place from this process's segment.
    pub fn reply_payload(&self) -> Result<&[u8]> {
        let active = self.active()?;
        match (active.reply_len, active.segment.as_ref()) {
            (Some(len), Some(segment)) => record::payload(segment.as_slice(), len),
            _ => Err(SryError::ProtocolViolation("no reply has been read".into())),
        }
    }

    /// Whether a reply signal is waiting, polling up to `timeout`.
    pub fn reply_ready(&self, timeout: Option<Duration>) -> Result<bool> {
        let fd = self.reply_fd()?;
        let ready = wait_readable(&[fd], timeout)?;
        Ok(!ready.is_empty())
    }

    /// Block until a message or proxy arrives.
    pub fn receive(&mut self) -> Result<Received> {
        let dir = self.registry.dir().to_path_buf();
        let active = self.active_mut()?;
        match active.fifos.read_request()? {
            Signal::Proxy(value) => {
                debug!(value, "received proxy");
                Ok(Received::Proxy(value))
            }
            Signal::ReplyError => Err(SryError::ProtocolViolation(
                "error signal arrived on the receive fifo".into(),
            )),
            Signal::Message(handle) => {
                let attachment = Attachment::attach(handle, &dir)?;
                if let Err(err) = active.ledger.add_pending(attachment.pending_entry()) {
                    warn!(sender = attachment.sender_name(), error = %err, "cannot track sender");
                    signal_path(attachment.reply_path(), Signal::ReplyError)?;
                    return Err(err);
                }
                debug!(
                    sender = attachment.sender_name(),
                    pid = attachment.sender_pid(),
                    len = attachment.len(),
                    "received message"
                );
                Ok(Received::Message(attachment))
            }
        }
    }

    /// Receive and copy the message into `buf`.
    ///
    /// A message larger than `buf` is answered with the error signal and
    /// reported as [`SryError::BufferTooSmall`]; it is never truncated.
    pub fn receive_into(&mut self, buf: &mut [u8]) -> Result<Received> {
        match self.receive()? {
            Received::Message(attachment) if attachment.len() > buf.len() => {
                let needed = attachment.len();
                self.reply_error(attachment)?;
                Err(SryError::BufferTooSmall {
                    needed,
                    capacity: buf.len(),
                })
            }
            Received::Message(attachment) => {
                attachment.copy_to(buf)?;
                Ok(Received::Message(attachment))
            }
            proxy => Ok(proxy),
        }
    }

    /// Answer a message with `reply`.
    ///
    /// A reply longer than the sender accepts is refused with
    /// [`SryError::ReplyTooLarge`] and the sender gets the error signal
    /// instead. Either way the sender is unblocked.
    pub fn reply(&mut self, mut attachment: Attachment, reply: &[u8]) -> Result<usize> {
        self.active()?.ledger.remove_pending(&attachment.pending_entry());
        let capacity = attachment.reply_capacity();
        let written = if reply.len() > capacity {
            Err(SryError::ReplyTooLarge {
                len: reply.len(),
                capacity,
            })
        } else {
            attachment.write_reply(reply)
        };

        let reply_path = attachment.reply_path().to_path_buf();
        let handle = attachment.handle();
        drop(attachment);

        match written {
            Ok(()) => {
                signal_path(&reply_path, Signal::Message(handle))?;
                Ok(reply.len())
            }
            Err(err) => {
                signal_path(&reply_path, Signal::ReplyError)?;
                Err(err)
            }
        }
    }

    /// Unblock the sender with the error signal.
    pub fn reply_error(&mut self, attachment: Attachment) -> Result<()> {
        self.active()?.ledger.remove_pending(&attachment.pending_entry());
        let reply_path = attachment.reply_path().to_path_buf();
        drop(attachment);
        signal_path(&reply_path, Signal::ReplyError)?;
        Ok(())
    }

    /// Pass the in-flight message to another receiver, which will answer the
    /// original sender directly.
    pub fn relay(&mut self, attachment: Attachment, forward: &Handle) -> Result<()> {
        self.active()?.ledger.remove_pending(&attachment.pending_entry());
        let handle = attachment.handle();
        drop(attachment);
        forward.signal(Signal::Message(handle))?;
        debug!(to = forward.name(), "relayed message");
        Ok(())
    }

    /// Send the proxy `value` to `to`. Never blocks on a reply.
    pub fn trigger(&self, to: &Handle, value: u32) -> Result<()> {
        if encode_proxy(value).is_none() {
            return Err(SryError::InvalidProxy(i64::from(value)));
        }
        to.signal(Signal::Proxy(value))?;
        debug!(to = to.name(), value, "triggered proxy");
        Ok(())
    }

    /// Whether the sender of `attachment` still runs.
    pub fn sender_alive(&self, attachment: &Attachment) -> bool {
        self.registry
            .is_alive(attachment.sender_name(), attachment.sender_pid())
    }

    /// Whether `name` held by `pid` still runs. A dead receiver's FIFOs are
    /// removed.
    pub fn receiver_alive(&self, name: &str, pid: u32) -> bool {
        self.registry.is_alive(name, pid)
    }

    /// Receive FIFO descriptor, for use with `poll`.
    pub fn receive_fd(&self) -> Result<BorrowedFd<'_>> {
        self.active()?
            .fifos
            .receive_fd()
            .ok_or(SryError::Transport(simpl_transport::TransportError::Closed))
    }

    /// Reply FIFO descriptor, for use with `poll`.
    pub fn reply_fd(&self) -> Result<BorrowedFd<'_>> {
        self.active()?
            .fifos
            .reply_fd()
            .ok_or(SryError::Transport(simpl_transport::TransportError::Closed))
    }

    pub(crate) fn track_remote(&self, remote: crate::tables::RemoteReceiver) -> Result<()> {
        self.active()?.ledger.add_remote(remote)
    }
}

impl Drop for Sry {
    fn drop(&mut self) {
        if self.active.is_some() {
            let _ = self.close();
        }
    }
}

/// Decode a raw proxy signal value.
pub fn return_proxy(encoded: i32) -> Result<u32> {
    simpl_transport::return_proxy(encoded).ok_or(SryError::InvalidProxy(i64::from(encoded)))
}

fn to_u32(len: usize) -> Result<u32> {
    u32::try_from(len).map_err(|_| SryError::BufferTooSmall {
        needed: len,
        capacity: u32::MAX as usize,
    })
}
