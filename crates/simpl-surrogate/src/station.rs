//! The well-known station a remote locate asks for an outbound session.
//!
//! The station keeps one spare outbound session registered at all times.
//! A REQUEST is answered with the spare's name, and a fresh spare takes its
//! place, so a locator never waits on session startup.

use std::sync::Arc;

use simpl_sry::{Protocol, Received, Sry, SryConfig, SryError, PROXY_SHUTDOWN};
use simpl_wire::{decode_token_body, Token};
use tracing::{debug, info, warn};

use crate::config::SurrogateConfig;
use crate::error::Result;
use crate::link::Connector;
use crate::outbound::Outbound;
use crate::session::{register_session, spawn_session};

pub struct Station {
    protocol: Protocol,
    sry: Sry,
    connector: Arc<dyn Connector>,
    config: Arc<SurrogateConfig>,
    sry_config: SryConfig,
}

impl Station {
    /// Register the station name for `protocol`.
    pub fn open(
        protocol: Protocol,
        connector: Arc<dyn Connector>,
        config: Arc<SurrogateConfig>,
        sry_config: SryConfig,
    ) -> Result<Self> {
        let sry = Sry::open_with_config(protocol.station(), sry_config.clone())?;
        info!(station = protocol.station(), "surrogate station registered");
        Ok(Self {
            protocol,
            sry,
            connector,
            config,
            sry_config,
        })
    }

    pub fn name(&self) -> &str {
        self.protocol.station()
    }

    /// Serve session requests until PROXY_SHUTDOWN arrives.
    pub fn run(mut self) -> Result<()> {
        let mut spare = self.spawn_spare()?;
        loop {
            let msg = match self.sry.receive() {
                Ok(Received::Message(msg)) => msg,
                Ok(Received::Proxy(PROXY_SHUTDOWN)) => break,
                Ok(Received::Proxy(value)) => {
                    debug!(value, "station ignores proxy");
                    continue;
                }
                Err(err @ SryError::Transport(_)) => return Err(err.into()),
                Err(err) => {
                    warn!(error = %err, "station receive failed");
                    continue;
                }
            };

            let is_request = decode_token_body(msg.payload())
                .is_ok_and(|code| code == Token::Request.code());
            if !is_request {
                warn!(sender = msg.sender_name(), "station expected a session request");
                self.sry.reply_error(msg)?;
                continue;
            }

            let sender = msg.sender_name().to_string();
            match self.sry.reply(msg, spare.as_bytes()) {
                Ok(_) => {
                    debug!(%sender, session = %spare, "handed out outbound session");
                    spare = self.spawn_spare()?;
                }
                Err(err) => warn!(%sender, error = %err, "could not hand out session"),
            }
        }

        info!(station = self.name(), "station shutting down");
        match self.sry.locate_local(&spare) {
            Ok(handle) => {
                if let Err(err) = self.sry.trigger(&handle, PROXY_SHUTDOWN) {
                    debug!(session = %spare, error = %err, "spare already gone");
                }
            }
            Err(err) => debug!(session = %spare, error = %err, "spare already gone"),
        }
        Ok(())
    }

    fn spawn_spare(&self) -> Result<String> {
        let (id, sry) = register_session(self.protocol.outbound_prefix(), &self.sry_config)?;
        let name = sry.name().unwrap_or_default().to_string();
        let session = Outbound::new(
            id,
            sry,
            Arc::clone(&self.connector),
            Arc::clone(&self.config),
        );
        spawn_session("outbound", id, move || session.run())?;
        Ok(name)
    }
}

/// Ask the station of a running surrogate to shut down.
pub fn stop_station(protocol: Protocol, sry_config: &SryConfig) -> Result<()> {
    let sry = Sry::new(sry_config.clone());
    let station = sry.locate_local(protocol.station())?;
    sry.trigger(&station, PROXY_SHUTDOWN)?;
    Ok(())
}
