use clap::{Args, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use simpl_sry::{Protocol, SryConfig};
use simpl_surrogate::{DEFAULT_BAUD, DEFAULT_PORT, DEFAULT_SERIAL_DEVICE};

use crate::exit::{CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod clean;
pub mod doctor;
pub mod echo;
pub mod ps;
pub mod send;
pub mod serial;
pub mod slay;
pub mod tcp;
pub mod trigger;
pub mod version;

/// Settings every subcommand shares.
#[derive(Debug)]
pub struct Context {
    pub format: OutputFormat,
    pub sry_config: SryConfig,
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List registered names.
    Ps(PsArgs),
    /// Remove FIFOs left behind by processes that are gone.
    Clean(CleanArgs),
    /// Terminate every process registered under a name.
    Slay(SlayArgs),
    /// Run the TCP surrogate.
    TcpSurrogate(TcpSurrogateArgs),
    /// Run the serial surrogate.
    SerialSurrogate(SerialSurrogateArgs),
    /// Register a name and answer every message with its payload.
    Echo(EchoArgs),
    /// Locate a receiver, send one message and print the reply.
    Send(SendArgs),
    /// Send a proxy to a receiver.
    Trigger(TriggerArgs),
    /// Run local environment health checks.
    Doctor(DoctorArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, ctx: &Context) -> CliResult<i32> {
    match command {
        Command::Ps(args) => ps::run(args, ctx),
        Command::Clean(args) => clean::run(args, ctx),
        Command::Slay(args) => slay::run(args, ctx),
        Command::TcpSurrogate(args) => tcp::run(args, ctx),
        Command::SerialSurrogate(args) => serial::run(args, ctx),
        Command::Echo(args) => echo::run(args, ctx),
        Command::Send(args) => send::run(args, ctx),
        Command::Trigger(args) => trigger::run(args, ctx),
        Command::Doctor(args) => doctor::run(args, ctx),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug, Default)]
pub struct PsArgs {
    /// Only show registrations whose owner is still running.
    #[arg(long)]
    pub live: bool,
}

#[derive(Args, Debug, Default)]
pub struct CleanArgs {}

#[derive(Args, Debug)]
pub struct SlayArgs {
    /// Registered name to terminate.
    pub name: String,
}

#[derive(Args, Debug)]
pub struct TcpSurrogateArgs {
    /// TCP port to listen on and connect to.
    #[arg(long, default_value_t = DEFAULT_PORT)]
    pub port: u16,
    /// Address to bind.
    #[arg(long, default_value = "::")]
    pub bind: String,
    /// Idle interval between liveness checks (at least 10s).
    #[arg(long, default_value = "60s")]
    pub check_interval: String,
    /// Unanswered keep-alive probes tolerated (at least 1).
    #[arg(long, default_value_t = 3)]
    pub fail_limit: u32,
    /// Do not probe idle links.
    #[arg(long)]
    pub no_keepalive: bool,
    /// Largest message plus header a session carries, in bytes.
    #[arg(long, default_value_t = 8192)]
    pub max_msg: usize,
    /// How long to wait for the far side to answer a name locate (at least 10s).
    #[arg(long, default_value = "60s")]
    pub locate_timeout: String,
}

#[derive(Args, Debug)]
pub struct SerialSurrogateArgs {
    /// Serial device.
    #[arg(long, default_value = DEFAULT_SERIAL_DEVICE)]
    pub device: PathBuf,
    /// Line speed.
    #[arg(long, default_value_t = DEFAULT_BAUD)]
    pub baud: u32,
    /// Keep-alive interval; 0 disables keep-alive.
    #[arg(long, default_value = "10s")]
    pub keepalive_interval: String,
    /// Unanswered keep-alive probes tolerated (at least 1).
    #[arg(long, default_value_t = 3)]
    pub fail_limit: u32,
    /// How long to wait for the far side to answer a name locate (at least 10s).
    #[arg(long, default_value = "60s")]
    pub locate_timeout: String,
    /// Largest message plus header a session carries, in bytes.
    #[arg(long, default_value_t = 8192)]
    pub max_msg: usize,
}

#[derive(Args, Debug)]
pub struct EchoArgs {
    /// Name to register.
    pub name: String,
    /// Reply with the payload reversed.
    #[arg(long)]
    pub reverse: bool,
    /// Exit after answering N messages.
    #[arg(long)]
    pub count: Option<usize>,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Receiver name.
    pub name: String,
    /// Host of the receiver; empty for this host.
    #[arg(long, default_value = "")]
    pub host: String,
    /// Surrogate protocol for remote receivers.
    #[arg(long, default_value = "tcp", value_parser = parse_protocol)]
    pub protocol: Protocol,
    /// Name to register as sender. Default: derived from the pid.
    #[arg(long = "as", value_name = "NAME")]
    pub sender: Option<String>,
    /// JSON payload.
    #[arg(long, conflicts_with_all = ["data", "file"])]
    pub json: Option<String>,
    /// Raw string payload.
    #[arg(long, conflicts_with_all = ["json", "file"])]
    pub data: Option<String>,
    /// Read payload from file.
    #[arg(long, conflicts_with_all = ["json", "data"])]
    pub file: Option<PathBuf>,
    /// Largest reply accepted, in bytes.
    #[arg(long, default_value_t = 8192)]
    pub reply_size: usize,
    /// Send the message this many times.
    #[arg(long, default_value_t = 1)]
    pub repeat: usize,
}

#[derive(Args, Debug)]
pub struct TriggerArgs {
    /// Receiver name.
    pub name: String,
    /// Proxy value, or `shutdown`.
    pub value: String,
}

#[derive(Args, Debug, Default)]
pub struct DoctorArgs {}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

fn parse_protocol(input: &str) -> Result<Protocol, String> {
    input.parse()
}

/// Parse `150ms`, `2s` or a bare number of seconds.
///
/// `0` yields `None` when `allow_zero` is set and is rejected otherwise.
pub fn parse_duration(input: &str, allow_zero: bool) -> CliResult<Option<Duration>> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, millis) = if let Some(num) = input.strip_suffix("ms") {
        (num, true)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, false)
    } else {
        (input, false)
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return if allow_zero {
            Ok(None)
        } else {
            Err(CliError::new(USAGE, "duration must be greater than zero"))
        };
    }

    Ok(Some(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    }))
}

/// Parse a duration that must be at least `min`.
pub fn parse_at_least(flag: &str, input: &str, min: Duration) -> CliResult<Duration> {
    let value = parse_duration(input, false)?
        .ok_or_else(|| CliError::new(USAGE, format!("{flag} must be greater than zero")))?;
    if value < min {
        return Err(CliError::new(
            USAGE,
            format!("{flag} must be at least {}s", min.as_secs()),
        ));
    }
    Ok(value)
}

pub fn require_at_least<T: PartialOrd + std::fmt::Display>(flag: &str, value: T, min: T) -> CliResult<T> {
    if value < min {
        return Err(CliError::new(USAGE, format!("{flag} must be at least {min}")));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_duration_seconds_and_millis() {
        assert_eq!(parse_duration("2s", false).unwrap(), Some(Duration::from_secs(2)));
        assert_eq!(
            parse_duration("150ms", false).unwrap(),
            Some(Duration::from_millis(150))
        );
        assert_eq!(parse_duration("3", false).unwrap(), Some(Duration::from_secs(3)));
    }

    #[test]
    fn parse_duration_zero_handling() {
        assert!(parse_duration("0s", false).is_err());
        assert_eq!(parse_duration("0", true).unwrap(), None);
        assert!(parse_duration("bad", true).is_err());
    }

    #[test]
    fn minimums_are_enforced() {
        assert!(parse_at_least("--check-interval", "9s", Duration::from_secs(10)).is_err());
        assert_eq!(
            parse_at_least("--check-interval", "10", Duration::from_secs(10)).unwrap(),
            Duration::from_secs(10)
        );
        assert_eq!(require_at_least("--fail-limit", 0u32, 1).unwrap_err().code, USAGE);
        assert_eq!(require_at_least("--max-msg", 5usize, 1).unwrap(), 5);
    }
}
