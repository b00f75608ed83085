mod cmd;
mod exit;
mod logging;
mod output;

use std::path::PathBuf;

use clap::Parser;
use simpl_sry::SryConfig;

use crate::cmd::{Command, Context};
use crate::logging::{init_logging, LogFormat, LogLevel, DEFAULT_LOG_FILE};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "simpl", version, about = "SIMPL messaging CLI")]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(long, value_name = "LEVEL", default_value = "info", global = true)]
    log_level: LogLevel,

    /// File receiving warnings and errors, restarted once it reaches 100 KiB.
    #[arg(
        long,
        value_name = "PATH",
        env = "SIM_LOG_FILE",
        default_value = DEFAULT_LOG_FILE,
        global = true
    )]
    log_file: PathBuf,

    /// Do not write the warning log file.
    #[arg(long, global = true)]
    no_log_file: bool,

    /// Directory holding the FIFOs.
    #[arg(long, value_name = "DIR", env = "SIM_FIFO_PATH", global = true)]
    fifo_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    let log_file = (!cli.no_log_file).then_some(cli.log_file.as_path());
    init_logging(cli.log_format, cli.log_level, log_file);

    let mut sry_config = SryConfig::default();
    if let Some(dir) = cli.fifo_dir {
        sry_config = sry_config.with_fifo_dir(dir);
    }
    let ctx = Context {
        format: cli.format.unwrap_or_else(OutputFormat::default_for_stdout),
        sry_config,
        log_file: log_file.map(PathBuf::from),
    };

    match cmd::run(cli.command, &ctx) {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_send_subcommand() {
        let cli = Cli::try_parse_from([
            "simpl", "send", "echo", "--host", "nodeb", "--protocol", "tcp", "--data", "hello",
        ])
        .expect("send args should parse");

        assert!(matches!(cli.command, Command::Send(_)));
    }

    #[test]
    fn rejects_conflicting_payload_args() {
        let err = Cli::try_parse_from([
            "simpl", "send", "echo", "--json", "{\"x\":1}", "--data", "hello",
        ])
        .expect_err("conflicting args should fail");

        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn parses_global_fifo_dir_after_subcommand() {
        let cli = Cli::try_parse_from(["simpl", "ps", "--fifo-dir", "/tmp/fifos"])
            .expect("ps args should parse");
        assert_eq!(cli.fifo_dir, Some(PathBuf::from("/tmp/fifos")));
        assert!(matches!(cli.command, Command::Ps(_)));
    }

    #[test]
    fn parses_tcp_surrogate_flags() {
        let cli = Cli::try_parse_from([
            "simpl",
            "tcp-surrogate",
            "--port",
            "6000",
            "--check-interval",
            "30s",
            "--no-keepalive",
        ])
        .expect("tcp-surrogate args should parse");
        assert!(matches!(cli.command, Command::TcpSurrogate(_)));
    }
}
