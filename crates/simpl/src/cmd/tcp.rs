use std::time::Duration;

use simpl_sry::install_signal_teardown;
use simpl_surrogate::{SurrogateConfig, TcpSurrogate};

use crate::cmd::{parse_at_least, require_at_least, Context, TcpSurrogateArgs};
use crate::exit::{surrogate_error, CliResult, SUCCESS};

const MIN_INTERVAL: Duration = Duration::from_secs(10);

pub fn run(args: TcpSurrogateArgs, ctx: &Context) -> CliResult<i32> {
    let config = build_config(&args)?;
    install_signal_teardown();

    tracing::info!(
        port = config.port,
        check_interval = ?config.check_interval,
        fail_limit = config.fail_limit,
        keepalive = config.keepalive,
        max_msg = config.max_msg_mem,
        "starting tcp surrogate"
    );
    let surrogate = TcpSurrogate::start(config, ctx.sry_config.clone())
        .map_err(|err| surrogate_error("tcp surrogate failed to start", err))?;
    surrogate
        .wait()
        .map_err(|err| surrogate_error("tcp surrogate stopped", err))?;
    Ok(SUCCESS)
}

fn build_config(args: &TcpSurrogateArgs) -> CliResult<SurrogateConfig> {
    require_at_least("--port", args.port, 1)?;
    Ok(SurrogateConfig::default()
        .with_port(args.port)
        .with_bind_host(args.bind.clone())
        .with_check_interval(parse_at_least("--check-interval", &args.check_interval, MIN_INTERVAL)?)
        .with_fail_limit(require_at_least("--fail-limit", args.fail_limit, 1)?)
        .with_keepalive(!args.no_keepalive)
        .with_max_msg_mem(require_at_least("--max-msg", args.max_msg, 1)?)
        .with_nameloc_timeout(parse_at_least("--locate-timeout", &args.locate_timeout, MIN_INTERVAL)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exit::USAGE;

    fn args() -> TcpSurrogateArgs {
        TcpSurrogateArgs {
            port: 50001,
            bind: "::".to_string(),
            check_interval: "60s".to_string(),
            fail_limit: 3,
            no_keepalive: false,
            max_msg: 8192,
            locate_timeout: "60s".to_string(),
        }
    }

    #[test]
    fn defaults_build_a_config() {
        let config = build_config(&args()).unwrap();
        assert_eq!(config.port, 50001);
        assert_eq!(config.check_interval, Duration::from_secs(60));
        assert!(config.keepalive);
    }

    #[test]
    fn rejects_values_below_minimums() {
        let mut short = args();
        short.check_interval = "5s".to_string();
        assert_eq!(build_config(&short).unwrap_err().code, USAGE);

        let mut no_port = args();
        no_port.port = 0;
        assert_eq!(build_config(&no_port).unwrap_err().code, USAGE);

        let mut no_limit = args();
        no_limit.fail_limit = 0;
        assert_eq!(build_config(&no_limit).unwrap_err().code, USAGE);
    }
}
