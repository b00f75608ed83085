use std::time::Duration;

use simpl_sry::install_signal_teardown;
use simpl_surrogate::{SerialSurrogate, SurrogateConfig};

use crate::cmd::{parse_at_least, parse_duration, require_at_least, Context, SerialSurrogateArgs};
use crate::exit::{surrogate_error, CliResult, SUCCESS};

const MIN_LOCATE_TIMEOUT: Duration = Duration::from_secs(10);

pub fn run(args: SerialSurrogateArgs, ctx: &Context) -> CliResult<i32> {
    let config = build_config(&args)?;
    install_signal_teardown();

    tracing::info!(
        device = %config.device.display(),
        baud = config.baud,
        keepalive = config.keepalive,
        "starting serial surrogate"
    );
    let surrogate = SerialSurrogate::start(config, ctx.sry_config.clone())
        .map_err(|err| surrogate_error("serial surrogate failed to start", err))?;
    surrogate
        .wait()
        .map_err(|err| surrogate_error("serial surrogate stopped", err))?;
    Ok(SUCCESS)
}

fn build_config(args: &SerialSurrogateArgs) -> CliResult<SurrogateConfig> {
    let mut config = SurrogateConfig::serial()
        .with_device(args.device.clone(), args.baud)
        .with_fail_limit(require_at_least("--fail-limit", args.fail_limit, 1)?)
        .with_max_msg_mem(require_at_least("--max-msg", args.max_msg, 1)?)
        .with_nameloc_timeout(parse_at_least(
            "--locate-timeout",
            &args.locate_timeout,
            MIN_LOCATE_TIMEOUT,
        )?);
    // A zero interval turns probing off; liveness checks keep the default pace.
    match parse_duration(&args.keepalive_interval, true)? {
        Some(interval) => config = config.with_check_interval(interval),
        None => config = config.with_keepalive(false),
    }
    Ok(config)
}
