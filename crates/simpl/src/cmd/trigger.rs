use simpl_sry::{Sry, PROXY_SHUTDOWN};

use crate::cmd::{Context, TriggerArgs};
use crate::exit::{sry_error, CliError, CliResult, SUCCESS, USAGE};

pub fn run(args: TriggerArgs, ctx: &Context) -> CliResult<i32> {
    let value = parse_proxy(&args.value)?;
    let sry = Sry::new(ctx.sry_config.clone());
    let receiver = sry
        .locate_local(&args.name)
        .map_err(|err| sry_error("locate failed", err))?;
    sry.trigger(&receiver, value)
        .map_err(|err| sry_error("trigger failed", err))?;
    tracing::info!(name = %args.name, value, "proxy sent");
    Ok(SUCCESS)
}

fn parse_proxy(input: &str) -> CliResult<u32> {
    if input.eq_ignore_ascii_case("shutdown") {
        return Ok(PROXY_SHUTDOWN);
    }
    input
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid proxy value: {input}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_numbers_and_shutdown() {
        assert_eq!(parse_proxy("7").unwrap(), 7);
        assert_eq!(parse_proxy("shutdown").unwrap(), PROXY_SHUTDOWN);
        assert_eq!(parse_proxy("-1").unwrap_err().code, USAGE);
        assert_eq!(parse_proxy("x").unwrap_err().code, USAGE);
    }
}
