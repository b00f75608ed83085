use crate::cmd::{Context, SlayArgs};
use crate::exit::{transport_error, CliError, CliResult, FAILURE, SUCCESS};
use crate::output::{print_registrations, RegistrationRow};

pub fn run(args: SlayArgs, ctx: &Context) -> CliResult<i32> {
    let registry = ctx.sry_config.registry();
    let slain = registry
        .slay(&args.name)
        .map_err(|err| transport_error("slay failed", err))?;
    if slain.is_empty() {
        return Err(CliError::new(
            FAILURE,
            format!("no registration named '{}'", args.name),
        ));
    }

    let rows: Vec<RegistrationRow> = slain
        .into_iter()
        .map(|entry| RegistrationRow {
            name: entry.name,
            pid: entry.pid,
            alive: false,
        })
        .collect();
    print_registrations("slay-report", registry.dir(), &rows, ctx.format);
    Ok(SUCCESS)
}
