use crate::cmd::{Context, PsArgs};
use crate::exit::{transport_error, CliResult, SUCCESS};
use crate::output::{print_registrations, RegistrationRow};

pub fn run(args: PsArgs, ctx: &Context) -> CliResult<i32> {
    let registry = ctx.sry_config.registry();
    registry
        .check_dir()
        .map_err(|err| transport_error("fifo directory", err))?;
    let entries = registry
        .scan()
        .map_err(|err| transport_error("scan failed", err))?;

    let rows: Vec<RegistrationRow> = entries
        .into_iter()
        .map(|entry| RegistrationRow {
            alive: registry.probe().is_alive(entry.pid),
            name: entry.name,
            pid: entry.pid,
        })
        .filter(|row| !args.live || row.alive)
        .collect();

    print_registrations("registrations", registry.dir(), &rows, ctx.format);
    Ok(SUCCESS)
}
