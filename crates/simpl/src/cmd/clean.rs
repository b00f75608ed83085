use crate::cmd::{CleanArgs, Context};
use crate::exit::{transport_error, CliResult, SUCCESS};
use crate::output::{print_registrations, RegistrationRow};

pub fn run(_args: CleanArgs, ctx: &Context) -> CliResult<i32> {
    let registry = ctx.sry_config.registry();
    let removed = registry
        .sweep()
        .map_err(|err| transport_error("sweep failed", err))?;
    tracing::info!(count = removed.len(), dir = %registry.dir().display(), "orphaned fifos removed");

    let rows: Vec<RegistrationRow> = removed
        .into_iter()
        .map(|entry| RegistrationRow {
            name: entry.name,
            pid: entry.pid,
            alive: false,
        })
        .collect();
    print_registrations("clean-report", registry.dir(), &rows, ctx.format);
    Ok(SUCCESS)
}
