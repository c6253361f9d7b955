//! `show-config`: the snapshot the running system was built from.

use switchyard_config::Settings;

use crate::cli::{GlobalOpts, OutputFormat, SystemArgs};
use crate::error::CliError;
use crate::output;

use super::util;

pub fn handle(args: &SystemArgs, global: &GlobalOpts, settings: &Settings) -> Result<(), CliError> {
    let (runtime, _report) = util::load_system(args, global, settings)?;
    let Some(snapshot) = runtime.running_config() else {
        return Ok(());
    };
    runtime.teardown();

    // Configuration has no table form; every format but compact is pretty JSON.
    let out = match global.output {
        OutputFormat::JsonCompact => serde_json::to_string(&*snapshot)?,
        _ => serde_json::to_string_pretty(&*snapshot)?,
    };
    output::print_output(&out, global.quiet);
    Ok(())
}
