//! `tie-lines`: the routing graph after a load.

use tabled::Tabled;

use switchyard_config::Settings;
use switchyard_core::TieLine;

use crate::cli::{GlobalOpts, SystemArgs};
use crate::error::CliError;
use crate::output;

use super::util;

#[derive(Tabled)]
struct TieLineRow {
    #[tabled(rename = "Source")]
    source: String,
    #[tabled(rename = "Destination")]
    destination: String,
    #[tabled(rename = "Signal")]
    signal: String,
}

impl From<&TieLine> for TieLineRow {
    fn from(line: &TieLine) -> Self {
        Self {
            source: line.source().to_string(),
            destination: line.destination().to_string(),
            signal: util::or_dash(line.signal_type()),
        }
    }
}

pub fn handle(args: &SystemArgs, global: &GlobalOpts, settings: &Settings) -> Result<(), CliError> {
    let (runtime, _report) = util::load_system(args, global, settings)?;
    let lines = runtime.tie_lines().snapshot();
    runtime.teardown();

    let out = output::render_list(
        &global.output,
        &lines,
        |l| TieLineRow::from(l),
        |l| l.to_string(),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}
