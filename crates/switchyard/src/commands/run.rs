//! `run`: keep a system loaded until interrupted.

use tracing::info;

use switchyard_config::Settings;

use crate::cli::{GlobalOpts, SystemArgs};
use crate::error::CliError;
use crate::output;

use super::util;

pub async fn handle(args: &SystemArgs, global: &GlobalOpts, settings: &Settings) -> Result<(), CliError> {
    let (runtime, report) = util::load_system(args, global, settings)?;

    output::print_output(
        &format!(
            "Running {} devices, {} tie lines ({} failures). Press Ctrl-C to stop.",
            runtime.registry().len(),
            report.tie_lines,
            report.failures.len()
        ),
        global.quiet,
    );

    tokio::signal::ctrl_c().await?;
    info!("interrupt received, tearing down");
    runtime.teardown();
    Ok(())
}
