//! `check`: load a system file and report what failed.

use tabled::Tabled;

use switchyard_config::Settings;
use switchyard_core::{LoadFailure, LoadReport};

use crate::cli::{CheckArgs, GlobalOpts, OutputFormat};
use crate::error::CliError;
use crate::output;

use super::util;

#[derive(Tabled)]
struct FailureRow {
    #[tabled(rename = "Key")]
    key: String,
    #[tabled(rename = "Stage")]
    stage: String,
    #[tabled(rename = "Problem")]
    message: String,
}

impl From<&LoadFailure> for FailureRow {
    fn from(f: &LoadFailure) -> Self {
        Self {
            key: f.key.clone(),
            stage: f.stage.to_string(),
            message: f.message.clone(),
        }
    }
}

fn summary(report: &LoadReport, registered: usize) -> String {
    format!(
        "{} devices loaded ({registered} registered), {} tie lines, {} failures",
        report.devices.len(),
        report.tie_lines,
        report.failures.len()
    )
}

pub fn handle(args: &CheckArgs, global: &GlobalOpts, settings: &Settings) -> Result<(), CliError> {
    let (runtime, report) = util::load_system(&args.system, global, settings)?;
    let registered = runtime.registry().len();
    runtime.teardown();

    let out = match global.output {
        OutputFormat::Json | OutputFormat::JsonCompact => {
            output::render_single(&global.output, &report, |_| String::new())?
        }
        OutputFormat::Table => {
            let failures = output::render_list(
                &global.output,
                &report.failures,
                |f| FailureRow::from(f),
                |_| String::new(),
            )?;
            if failures.is_empty() {
                summary(&report, registered)
            } else {
                format!("{}\n{failures}", summary(&report, registered))
            }
        }
        OutputFormat::Plain => report
            .failures
            .iter()
            .map(|f| format!("{}\t{}\t{}", f.key, f.stage, f.message))
            .collect::<Vec<_>>()
            .join("\n"),
    };
    output::print_output(&out, global.quiet);

    if args.strict {
        if let Some(first) = report.failures.first() {
            return Err(CliError::LoadFailed {
                count: report.failures.len(),
                first: format!("{} ({}): {}", first.key, first.stage, first.message),
            });
        }
    }
    Ok(())
}
