//! `join-map`: effective joins of one device on one bridge.

use tabled::Tabled;

use switchyard_config::Settings;
use switchyard_core::JoinEntry;

use crate::cli::{GlobalOpts, JoinMapArgs};
use crate::error::CliError;
use crate::output;

use super::util;

#[derive(Tabled)]
struct JoinRow {
    #[tabled(rename = "Field")]
    field: String,
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Join")]
    join: u32,
    #[tabled(rename = "Span")]
    span: String,
    #[tabled(rename = "Description")]
    description: String,
}

impl From<&JoinEntry> for JoinRow {
    fn from(e: &JoinEntry) -> Self {
        Self {
            field: e.field.clone(),
            kind: e.kind.to_string(),
            join: e.join,
            span: e.span.to_string(),
            description: e.description.clone(),
        }
    }
}

pub fn handle(args: &JoinMapArgs, global: &GlobalOpts, settings: &Settings) -> Result<(), CliError> {
    let (runtime, _report) = util::load_system(&args.system, global, settings)?;

    let device = runtime
        .registry()
        .get(&args.bridge)
        .ok_or_else(|| CliError::NotFound {
            resource_type: "bridge".into(),
            identifier: args.bridge.clone(),
            list_command: "devices".into(),
        })?;
    let bridge = device
        .as_signal_bridge()
        .ok_or_else(|| CliError::Validation {
            field: "bridge".into(),
            reason: format!("'{}' ({}) is not a bridge", args.bridge, device.type_name()),
        })?;
    let join_map = bridge
        .join_map(&args.device)
        .ok_or_else(|| CliError::NotFound {
            resource_type: "bridge link".into(),
            identifier: format!("{} on {}", args.device, args.bridge),
            list_command: "devices".into(),
        })?;
    let entries = join_map.entries();
    runtime.teardown();

    let out = output::render_list(
        &global.output,
        &entries,
        |e| JoinRow::from(e),
        |e| format!("{} {} {}", e.kind, e.join, e.field),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}
