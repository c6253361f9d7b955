//! `devices`: what the registry holds after a load.

use serde::Serialize;
use tabled::Tabled;

use switchyard_config::Settings;
use switchyard_core::LifecycleState;

use crate::cli::{GlobalOpts, SystemArgs};
use crate::error::CliError;
use crate::output;

use super::util;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DeviceSummary {
    key: String,
    name: String,
    type_name: String,
    state: Option<LifecycleState>,
    online: bool,
    feedbacks: usize,
}

#[derive(Tabled)]
struct DeviceRow {
    #[tabled(rename = "Key")]
    key: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Type")]
    type_name: String,
    #[tabled(rename = "State")]
    state: String,
    #[tabled(rename = "Online")]
    online: String,
    #[tabled(rename = "Feedbacks")]
    feedbacks: usize,
}

impl From<&DeviceSummary> for DeviceRow {
    fn from(d: &DeviceSummary) -> Self {
        Self {
            key: d.key.clone(),
            name: d.name.clone(),
            type_name: d.type_name.clone(),
            state: util::or_dash(d.state),
            online: if d.online { "yes" } else { "no" }.into(),
            feedbacks: d.feedbacks,
        }
    }
}

pub fn handle(args: &SystemArgs, global: &GlobalOpts, settings: &Settings) -> Result<(), CliError> {
    let (runtime, _report) = util::load_system(args, global, settings)?;
    let registry = runtime.registry();

    let devices: Vec<DeviceSummary> = registry
        .list()
        .iter()
        .map(|device| DeviceSummary {
            key: device.key().to_owned(),
            name: device.name().to_owned(),
            type_name: device.type_name().to_owned(),
            state: registry.state(device.key()),
            online: device.is_online().value(),
            feedbacks: device.feedbacks().len(),
        })
        .collect();
    runtime.teardown();

    let out = output::render_list(
        &global.output,
        &devices,
        |d| DeviceRow::from(d),
        |d| d.key.clone(),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}
