//! `types`: every device type the factory chain knows.

use tabled::Tabled;

use switchyard_core::{FactoryInfo, FactoryRegistry};

use crate::cli::GlobalOpts;
use crate::error::CliError;
use crate::output;

#[derive(Tabled)]
struct TypeRow {
    #[tabled(rename = "Type")]
    type_name: String,
    #[tabled(rename = "Library")]
    library: &'static str,
    #[tabled(rename = "Description")]
    description: &'static str,
}

impl From<&FactoryInfo> for TypeRow {
    fn from(info: &FactoryInfo) -> Self {
        Self {
            type_name: info.type_name.clone(),
            library: info.library,
            description: info.description,
        }
    }
}

pub fn handle(global: &GlobalOpts) -> Result<(), CliError> {
    let types = FactoryRegistry::with_builtin().describe();
    let out = output::render_list(
        &global.output,
        &types,
        |t| TypeRow::from(t),
        |t| t.type_name.clone(),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}
