//! `settings`: show the effective settings or write defaults.

use switchyard_config::Settings;

use crate::cli::{GlobalOpts, SettingsArgs};
use crate::error::CliError;
use crate::output;

use super::util;

fn detail(settings: &Settings, path: &str, exists: bool) -> String {
    [
        format!("Settings file:  {path}{}", if exists { "" } else { " (not present)" }),
        format!("Processor type: {}", settings.processor_type),
        format!("Processor key:  {}", settings.processor_key),
        format!(
            "System file:    {}",
            util::or_dash(settings.system_file.as_ref().map(|p| p.display()))
        ),
        format!("Log filter:     {}", util::or_dash(settings.log_filter.as_deref())),
    ]
    .join("\n")
}

pub fn handle(args: &SettingsArgs, global: &GlobalOpts, settings: &Settings) -> Result<(), CliError> {
    let path = util::settings_path(global);

    if args.init {
        if path.exists() && !args.force {
            return Err(CliError::SettingsExist {
                path: path.display().to_string(),
            });
        }
        switchyard_config::save_settings(&path, &Settings::default())?;
        output::print_output(
            &format!("Wrote default settings to {}", path.display()),
            global.quiet,
        );
        return Ok(());
    }

    // Validate before showing, so a broken file is reported here too.
    settings.runtime_settings()?;
    let shown = path.display().to_string();
    let exists = path.exists();
    let out = output::render_single(&global.output, settings, |s| detail(s, &shown, exists))?;
    output::print_output(&out, global.quiet);
    Ok(())
}
