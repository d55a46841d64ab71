//! Command implementations

pub mod completions;
pub mod targets;
pub mod upload;

use su_core::{Config, ConfigManager};

use crate::exit_code::ExitCode;
use crate::output::Formatter;

/// Load the config file, reporting failures through the formatter
pub(crate) fn load_config(formatter: &Formatter) -> Result<Config, ExitCode> {
    let manager = match ConfigManager::new() {
        Ok(m) => m,
        Err(e) => {
            formatter.error(&e.to_string());
            return Err(ExitCode::GeneralError);
        }
    };

    manager.load().map_err(|e| {
        formatter.error(&format!("Failed to load {}: {e}", manager.path().display()));
        ExitCode::GeneralError
    })
}
