//! targets command - List configured upload targets
//!
//! Credentials are never printed.

use clap::Args;
use serde::Serialize;
use su_core::Target;

use crate::exit_code::ExitCode;
use crate::output::{Formatter, OutputConfig};

/// List configured upload targets
#[derive(Args, Debug)]
pub struct TargetsArgs {
    /// Show paths and URL prefixes
    #[arg(short, long)]
    pub long: bool,
}

/// JSON output for the target list
#[derive(Serialize)]
struct TargetListOutput {
    targets: Vec<TargetInfo>,
}

/// Target information for output (without credentials)
#[derive(Debug, Serialize)]
struct TargetInfo {
    name: String,
    backend: String,
    location: String,
    working_dir: String,
    path_prefix: String,
    url_prefix: String,
}

impl From<&Target> for TargetInfo {
    fn from(target: &Target) -> Self {
        Self {
            name: target.name.clone(),
            backend: target.backend.kind().to_string(),
            location: target.backend.location(),
            working_dir: target.paths.working_dir.clone(),
            path_prefix: target.paths.path_prefix.clone(),
            url_prefix: target.paths.url_prefix.clone(),
        }
    }
}

/// Execute the targets command
pub async fn execute(args: TargetsArgs, output_config: OutputConfig) -> ExitCode {
    let formatter = Formatter::new(output_config);

    let config = match super::load_config(&formatter) {
        Ok(c) => c,
        Err(code) => return code,
    };

    let targets: Vec<TargetInfo> = config.targets.iter().map(TargetInfo::from).collect();

    if formatter.is_json() {
        formatter.json(&TargetListOutput { targets });
    } else if targets.is_empty() {
        formatter.println("No targets configured.");
    } else {
        for target in &targets {
            let styled_name = formatter.style_name(&format!("{:<12}", target.name));
            let styled_location = formatter.style_url(&target.location);
            formatter.println(&format!(
                "{styled_name} {:<5} {styled_location}",
                target.backend
            ));
            if args.long {
                let dir = if target.working_dir.is_empty() {
                    "-"
                } else {
                    target.working_dir.as_str()
                };
                formatter.println(&formatter.style_dim(&format!(
                    "             dir: {dir}  prefix: {}  url: {}",
                    target.path_prefix, target.url_prefix
                )));
            }
        }
    }

    ExitCode::Success
}
