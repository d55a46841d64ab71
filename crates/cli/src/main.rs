//! su - upload a file to FTP, SFTP or S3 and print its public URL

mod commands;
mod exit_code;
mod output;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::commands::{completions, targets, upload};
use crate::output::OutputConfig;

/// Upload files to FTP, SFTP or S3-compatible storage
#[derive(Parser, Debug)]
#[command(name = "su", version, about, long_about = None)]
pub struct Cli {
    /// Output JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Only print errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Log every attempt and transfer step to stderr
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Upload a file and print its public URL
    Upload(upload::UploadArgs),

    /// List configured targets
    Targets(targets::TargetsArgs),

    /// Generate shell completions
    Completions(completions::CompletionsArgs),
}

fn init_tracing(debug: bool) {
    let default_level = if debug { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    let output_config = OutputConfig {
        json: cli.json,
        no_color: cli.no_color,
        quiet: cli.quiet,
    };

    let code = match cli.command {
        Commands::Upload(args) => upload::execute(args, output_config).await,
        Commands::Targets(args) => targets::execute(args, output_config).await,
        Commands::Completions(args) => completions::execute(args),
    };

    code.into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_upload() {
        let cli = Cli::parse_from([
            "su", "--json", "upload", "report.pdf", "2024/q1.pdf", "--target", "cdn",
            "--attempts", "3",
        ]);
        assert!(cli.json);
        match cli.command {
            Commands::Upload(args) => {
                assert_eq!(args.file.to_str(), Some("report.pdf"));
                assert_eq!(args.name.as_deref(), Some("2024/q1.pdf"));
                assert_eq!(args.target, "cdn");
                assert_eq!(args.attempts, Some(3));
                assert_eq!(args.retry_delay_ms, None);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
