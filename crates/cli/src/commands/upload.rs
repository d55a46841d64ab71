//! upload command - Upload a local file to a configured target
//!
//! Prints the public URL of the uploaded file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use su_core::{BackendConfig, RetryConfig, Target, Uploader};
use su_ftp::FtpBackend;
use su_s3::S3Backend;
use su_sftp::SftpBackend;

use crate::exit_code::ExitCode;
use crate::output::{Formatter, OutputConfig};

/// Upload a file and print its public URL
#[derive(Args, Debug)]
pub struct UploadArgs {
    /// Local file to upload
    pub file: PathBuf,

    /// Name to store the file under (may contain '/'); defaults to the file name
    pub name: Option<String>,

    /// Target to upload to
    #[arg(short, long, env = "SU_TARGET")]
    pub target: String,

    /// Override the number of attempts
    #[arg(long)]
    pub attempts: Option<u32>,

    /// Override the delay between attempts, in milliseconds
    #[arg(long)]
    pub retry_delay_ms: Option<u64>,
}

#[derive(Debug, Serialize)]
struct UploadOutput {
    url: String,
    target: String,
    name: String,
    backend: String,
    size_bytes: u64,
}

/// Execute the upload command
pub async fn execute(args: UploadArgs, output_config: OutputConfig) -> ExitCode {
    let formatter = Formatter::new(output_config);

    let name = match upload_name(&args.file, args.name.as_deref()) {
        Ok(n) => n,
        Err(e) => {
            formatter.error(&e);
            return ExitCode::UsageError;
        }
    };

    let config = match super::load_config(&formatter) {
        Ok(c) => c,
        Err(code) => return code,
    };

    let target = match config.target(&args.target) {
        Ok(t) => t,
        Err(_) => {
            formatter.error(&format!("Target '{}' not found", args.target));
            return ExitCode::NotFound;
        }
    };

    let retry = retry_config(&config.retry, args.attempts, args.retry_delay_ms);

    let (mut file, size) = match open_source(&args.file).await {
        Ok(f) => f,
        Err(e) => {
            formatter.error(&format!("{e:#}"));
            return ExitCode::NotFound;
        }
    };

    let uploader = match build_uploader(target, retry).await {
        Ok(u) => u,
        Err(e) => {
            formatter.error(&format!("Failed to set up target '{}': {e}", target.name));
            return ExitCode::GeneralError;
        }
    };

    if !target.paths.working_dir.is_empty() {
        formatter.warning(&format!(
            "Target '{}' stores under working_dir '{}', which is not part of the returned URL",
            target.name, target.paths.working_dir
        ));
    }

    let spinner = formatter.progress_enabled().then(|| {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} {msg}")
                .expect("Valid template"),
        );
        pb.set_message(format!("Uploading {name} to {}...", target.name));
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    });

    let result = uploader.upload(&mut file, &name).await;

    if let Some(pb) = spinner {
        pb.finish_and_clear();
    }

    let url = match result {
        Ok(url) => url,
        Err(e) => {
            formatter.error(&format!("Upload failed: {e}"));
            return ExitCode::NetworkError;
        }
    };

    if formatter.is_json() {
        formatter.json(&UploadOutput {
            url,
            target: target.name.clone(),
            name,
            backend: target.backend.kind().to_string(),
            size_bytes: size,
        });
    } else {
        let styled_size = formatter.style_size(&humansize::format_size(size, humansize::BINARY));
        formatter.success(&format!(
            "Uploaded {name} ({styled_size}) to {}",
            formatter.style_name(&target.name)
        ));
        formatter.println(&formatter.style_url(&url));
    }

    ExitCode::Success
}

/// Build the uploader for a target
pub async fn build_uploader(
    target: &Target,
    retry: RetryConfig,
) -> su_core::Result<Box<dyn Uploader>> {
    let paths = target.paths.clone();

    let uploader: Box<dyn Uploader> = match &target.backend {
        BackendConfig::Ftp(c) => {
            Box::new(FtpBackend::new(c.clone())?.uploader(paths).with_retry(retry))
        }
        BackendConfig::Sftp(c) => {
            Box::new(SftpBackend::new(c.clone())?.uploader(paths).with_retry(retry))
        }
        BackendConfig::S3(c) => {
            Box::new(S3Backend::new(c).await?.uploader(paths).with_retry(retry))
        }
    };

    Ok(uploader)
}

fn retry_config(base: &RetryConfig, attempts: Option<u32>, delay_ms: Option<u64>) -> RetryConfig {
    RetryConfig {
        max_attempts: attempts.unwrap_or(base.max_attempts),
        delay_ms: delay_ms.unwrap_or(base.delay_ms),
    }
}

/// Logical name for the upload: explicit, or the file's own name
fn upload_name(file: &Path, name: Option<&str>) -> Result<String, String> {
    match name {
        Some(n) if n.trim().is_empty() => Err("Name cannot be empty".to_string()),
        Some(n) => Ok(n.to_string()),
        None => file
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
            .ok_or_else(|| format!("Cannot derive a name from {}", file.display())),
    }
}

async fn open_source(path: &Path) -> anyhow::Result<(tokio::fs::File, u64)> {
    let file = tokio::fs::File::open(path)
        .await
        .with_context(|| format!("Failed to open {}", path.display()))?;
    let metadata = file
        .metadata()
        .await
        .with_context(|| format!("Failed to stat {}", path.display()))?;

    if !metadata.is_file() {
        anyhow::bail!("{} is not a regular file", path.display());
    }

    Ok((file, metadata.len()))
}
