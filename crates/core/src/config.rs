//! Configuration model and config file management
//!
//! Upload targets are stored as TOML. The file lives at
//! `$SU_CONFIG_DIR/config.toml`, falling back to the platform config
//! directory (`~/.config/simple-uploader/config.toml` on Linux).

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::retry::RetryConfig;

const CONFIG_FILE: &str = "config.toml";
const CONFIG_DIR_ENV: &str = "SU_CONFIG_DIR";

/// Where uploads land and how their public URL is built
///
/// Immutable once an uploader is constructed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploaderConfig {
    /// Optional root prepended to every stored path; empty means none
    #[serde(default)]
    pub working_dir: String,
    /// Prefix under which every upload is placed
    pub path_prefix: String,
    /// Prefix of the public URL returned to callers
    pub url_prefix: String,
}

impl UploaderConfig {
    pub fn new(
        working_dir: impl Into<String>,
        path_prefix: impl Into<String>,
        url_prefix: impl Into<String>,
    ) -> Self {
        Self {
            working_dir: working_dir.into(),
            path_prefix: path_prefix.into(),
            url_prefix: url_prefix.into(),
        }
    }
}

/// Legacy FTP connection settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FtpConfig {
    /// `host:port`
    pub addr: String,
    pub login: String,
    /// Plain value or `env:VAR`
    pub password: String,
    #[serde(default = "default_ftp_timeout")]
    pub timeout_secs: u64,
}

impl FtpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// How the SFTP connector verifies the server's host key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "kebab-case")]
pub enum HostKeyPolicy {
    /// Accept any key without checking. Insecure, kept for compatibility.
    AcceptAny,
    /// Accept only the key with this fingerprint (`SHA256:...`)
    Pinned { fingerprint: String },
    /// Check a known_hosts file; with `learn`, unknown hosts are trusted and
    /// appended on first use while changed keys are always rejected
    KnownHosts {
        #[serde(default)]
        path: Option<PathBuf>,
        #[serde(default = "default_true")]
        learn: bool,
    },
}

impl Default for HostKeyPolicy {
    fn default() -> Self {
        HostKeyPolicy::KnownHosts {
            path: None,
            learn: true,
        }
    }
}

/// SFTP connection settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SftpConfig {
    /// `host:port`
    pub addr: String,
    pub login: String,
    /// Plain value or `env:VAR`
    pub password: String,
    #[serde(default = "default_sftp_timeout")]
    pub timeout_secs: u64,
    /// Pause before opening the destination file and before copying
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
    #[serde(default)]
    pub host_key: HostKeyPolicy,
}

impl SftpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }
}

/// S3-compatible object storage settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct S3Config {
    pub bucket: String,
    /// Custom endpoint for S3-compatible services; AWS when unset
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default = "default_region")]
    pub region: String,
    pub access_key: String,
    /// Plain value or `env:VAR`
    pub secret_key: String,
    #[serde(default = "default_true")]
    pub force_path_style: bool,
}

/// Transport of a target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BackendConfig {
    Ftp(FtpConfig),
    Sftp(SftpConfig),
    S3(S3Config),
}

impl BackendConfig {
    pub fn kind(&self) -> &'static str {
        match self {
            BackendConfig::Ftp(_) => "ftp",
            BackendConfig::Sftp(_) => "sftp",
            BackendConfig::S3(_) => "s3",
        }
    }

    /// Host or endpoint, for display
    pub fn location(&self) -> String {
        match self {
            BackendConfig::Ftp(c) => c.addr.clone(),
            BackendConfig::Sftp(c) => c.addr.clone(),
            BackendConfig::S3(c) => match &c.endpoint {
                Some(endpoint) => format!("{}/{}", endpoint.trim_end_matches('/'), c.bucket),
                None => format!("s3://{}", c.bucket),
            },
        }
    }
}

/// A named upload destination
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    pub name: String,
    #[serde(flatten)]
    pub paths: UploaderConfig,
    pub backend: BackendConfig,
}

/// Contents of the config file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub targets: Vec<Target>,
}

impl Config {
    pub fn target(&self, name: &str) -> Result<&Target> {
        self.targets
            .iter()
            .find(|t| t.name == name)
            .ok_or_else(|| Error::TargetNotFound(name.to_string()))
    }

    pub fn validate(&self) -> Result<()> {
        for (i, target) in self.targets.iter().enumerate() {
            if target.name.is_empty() {
                return Err(Error::Config(format!("Target #{} has an empty name", i + 1)));
            }
            if target.paths.path_prefix.is_empty() {
                return Err(Error::Config(format!(
                    "Target '{}' has an empty path_prefix",
                    target.name
                )));
            }
            if self.targets[..i].iter().any(|t| t.name == target.name) {
                return Err(Error::Config(format!(
                    "Target '{}' is defined more than once",
                    target.name
                )));
            }
        }
        Ok(())
    }
}

/// Loads and saves the config file
#[derive(Debug, Clone)]
pub struct ConfigManager {
    path: PathBuf,
}

impl ConfigManager {
    /// Use the default config location
    pub fn new() -> Result<Self> {
        Ok(Self {
            path: config_dir()?.join(CONFIG_FILE),
        })
    }

    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read and validate the config; a missing file yields the defaults
    pub fn load(&self) -> Result<Config> {
        if !self.path.exists() {
            tracing::debug!(path = %self.path.display(), "Config file not found, using defaults");
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(&self.path)?;
        let config: Config = toml::from_str(&content).map_err(|e| {
            Error::Config(format!("Failed to parse {}: {e}", self.path.display()))
        })?;
        config.validate()?;

        Ok(config)
    }

    pub fn save(&self, config: &Config) -> Result<()> {
        config.validate()?;

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(config)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {e}")))?;
        std::fs::write(&self.path, content)?;

        Ok(())
    }
}

/// Resolve a secret that may be written as `env:VAR`
pub fn resolve_secret(value: &str) -> Result<String> {
    match value.strip_prefix("env:") {
        Some(var) => std::env::var(var)
            .map_err(|_| Error::Config(format!("Environment variable {var} is not set"))),
        None => Ok(value.to_string()),
    }
}

fn config_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var(CONFIG_DIR_ENV) {
        return Ok(PathBuf::from(dir));
    }

    dirs::config_dir()
        .map(|d| d.join("simple-uploader"))
        .ok_or_else(|| Error::Config("Could not determine config directory".to_string()))
}

fn default_ftp_timeout() -> u64 {
    20
}

fn default_sftp_timeout() -> u64 {
    30
}

fn default_settle_ms() -> u64 {
    50
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_true() -> bool {
    true
}
