//! su-core: Core library for simple-uploader
//!
//! This crate provides the transport-independent part of an upload:
//! - Destination path and public URL resolution
//! - A bounded, fixed-delay retry engine with pluggable attempt reporting
//! - The `Backend` capability trait implemented by each transport crate
//! - `RetryingUploader`, which drives a backend through each attempt
//! - Configuration of targets and the config file
//!
//! Transport clients live in `su-ftp`, `su-sftp` and `su-s3`.

pub mod config;
pub mod error;
pub mod path;
pub mod retry;
pub mod traits;
pub mod uploader;

pub use config::{
    BackendConfig, Config, ConfigManager, FtpConfig, HostKeyPolicy, S3Config, SftpConfig, Target,
    UploaderConfig, resolve_secret,
};
pub use error::{Error, Result};
pub use retry::{
    AttemptFailure, RetryBuilder, RetryConfig, RetryObserver, TracingObserver, run_with_retries,
};
pub use traits::{Backend, NamespacePolicy, UploadSource, Uploader};
pub use uploader::RetryingUploader;
