//! Error types for the upload core
//!
//! Every per-attempt failure is retried by the retry engine; only `Init` and
//! `Config` surface before any attempt is made.

use thiserror::Error;

/// Result type alias using the upload error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced while uploading
#[derive(Debug, Error)]
pub enum Error {
    /// The local source could not be rewound or read
    #[error("Source error: {0}")]
    Source(#[source] std::io::Error),

    /// Dialing the backend failed or timed out
    #[error("Connection error: {0}")]
    Connection(String),

    /// The backend rejected the credentials
    #[error("Authentication error: {0}")]
    Auth(String),

    /// The server's host key did not pass the configured verification policy
    #[error("Host key rejected: {0}")]
    HostKey(String),

    /// Ancestor directories could not be created
    #[error("Namespace error: {0}")]
    Namespace(String),

    /// Writing the data to the backend failed
    #[error("Transfer error: {0}")]
    Transfer(String),

    /// The transfer reported success but nothing was written
    #[error("Zero bytes written to {0}")]
    ZeroBytesWritten(String),

    /// Backend client construction failed
    #[error("Initialization error: {0}")]
    Init(String),

    /// No upload target with this name is configured
    #[error("Target not found: {0}")]
    TargetNotFound(String),

    /// Invalid or unreadable configuration
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    General(String),
}
