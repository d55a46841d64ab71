//! su-sftp: SFTP backend for simple-uploader
//!
//! Connects over SSH with password authentication, verifies the server's
//! host key according to a [`su_core::HostKeyPolicy`], creates all ancestor
//! directories and streams the source into the destination file.

mod client;
mod host_key;

pub use client::{SftpBackend, SftpConnection};
pub use host_key::{HostKeyVerifier, SshError, fingerprints_match, split_host_port};
