//! SFTP backend implementation
//!
//! Wraps russh and russh-sftp and implements the `Backend` trait from su-core.

use std::sync::Arc;

use async_trait::async_trait;
use russh::client::{self, Handle};
use russh::Disconnect;
use russh_sftp::client::SftpSession;
use russh_sftp::protocol::OpenFlags;
use tokio::io::AsyncWriteExt;

use su_core::{
    Backend, Error, NamespacePolicy, Result, RetryingUploader, SftpConfig, UploadSource,
    UploaderConfig, path, resolve_secret,
};

use crate::host_key::{HostKeyVerifier, split_host_port};

/// SSH connection plus the SFTP subsystem running on it
pub struct SftpConnection {
    ssh: Handle<HostKeyVerifier>,
    sftp: SftpSession,
}

/// SFTP backend
pub struct SftpBackend {
    config: SftpConfig,
    password: String,
    host: String,
    port: u16,
}

impl SftpBackend {
    pub fn new(config: SftpConfig) -> Result<Self> {
        let password = resolve_secret(&config.password)?;
        let (host, port) = split_host_port(&config.addr);

        Ok(Self {
            config,
            password,
            host,
            port,
        })
    }

    /// Wrap the backend in a retrying uploader with default retry settings
    pub fn uploader(self, paths: UploaderConfig) -> RetryingUploader<Self> {
        RetryingUploader::new(self, paths)
    }

    pub fn config(&self) -> &SftpConfig {
        &self.config
    }

    /// Dial, verify the host key and authenticate
    async fn dial(&self) -> Result<Handle<HostKeyVerifier>> {
        let ssh_config = client::Config {
            inactivity_timeout: Some(self.config.timeout()),
            ..Default::default()
        };
        let verifier =
            HostKeyVerifier::new(self.host.clone(), self.port, self.config.host_key.clone());

        let mut handle = client::connect(
            Arc::new(ssh_config),
            (self.host.as_str(), self.port),
            verifier,
        )
        .await?;

        let auth = handle
            .authenticate_password(self.config.login.as_str(), self.password.as_str())
            .await
            .map_err(|e| Error::Auth(e.to_string()))?;

        if !auth.success() {
            return Err(Error::Auth(format!(
                "Password rejected for {}@{}",
                self.config.login, self.config.addr
            )));
        }

        Ok(handle)
    }
}

/// What a remote path currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Entry {
    Missing,
    Directory,
    Other,
}

/// Directory operations used while preparing the remote namespace
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub(crate) trait RemoteDirs: Send + Sync {
    async fn stat(&self, path: &str) -> Entry;
    async fn mkdir(&self, path: &str) -> std::result::Result<(), String>;
}

#[async_trait]
impl RemoteDirs for SftpSession {
    async fn stat(&self, path: &str) -> Entry {
        match self.metadata(path).await {
            Ok(meta) if meta.is_dir() => Entry::Directory,
            Ok(_) => Entry::Other,
            Err(_) => Entry::Missing,
        }
    }

    async fn mkdir(&self, path: &str) -> std::result::Result<(), String> {
        self.create_dir(path).await.map_err(|e| e.to_string())
    }
}

/// Create `dir` and all of its ancestors, tolerating concurrent creation
pub(crate) async fn mkdir_all<D: RemoteDirs + ?Sized>(dirs: &D, dir: &str) -> Result<()> {
    for ancestor in path::ancestors(dir) {
        match dirs.stat(&ancestor).await {
            Entry::Directory => continue,
            Entry::Other => {
                return Err(Error::Namespace(format!(
                    "{ancestor} exists and is not a directory"
                )));
            }
            Entry::Missing => {}
        }

        if let Err(e) = dirs.mkdir(&ancestor).await {
            // Another client may have created it first.
            if dirs.stat(&ancestor).await != Entry::Directory {
                return Err(Error::Namespace(format!("{ancestor}: {e}")));
            }
        } else {
            tracing::debug!(dir = %ancestor, "Created directory");
        }
    }

    Ok(())
}

#[async_trait]
impl Backend for SftpBackend {
    type Session = SftpConnection;

    fn name(&self) -> &'static str {
        "sftp"
    }

    fn namespace(&self) -> NamespacePolicy {
        NamespacePolicy::Required
    }

    async fn connect(&self) -> Result<SftpConnection> {
        let timeout = self.config.timeout();
        let ssh = tokio::time::timeout(timeout, self.dial())
            .await
            .map_err(|_| {
                Error::Connection(format!(
                    "{}: timed out after {}s",
                    self.config.addr,
                    timeout.as_secs()
                ))
            })??;

        let opened = async {
            let channel = ssh.channel_open_session().await?;
            channel.request_subsystem(true, "sftp").await?;
            Ok::<_, russh::Error>(channel)
        }
        .await;

        let channel = match opened {
            Ok(channel) => channel,
            Err(e) => {
                let _ = ssh.disconnect(Disconnect::ByApplication, "", "en").await;
                return Err(Error::Connection(format!(
                    "Failed to open SFTP channel: {e}"
                )));
            }
        };

        let sftp = match SftpSession::new(channel.into_stream()).await {
            Ok(sftp) => sftp,
            Err(e) => {
                let _ = ssh.disconnect(Disconnect::ByApplication, "", "en").await;
                return Err(Error::Connection(format!("Failed to start SFTP: {e}")));
            }
        };

        tracing::debug!(addr = %self.config.addr, "SFTP session established");
        Ok(SftpConnection { ssh, sftp })
    }

    async fn ensure_namespace(&self, session: &mut SftpConnection, dir: &str) -> Result<()> {
        mkdir_all(&session.sftp, dir).await
    }

    async fn transfer(
        &self,
        session: &mut SftpConnection,
        source: &mut dyn UploadSource,
        path: &str,
    ) -> Result<u64> {
        // Some servers report mkdir before the directory is usable.
        tokio::time::sleep(self.config.settle()).await;

        let mut file = session
            .sftp
            .open_with_flags(
                path,
                OpenFlags::CREATE | OpenFlags::TRUNCATE | OpenFlags::WRITE,
            )
            .await
            .map_err(|e| Error::Transfer(format!("Failed to open {path}: {e}")))?;

        tokio::time::sleep(self.config.settle()).await;

        let copied = tokio::io::copy(source, &mut file).await;
        let closed = file.shutdown().await;

        let written =
            copied.map_err(|e| Error::Transfer(format!("Failed to write {path}: {e}")))?;
        closed.map_err(|e| Error::Transfer(format!("Failed to close {path}: {e}")))?;

        Ok(written)
    }

    fn validate(&self, path: &str, written: u64) -> Result<()> {
        if written == 0 {
            return Err(Error::ZeroBytesWritten(path.to_string()));
        }
        Ok(())
    }

    async fn release(&self, session: SftpConnection) {
        if let Err(e) = session.sftp.close().await {
            tracing::debug!(error = %e, "SFTP close failed");
        }
        if let Err(e) = session
            .ssh
            .disconnect(Disconnect::ByApplication, "", "en")
            .await
        {
            tracing::debug!(error = %e, "SSH disconnect failed");
        }
    }
}
