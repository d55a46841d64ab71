//! su-ftp: FTP backend for simple-uploader
//!
//! Uses the blocking `suppaftp` client; every step of an attempt runs on the
//! blocking thread pool. Each attempt dials, logs in, creates missing
//! ancestor directories on a best-effort basis and stores the file.

use std::io::Cursor;
use std::net::ToSocketAddrs;

use async_trait::async_trait;
use suppaftp::FtpStream;
use suppaftp::types::FileType;
use tokio::io::AsyncReadExt;

use su_core::{
    Backend, Error, FtpConfig, NamespacePolicy, Result, RetryingUploader, UploadSource,
    UploaderConfig, path, resolve_secret,
};

/// Directory operations needed to materialize ancestors of a path
#[cfg_attr(test, mockall::automock)]
pub trait RemoteDirs {
    /// List `path`; an empty listing is treated like a missing directory
    fn list(&mut self, path: &str) -> Result<Vec<String>>;

    fn mkdir(&mut self, path: &str) -> Result<()>;
}

impl RemoteDirs for FtpStream {
    fn list(&mut self, path: &str) -> Result<Vec<String>> {
        FtpStream::list(self, Some(path)).map_err(|e| Error::Namespace(e.to_string()))
    }

    fn mkdir(&mut self, path: &str) -> Result<()> {
        FtpStream::mkdir(self, path).map_err(|e| Error::Namespace(e.to_string()))
    }
}

/// Create `dir` and its ancestors one level at a time
///
/// FTP has no "create full path" command. Each ancestor is listed and
/// created when the listing errors or comes back empty. A failed creation
/// does not stop the walk; the failures are collected into the returned
/// error.
pub fn ensure_dirs<D: RemoteDirs + ?Sized>(dirs: &mut D, dir: &str) -> Result<()> {
    let mut failed = Vec::new();

    for ancestor in path::ancestors(dir) {
        let missing = match dirs.list(&ancestor) {
            Ok(entries) => entries.is_empty(),
            Err(_) => true,
        };
        if !missing {
            continue;
        }

        match dirs.mkdir(&ancestor) {
            Ok(()) => tracing::debug!(dir = %ancestor, "Created directory"),
            Err(e) => {
                tracing::debug!(dir = %ancestor, error = %e, "Skipping directory");
                failed.push(format!("{ancestor}: {e}"));
            }
        }
    }

    if failed.is_empty() {
        Ok(())
    } else {
        Err(Error::Namespace(failed.join("; ")))
    }
}

/// Live FTP control connection for one attempt
pub struct FtpSession {
    stream: Option<FtpStream>,
}

impl FtpSession {
    /// Run a blocking operation on the control connection
    async fn run<T, F>(&mut self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut FtpStream) -> Result<T> + Send + 'static,
    {
        let mut stream = self
            .stream
            .take()
            .ok_or_else(|| Error::Connection("FTP session already closed".to_string()))?;

        let (stream, result) = tokio::task::spawn_blocking(move || {
            let result = op(&mut stream);
            (stream, result)
        })
        .await
        .map_err(|e| Error::General(format!("FTP worker failed: {e}")))?;

        self.stream = Some(stream);
        result
    }
}

/// FTP backend
#[derive(Debug, Clone)]
pub struct FtpBackend {
    config: FtpConfig,
    password: String,
}

impl FtpBackend {
    pub fn new(config: FtpConfig) -> Result<Self> {
        let password = resolve_secret(&config.password)?;
        Ok(Self { config, password })
    }

    /// Wrap the backend in a retrying uploader with default retry settings
    pub fn uploader(self, paths: UploaderConfig) -> RetryingUploader<Self> {
        RetryingUploader::new(self, paths)
    }

    pub fn config(&self) -> &FtpConfig {
        &self.config
    }
}

#[async_trait]
impl Backend for FtpBackend {
    type Session = FtpSession;

    fn name(&self) -> &'static str {
        "ftp"
    }

    fn namespace(&self) -> NamespacePolicy {
        NamespacePolicy::BestEffort
    }

    async fn connect(&self) -> Result<FtpSession> {
        let addr = self.config.addr.clone();
        let timeout = self.config.timeout();
        let login = self.config.login.clone();
        let password = self.password.clone();

        let stream = tokio::task::spawn_blocking(move || -> Result<FtpStream> {
            let socket = addr
                .to_socket_addrs()
                .map_err(|e| Error::Connection(format!("Failed to resolve {addr}: {e}")))?
                .next()
                .ok_or_else(|| Error::Connection(format!("No address found for {addr}")))?;

            let mut stream = FtpStream::connect_timeout(socket, timeout)
                .map_err(|e| Error::Connection(format!("{addr}: {e}")))?;

            if let Err(e) = stream.login(&login, &password) {
                let _ = stream.quit();
                return Err(Error::Auth(e.to_string()));
            }

            if let Err(e) = stream.transfer_type(FileType::Binary) {
                let _ = stream.quit();
                return Err(Error::Connection(format!("Failed to set binary mode: {e}")));
            }

            Ok(stream)
        })
        .await
        .map_err(|e| Error::General(format!("FTP worker failed: {e}")))??;

        tracing::debug!(addr = %self.config.addr, "FTP session established");

        Ok(FtpSession {
            stream: Some(stream),
        })
    }

    async fn ensure_namespace(&self, session: &mut FtpSession, dir: &str) -> Result<()> {
        let dir = dir.to_string();
        session.run(move |stream| ensure_dirs(stream, &dir)).await
    }

    async fn transfer(
        &self,
        session: &mut FtpSession,
        source: &mut dyn UploadSource,
        path: &str,
    ) -> Result<u64> {
        let mut data = Vec::new();
        source.read_to_end(&mut data).await.map_err(Error::Source)?;

        let path = path.to_string();
        session
            .run(move |stream| {
                stream
                    .put_file(&path, &mut Cursor::new(data))
                    .map_err(|e| Error::Transfer(format!("{path}: {e}")))
            })
            .await
    }

    async fn release(&self, mut session: FtpSession) {
        let Some(mut stream) = session.stream.take() else {
            return;
        };

        match tokio::task::spawn_blocking(move || stream.quit()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::debug!(error = %e, "FTP quit failed"),
            Err(e) => tracing::debug!(error = %e, "FTP quit worker failed"),
        }
    }
}
