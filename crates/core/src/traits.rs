//! Upload capability traits
//!
//! `Uploader` is what callers depend on. `Backend` is the per-transport
//! capability set that [`crate::RetryingUploader`] drives through each attempt.

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncSeek};

use crate::error::Result;

/// A seekable byte source owned by the caller
///
/// The uploader only seeks and reads it; it is never closed by the core.
pub trait UploadSource: AsyncRead + AsyncSeek + Unpin + Send {}

impl<T: AsyncRead + AsyncSeek + Unpin + Send + ?Sized> UploadSource for T {}

/// How a backend's namespace has to be prepared before writing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NamespacePolicy {
    /// Flat key space, nothing to create
    Flat,
    /// Ancestor directories are created, failures are logged and ignored
    BestEffort,
    /// Ancestor directories must exist, failure aborts the attempt
    Required,
}

/// One transport, split into the steps of a single upload attempt
///
/// A session is opened by `connect` at the start of every attempt and handed
/// back through `release` before the attempt returns, whatever the outcome.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Per-attempt connection state
    type Session: Send;

    /// Backend identity used in diagnostics
    fn name(&self) -> &'static str;

    fn namespace(&self) -> NamespacePolicy;

    async fn connect(&self) -> Result<Self::Session>;

    /// Create `dir` and all of its ancestors
    async fn ensure_namespace(&self, session: &mut Self::Session, dir: &str) -> Result<()>;

    /// Write the whole source to `path`, returning the number of bytes written
    async fn transfer(
        &self,
        session: &mut Self::Session,
        source: &mut dyn UploadSource,
        path: &str,
    ) -> Result<u64>;

    /// Check the outcome of a transfer that reported no error
    fn validate(&self, _path: &str, _written: u64) -> Result<()> {
        Ok(())
    }

    /// Close the session; errors here are logged, never surfaced
    async fn release(&self, session: Self::Session);
}

/// Upload a local file under a logical name and return its public URL
#[async_trait]
pub trait Uploader: Send + Sync {
    async fn upload(&self, source: &mut dyn UploadSource, name: &str) -> Result<String>;
}
