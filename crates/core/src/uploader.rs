//! Retrying uploader
//!
//! Binds a [`Backend`] to an [`UploaderConfig`] and runs every upload through
//! the retry loop. Each attempt rewinds the source, opens a fresh session,
//! prepares the namespace according to the backend's policy, transfers,
//! validates and releases the session.

use std::io::SeekFrom;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::AsyncSeekExt;
use tokio::sync::Mutex;

use crate::config::UploaderConfig;
use crate::error::{Error, Result};
use crate::path;
use crate::retry::{RetryConfig, RetryObserver, TracingObserver, run_with_retries};
use crate::traits::{Backend, NamespacePolicy, UploadSource, Uploader};

/// [`Uploader`] over a single backend
pub struct RetryingUploader<B> {
    backend: B,
    config: UploaderConfig,
    retry: RetryConfig,
    observer: Arc<dyn RetryObserver>,
}

impl<B: Backend> RetryingUploader<B> {
    /// Default retry policy (10 attempts, 5 s apart) reporting through `tracing`
    pub fn new(backend: B, config: UploaderConfig) -> Self {
        Self {
            backend,
            config,
            retry: RetryConfig::default(),
            observer: Arc::new(TracingObserver),
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn RetryObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn config(&self) -> &UploaderConfig {
        &self.config
    }

    /// Remote path a name is stored at
    pub fn destination(&self, name: &str) -> String {
        path::resolve(&self.config.working_dir, &self.config.path_prefix, name)
    }

    /// Public URL returned for a name
    pub fn public_url(&self, name: &str) -> String {
        path::public_url(&self.config.url_prefix, &self.config.path_prefix, name)
    }

    async fn attempt(&self, source: &mut dyn UploadSource, dest: &str) -> Result<()> {
        source.seek(SeekFrom::Start(0)).await.map_err(Error::Source)?;

        let mut session = self.backend.connect().await?;
        let outcome = self.write(&mut session, source, dest).await;
        self.backend.release(session).await;

        outcome
    }

    async fn write(
        &self,
        session: &mut B::Session,
        source: &mut dyn UploadSource,
        dest: &str,
    ) -> Result<()> {
        if let Some(dir) = path::parent_dir(dest) {
            match self.backend.namespace() {
                NamespacePolicy::Flat => {}
                NamespacePolicy::BestEffort => {
                    if let Err(e) = self.backend.ensure_namespace(session, dir).await {
                        tracing::warn!(
                            backend = self.backend.name(),
                            dir,
                            error = %e,
                            "Could not prepare directories, uploading anyway"
                        );
                    }
                }
                NamespacePolicy::Required => {
                    self.backend.ensure_namespace(session, dir).await?;
                }
            }
        }

        let written = self.backend.transfer(session, source, dest).await?;
        self.backend.validate(dest, written)?;

        tracing::debug!(backend = self.backend.name(), dest, written, "Transfer complete");
        Ok(())
    }
}

#[async_trait]
impl<B: Backend> Uploader for RetryingUploader<B> {
    async fn upload(&self, source: &mut dyn UploadSource, name: &str) -> Result<String> {
        let dest = self.destination(name);
        let dest = dest.as_str();

        // Attempts run one after another; the lock only lends the source to
        // the attempt currently in flight.
        let source = Mutex::new(source);
        let source = &source;

        run_with_retries(
            &self.retry,
            self.observer.as_ref(),
            self.backend.name(),
            |attempt| async move {
                tracing::debug!(
                    backend = self.backend.name(),
                    attempt,
                    dest,
                    "Starting upload attempt"
                );
                let mut source = source.lock().await;
                self.attempt(&mut **source, dest).await
            },
        )
        .await?;

        let url = self.public_url(name);
        tracing::info!(backend = self.backend.name(), dest, url = %url, "Upload finished");

        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::RetryBuilder;
    use crate::retry::tests::RecordingObserver;
    use std::io::Cursor;
    use std::sync::Mutex as StdMutex;
    use tokio::io::AsyncReadExt;

    /// What the fake backend should do on a given attempt
    #[derive(Clone, Copy, PartialEq)]
    enum Step {
        Ok,
        FailConnect,
        FailNamespace,
        FailTransfer,
        WriteNothing,
    }

    /// In-memory backend scripted per attempt
    struct FakeBackend {
        policy: NamespacePolicy,
        reject_empty: bool,
        script: StdMutex<Vec<Step>>,
        log: StdMutex<Vec<String>>,
        stored: StdMutex<Vec<u8>>,
    }

    impl FakeBackend {
        fn new(policy: NamespacePolicy, script: Vec<Step>) -> Self {
            Self {
                policy,
                reject_empty: false,
                script: StdMutex::new(script),
                log: StdMutex::new(Vec::new()),
                stored: StdMutex::new(Vec::new()),
            }
        }

        fn current(&self) -> Step {
            let script = self.script.lock().unwrap();
            script.first().copied().unwrap_or(Step::Ok)
        }

        fn record(&self, entry: impl Into<String>) {
            self.log.lock().unwrap().push(entry.into());
        }

        fn log(&self) -> Vec<String> {
            self.log.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Backend for FakeBackend {
        type Session = ();

        fn name(&self) -> &'static str {
            "fake"
        }

        fn namespace(&self) -> NamespacePolicy {
            self.policy
        }

        async fn connect(&self) -> Result<()> {
            if self.current() == Step::FailConnect {
                self.script.lock().unwrap().remove(0);
                self.record("connect-failed");
                return Err(Error::Connection("refused".to_string()));
            }
            self.record("connect");
            Ok(())
        }

        async fn ensure_namespace(&self, _session: &mut (), dir: &str) -> Result<()> {
            self.record(format!("mkdir {dir}"));
            if self.current() == Step::FailNamespace {
                return Err(Error::Namespace(format!("cannot create {dir}")));
            }
            Ok(())
        }

        async fn transfer(
            &self,
            _session: &mut (),
            source: &mut dyn UploadSource,
            path: &str,
        ) -> Result<u64> {
            let step = {
                let mut script = self.script.lock().unwrap();
                if script.is_empty() {
                    Step::Ok
                } else {
                    script.remove(0)
                }
            };
            self.record(format!("transfer {path}"));

            match step {
                Step::FailTransfer => Err(Error::Transfer("broken pipe".to_string())),
                Step::WriteNothing => Ok(0),
                _ => {
                    let mut buf = Vec::new();
                    source.read_to_end(&mut buf).await.map_err(Error::Source)?;
                    let written = buf.len() as u64;
                    *self.stored.lock().unwrap() = buf;
                    Ok(written)
                }
            }
        }

        fn validate(&self, path: &str, written: u64) -> Result<()> {
            if self.reject_empty && written == 0 {
                return Err(Error::ZeroBytesWritten(path.to_string()));
            }
            Ok(())
        }

        async fn release(&self, _session: ()) {
            self.record("release");
        }
    }

    fn uploader(backend: FakeBackend, dir: &str) -> RetryingUploader<FakeBackend> {
        RetryingUploader::new(
            backend,
            UploaderConfig::new(dir, "/files", "https://cdn.example/"),
        )
        .with_retry(RetryBuilder::new().delay_ms(1).build())
    }

    #[tokio::test]
    async fn test_upload_returns_url_independent_of_working_dir() {
        let up = uploader(FakeBackend::new(NamespacePolicy::Flat, vec![]), "/var/www");
        let mut source = Cursor::new(b"hello".to_vec());

        let url = up.upload(&mut source, "a/b.txt").await.unwrap();

        assert_eq!(url, "https://cdn.example//files/a/b.txt");
        assert_eq!(up.destination("a/b.txt"), "/var/www/files/a/b.txt");
        assert_eq!(
            up.backend().log(),
            vec!["connect", "transfer /var/www/files/a/b.txt", "release"]
        );
        assert_eq!(*up.backend().stored.lock().unwrap(), b"hello");
    }

    #[tokio::test]
    async fn test_flat_namespace_skips_directory_creation() {
        let up = uploader(FakeBackend::new(NamespacePolicy::Flat, vec![]), "");
        let mut source = Cursor::new(b"x".to_vec());

        up.upload(&mut source, "deep/er/name.bin").await.unwrap();

        assert!(!up.backend().log().iter().any(|e| e.starts_with("mkdir")));
    }

    #[tokio::test]
    async fn test_best_effort_namespace_failure_still_transfers() {
        let up = uploader(
            FakeBackend::new(NamespacePolicy::BestEffort, vec![Step::FailNamespace]),
            "",
        );
        let mut source = Cursor::new(b"data".to_vec());

        let url = up.upload(&mut source, "a/b.txt").await.unwrap();

        assert_eq!(url, "https://cdn.example//files/a/b.txt");
        assert_eq!(
            up.backend().log(),
            vec!["connect", "mkdir /files/a", "transfer /files/a/b.txt", "release"]
        );
    }

    #[tokio::test]
    async fn test_required_namespace_failure_aborts_attempt() {
        let backend = FakeBackend::new(
            NamespacePolicy::Required,
            vec![Step::FailNamespace, Step::Ok],
        );
        let observer = Arc::new(RecordingObserver::default());
        let up = uploader(backend, "").with_observer(observer.clone());
        let mut source = Cursor::new(b"data".to_vec());

        // The namespace step fails without consuming the script, so every
        // attempt fails the same way until exhaustion.
        let result = up.upload(&mut source, "a/b.txt").await;

        assert!(matches!(result, Err(Error::Namespace(_))));
        assert_eq!(observer.failures.lock().unwrap().len(), 10);
        let log = up.backend().log();
        assert!(!log.iter().any(|e| e.starts_with("transfer")));
        assert_eq!(log.iter().filter(|e| *e == "release").count(), 10);
    }

    #[tokio::test]
    async fn test_retry_rewinds_source_and_reconnects() {
        let backend = FakeBackend::new(
            NamespacePolicy::Required,
            vec![Step::FailConnect, Step::FailTransfer, Step::Ok],
        );
        let observer = Arc::new(RecordingObserver::default());
        let up = uploader(backend, "").with_observer(observer.clone());

        let mut source = Cursor::new(b"payload".to_vec());
        source.set_position(4);

        up.upload(&mut source, "n.txt").await.unwrap();

        assert_eq!(*up.backend().stored.lock().unwrap(), b"payload");
        assert_eq!(
            up.backend().log(),
            vec![
                "connect-failed",
                "connect",
                "mkdir /files",
                "transfer /files/n.txt",
                "release",
                "connect",
                "mkdir /files",
                "transfer /files/n.txt",
                "release",
            ]
        );
        assert_eq!(*observer.failures.lock().unwrap(), vec![(1, true), (2, true)]);
    }

    #[tokio::test]
    async fn test_zero_bytes_rejected_then_retried() {
        let mut backend = FakeBackend::new(NamespacePolicy::Flat, vec![Step::WriteNothing]);
        backend.reject_empty = true;
        let observer = Arc::new(RecordingObserver::default());
        let up = uploader(backend, "").with_observer(observer.clone());
        let mut source = Cursor::new(b"abc".to_vec());

        let url = up.upload(&mut source, "z.txt").await.unwrap();

        assert_eq!(url, "https://cdn.example//files/z.txt");
        assert_eq!(observer.failures.lock().unwrap().len(), 1);
        assert_eq!(
            up.backend()
                .log()
                .iter()
                .filter(|e| e.starts_with("transfer"))
                .count(),
            2
        );
    }

    #[tokio::test]
    async fn test_exhaustion_returns_last_error_and_no_url() {
        let backend = FakeBackend::new(NamespacePolicy::Flat, vec![Step::FailTransfer; 10]);
        let up = uploader(backend, "");
        let mut source = Cursor::new(b"abc".to_vec());

        let result = up.upload(&mut source, "z.txt").await;

        assert!(matches!(result, Err(Error::Transfer(_))));
        assert_eq!(
            up.backend()
                .log()
                .iter()
                .filter(|e| *e == "release")
                .count(),
            10
        );
    }
}
