//! Server host key verification

use std::path::PathBuf;

use russh::client;
use russh::keys::PublicKey;
use russh::keys::ssh_key::HashAlg;
use su_core::{Error, HostKeyPolicy};
use thiserror::Error as ThisError;

/// Errors raised from inside the SSH handler
#[derive(Debug, ThisError)]
pub enum SshError {
    #[error(transparent)]
    Russh(#[from] russh::Error),

    #[error("{0}")]
    HostKey(String),
}

impl From<SshError> for Error {
    fn from(e: SshError) -> Self {
        match e {
            SshError::HostKey(msg) => Error::HostKey(msg),
            SshError::Russh(e) => Error::Connection(e.to_string()),
        }
    }
}

/// Split `host:port` into its parts, defaulting to port 22
///
/// Bracketed IPv6 literals (`[::1]:2222`) are unwrapped.
pub fn split_host_port(addr: &str) -> (String, u16) {
    if let Some(rest) = addr.strip_prefix('[')
        && let Some((host, tail)) = rest.split_once(']')
    {
        let port = tail
            .strip_prefix(':')
            .and_then(|p| p.parse().ok())
            .unwrap_or(22);
        return (host.to_string(), port);
    }

    match addr.rsplit_once(':') {
        Some((host, port)) if !host.contains(':') => match port.parse() {
            Ok(port) => (host.to_string(), port),
            Err(_) => (addr.to_string(), 22),
        },
        _ => (addr.to_string(), 22),
    }
}

/// Compare two SHA256 fingerprints, ignoring the `SHA256:` prefix and padding
pub fn fingerprints_match(expected: &str, actual: &str) -> bool {
    fn normalize(f: &str) -> &str {
        let f = f.trim();
        f.strip_prefix("SHA256:").unwrap_or(f).trim_end_matches('=')
    }

    !normalize(expected).is_empty() && normalize(expected) == normalize(actual)
}

fn default_known_hosts() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".ssh").join("known_hosts"))
}

/// russh handler that applies a [`HostKeyPolicy`]
pub struct HostKeyVerifier {
    host: String,
    port: u16,
    policy: HostKeyPolicy,
}

impl HostKeyVerifier {
    pub fn new(host: impl Into<String>, port: u16, policy: HostKeyPolicy) -> Self {
        Self {
            host: host.into(),
            port,
            policy,
        }
    }

    /// Decide whether `key` is acceptable for this host
    pub fn verify(&self, key: &PublicKey) -> Result<bool, SshError> {
        let fingerprint = key.fingerprint(HashAlg::Sha256).to_string();

        match &self.policy {
            HostKeyPolicy::AcceptAny => {
                tracing::debug!(
                    host = %self.host,
                    fingerprint = %fingerprint,
                    "Host key verification disabled, accepting"
                );
                Ok(true)
            }
            HostKeyPolicy::Pinned { fingerprint: pinned } => {
                if fingerprints_match(pinned, &fingerprint) {
                    Ok(true)
                } else {
                    Err(SshError::HostKey(format!(
                        "{}:{} presented {fingerprint}, expected {pinned}",
                        self.host, self.port
                    )))
                }
            }
            HostKeyPolicy::KnownHosts { path, learn } => {
                let path = path.clone().or_else(default_known_hosts).ok_or_else(|| {
                    SshError::HostKey("Could not determine known_hosts location".to_string())
                })?;

                match russh::keys::check_known_hosts_path(&self.host, self.port, key, &path) {
                    Ok(true) => Ok(true),
                    Ok(false) if *learn => {
                        russh::keys::known_hosts::learn_known_hosts_path(&self.host, self.port, key, &path)
                            .map_err(|e| {
                                SshError::HostKey(format!(
                                    "Failed to record host key in {}: {e}",
                                    path.display()
                                ))
                            })?;
                        tracing::info!(
                            host = %self.host,
                            port = self.port,
                            fingerprint = %fingerprint,
                            "Trusting new host key"
                        );
                        Ok(true)
                    }
                    Ok(false) => Err(SshError::HostKey(format!(
                        "Unknown host {}:{} ({fingerprint}) not in {}",
                        self.host,
                        self.port,
                        path.display()
                    ))),
                    Err(e) => Err(SshError::HostKey(format!(
                        "{}:{} failed known_hosts check: {e}",
                        self.host, self.port
                    ))),
                }
            }
        }
    }
}

impl client::Handler for HostKeyVerifier {
    type Error = SshError;

    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> Result<bool, Self::Error> {
        self.verify(server_public_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const KEY: &str =
        "ssh-ed25519 AAAAC3NzaC1lZDI1NTE5AAAAIBm7bD3Q7vSBCGZv5LJd+F/Djj4V1jav316PBCIimlIk test";
    const KEY_FINGERPRINT: &str = "SHA256:zAUS/kX5ME/vEh1XOG0SMxRFfS4oo4Z/piUJ4aaix0o";
    const OTHER_KEY: &str =
        "ssh-ed25519 AAAAC3NzaC1lZDI1NTE5AAAAIDG2XrF+QNGrKnfBl4tnhRg5sZszUEV7l1ANn3ty2+4r other";

    fn key(s: &str) -> PublicKey {
        PublicKey::from_openssh(s).unwrap()
    }

    #[test]
    fn test_split_host_port() {
        assert_eq!(split_host_port("box.example:2222"), ("box.example".to_string(), 2222));
        assert_eq!(split_host_port("box.example"), ("box.example".to_string(), 22));
        assert_eq!(split_host_port("[::1]:2200"), ("::1".to_string(), 2200));
        assert_eq!(split_host_port("[::1]"), ("::1".to_string(), 22));
        assert_eq!(split_host_port("::1"), ("::1".to_string(), 22));
    }

    #[test]
    fn test_fingerprints_match() {
        assert!(fingerprints_match(KEY_FINGERPRINT, KEY_FINGERPRINT));
        assert!(fingerprints_match(
            "zAUS/kX5ME/vEh1XOG0SMxRFfS4oo4Z/piUJ4aaix0o=",
            KEY_FINGERPRINT
        ));
        assert!(!fingerprints_match("SHA256:", KEY_FINGERPRINT));
        assert!(!fingerprints_match("SHA256:other", KEY_FINGERPRINT));
    }

    #[test]
    fn test_accept_any() {
        let verifier = HostKeyVerifier::new("box", 22, HostKeyPolicy::AcceptAny);
        assert!(verifier.verify(&key(KEY)).unwrap());
    }

    #[test]
    fn test_pinned() {
        let verifier = HostKeyVerifier::new(
            "box",
            22,
            HostKeyPolicy::Pinned {
                fingerprint: KEY_FINGERPRINT.to_string(),
            },
        );
        assert!(verifier.verify(&key(KEY)).unwrap());
        assert!(matches!(
            verifier.verify(&key(OTHER_KEY)),
            Err(SshError::HostKey(_))
        ));
    }

    #[test]
    fn test_known_hosts_strict() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("known_hosts");
        std::fs::write(&path, format!("box.example {KEY}\n")).unwrap();

        let verifier = HostKeyVerifier::new(
            "box.example",
            22,
            HostKeyPolicy::KnownHosts {
                path: Some(path.clone()),
                learn: false,
            },
        );
        assert!(verifier.verify(&key(KEY)).unwrap());
        assert!(verifier.verify(&key(OTHER_KEY)).is_err());

        let stranger = HostKeyVerifier::new(
            "stranger.example",
            22,
            HostKeyPolicy::KnownHosts {
                path: Some(path),
                learn: false,
            },
        );
        assert!(stranger.verify(&key(KEY)).is_err());
    }

    #[test]
    fn test_known_hosts_trust_on_first_use() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("known_hosts");
        std::fs::write(&path, "").unwrap();

        let policy = HostKeyPolicy::KnownHosts {
            path: Some(path.clone()),
            learn: true,
        };
        let verifier = HostKeyVerifier::new("new.example", 2222, policy);
        assert!(verifier.verify(&key(KEY)).unwrap());

        let strict = HostKeyVerifier::new(
            "new.example",
            2222,
            HostKeyPolicy::KnownHosts {
                path: Some(path),
                learn: false,
            },
        );
        assert!(strict.verify(&key(KEY)).unwrap());
    }

    #[test]
    fn test_ssh_error_conversion() {
        let err: Error = SshError::HostKey("mismatch".to_string()).into();
        assert!(matches!(err, Error::HostKey(msg) if msg == "mismatch"));
    }
}
