//! Server host key verification

use async_trait::async_trait;
use russh::client::Handler;
use russh::keys::{HashAlg, PublicKey};

/// SSH event handler that optionally pins the server key fingerprint
pub(crate) struct HostKeyCheck {
    expected: Option<String>,
}

impl HostKeyCheck {
    pub(crate) fn new(expected: Option<&str>) -> Self {
        Self {
            expected: expected.map(str::to_string),
        }
    }
}

#[async_trait]
impl Handler for HostKeyCheck {
    type Error = russh::Error;

    async fn check_server_key(&mut self, server_public_key: &PublicKey) -> Result<bool, Self::Error> {
        let actual = server_public_key.fingerprint(HashAlg::Sha256).to_string();

        match &self.expected {
            Some(expected) if !fingerprint_matches(expected, &actual) => {
                tracing::warn!(expected = %expected, actual = %actual, "SFTP host key fingerprint mismatch");
                Ok(false)
            }
            Some(_) => Ok(true),
            None => {
                tracing::debug!(fingerprint = %actual, "Accepting unpinned SFTP host key");
                Ok(true)
            }
        }
    }
}

/// Compare SHA256 fingerprints, ignoring the `SHA256:` prefix and base64 padding
pub(crate) fn fingerprint_matches(expected: &str, actual: &str) -> bool {
    fn normalize(raw: &str) -> &str {
        let raw = raw.trim();
        let raw = raw
            .get(..7)
            .filter(|p| p.eq_ignore_ascii_case("sha256:"))
            .map_or(raw, |_| &raw[7..]);
        raw.trim_end_matches('=')
    }
    let expected = normalize(expected);
    !expected.is_empty() && expected == normalize(actual)
}
