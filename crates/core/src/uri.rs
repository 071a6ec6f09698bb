//! URI model
//!
//! Handles resource locators of the form
//! `scheme://[username[:password]@]host[:port]/path[?key=value&...]`
//! plus the opaque alias form `scheme:NAME`.
//!
//! Tokenization is delegated to the `url` crate. Components are stored
//! percent-decoded and re-encoded on display, so `Uri::parse(&uri.to_string())`
//! always yields the same value.

use std::collections::BTreeMap;
use std::fmt;
use std::fmt::Write as _;
use std::str::FromStr;

use url::Url;
use url::form_urlencoded;

use crate::error::{Error, Result};

/// Query parameter names whose values are treated as secrets
pub const CREDENTIAL_KEYS: &[&str] = &[
    "password",
    "secret",
    "secret_key",
    "secret_access_key",
    "aws_secret_access_key",
    "session_token",
    "token",
    "access_token",
    "api_key",
    "passphrase",
];

const REDACTED: &str = "***";

/// Check whether a query key carries a credential
pub fn is_credential_key(key: &str) -> bool {
    CREDENTIAL_KEYS
        .iter()
        .any(|k| k.eq_ignore_ascii_case(key))
}

/// A string that never shows up in `Debug` or `Display` output
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Access the plaintext value
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(REDACTED)
    }
}

/// A parsed, immutable resource locator
#[derive(Clone, PartialEq, Eq)]
pub struct Uri {
    scheme: String,
    username: Option<String>,
    password: Option<Secret>,
    host: Option<String>,
    port: Option<u16>,
    path: String,
    encoded_path: String,
    query: BTreeMap<String, String>,
}

impl Uri {
    /// Parse a raw string into a URI
    ///
    /// Fails with [`Error::MalformedUri`] when the scheme is missing or the
    /// string is not valid URI syntax. The fragment, if any, is dropped.
    pub fn parse(raw: &str) -> Result<Self> {
        let url = Url::parse(raw).map_err(|e| malformed(raw, e))?;

        let username = match url.username() {
            "" => None,
            user => Some(decode(raw, user)?),
        };
        let password = url
            .password()
            .map(|p| decode(raw, p).map(Secret::new))
            .transpose()?;
        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .map(str::to_string);
        let encoded_path = url.path().to_string();
        let path = decode(raw, &encoded_path)?;

        let mut query = BTreeMap::new();
        for (key, value) in url.query_pairs() {
            // Later occurrences replace earlier ones
            query.insert(key.into_owned(), value.into_owned());
        }

        Ok(Self {
            scheme: url.scheme().to_ascii_lowercase(),
            username,
            password,
            host,
            port: url.port(),
            path,
            encoded_path,
            query,
        })
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    pub fn password(&self) -> Option<&Secret> {
        self.password.as_ref()
    }

    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    pub fn port(&self) -> Option<u16> {
        self.port
    }

    /// Decoded path; empty for connection-only URIs
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn query(&self) -> &BTreeMap<String, String> {
        &self.query
    }

    pub fn query_param(&self, key: &str) -> Option<&str> {
        self.query.get(key).map(String::as_str)
    }

    /// Whether any credential is embedded in the authority
    pub fn has_credentials(&self) -> bool {
        self.username.is_some() || self.password.is_some()
    }

    /// Whether the URI has an authority section (`//...`)
    pub fn has_authority(&self) -> bool {
        self.host.is_some() || self.port.is_some() || self.has_credentials()
    }

    /// Whether this is the opaque `scheme:NAME` form
    pub fn is_opaque(&self) -> bool {
        !self.has_authority() && !self.path.is_empty() && !self.path.starts_with('/')
    }

    pub fn with_username(mut self, username: Option<String>) -> Self {
        self.username = username;
        self
    }

    pub fn with_password(mut self, password: Option<Secret>) -> Self {
        self.password = password;
        self
    }

    pub fn with_port(mut self, port: Option<u16>) -> Self {
        self.port = port;
        self
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self.encoded_path = encode_path(&self.path);
        self
    }

    /// Path as written, percent-escapes intact
    pub(crate) fn encoded_path(&self) -> &str {
        &self.encoded_path
    }

    /// Replace the path, keeping an already-encoded rendering of it
    pub(crate) fn with_path_parts(mut self, path: String, encoded_path: String) -> Self {
        self.path = path;
        self.encoded_path = encoded_path;
        self
    }

    pub fn with_query_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(key.into(), value.into());
        self
    }

    /// Authority with the password masked, e.g. `user:***@host:21`
    pub fn redacted_authority(&self) -> String {
        let mut out = String::new();
        self.write_authority(&mut out, true);
        out
    }

    /// Full URI with the password and credential query values masked
    pub fn redacted(&self) -> String {
        self.render(true)
    }

    fn write_authority(&self, out: &mut String, redact: bool) {
        if self.has_credentials() {
            if let Some(user) = &self.username {
                out.push_str(&urlencoding::encode(user));
            }
            if let Some(password) = &self.password {
                out.push(':');
                if redact {
                    out.push_str(REDACTED);
                } else {
                    out.push_str(&urlencoding::encode(password.expose()));
                }
            }
            out.push('@');
        }
        if let Some(host) = &self.host {
            out.push_str(host);
        }
        if let Some(port) = self.port {
            let _ = write!(out, ":{port}");
        }
    }

    fn render(&self, redact: bool) -> String {
        let mut out = format!("{}:", self.scheme);

        if self.has_authority() {
            out.push_str("//");
            self.write_authority(&mut out, redact);
            if !self.encoded_path.is_empty() && !self.encoded_path.starts_with('/') {
                out.push('/');
            }
            out.push_str(&self.encoded_path);
        } else if self.encoded_path.starts_with('/') {
            out.push_str("//");
            out.push_str(&self.encoded_path);
        } else {
            out.push_str(&self.encoded_path);
        }

        if !self.query.is_empty() {
            let mut serializer = form_urlencoded::Serializer::new(String::new());
            for (key, value) in &self.query {
                if redact && is_credential_key(key) {
                    serializer.append_pair(key, REDACTED);
                } else {
                    serializer.append_pair(key, value);
                }
            }
            out.push('?');
            out.push_str(&serializer.finish());
        }

        out
    }
}

impl fmt::Display for Uri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render(false))
    }
}

impl fmt::Debug for Uri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Uri({})", self.redacted())
    }
}

impl FromStr for Uri {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Anything the dispatcher accepts as a resource locator
pub trait IntoUri {
    fn into_uri(self) -> Result<Uri>;
}

impl IntoUri for Uri {
    fn into_uri(self) -> Result<Uri> {
        Ok(self)
    }
}

impl IntoUri for &Uri {
    fn into_uri(self) -> Result<Uri> {
        Ok(self.clone())
    }
}

impl IntoUri for &str {
    fn into_uri(self) -> Result<Uri> {
        Uri::parse(self)
    }
}

impl IntoUri for String {
    fn into_uri(self) -> Result<Uri> {
        Uri::parse(&self)
    }
}

impl IntoUri for &String {
    fn into_uri(self) -> Result<Uri> {
        Uri::parse(self)
    }
}

fn decode(raw: &str, component: &str) -> Result<String> {
    urlencoding::decode(component)
        .map(|c| c.into_owned())
        .map_err(|e| malformed(raw, e))
}

fn encode_path(path: &str) -> String {
    path.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

fn malformed(raw: &str, reason: impl fmt::Display) -> Error {
    Error::MalformedUri {
        uri: redact_raw(raw),
        reason: reason.to_string(),
    }
}

/// Best-effort password masking for strings that failed to parse
fn redact_raw(raw: &str) -> String {
    let Some(start) = raw.find("://").map(|i| i + 3) else {
        return raw.to_string();
    };
    let rest = &raw[start..];
    let end = rest.find(['/', '?', '#']).unwrap_or(rest.len());
    let authority = &rest[..end];

    match authority.rfind('@') {
        Some(at) => match authority[..at].find(':') {
            Some(colon) => format!(
                "{}{}:{}{}",
                &raw[..start],
                &authority[..colon],
                REDACTED,
                &rest[at..]
            ),
            None => raw.to_string(),
        },
        None => raw.to_string(),
    }
}
