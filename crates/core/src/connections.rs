//! Named connections
//!
//! A named connection is a URI registered under an alias, typically through
//! an environment variable `PREFIX__CONN__ALIAS=uri`. The set is an immutable
//! snapshot: reloading means building a new [`Connections`] value.

use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::uri::Uri;

/// Environment prefix used when none is configured
pub const DEFAULT_ENV_PREFIX: &str = "URIO";

const CONN_MARKER: &str = "__CONN__";

/// Snapshot of alias → URI mappings
///
/// Alias names are case-insensitive and stored upper-cased.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Connections {
    entries: BTreeMap<String, Uri>,
}

impl Connections {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every `PREFIX__CONN__NAME` variable from the process environment
    pub fn from_env(prefix: &str) -> Result<Self> {
        Self::from_vars(prefix, std::env::vars())
    }

    /// Load connections from an arbitrary set of key/value pairs
    ///
    /// Keys that do not start with `PREFIX__CONN__` are ignored. A value that
    /// does not parse as a URI is an error.
    pub fn from_vars<I, K, V>(prefix: &str, vars: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let marker = format!("{}{CONN_MARKER}", prefix.to_ascii_uppercase());
        let mut connections = Self::new();

        for (key, value) in vars {
            let key = key.as_ref().to_ascii_uppercase();
            let Some(name) = key.strip_prefix(&marker) else {
                continue;
            };
            if validate_name(name).is_err() {
                tracing::warn!(variable = %key, "Ignoring connection with invalid name");
                continue;
            }
            let uri = Uri::parse(value.as_ref())?;
            tracing::debug!(name, uri = %uri.redacted(), "Loaded named connection");
            connections.entries.insert(name.to_string(), uri);
        }

        Ok(connections)
    }

    /// Register a connection, replacing any existing one with the same name
    pub fn insert(&mut self, name: &str, uri: Uri) -> Result<()> {
        validate_name(name)?;
        self.entries.insert(name.to_ascii_uppercase(), uri);
        Ok(())
    }

    /// Builder-style [`Connections::insert`]
    pub fn with(mut self, name: &str, uri: Uri) -> Result<Self> {
        self.insert(name, uri)?;
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Option<&Uri> {
        self.entries.get(&name.to_ascii_uppercase())
    }

    /// Look up an alias that must belong to `scheme`
    pub fn get_for_scheme(&self, name: &str, scheme: &str) -> Option<&Uri> {
        self.get(name).filter(|uri| uri.scheme() == scheme)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Uri)> {
        self.entries.iter().map(|(name, uri)| (name.as_str(), uri))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Combine two snapshots; entries of `other` win on name clashes
    pub fn merge(mut self, other: Connections) -> Self {
        self.entries.extend(other.entries);
        self
    }
}

/// Check that an alias name only uses `[A-Za-z0-9_-]`
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::Config("Connection name cannot be empty".into()));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(Error::Config(format!(
            "Connection name '{name}' may only contain letters, digits, '_' and '-'"
        )));
    }
    Ok(())
}
