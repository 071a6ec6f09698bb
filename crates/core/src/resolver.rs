//! Credential resolution
//!
//! Turns a caller URI into a [`ConnectionDescriptor`] by substituting named
//! connections, overlaying the caller's explicit fields and applying the
//! effective timeouts. Resolution is a pure function of the URI and the
//! connection snapshot held by the resolver.

use std::time::Duration;

use crate::config::TimeoutConfig;
use crate::connections::Connections;
use crate::error::{Error, Result, Target};
use crate::uri::Uri;

/// Query parameter overriding the connect timeout
pub const CONNECT_TIMEOUT_PARAM: &str = "connect_timeout_ms";

/// Query parameter overriding the I/O timeout
pub const IO_TIMEOUT_PARAM: &str = "io_timeout_ms";

/// Everything a client factory needs to open a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionDescriptor {
    /// Fully resolved URI, credentials included
    pub uri: Uri,
    /// Named connection the URI was resolved through, if any
    pub alias: Option<String>,
    pub timeouts: TimeoutConfig,
}

impl ConnectionDescriptor {
    /// Descriptor for a URI used as-is with default timeouts
    pub fn new(uri: Uri) -> Self {
        Self {
            uri,
            alias: None,
            timeouts: TimeoutConfig::default(),
        }
    }

    pub fn target(&self) -> Target {
        Target::of(&self.uri)
    }

    pub fn connect_timeout(&self) -> Duration {
        self.timeouts.connect()
    }

    pub fn io_timeout(&self) -> Duration {
        self.timeouts.io()
    }
}

/// Resolves URIs against a snapshot of named connections
#[derive(Debug, Clone, Default)]
pub struct CredentialResolver {
    connections: Connections,
    timeouts: TimeoutConfig,
}

impl CredentialResolver {
    pub fn new(connections: Connections) -> Self {
        Self {
            connections,
            timeouts: TimeoutConfig::default(),
        }
    }

    /// Set the timeouts used when a URI does not override them
    pub fn with_timeouts(mut self, timeouts: TimeoutConfig) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn connections(&self) -> &Connections {
        &self.connections
    }

    pub fn timeouts(&self) -> TimeoutConfig {
        self.timeouts
    }

    /// Resolve a URI into a connection descriptor
    pub fn resolve(&self, uri: &Uri) -> Result<ConnectionDescriptor> {
        let scheme = uri.scheme();

        let (resolved, alias) = if uri.is_opaque() {
            let name = uri.path();
            let base = self
                .connections
                .get_for_scheme(name, scheme)
                .ok_or_else(|| Error::UnknownConnection(format!("{scheme}:{name}")))?;
            (overlay(base, uri, false), Some(name.to_ascii_uppercase()))
        } else if let Some((name, base)) = uri.host().and_then(|host| {
            self.connections
                .get_for_scheme(host, scheme)
                .map(|base| (host, base))
        }) {
            (overlay(base, uri, true), Some(name.to_ascii_uppercase()))
        } else {
            self.inject(uri)
        };

        let timeouts = self.timeouts_for(&resolved)?;

        tracing::debug!(
            uri = %resolved.redacted(),
            alias = alias.as_deref().unwrap_or("-"),
            connect_ms = timeouts.connect_ms,
            io_ms = timeouts.io_ms,
            "Resolved connection"
        );

        Ok(ConnectionDescriptor {
            uri: resolved,
            alias,
            timeouts,
        })
    }

    /// Lend credentials from the closest matching named connection
    fn inject(&self, uri: &Uri) -> (Uri, Option<String>) {
        if uri.has_credentials() {
            return (uri.clone(), None);
        }
        let Some(host) = uri.host() else {
            return (uri.clone(), None);
        };

        let lender = self
            .connections
            .iter()
            .filter(|(_, candidate)| {
                candidate.scheme() == uri.scheme()
                    && candidate
                        .host()
                        .is_some_and(|h| h.eq_ignore_ascii_case(host))
                    && ports_compatible(candidate.port(), uri.port())
                    && candidate.has_credentials()
                    && is_path_prefix(candidate.path(), uri.path())
            })
            .max_by_key(|(_, candidate)| candidate.path().trim_end_matches('/').len());

        let Some((name, lender)) = lender else {
            return (uri.clone(), None);
        };

        tracing::debug!(connection = name, "Injecting credentials from named connection");

        let mut out = uri
            .clone()
            .with_username(lender.username().map(str::to_string))
            .with_password(lender.password().cloned());
        if out.port().is_none() {
            out = out.with_port(lender.port());
        }
        for (key, value) in lender.query() {
            if out.query_param(key).is_none() {
                out = out.with_query_param(key, value);
            }
        }
        (out, Some(name.to_string()))
    }

    fn timeouts_for(&self, uri: &Uri) -> Result<TimeoutConfig> {
        let mut timeouts = self.timeouts;
        if let Some(ms) = millis_param(uri, CONNECT_TIMEOUT_PARAM)? {
            timeouts.connect_ms = ms;
        }
        if let Some(ms) = millis_param(uri, IO_TIMEOUT_PARAM)? {
            timeouts.io_ms = ms;
        }
        Ok(timeouts)
    }
}

/// Caller fields win over the named connection's
fn overlay(base: &Uri, caller: &Uri, keep_caller_path: bool) -> Uri {
    let mut out = base.clone();
    if caller.username().is_some() {
        out = out.with_username(caller.username().map(str::to_string));
    }
    if caller.password().is_some() {
        out = out.with_password(caller.password().cloned());
    }
    if caller.port().is_some() {
        out = out.with_port(caller.port());
    }
    if keep_caller_path {
        out = out.with_path_parts(
            join_path(base.path(), caller.path()),
            join_path(base.encoded_path(), caller.encoded_path()),
        );
    }
    for (key, value) in caller.query() {
        out = out.with_query_param(key, value);
    }
    out
}

fn join_path(base: &str, extra: &str) -> String {
    if extra.is_empty() {
        return base.to_string();
    }
    if base.is_empty() {
        return extra.to_string();
    }
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        extra.trim_start_matches('/')
    )
}

fn ports_compatible(lender: Option<u16>, caller: Option<u16>) -> bool {
    match (lender, caller) {
        (Some(a), Some(b)) => a == b,
        _ => true,
    }
}

fn is_path_prefix(prefix: &str, path: &str) -> bool {
    let prefix = prefix.trim_end_matches('/');
    prefix.is_empty()
        || path == prefix
        || path
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.starts_with('/'))
}

fn millis_param(uri: &Uri, key: &str) -> Result<Option<u64>> {
    uri.query_param(key)
        .map(|raw| {
            raw.parse::<u64>().map_err(|_| Error::MalformedUri {
                uri: uri.redacted(),
                reason: format!("{key} must be a number of milliseconds, got '{raw}'"),
            })
        })
        .transpose()
}
