//! urio-http: read-only HTTP(S) backend for urio
//!
//! `http(s)://[user[:pass]@]host[:port]/path?query`. Userinfo becomes basic
//! auth; the query string (minus urio's own timeout parameters) is forwarded.
//! Each read is an independent GET, so streams never contend.

pub mod client;

use std::sync::Arc;

use urio_core::{Client, ConnectionDescriptor, Registry};

pub use client::HttpClient;

pub const SCHEMES: &[&str] = &["http", "https"];

/// Register `http` and `https`
pub fn register(registry: &Registry) {
    for scheme in SCHEMES {
        registry.register(scheme, |descriptor: &ConnectionDescriptor| {
            Ok(Arc::new(HttpClient::connect(descriptor)?) as Arc<dyn Client>)
        });
    }
}
