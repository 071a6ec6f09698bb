//! urio-gs: Google Cloud Storage backend for urio
//!
//! `gs://bucket/object?token=&user_project=&endpoint=`. Requests go to the
//! GCS JSON API with an OAuth bearer token taken from `token=`, the URI
//! password, or `GOOGLE_OAUTH_ACCESS_TOKEN`, in that order. Without a token
//! requests are anonymous, which is enough for public buckets.

pub mod client;
mod objects;

use std::sync::Arc;

use urio_core::{Client, ConnectionDescriptor, Registry};

pub use client::{GsClient, GsOptions};

pub const SCHEME: &str = "gs";

/// Register the `gs` scheme
pub fn register(registry: &Registry) {
    registry.register_pooled(SCHEME, |descriptor: &ConnectionDescriptor| {
        Ok(Arc::new(GsClient::connect(descriptor)?) as Arc<dyn Client>)
    });
}
