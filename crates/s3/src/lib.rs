//! urio-s3: S3 backend for urio
//!
//! `s3://[key:secret@]bucket/key?region=&endpoint=&path_style=&part_size=`
//!
//! This is the only crate that directly depends on the AWS SDK. Clients
//! allow concurrent streams, so the scheme is registered pooled.

pub mod client;
mod error;
pub mod multipart;

use std::sync::Arc;

use urio_core::{Client, ConnectionDescriptor, Registry};

pub use client::{S3Client, S3Options};

pub const SCHEME: &str = "s3";

/// Register the `s3` scheme
pub fn register(registry: &Registry) {
    registry.register_pooled(SCHEME, |descriptor: &ConnectionDescriptor| {
        Ok(Arc::new(S3Client::connect(descriptor)?) as Arc<dyn Client>)
    });
}
