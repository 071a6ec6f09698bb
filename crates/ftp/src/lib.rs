//! urio-ftp: FTP backend for urio
//!
//! `ftp://[user[:pass]@]host[:port]/path`, anonymous login when no user is
//! given. One control connection carries one transfer at a time, so a client
//! allows a single open stream. Overwrites are uploaded under a hidden
//! sibling name and renamed into place on close.

pub mod client;
mod listing;

use std::sync::Arc;

use urio_core::{Client, ConnectionDescriptor, Registry};

pub use client::FtpClient;

pub const SCHEME: &str = "ftp";

/// Register the `ftp` scheme
pub fn register(registry: &Registry) {
    registry.register(SCHEME, |descriptor: &ConnectionDescriptor| {
        Ok(Arc::new(FtpClient::connect(descriptor)?) as Arc<dyn Client>)
    });
}
