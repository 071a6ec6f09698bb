//! urio-core: URI-addressed streaming I/O
//!
//! This crate provides the backend-independent layer of urio:
//! - URI parsing and redaction
//! - Named connections and the configuration file
//! - Credential resolution
//! - The client registry and the `Client` contract
//! - Stream adapters with guaranteed release
//! - The `Dispatcher` entry point
//! - Built-in `file://` and `memory://` backends
//!
//! Protocol backends (S3, GCS, FTP, SFTP, PostgreSQL, HTTP) live in their own
//! crates and plug in through [`Registry::register`].

pub mod backends;
pub mod client;
pub mod config;
pub mod connections;
pub mod dispatcher;
pub mod error;
pub mod registry;
pub mod resolver;
pub mod runtime;
pub mod stream;
pub mod uri;

pub use client::{
    Capabilities, Client, Entry, Listable, Listing, OpenMode, Removable, SlotGuard, StreamSlot,
    WriteMode, staging_path,
};
pub use config::{Config, ConfigManager, TimeoutConfig};
pub use connections::{Connections, DEFAULT_ENV_PREFIX};
pub use dispatcher::Dispatcher;
pub use error::{Error, Operation, Result, Target};
pub use registry::{ClientFactory, Registry};
pub use resolver::{ConnectionDescriptor, CredentialResolver};
pub use runtime::BlockingRuntime;
pub use stream::{ReadAdapter, ReadStream, Stream, WriteAdapter, WriteStream};
pub use uri::{IntoUri, Secret, Uri};
