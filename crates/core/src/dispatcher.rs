//! Dispatcher
//!
//! The single entry point: resolve a URI, build a client through the
//! registry and hand back a stream or perform a one-shot operation.

use std::sync::Arc;

use crate::client::{Client, Listing, OpenMode, WriteMode};
use crate::config::TimeoutConfig;
use crate::connections::Connections;
use crate::error::{Operation, Result};
use crate::registry::Registry;
use crate::resolver::{ConnectionDescriptor, CredentialResolver};
use crate::stream::{DEFAULT_CHUNK_SIZE, ReadStream, Stream, WriteStream};
use crate::uri::IntoUri;

#[derive(Debug, Clone)]
pub struct Dispatcher {
    registry: Arc<Registry>,
    resolver: CredentialResolver,
}

impl Dispatcher {
    pub fn new(registry: Arc<Registry>, connections: Connections) -> Self {
        Self::with_resolver(registry, CredentialResolver::new(connections))
    }

    pub fn with_resolver(registry: Arc<Registry>, resolver: CredentialResolver) -> Self {
        Self { registry, resolver }
    }

    /// Default timeouts for URIs that do not set their own
    pub fn with_timeouts(mut self, timeouts: TimeoutConfig) -> Self {
        self.resolver = self.resolver.with_timeouts(timeouts);
        self
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn resolver(&self) -> &CredentialResolver {
        &self.resolver
    }

    /// Resolve a URI without connecting
    pub fn resolve(&self, uri: impl IntoUri) -> Result<ConnectionDescriptor> {
        self.resolver.resolve(&uri.into_uri()?)
    }

    /// Resolve a URI and build its client
    pub fn client_for(&self, uri: impl IntoUri) -> Result<Arc<dyn Client>> {
        self.connect(uri).map(|(client, _)| client)
    }

    fn connect(&self, uri: impl IntoUri) -> Result<(Arc<dyn Client>, ConnectionDescriptor)> {
        let descriptor = self.resolve(uri)?;
        let client = self.registry.open(&descriptor)?;
        Ok((client, descriptor))
    }

    /// Open a stream in the given mode
    pub fn open(&self, uri: impl IntoUri, mode: OpenMode) -> Result<Stream> {
        match mode {
            OpenMode::Read => self.open_reader(uri).map(Stream::Reader),
            OpenMode::Write(write_mode) => self.open_writer(uri, write_mode).map(Stream::Writer),
        }
    }

    pub fn open_reader(&self, uri: impl IntoUri) -> Result<ReadStream> {
        let (client, descriptor) = self.connect(uri)?;
        client.get_reader(descriptor.uri.path())
    }

    pub fn open_writer(&self, uri: impl IntoUri, mode: WriteMode) -> Result<WriteStream> {
        let (client, descriptor) = self.connect(uri)?;
        let caps = client.capabilities();
        if !caps.write {
            return Err(client.target().read_only());
        }
        if mode == WriteMode::Append && !caps.append {
            return Err(client.target().unsupported(Operation::Append));
        }
        client.get_writer(descriptor.uri.path(), mode)
    }

    /// Run `f` with an open reader, closing it afterwards
    ///
    /// On failure the reader is still released and the closure's error is
    /// returned.
    pub fn with_reader<T, F>(&self, uri: impl IntoUri, f: F) -> Result<T>
    where
        F: FnOnce(&mut ReadStream) -> Result<T>,
    {
        let mut reader = self.open_reader(uri)?;
        match f(&mut reader) {
            Ok(value) => {
                reader.close()?;
                Ok(value)
            }
            Err(e) => {
                if let Err(close_err) = reader.close() {
                    tracing::warn!(path = reader.path(), error = %close_err, "Failed to release reader after error");
                }
                Err(e)
            }
        }
    }

    /// Run `f` with an open writer, committing on success
    ///
    /// A failing closure aborts the writer; a failing commit is returned.
    pub fn with_writer<T, F>(&self, uri: impl IntoUri, mode: WriteMode, f: F) -> Result<T>
    where
        F: FnOnce(&mut WriteStream) -> Result<T>,
    {
        let mut writer = self.open_writer(uri, mode)?;
        match f(&mut writer) {
            Ok(value) => {
                writer.close()?;
                Ok(value)
            }
            Err(e) => {
                if let Err(abort_err) = writer.abort() {
                    tracing::warn!(path = writer.path(), error = %abort_err, "Failed to abort writer after error");
                }
                Err(e)
            }
        }
    }

    /// Read a whole resource into memory
    pub fn get(&self, uri: impl IntoUri) -> Result<Vec<u8>> {
        self.with_reader(uri, |reader| reader.read_to_end_bytes())
    }

    /// Replace a resource with `data`
    pub fn put(&self, uri: impl IntoUri, data: &[u8]) -> Result<()> {
        self.with_writer(uri, WriteMode::Overwrite, |writer| writer.write_all_bytes(data))
    }

    /// Append `data` to a resource
    pub fn append(&self, uri: impl IntoUri, data: &[u8]) -> Result<()> {
        self.with_writer(uri, WriteMode::Append, |writer| writer.write_all_bytes(data))
    }

    /// Stream `src` into `dst`, returning the number of bytes copied
    pub fn copy(&self, src: impl IntoUri, dst: impl IntoUri) -> Result<u64> {
        self.copy_with_progress(src, dst, |_| {})
    }

    /// Like [`Dispatcher::copy`], reporting the running total after each chunk
    pub fn copy_with_progress<P>(&self, src: impl IntoUri, dst: impl IntoUri, mut progress: P) -> Result<u64>
    where
        P: FnMut(u64),
    {
        self.with_reader(src, |reader| {
            self.with_writer(dst, WriteMode::Overwrite, |writer| {
                let mut total = 0u64;
                loop {
                    let chunk = reader.read_chunk(DEFAULT_CHUNK_SIZE)?;
                    if chunk.is_empty() {
                        return Ok(total);
                    }
                    writer.write_all_bytes(&chunk)?;
                    total += chunk.len() as u64;
                    progress(total);
                }
            })
        })
    }

    pub fn exists(&self, uri: impl IntoUri) -> Result<bool> {
        let (client, descriptor) = self.connect(uri)?;
        client.exists(descriptor.uri.path())
    }

    /// Entries under a prefix, relative to it
    pub fn list(&self, uri: impl IntoUri) -> Result<Listing> {
        let (client, descriptor) = self.connect(uri)?;
        let listable = client
            .as_listable()
            .ok_or_else(|| client.target().unsupported(Operation::List))?;
        listable.list(descriptor.uri.path())
    }

    pub fn remove(&self, uri: impl IntoUri) -> Result<()> {
        let (client, descriptor) = self.connect(uri)?;
        let removable = client
            .as_removable()
            .ok_or_else(|| client.target().unsupported(Operation::Remove))?;
        removable.remove(descriptor.uri.path())
    }
}
