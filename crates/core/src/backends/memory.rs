//! In-process object store
//!
//! Objects live in a map shared by every client built from the same
//! [`MemoryStore`], keyed by `host + path`. Writers buffer until commit so an
//! aborted write leaves no trace.

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::client::{Capabilities, Client, Entry, Listable, Listing, Removable, WriteMode};
use crate::error::{Operation, Result, Target};
use crate::registry::Registry;
use crate::resolver::ConnectionDescriptor;
use crate::stream::{ReadStream, WriteAdapter, WriteStream};

pub const SCHEME: &str = "memory";

type Objects = Arc<RwLock<BTreeMap<String, Vec<u8>>>>;

/// Shared backing map for memory clients
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    objects: Objects,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register this store under `scheme`
    ///
    /// Registering under another scheme (e.g. `s3`) lets tests exercise the
    /// dispatcher without a live backend.
    pub fn register(&self, registry: &Registry, scheme: &str) {
        let store = self.clone();
        registry.register(scheme, move |descriptor: &ConnectionDescriptor| {
            Ok(Arc::new(MemoryClient::new(&store, descriptor)) as Arc<dyn Client>)
        });
    }

    /// Raw object lookup by `host + path`
    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.objects.read().get(key).cloned()
    }

    pub fn insert(&self, key: impl Into<String>, data: impl Into<Vec<u8>>) {
        self.objects.write().insert(key.into(), data.into());
    }

    pub fn keys(&self) -> Vec<String> {
        self.objects.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }
}

/// Client over a [`MemoryStore`] namespace
#[derive(Debug)]
pub struct MemoryClient {
    target: Target,
    namespace: String,
    objects: Objects,
}

impl MemoryClient {
    pub fn new(store: &MemoryStore, descriptor: &ConnectionDescriptor) -> Self {
        Self {
            target: descriptor.target(),
            namespace: descriptor.uri.host().unwrap_or_default().to_string(),
            objects: Arc::clone(&store.objects),
        }
    }

    fn key(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.namespace, path)
        } else {
            format!("{}/{}", self.namespace, path)
        }
    }

    fn dir_key(&self, path: &str) -> String {
        let key = self.key(path.trim_end_matches('/'));
        format!("{}/", key.trim_end_matches('/'))
    }
}

impl Client for MemoryClient {
    fn target(&self) -> &Target {
        &self.target
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::all()
    }

    fn get_reader(&self, path: &str) -> Result<ReadStream> {
        let data = self
            .objects
            .read()
            .get(&self.key(path))
            .cloned()
            .ok_or_else(|| self.target.not_found(Operation::Open, path))?;
        Ok(ReadStream::from_reader(
            self.target.clone(),
            path,
            std::io::Cursor::new(data),
        ))
    }

    fn get_writer(&self, path: &str, mode: WriteMode) -> Result<WriteStream> {
        let adapter = MemoryWriter {
            objects: Arc::clone(&self.objects),
            key: self.key(path),
            mode,
            buffer: Vec::new(),
        };
        Ok(WriteStream::new(self.target.clone(), path, adapter))
    }

    fn exists(&self, path: &str) -> Result<bool> {
        let objects = self.objects.read();
        if objects.contains_key(&self.key(path)) {
            return Ok(true);
        }
        let dir = self.dir_key(path);
        Ok(objects.keys().any(|k| k.starts_with(&dir)))
    }

    fn as_listable(&self) -> Option<&dyn Listable> {
        Some(self)
    }

    fn as_removable(&self) -> Option<&dyn Removable> {
        Some(self)
    }
}

impl Listable for MemoryClient {
    fn list(&self, prefix: &str) -> Result<Listing> {
        let dir = self.dir_key(prefix);
        let objects = self.objects.read();

        let mut dirs = BTreeSet::new();
        let mut entries = Vec::new();
        for (key, data) in objects.range(dir.clone()..) {
            let Some(rest) = key.strip_prefix(&dir) else {
                break;
            };
            match rest.split_once('/') {
                Some((child, _)) => {
                    if dirs.insert(child.to_string()) {
                        entries.push(Entry::dir(child));
                    }
                }
                None => entries.push(Entry::file(rest, data.len() as u64)),
            }
        }

        Ok(Box::new(entries.into_iter().map(Ok)))
    }
}

impl Removable for MemoryClient {
    fn remove(&self, path: &str) -> Result<()> {
        self.objects
            .write()
            .remove(&self.key(path))
            .map(|_| ())
            .ok_or_else(|| self.target.not_found(Operation::Remove, path))
    }
}

struct MemoryWriter {
    objects: Objects,
    key: String,
    mode: WriteMode,
    buffer: Vec<u8>,
}

impl WriteAdapter for MemoryWriter {
    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        let data = std::mem::take(&mut self.buffer);
        let mut objects = self.objects.write();
        match self.mode {
            WriteMode::Overwrite => {
                objects.insert(self.key.clone(), data);
            }
            WriteMode::Append => objects
                .entry(self.key.clone())
                .or_default()
                .extend_from_slice(&data),
        }
        Ok(())
    }

    fn abort(&mut self) -> Result<()> {
        self.buffer.clear();
        Ok(())
    }
}
