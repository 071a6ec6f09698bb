//! Local filesystem backend
//!
//! `file:///abs/path`. Writes go to a temporary file in the destination
//! directory and are moved into place (or appended) on commit.

use std::fs;
use std::io::{self, Seek, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use jiff::Timestamp;
use tempfile::NamedTempFile;

use crate::client::{Capabilities, Client, Entry, Listable, Listing, Removable, WriteMode};
use crate::error::{Error, Operation, Result, Target};
use crate::registry::Registry;
use crate::resolver::ConnectionDescriptor;
use crate::stream::{ReadStream, WriteAdapter, WriteStream};

pub const SCHEME: &str = "file";

pub fn register(registry: &Registry) {
    registry.register(SCHEME, |descriptor: &ConnectionDescriptor| {
        Ok(Arc::new(FileClient::new(descriptor)?) as Arc<dyn Client>)
    });
}

#[derive(Debug)]
pub struct FileClient {
    target: Target,
}

impl FileClient {
    pub fn new(descriptor: &ConnectionDescriptor) -> Result<Self> {
        match descriptor.uri.host() {
            None | Some("localhost") => Ok(Self {
                target: descriptor.target(),
            }),
            Some(host) => Err(Error::MalformedUri {
                uri: descriptor.uri.redacted(),
                reason: format!("file URIs cannot name a remote host ({host})"),
            }),
        }
    }

    fn io(&self, operation: Operation, path: &str, err: io::Error) -> Error {
        self.target.io(operation, path, err)
    }
}

impl Client for FileClient {
    fn target(&self) -> &Target {
        &self.target
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::all()
    }

    fn get_reader(&self, path: &str) -> Result<ReadStream> {
        let file = fs::File::open(path).map_err(|e| self.io(Operation::Open, path, e))?;
        Ok(ReadStream::from_reader(
            self.target.clone(),
            path,
            io::BufReader::new(file),
        ))
    }

    fn get_writer(&self, path: &str, mode: WriteMode) -> Result<WriteStream> {
        let op = mode.operation();
        let dest = PathBuf::from(path);
        let parent = dest
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        fs::create_dir_all(parent).map_err(|e| self.io(op, path, e))?;
        let temp = NamedTempFile::new_in(parent).map_err(|e| self.io(op, path, e))?;

        let adapter = FileWriter {
            target: self.target.clone(),
            temp: Some(temp),
            dest,
            mode,
        };
        Ok(WriteStream::new(self.target.clone(), path, adapter))
    }

    fn exists(&self, path: &str) -> Result<bool> {
        Path::new(path)
            .try_exists()
            .map_err(|e| self.io(Operation::Exists, path, e))
    }

    fn as_listable(&self) -> Option<&dyn Listable> {
        Some(self)
    }

    fn as_removable(&self) -> Option<&dyn Removable> {
        Some(self)
    }
}

impl Listable for FileClient {
    fn list(&self, prefix: &str) -> Result<Listing> {
        let dir = if prefix.is_empty() { "/" } else { prefix };
        let read_dir = fs::read_dir(dir).map_err(|e| self.io(Operation::List, prefix, e))?;

        let mut entries = Vec::new();
        for item in read_dir {
            let item = item.map_err(|e| self.io(Operation::List, prefix, e))?;
            let name = item.file_name().to_string_lossy().into_owned();
            let meta = item
                .metadata()
                .map_err(|e| self.io(Operation::List, prefix, e))?;
            let modified = meta
                .modified()
                .ok()
                .and_then(|t| Timestamp::try_from(t).ok());

            let entry = if meta.is_dir() {
                Entry::dir(name)
            } else {
                Entry::file(name, meta.len())
            };
            entries.push(entry.with_last_modified(modified));
        }
        entries.sort_by(|a, b| a.path.cmp(&b.path));

        Ok(Box::new(entries.into_iter().map(Ok)))
    }
}

impl Removable for FileClient {
    fn remove(&self, path: &str) -> Result<()> {
        let meta = fs::metadata(path).map_err(|e| self.io(Operation::Remove, path, e))?;
        let result = if meta.is_dir() {
            fs::remove_dir(path)
        } else {
            fs::remove_file(path)
        };
        result.map_err(|e| self.io(Operation::Remove, path, e))
    }
}

struct FileWriter {
    target: Target,
    temp: Option<NamedTempFile>,
    dest: PathBuf,
    mode: WriteMode,
}

impl FileWriter {
    fn temp(&mut self) -> Result<&mut NamedTempFile> {
        let path = self.dest.display().to_string();
        let op = self.mode.operation();
        self.temp
            .as_mut()
            .ok_or_else(|| self.target.transfer(op, format!("{path} is already released")))
    }

    fn fail(&self, err: io::Error) -> Error {
        self.target
            .io(self.mode.operation(), &self.dest.display().to_string(), err)
    }
}

impl WriteAdapter for FileWriter {
    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        let result = self.temp()?.write(buf);
        result.map_err(|e| self.fail(e))
    }

    fn flush(&mut self) -> Result<()> {
        let result = self.temp()?.flush();
        result.map_err(|e| self.fail(e))
    }

    fn commit(&mut self) -> Result<()> {
        let Some(mut temp) = self.temp.take() else {
            return Ok(());
        };
        temp.flush().map_err(|e| self.fail(e))?;

        match self.mode {
            WriteMode::Overwrite => {
                temp.persist(&self.dest).map_err(|e| self.fail(e.error))?;
            }
            WriteMode::Append => {
                let mut dest = fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&self.dest)
                    .map_err(|e| self.fail(e))?;
                let file = temp.as_file_mut();
                file.rewind().map_err(|e| self.fail(e))?;
                io::copy(file, &mut dest).map_err(|e| self.fail(e))?;
                dest.sync_all().map_err(|e| self.fail(e))?;
            }
        }
        Ok(())
    }

    fn abort(&mut self) -> Result<()> {
        match self.temp.take() {
            Some(temp) => temp.close().map_err(|e| self.fail(e)),
            None => Ok(()),
        }
    }
}
