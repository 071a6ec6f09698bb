//! Client contract
//!
//! A [`Client`] owns one live session to a backend and hands out streams.
//! Optional operations are exposed through capability traits
//! ([`Listable`], [`Removable`]) that a client advertises via
//! [`Client::as_listable`] and [`Client::as_removable`].

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use jiff::Timestamp;
use serde::Serialize;

use crate::error::{Error, Operation, Result, Target};
use crate::stream::{ReadStream, WriteStream};

/// What a client is able to do
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Capabilities {
    pub read: bool,
    pub write: bool,
    pub append: bool,
    pub exists: bool,
    pub list: bool,
    pub remove: bool,
    /// More than one stream may be open on the same session
    pub concurrent_streams: bool,
}

impl Capabilities {
    pub const fn read_only() -> Self {
        Self {
            read: true,
            write: false,
            append: false,
            exists: false,
            list: false,
            remove: false,
            concurrent_streams: true,
        }
    }

    pub const fn all() -> Self {
        Self {
            read: true,
            write: true,
            append: true,
            exists: true,
            list: true,
            remove: true,
            concurrent_streams: true,
        }
    }
}

/// How a writer treats existing content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WriteMode {
    Overwrite,
    Append,
}

impl WriteMode {
    /// Operation reported in errors for this mode
    pub const fn operation(self) -> Operation {
        match self {
            WriteMode::Overwrite => Operation::Write,
            WriteMode::Append => Operation::Append,
        }
    }
}

impl fmt::Display for WriteMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WriteMode::Overwrite => f.write_str("overwrite"),
            WriteMode::Append => f.write_str("append"),
        }
    }
}

/// Hidden sibling of `path` that an overwrite is staged under
///
/// Remote backends upload to this name and rename it over `path` on commit,
/// so an aborted upload never touches the existing object.
pub fn staging_path(path: &str) -> String {
    let nanos = Timestamp::now().as_nanosecond();
    let (dir, name) = match path.rfind('/') {
        Some(idx) => path.split_at(idx + 1),
        None => ("", path),
    };
    format!("{dir}.{name}.urio-{}-{nanos}.part", std::process::id())
}

/// Direction and mode requested from `Dispatcher::open`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpenMode {
    Read,
    Write(WriteMode),
}

impl FromStr for OpenMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "r" | "rb" => Ok(OpenMode::Read),
            "w" | "wb" => Ok(OpenMode::Write(WriteMode::Overwrite)),
            "a" | "ab" => Ok(OpenMode::Write(WriteMode::Append)),
            other => Err(Error::InvalidMode(other.to_string())),
        }
    }
}

/// One item of a listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Entry {
    /// Path relative to the listed prefix; directories end with `/`
    pub path: String,

    pub is_dir: bool,

    /// Size in bytes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<Timestamp>,
}

impl Entry {
    /// Create a new Entry for a file
    pub fn file(path: impl Into<String>, size: u64) -> Self {
        Self {
            path: path.into(),
            is_dir: false,
            size: Some(size),
            last_modified: None,
        }
    }

    /// Create a new Entry for a directory, adding the trailing `/`
    pub fn dir(path: impl Into<String>) -> Self {
        let mut path = path.into();
        if !path.ends_with('/') {
            path.push('/');
        }
        Self {
            path,
            is_dir: true,
            size: None,
            last_modified: None,
        }
    }

    pub fn with_last_modified(mut self, ts: Option<Timestamp>) -> Self {
        self.last_modified = ts;
        self
    }
}

/// Lazy, finite sequence of entries
pub type Listing = Box<dyn Iterator<Item = Result<Entry>> + Send>;

/// A live session to one backend
pub trait Client: Send + Sync {
    /// Scheme and redacted authority, used in every error
    fn target(&self) -> &Target;

    fn capabilities(&self) -> Capabilities;

    fn get_reader(&self, path: &str) -> Result<ReadStream>;

    fn get_writer(&self, path: &str, mode: WriteMode) -> Result<WriteStream> {
        let _ = (path, mode);
        Err(self.target().read_only())
    }

    fn exists(&self, path: &str) -> Result<bool> {
        let _ = path;
        Err(self.target().unsupported(Operation::Exists))
    }

    fn as_listable(&self) -> Option<&dyn Listable> {
        None
    }

    fn as_removable(&self) -> Option<&dyn Removable> {
        None
    }
}

/// Clients able to enumerate a prefix
pub trait Listable {
    /// Every call starts a fresh sequence
    fn list(&self, prefix: &str) -> Result<Listing>;
}

/// Clients able to delete a resource
pub trait Removable {
    fn remove(&self, path: &str) -> Result<()>;
}

/// At most one open stream per session
///
/// Clients whose protocol cannot multiplex transfers hold a [`SlotGuard`]
/// inside every stream adapter they create.
#[derive(Debug, Clone, Default)]
pub struct StreamSlot {
    busy: Arc<AtomicBool>,
}

impl StreamSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the session, failing if another stream holds it
    pub fn acquire(&self, target: &Target, operation: Operation) -> Result<SlotGuard> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| {
                target.transfer(
                    operation,
                    "session busy: another stream is open on this connection",
                )
            })?;
        Ok(SlotGuard {
            busy: Arc::clone(&self.busy),
        })
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

/// Frees the [`StreamSlot`] when dropped
#[derive(Debug)]
pub struct SlotGuard {
    busy: Arc<AtomicBool>,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_staging_path_is_hidden_sibling() {
        let staged = staging_path("/upload/report.csv");
        assert!(staged.starts_with("/upload/.report.csv.urio-"));
        assert!(staged.ends_with(".part"));

        let bare = staging_path("report.csv");
        assert!(bare.starts_with(".report.csv.urio-"));
        assert_ne!(staging_path("/a"), staging_path("/b"));
    }

    #[test]
    fn test_open_mode_parse() {
        assert_eq!("r".parse::<OpenMode>().unwrap(), OpenMode::Read);
        assert_eq!("rb".parse::<OpenMode>().unwrap(), OpenMode::Read);
        assert_eq!(
            "wb".parse::<OpenMode>().unwrap(),
            OpenMode::Write(WriteMode::Overwrite)
        );
        assert_eq!(
            "a".parse::<OpenMode>().unwrap(),
            OpenMode::Write(WriteMode::Append)
        );
        assert!(matches!(
            "rw".parse::<OpenMode>().unwrap_err(),
            Error::InvalidMode(ref m) if m == "rw"
        ));
    }

    #[test]
    fn test_entry_dir_has_trailing_slash() {
        assert_eq!(Entry::dir("logs").path, "logs/");
        assert_eq!(Entry::dir("logs/").path, "logs/");
        assert!(Entry::dir("logs").is_dir);
    }

    #[test]
    fn test_entry_json() {
        let ts: Timestamp = "2024-05-01T12:00:00Z".parse().unwrap();
        let entry = Entry::file("report.csv", 1024).with_last_modified(Some(ts));
        insta::assert_json_snapshot!(entry, @r#"
        {
          "path": "report.csv",
          "is_dir": false,
          "size": 1024,
          "last_modified": "2024-05-01T12:00:00Z"
        }
        "#);
    }

    #[test]
    fn test_stream_slot_is_exclusive() {
        let slot = StreamSlot::new();
        let target = Target::new("ftp", "host");

        let guard = slot.acquire(&target, Operation::Open).unwrap();
        assert!(slot.is_busy());
        let err = slot.acquire(&target, Operation::Open).unwrap_err();
        assert!(err.to_string().contains("session busy"));

        drop(guard);
        assert!(!slot.is_busy());
        assert!(slot.acquire(&target, Operation::Open).is_ok());
    }

    #[test]
    fn test_capability_presets() {
        let caps = Capabilities::read_only();
        assert!(caps.read && !caps.write && !caps.remove);
        assert!(Capabilities::all().append);
    }
}
