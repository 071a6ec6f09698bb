//! Built-in backends that need no external SDK
//!
//! - `file://` for the local filesystem
//! - `memory://` for an in-process store, mostly useful in tests

pub mod file;
pub mod memory;

pub use file::FileClient;
pub use memory::{MemoryClient, MemoryStore};

use crate::registry::Registry;

/// Register `file` and a fresh `memory` store on `registry`
///
/// Returns the memory store so callers can inspect or seed it.
pub fn register_builtin(registry: &Registry) -> MemoryStore {
    file::register(registry);
    let store = MemoryStore::new();
    store.register(registry, memory::SCHEME);
    store
}
