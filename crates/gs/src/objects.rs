//! JSON API response bodies

use jiff::Timestamp;
use serde::Deserialize;
use urio_core::Entry;

/// One page of `objects.list`
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ObjectPage {
    #[serde(default)]
    pub items: Vec<ObjectMeta>,
    #[serde(default)]
    pub prefixes: Vec<String>,
    pub next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ObjectMeta {
    pub name: String,
    /// The API sends sizes as decimal strings
    #[serde(default)]
    pub size: Option<String>,
    #[serde(default)]
    pub updated: Option<String>,
}

impl ObjectPage {
    /// Entries relative to `prefix`, directories first
    pub fn entries(self, prefix: &str) -> Vec<Entry> {
        let dirs = self.prefixes.into_iter().filter_map(|p| {
            let rel = p.strip_prefix(prefix).unwrap_or(&p);
            (!rel.is_empty()).then(|| Entry::dir(rel))
        });
        let files = self.items.into_iter().filter_map(|item| {
            let rel = item.name.strip_prefix(prefix).unwrap_or(&item.name);
            if rel.is_empty() {
                return None;
            }
            let size = item
                .size
                .as_deref()
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(0);
            let modified = item
                .updated
                .as_deref()
                .and_then(|u| u.parse::<Timestamp>().ok());
            Some(Entry::file(rel, size).with_last_modified(modified))
        });
        dirs.chain(files).collect()
    }
}
