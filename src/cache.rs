//! Shared content cache.
//!
//! Maps virtual paths to metadata, directory listings, and whole-file
//! content. The cache is shared between the async data bridge (writer on
//! fetch completion) and the provider engine (reader on OS callbacks, writer
//! on host priming), so every operation must be safe under concurrent access
//! from OS-pool threads.
//!
//! There is no TTL and no eviction: entries persist until overwritten or
//! process exit, and overwrites are last-writer-wins with no version checks.

use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// Directory entry as delivered by the external data provider.
///
/// This mirrors the scripting-layer wire shape; every field except `name`
/// may be absent and is re-derived by the engine where needed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FileInfo {
    pub name: String,
    pub hash: Option<String>,
    pub size: u64,
    pub is_directory: Option<bool>,
    pub is_blob_or_clob: Option<bool>,
    pub mode: Option<u32>,
}

/// Ordered directory listing; provider insertion order is preserved.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryListing {
    pub entries: Vec<FileInfo>,
}

impl DirectoryListing {
    pub fn new(entries: Vec<FileInfo>) -> Self {
        Self { entries }
    }

    /// Entry names in listing order.
    pub fn names(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.name.clone()).collect()
    }
}

/// Whole-file content. Partial reads slice at request time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileContent {
    pub data: Vec<u8>,
}

impl FileContent {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }
}

/// Concurrent cache keyed by canonical virtual path.
///
/// Three sharded maps rather than one table behind a global lock, so
/// unrelated traversals never serialize on each other.
#[derive(Debug, Default)]
pub struct ContentCache {
    infos: DashMap<String, FileInfo>,
    listings: DashMap<String, DirectoryListing>,
    contents: DashMap<String, Arc<FileContent>>,
}

impl ContentCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_file_info(&self, path: &str, info: FileInfo) {
        self.infos.insert(path.to_string(), info);
    }

    pub fn get_file_info(&self, path: &str) -> Option<FileInfo> {
        self.infos.get(path).map(|entry| entry.clone())
    }

    pub fn set_directory_listing(&self, path: &str, listing: DirectoryListing) {
        self.listings.insert(path.to_string(), listing);
    }

    pub fn get_directory_listing(&self, path: &str) -> Option<DirectoryListing> {
        self.listings.get(path).map(|entry| entry.clone())
    }

    pub fn set_file_content(&self, path: &str, content: FileContent) {
        self.contents.insert(path.to_string(), Arc::new(content));
    }

    /// Content is returned shared; large files are never copied on read.
    pub fn get_file_content(&self, path: &str) -> Option<Arc<FileContent>> {
        self.contents.get(path).map(|entry| entry.clone())
    }
}
