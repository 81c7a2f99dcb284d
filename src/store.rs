//! Local content-addressed object store.
//!
//! Read-only accessor over an on-disk instance directory. Objects live in
//! `objects/<hash>`; the `vheads` and `rmaps` subdirectories belong to the
//! same layout but are not consulted by the engine. The store is the first
//! consulted source for the `/objects` virtual subtree and for the fixed
//! root-level virtual directories; objects it does not hold may still exist
//! remotely.

use std::fs;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::path::{VirtualPath, ROOT_VIRTUAL_DIRS};

/// Classification of an addressed object's payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObjectType {
    File,
    Directory,
    Blob,
    Clob,
    Unknown,
    /// Structured object with a declared type name in its microdata header.
    Typed(String),
}

impl std::fmt::Display for ObjectType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ObjectType::File => write!(f, "FILE"),
            ObjectType::Directory => write!(f, "DIRECTORY"),
            ObjectType::Blob => write!(f, "BLOB"),
            ObjectType::Clob => write!(f, "CLOB"),
            ObjectType::Unknown => write!(f, "UNKNOWN"),
            ObjectType::Typed(name) => write!(f, "{}", name),
        }
    }
}

/// Metadata for a virtual node or stored object.
///
/// `exists = false` is a terminal "not found" answer, distinct from the
/// engine-level "pending" state (which is never stored).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMetadata {
    pub exists: bool,
    pub is_directory: bool,
    pub size: u64,
    pub object_type: ObjectType,
}

impl ObjectMetadata {
    pub fn not_found() -> Self {
        Self {
            exists: false,
            is_directory: false,
            size: 0,
            object_type: ObjectType::Unknown,
        }
    }

    pub fn directory() -> Self {
        Self {
            exists: true,
            is_directory: true,
            size: 0,
            object_type: ObjectType::Directory,
        }
    }
}

/// Number of leading bytes inspected for type classification.
const TYPE_PROBE_LEN: usize = 100;

/// Read-only object store rooted at an instance directory.
pub struct ObjectStore {
    objects_dir: PathBuf,
    /// Memoized per-hash metadata, never invalidated. Negative results are
    /// memoized too: objects are content-addressed and immutable.
    metadata_cache: DashMap<String, ObjectMetadata>,
}

impl ObjectStore {
    /// Open (or initialize) the store at `instance_path`.
    ///
    /// Creates the `objects`, `vheads`, and `rmaps` subdirectories when
    /// absent.
    ///
    /// # Arguments
    /// * `instance_path` - Instance directory on local disk
    pub fn new(instance_path: &Path) -> std::io::Result<Self> {
        let objects_dir: PathBuf = instance_path.join("objects");
        fs::create_dir_all(&objects_dir)?;
        fs::create_dir_all(instance_path.join("vheads"))?;
        fs::create_dir_all(instance_path.join("rmaps"))?;

        Ok(Self {
            objects_dir,
            metadata_cache: DashMap::new(),
        })
    }

    /// Read a whole object by hash.
    pub fn read_object(&self, hash: &str) -> Option<Vec<u8>> {
        fs::read(self.objects_dir.join(hash)).ok()
    }

    /// Read a byte range of an object; short at end-of-file.
    ///
    /// # Arguments
    /// * `hash` - Object hash
    /// * `offset` - Byte offset into the object
    /// * `length` - Maximum bytes to return
    pub fn read_object_section(&self, hash: &str, offset: u64, length: usize) -> Option<Vec<u8>> {
        let mut file: fs::File = fs::File::open(self.objects_dir.join(hash)).ok()?;
        file.seek(SeekFrom::Start(offset)).ok()?;

        let mut buffer: Vec<u8> = vec![0u8; length];
        let mut total: usize = 0;
        while total < length {
            match file.read(&mut buffer[total..]) {
                Ok(0) => break,
                Ok(n) => total += n,
                Err(_) => return None,
            }
        }
        buffer.truncate(total);
        Some(buffer)
    }

    /// List all stored object hashes.
    pub fn list_objects(&self) -> Vec<String> {
        let mut hashes: Vec<String> = Vec::new();
        let Ok(entries) = fs::read_dir(&self.objects_dir) else {
            return hashes;
        };
        for entry in entries.flatten() {
            let is_file: bool = entry.file_type().map(|t| t.is_file()).unwrap_or(false);
            if is_file {
                if let Ok(name) = entry.file_name().into_string() {
                    hashes.push(name);
                }
            }
        }
        hashes
    }

    /// Metadata for a stored object, memoized per hash.
    pub fn get_object_metadata(&self, hash: &str) -> ObjectMetadata {
        if let Some(cached) = self.metadata_cache.get(hash) {
            return cached.clone();
        }

        let metadata: ObjectMetadata = match fs::metadata(self.objects_dir.join(hash)) {
            Ok(m) if m.is_file() => ObjectMetadata {
                exists: true,
                is_directory: false,
                size: m.len(),
                object_type: self.classify_object(hash),
            },
            _ => ObjectMetadata::not_found(),
        };

        self.metadata_cache.insert(hash.to_string(), metadata.clone());
        metadata
    }

    /// Resolve metadata for a virtual path.
    ///
    /// The root and the fixed top-level virtual directories always resolve
    /// as directories regardless of backing storage. `/objects/<64-hex>`
    /// resolves to the stored object; anything else does not exist here
    /// (the async bridge may still know it).
    pub fn get_virtual_path_metadata(&self, path: &VirtualPath) -> ObjectMetadata {
        if path.is_root() || path.is_root_virtual_dir() {
            return ObjectMetadata::directory();
        }

        if path.is_object_path() {
            if let Some(hash) = path.object_hash() {
                // The hash itself is a file; deeper suffixes do not exist.
                if path.as_str() == format!("/objects/{}", hash) {
                    return self.get_object_metadata(hash);
                }
            }
            return ObjectMetadata::not_found();
        }

        ObjectMetadata::not_found()
    }

    /// Read content for a virtual path; only `/objects/<64-hex>` is backed.
    pub fn read_virtual_path(&self, path: &VirtualPath) -> Option<Vec<u8>> {
        let hash: &str = path.object_hash()?;
        if path.as_str() == format!("/objects/{}", hash) {
            self.read_object(hash)
        } else {
            None
        }
    }

    /// Names of a virtual directory's children.
    ///
    /// The root exposes the fixed virtual folders; `/objects` exposes every
    /// stored hash as a direct child. Other paths have no store-backed
    /// children.
    pub fn list_directory(&self, path: &VirtualPath) -> Vec<String> {
        if path.is_root() {
            return ROOT_VIRTUAL_DIRS.iter().map(|s| s.to_string()).collect();
        }
        if path.as_str() == "/objects" {
            return self.list_objects();
        }
        Vec::new()
    }

    /// Classify an object by probing its first bytes.
    ///
    /// Best-effort: truncated or binary-prefixed content can misclassify.
    /// That is a documented limitation of the format, not corrected here.
    fn classify_object(&self, hash: &str) -> ObjectType {
        let Some(header) = self.read_object_section(hash, 0, TYPE_PROBE_LEN) else {
            return ObjectType::Blob;
        };
        classify_header(&header)
    }
}

/// Classify a content header.
///
/// A microdata `itemtype` declaration yields the declared type name; other
/// markup markers yield CLOB; everything else is BLOB.
fn classify_header(header: &[u8]) -> ObjectType {
    let text: std::borrow::Cow<'_, str> = String::from_utf8_lossy(header);

    if let Some(name) = extract_item_type(&text) {
        return ObjectType::Typed(name);
    }
    if text.contains("<div") || text.contains("itemscope") {
        return ObjectType::Clob;
    }
    ObjectType::Blob
}

/// Extract the declared type name from `itemtype="//refin.io/<Name>"`.
fn extract_item_type(text: &str) -> Option<String> {
    const MARKER: &str = "itemtype=\"//refin.io/";
    let start: usize = text.find(MARKER)? + MARKER.len();
    let rest: &str = &text[start..];
    let end: usize = rest.find('"')?;
    if end == 0 {
        return None;
    }
    Some(rest[..end].to_string())
}
