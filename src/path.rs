//! Virtual path normalization.
//!
//! The OS layer hands callbacks native relative paths (backslash-separated
//! on Windows, possibly empty for the root). All engine-internal lookups use
//! the canonical form: forward slashes, leading `/`, root is `/`.

use std::fmt;

/// Fixed top-level virtual directories.
///
/// These always resolve as directories even when no cache or object-store
/// entry exists. They are structural plumbing the OS layer needs to accept
/// the mount, not derived data, and the set must not change at runtime.
pub const ROOT_VIRTUAL_DIRS: [&str; 5] = ["objects", "chats", "debug", "invites", "types"];

/// Canonical root-relative path in the virtual namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VirtualPath(String);

impl VirtualPath {
    /// The virtual root, `/`.
    pub fn root() -> Self {
        VirtualPath("/".to_string())
    }

    /// Normalize an OS-native relative path.
    ///
    /// Backslashes become forward slashes, a leading `/` is ensured, and an
    /// empty path maps to the root.
    ///
    /// # Arguments
    /// * `raw` - Path as received from the OS callback
    pub fn from_os(raw: &str) -> Self {
        let unified: String = raw.replace('\\', "/");
        let trimmed: &str = unified.trim_end_matches('/');
        if trimmed.is_empty() {
            return Self::root();
        }
        if trimmed.starts_with('/') {
            VirtualPath(trimmed.to_string())
        } else {
            VirtualPath(format!("/{}", trimmed))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0 == "/"
    }

    /// Append a child name.
    pub fn join(&self, name: &str) -> VirtualPath {
        if self.is_root() {
            VirtualPath(format!("/{}", name))
        } else {
            VirtualPath(format!("{}/{}", self.0, name))
        }
    }

    /// Check whether this is one of the fixed root-level virtual directories.
    pub fn is_root_virtual_dir(&self) -> bool {
        match self.0.strip_prefix('/') {
            Some(rest) => ROOT_VIRTUAL_DIRS.contains(&rest),
            None => false,
        }
    }

    /// Check whether this path lies under the addressed-object subtree.
    pub fn is_object_path(&self) -> bool {
        self.0 == "/objects" || self.0.starts_with("/objects/")
    }

    /// Extract the content hash for paths of the form `/objects/<64-hex>`
    /// (optionally with a deeper suffix).
    ///
    /// # Returns
    /// The hash component if present and well-formed.
    pub fn object_hash(&self) -> Option<&str> {
        let rest: &str = self.0.strip_prefix("/objects/")?;
        let hash: &str = match rest.find('/') {
            Some(idx) => &rest[..idx],
            None => rest,
        };
        if hash.len() == 64 && hash.bytes().all(|b| b.is_ascii_hexdigit()) {
            Some(hash)
        } else {
            None
        }
    }
}

impl fmt::Display for VirtualPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
