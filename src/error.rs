//! Error types for the provider engine.

use std::fmt;

/// Errors that can occur on the host-facing control surface.
#[derive(Debug)]
pub enum ProviderError {
    /// Virtualization already started.
    AlreadyStarted,

    /// Virtualization not started.
    NotStarted,

    /// Virtualization root path error.
    InvalidRootPath(String),

    /// IO error.
    Io(std::io::Error),
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderError::AlreadyStarted => write!(f, "Virtualization already started"),
            ProviderError::NotStarted => write!(f, "Virtualization not started"),
            ProviderError::InvalidRootPath(path) => {
                write!(f, "Invalid virtualization root path: {}", path)
            }
            ProviderError::Io(e) => write!(f, "IO error: {}", e),
        }
    }
}

impl std::error::Error for ProviderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ProviderError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ProviderError {
    fn from(e: std::io::Error) -> Self {
        ProviderError::Io(e)
    }
}

/// Status codes surfaced to the OS virtualization layer.
///
/// Engine callbacks never panic and never expose internal error detail
/// across the OS boundary; every internal fault maps to one of these.
/// "Not found" and "pending, fetching asynchronously" are deliberately
/// the same code: the OS retries on the next access once the cache is
/// warm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackError {
    /// Path or object does not exist locally (yet).
    NotFound,

    /// Mutating operation denied (read-only provider).
    AccessDenied,

    /// OS-side buffer allocation failed.
    OutOfMemory,

    /// Enumeration output buffer cannot hold even a single entry.
    BufferTooSmall,
}

impl fmt::Display for CallbackError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallbackError::NotFound => write!(f, "Not found"),
            CallbackError::AccessDenied => write!(f, "Access denied"),
            CallbackError::OutOfMemory => write!(f, "Out of memory"),
            CallbackError::BufferTooSmall => write!(f, "Buffer too small for a single entry"),
        }
    }
}

impl std::error::Error for CallbackError {}
