//! Request statistics for the provider engine.
//!
//! Counters are process-wide, monotonically increasing (except the active
//! enumeration gauge), and incremented lock-free from OS callback threads.
//! Purely observational; nothing in the engine branches on them.

use std::sync::atomic::{AtomicU64, Ordering};

/// Lock-free counters updated by callback entry points.
#[derive(Debug, Default)]
pub struct ProviderStats {
    placeholder_requests: AtomicU64,
    file_data_requests: AtomicU64,
    directory_enumerations: AtomicU64,
    enumeration_callbacks: AtomicU64,
    active_enumerations: AtomicU64,
    bytes_read: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
}

impl ProviderStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_placeholder_request(&self) {
        self.placeholder_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_file_data_request(&self) {
        self.file_data_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_directory_enumeration(&self) {
        self.directory_enumerations.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_enumeration_callback(&self) {
        self.enumeration_callbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn enumeration_opened(&self) {
        self.active_enumerations.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn enumeration_closed(&self) {
        // Saturating: an end without a matching start must not wrap.
        let _ = self
            .active_enumerations
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| v.checked_sub(1));
    }

    pub(crate) fn record_bytes_read(&self, count: u64) {
        self.bytes_read.fetch_add(count, Ordering::Relaxed);
    }

    pub(crate) fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Take a consistent-enough snapshot for status queries.
    ///
    /// Individual counters are read independently; callers must not expect
    /// cross-counter atomicity.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            placeholder_requests: self.placeholder_requests.load(Ordering::Relaxed),
            file_data_requests: self.file_data_requests.load(Ordering::Relaxed),
            directory_enumerations: self.directory_enumerations.load(Ordering::Relaxed),
            enumeration_callbacks: self.enumeration_callbacks.load(Ordering::Relaxed),
            active_enumerations: self.active_enumerations.load(Ordering::Relaxed),
            bytes_read: self.bytes_read.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time view of [`ProviderStats`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub placeholder_requests: u64,
    pub file_data_requests: u64,
    pub directory_enumerations: u64,
    pub enumeration_callbacks: u64,
    pub active_enumerations: u64,
    pub bytes_read: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
}
