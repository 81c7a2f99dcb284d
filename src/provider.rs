//! Virtualization provider engine.
//!
//! Central coordinator tying the object store, content cache, async bridge,
//! and enumeration sessions together behind the OS callback contract:
//!
//! ```text
//!                    ┌───────────────────────────────┐
//!  OS callbacks ────►│         VirtProvider          │◄──── host control
//!  (placeholder,     │                               │      (start/stop,
//!   file data,       │  resolution order:            │       priming,
//!   enumeration,     │   1. object store (local,     │       stats)
//!   notifications)   │      authoritative)           │
//!                    │   2. content cache            │
//!                    │   3. async fetch + NotFound   │
//!                    └──────────────┬────────────────┘
//!                                   │
//!                            AsyncBridge ──► DataProvider (host)
//! ```
//!
//! Every callback entry point is infallible at the boundary: internal
//! faults degrade to conservative status codes, never panics, and never
//! leak error detail across the OS boundary.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use tracing::{debug, info, warn};

use crate::bridge::{AsyncBridge, DataProvider, DebugSink, WriteIntent};
use crate::cache::{ContentCache, DirectoryListing, FileContent, FileInfo};
use crate::enumeration::{BasicFileInfo, DirEntrySink, SessionId, SessionTable};
use crate::error::{CallbackError, ProviderError};
use crate::executor::AsyncExecutor;
use crate::options::ProviderOptions;
use crate::path::VirtualPath;
use crate::stats::{ProviderStats, StatsSnapshot};
use crate::store::{ObjectMetadata, ObjectStore};

/// File-change notifications delivered by the OS after the fact or as
/// permission questions before a mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    /// A handle was opened. Informational.
    FileOpened,
    /// A new file appeared inside the virtualization root.
    NewFileCreated,
    /// An existing file was overwritten.
    FileOverwritten,
    /// Permission question preceding a delete.
    PreDelete,
    /// Permission question preceding a rename.
    PreRename,
    /// Permission question preceding hardlink creation.
    PreSetHardlink,
}

/// Mode bits mask and directory marker for provider-supplied `mode` fields.
const MODE_TYPE_MASK: u32 = 0o170000;
const MODE_DIRECTORY: u32 = 0o040000;

/// The virtualization engine. One instance per virtualization root.
///
/// The host wraps this in an `Arc` and hands the clone to its OS binding as
/// the opaque instance context; callbacks arrive on OS-pool threads, the
/// control surface on host threads, concurrently.
pub struct VirtProvider {
    options: ProviderOptions,
    store: ObjectStore,
    cache: Arc<ContentCache>,
    bridge: Arc<AsyncBridge>,
    executor: Arc<AsyncExecutor>,
    sessions: SessionTable,
    stats: ProviderStats,
    running: AtomicBool,
    virtualization_root: PathBuf,
}

impl VirtProvider {
    /// Create an engine over a local instance directory.
    ///
    /// # Arguments
    /// * `instance_path` - Object-store instance directory (created if absent)
    /// * `virtualization_root` - Directory the OS projects the tree into
    /// * `provider` - Host-side async data provider
    /// * `options` - Engine configuration
    pub fn new(
        instance_path: &Path,
        virtualization_root: impl Into<PathBuf>,
        provider: Arc<dyn DataProvider>,
        options: ProviderOptions,
    ) -> Result<Self, ProviderError> {
        let store: ObjectStore = ObjectStore::new(instance_path)?;
        let cache: Arc<ContentCache> = Arc::new(ContentCache::new());
        let executor: Arc<AsyncExecutor> =
            Arc::new(AsyncExecutor::new(options.executor.clone()));
        let bridge: Arc<AsyncBridge> = AsyncBridge::new(
            provider,
            cache.clone(),
            executor.clone(),
            options.write_drain_interval,
        );
        let sessions: SessionTable = SessionTable::new(
            options.enumeration_wait_timeout,
            options.max_calls_per_enumeration,
        );

        Ok(Self {
            options,
            store,
            cache,
            bridge,
            executor,
            sessions,
            stats: ProviderStats::new(),
            running: AtomicBool::new(false),
            virtualization_root: virtualization_root.into(),
        })
    }

    // ========================================================================
    // Control surface (host-facing)
    // ========================================================================

    /// Start virtualizing: validate and create the root directory.
    pub fn start(&self) -> Result<(), ProviderError> {
        if self.running.load(Ordering::Acquire) {
            return Err(ProviderError::AlreadyStarted);
        }
        if self.virtualization_root.as_os_str().is_empty() {
            return Err(ProviderError::InvalidRootPath(String::new()));
        }
        fs::create_dir_all(&self.virtualization_root).map_err(|e| {
            ProviderError::InvalidRootPath(format!(
                "{}: {}",
                self.virtualization_root.display(),
                e
            ))
        })?;

        self.running.store(true, Ordering::Release);
        info!(root = %self.virtualization_root.display(), "Virtualization started");
        Ok(())
    }

    /// Stop virtualizing: flush pending writes and shut down the executor.
    pub fn stop(&self) -> Result<(), ProviderError> {
        if self
            .running
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(ProviderError::NotStarted);
        }

        self.bridge.shutdown();
        self.executor.cancel_all();
        info!(root = %self.virtualization_root.display(), "Virtualization stopped");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn virtualization_root(&self) -> &Path {
        &self.virtualization_root
    }

    /// Point-in-time request statistics.
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Install the host debug sink.
    pub fn set_debug_sink(&self, sink: DebugSink) {
        self.bridge.set_debug_sink(sink);
    }

    /// Buffer a local write for asynchronous delivery to the data provider.
    pub fn queue_write(&self, intent: WriteIntent) {
        self.bridge.queue_write(intent);
    }

    /// Prime the cache with a directory listing pushed by the host.
    ///
    /// Entries are normalized before caching: the fixed root virtual
    /// directories are forced to directories whatever the host said, and a
    /// missing `is_directory` is derived from the entry's mode bits. Each
    /// entry is also primed individually under its child path so a
    /// placeholder request never round-trips for something the listing
    /// already described.
    pub fn set_cached_directory(&self, os_path: &str, entries: Vec<FileInfo>) {
        let path: VirtualPath = VirtualPath::from_os(os_path);
        let at_root: bool = path.is_root();

        let mut normalized: Vec<FileInfo> = Vec::with_capacity(entries.len());
        for mut entry in entries {
            let forced_dir: bool = at_root && VirtualPath::root().join(&entry.name).is_root_virtual_dir();
            let is_directory: bool = forced_dir || derive_is_directory(&entry);
            entry.is_directory = Some(is_directory);

            let child: VirtualPath = path.join(&entry.name);
            self.cache.set_file_info(child.as_str(), entry.clone());
            normalized.push(entry);
        }

        debug!(path = %path, entries = normalized.len(), "Primed directory listing");
        self.cache
            .set_directory_listing(path.as_str(), DirectoryListing::new(normalized));
    }

    /// Prime the cache with file content pushed by the host.
    pub fn set_cached_content(&self, os_path: &str, data: Vec<u8>) {
        let path: VirtualPath = VirtualPath::from_os(os_path);
        debug!(path = %path, bytes = data.len(), "Primed file content");
        self.cache.set_file_content(path.as_str(), FileContent::new(data));
    }

    // ========================================================================
    // OS callback entry points
    // ========================================================================

    /// Resolve placeholder metadata for a path the OS is materializing.
    ///
    /// # Returns
    /// [`CallbackError::NotFound`] both for paths that do not exist and for
    /// paths whose metadata is still being fetched; the OS retries once the
    /// cache is warm.
    pub fn placeholder_info(&self, os_path: &str) -> Result<BasicFileInfo, CallbackError> {
        self.stats.record_placeholder_request();
        let path: VirtualPath = VirtualPath::from_os(os_path);

        // The store answers first for the root, the fixed virtual
        // directories, and locally stored objects; anything it does not
        // hold falls through to the cache and the provider.
        let meta: ObjectMetadata = self.store.get_virtual_path_metadata(&path);
        if meta.exists {
            return Ok(BasicFileInfo {
                name: leaf_name(&path),
                is_directory: meta.is_directory,
                size: meta.size,
                timestamp: SystemTime::now(),
            });
        }

        if let Some(info) = self.cache.get_file_info(path.as_str()) {
            self.stats.record_cache_hit();
            return Ok(file_info_to_basic(&info));
        }
        self.stats.record_cache_miss();

        debug!(path = %path, "Placeholder miss; fetching asynchronously");
        self.bridge.fetch_file_info(&path);
        Err(CallbackError::NotFound)
    }

    /// Serve a byte range of a file's content.
    ///
    /// A range starting at or past end-of-file is an empty success, and a
    /// range crossing end-of-file is truncated, matching ordinary file-read
    /// semantics.
    pub fn file_data(
        &self,
        os_path: &str,
        offset: u64,
        length: usize,
    ) -> Result<Vec<u8>, CallbackError> {
        self.stats.record_file_data_request();
        let path: VirtualPath = VirtualPath::from_os(os_path);

        if let Some(content) = self.cache.get_file_content(path.as_str()) {
            self.stats.record_cache_hit();
            let data: &[u8] = &content.data;
            if offset >= data.len() as u64 {
                return Ok(Vec::new());
            }
            let start: usize = offset as usize;
            let end: usize = start.saturating_add(length).min(data.len());
            let section: Vec<u8> = data[start..end].to_vec();
            self.stats.record_bytes_read(section.len() as u64);
            return Ok(section);
        }
        self.stats.record_cache_miss();

        if let Some(section) = read_object_section(&self.store, &path, offset, length) {
            self.stats.record_bytes_read(section.len() as u64);
            return Ok(section);
        }

        // A store miss under /objects delegates like any other path: the
        // object may exist remotely and materialize on retry.
        debug!(path = %path, "Content miss; fetching asynchronously");
        self.bridge.fetch_file_content(&path);
        Err(CallbackError::NotFound)
    }

    /// Open a directory enumeration session.
    pub fn start_enumeration(&self, session: SessionId, os_path: &str) {
        self.stats.record_directory_enumeration();
        self.stats.enumeration_opened();
        let path: VirtualPath = VirtualPath::from_os(os_path);
        debug!(session = %session, path = %path, "Enumeration opened");
        self.sessions.open(session, path);
    }

    /// Serve one enumeration batch into the OS buffer.
    ///
    /// # Returns
    /// Entries added, or [`CallbackError::BufferTooSmall`] when the buffer
    /// cannot hold a single entry (the cursor does not move in that case).
    pub fn enumeration_batch(
        &self,
        session: SessionId,
        search_expression: Option<&str>,
        restart: bool,
        sink: &mut dyn DirEntrySink,
    ) -> Result<usize, CallbackError> {
        self.stats.record_enumeration_callback();
        let result = self.sessions.get_batch(
            session,
            search_expression,
            restart,
            sink,
            |path| self.load_entries(path),
        )?;
        Ok(result.added)
    }

    /// Close an enumeration session.
    pub fn end_enumeration(&self, session: SessionId) {
        if self.sessions.close(session) {
            self.stats.enumeration_closed();
        }
        debug!(session = %session, "Enumeration closed");
    }

    /// Apply the read-only policy to a file-change notification.
    ///
    /// Informational open notifications are allowed; every mutation,
    /// including the permission questions, is denied.
    pub fn notification(
        &self,
        os_path: &str,
        kind: NotificationKind,
    ) -> Result<(), CallbackError> {
        let path: VirtualPath = VirtualPath::from_os(os_path);
        match kind {
            NotificationKind::FileOpened => Ok(()),
            other => {
                debug!(path = %path, kind = ?other, "Mutation denied by read-only policy");
                Err(CallbackError::AccessDenied)
            }
        }
    }

    // ========================================================================
    // Listing resolution
    // ========================================================================

    /// Produce the full listing for an enumeration session's directory.
    ///
    /// Runs without the session-table lock held. Resolution is cache first
    /// (a primed listing always wins), then the store for the directories it
    /// backs, then a bounded delegated fetch, then empty.
    fn load_entries(&self, path: &VirtualPath) -> Vec<BasicFileInfo> {
        if let Some(listing) = self.cache.get_directory_listing(path.as_str()) {
            self.stats.record_cache_hit();
            return listing.entries.iter().map(file_info_to_basic).collect();
        }

        if path.is_root() {
            return self
                .store
                .list_directory(path)
                .into_iter()
                .map(BasicFileInfo::directory)
                .collect();
        }

        if path.as_str() == "/objects" {
            return self
                .store
                .list_objects()
                .into_iter()
                .map(|hash| {
                    let size: u64 = self.store.get_object_metadata(&hash).size;
                    BasicFileInfo::file(hash, size)
                })
                .collect();
        }

        self.stats.record_cache_miss();

        match self
            .bridge
            .fetch_directory_listing_wait(path, self.options.listing_fetch_timeout)
        {
            Some(listing) => listing.entries.iter().map(file_info_to_basic).collect(),
            None => {
                warn!(path = %path, "Listing unavailable; enumerating empty");
                Vec::new()
            }
        }
    }
}

impl Drop for VirtProvider {
    fn drop(&mut self) {
        if self.is_running() {
            let _ = self.stop();
        }
    }
}

/// Last path component; the root maps to "/".
fn leaf_name(path: &VirtualPath) -> String {
    if path.is_root() {
        return "/".to_string();
    }
    path.as_str()
        .rsplit('/')
        .next()
        .unwrap_or_default()
        .to_string()
}

fn derive_is_directory(info: &FileInfo) -> bool {
    match info.is_directory {
        Some(flag) => flag,
        None => info
            .mode
            .map_or(false, |mode| mode & MODE_TYPE_MASK == MODE_DIRECTORY),
    }
}

fn file_info_to_basic(info: &FileInfo) -> BasicFileInfo {
    BasicFileInfo {
        name: info.name.clone(),
        is_directory: derive_is_directory(info),
        size: info.size,
        timestamp: SystemTime::now(),
    }
}

/// Ranged read of an exact `/objects/<hash>` path.
fn read_object_section(
    store: &ObjectStore,
    path: &VirtualPath,
    offset: u64,
    length: usize,
) -> Option<Vec<u8>> {
    let hash: &str = path.object_hash()?;
    if path.as_str() != format!("/objects/{}", hash) {
        return None;
    }
    store.read_object_section(hash, offset, length)
}
