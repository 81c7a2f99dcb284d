//! Async bridge between OS callbacks and the external data provider.
//!
//! The external provider lives on the host side of the embedding boundary
//! and is inherently async; OS callbacks are synchronous and must answer
//! promptly. The bridge resolves this mismatch with a cache-first protocol:
//!
//! ```text
//! callback thread          bridge                     data provider
//! ───────────────          ──────                     ─────────────
//!   miss in cache ───────► fetch_*() submits future ─► async call
//!   return NotFound            │                          │
//!   (OS retries)               ▼                          ▼
//!                          cache.set_*() ◄───────── result
//!   retry: cache hit
//! ```
//!
//! Every fetch is fire-and-forget except the first-page enumeration load,
//! which waits a short bounded interval because the enumeration contract
//! has no OS-driven retry.
//!
//! Host-side handlers are optional per operation. A missing handler is a
//! registration gap, not a fault: the default trait methods log it and
//! return empty results so the filesystem degrades to "not found" instead
//! of erroring.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::cache::{ContentCache, DirectoryListing, FileContent, FileInfo};
use crate::executor::AsyncExecutor;
use crate::path::VirtualPath;

/// Host-side data provider.
///
/// Implementors supply content for virtual paths the engine cannot resolve
/// locally. Every method has a safe default so hosts may register only the
/// operations they support.
#[async_trait]
pub trait DataProvider: Send + Sync + 'static {
    /// Metadata for a single virtual path, or None if unknown.
    async fn get_file_info(&self, path: &str) -> Option<FileInfo> {
        debug!(path, operation = "get_file_info", "No handler registered");
        None
    }

    /// Listing for a virtual directory, or None if unknown.
    async fn get_directory_listing(&self, path: &str) -> Option<DirectoryListing> {
        debug!(
            path,
            operation = "get_directory_listing",
            "No handler registered"
        );
        None
    }

    /// Whole-file content for a virtual path, or None if unknown.
    async fn get_file_content(&self, path: &str) -> Option<Vec<u8>> {
        debug!(path, operation = "get_file_content", "No handler registered");
        None
    }

    /// Persist a file created inside the virtualization root.
    ///
    /// # Returns
    /// true if the host accepted the file.
    async fn create_file(&self, path: &str, _data: Vec<u8>) -> bool {
        debug!(path, operation = "create_file", "No handler registered");
        false
    }
}

/// Sink for human-readable diagnostic messages forwarded to the host.
///
/// Delivery is best-effort by contract: a sink that is absent or failing
/// must never disturb filesystem operations.
pub type DebugSink = Box<dyn Fn(&str) + Send + Sync>;

/// A buffered local write awaiting delivery to the data provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteIntent {
    Create { path: String, data: Vec<u8> },
    Update { path: String, data: Vec<u8> },
    Delete { path: String },
}

impl WriteIntent {
    fn path(&self) -> &str {
        match self {
            WriteIntent::Create { path, .. }
            | WriteIntent::Update { path, .. }
            | WriteIntent::Delete { path } => path,
        }
    }
}

/// Bridge owning the executor handoff, the write-intent queue, and the
/// debug channel.
pub struct AsyncBridge {
    provider: Arc<dyn DataProvider>,
    cache: Arc<ContentCache>,
    executor: Arc<AsyncExecutor>,
    write_queue: Mutex<VecDeque<WriteIntent>>,
    debug_sink: Mutex<Option<DebugSink>>,
    drain_stop: Arc<AtomicBool>,
    drain_thread: Mutex<Option<JoinHandle<()>>>,
}

impl AsyncBridge {
    /// Create a bridge and start its periodic write-queue drain.
    ///
    /// # Arguments
    /// * `provider` - Host-side data provider
    /// * `cache` - Shared content cache populated on fetch completion
    /// * `executor` - Executor carrying provider futures
    /// * `drain_interval` - Period between write-queue drains
    pub fn new(
        provider: Arc<dyn DataProvider>,
        cache: Arc<ContentCache>,
        executor: Arc<AsyncExecutor>,
        drain_interval: Duration,
    ) -> Arc<Self> {
        let bridge = Arc::new(Self {
            provider,
            cache,
            executor,
            write_queue: Mutex::new(VecDeque::new()),
            debug_sink: Mutex::new(None),
            drain_stop: Arc::new(AtomicBool::new(false)),
            drain_thread: Mutex::new(None),
        });

        let weak = Arc::downgrade(&bridge);
        let stop: Arc<AtomicBool> = bridge.drain_stop.clone();
        let thread: JoinHandle<()> = std::thread::Builder::new()
            .name("vfs-write-drain".to_string())
            .spawn(move || {
                while !stop.load(Ordering::Acquire) {
                    std::thread::sleep(drain_interval);
                    match weak.upgrade() {
                        Some(bridge) => bridge.drain_writes(),
                        None => break,
                    }
                }
            })
            .expect("Failed to spawn drain thread");
        *bridge.drain_thread.lock() = Some(thread);

        bridge
    }

    /// Install the host debug sink, replacing any previous one.
    pub fn set_debug_sink(&self, sink: DebugSink) {
        *self.debug_sink.lock() = Some(sink);
    }

    /// Forward a diagnostic message to the host. Never fails.
    pub fn emit_debug(&self, message: &str) {
        let guard = self.debug_sink.lock();
        if let Some(sink) = guard.as_ref() {
            sink(message);
        }
    }

    // ========================================================================
    // Fetch paths (cache population)
    // ========================================================================

    /// Kick off an async metadata fetch; the result lands in the cache.
    pub fn fetch_file_info(&self, path: &VirtualPath) {
        let provider: Arc<dyn DataProvider> = self.provider.clone();
        let cache: Arc<ContentCache> = self.cache.clone();
        let key: String = path.as_str().to_string();

        let submitted = self.executor.submit(async move {
            if let Some(info) = provider.get_file_info(&key).await {
                cache.set_file_info(&key, info);
            }
        });
        if let Err(err) = submitted {
            warn!(path = %path, error = %err, "Dropped file info fetch");
        }
    }

    /// Kick off an async content fetch; the result lands in the cache.
    pub fn fetch_file_content(&self, path: &VirtualPath) {
        let provider: Arc<dyn DataProvider> = self.provider.clone();
        let cache: Arc<ContentCache> = self.cache.clone();
        let key: String = path.as_str().to_string();

        let submitted = self.executor.submit(async move {
            if let Some(data) = provider.get_file_content(&key).await {
                cache.set_file_content(&key, FileContent::new(data));
            }
        });
        if let Err(err) = submitted {
            warn!(path = %path, error = %err, "Dropped file content fetch");
        }
    }

    /// Kick off an async listing fetch; the result lands in the cache.
    pub fn fetch_directory_listing(&self, path: &VirtualPath) {
        let provider: Arc<dyn DataProvider> = self.provider.clone();
        let cache: Arc<ContentCache> = self.cache.clone();
        let key: String = path.as_str().to_string();

        let submitted = self.executor.submit(async move {
            if let Some(listing) = provider.get_directory_listing(&key).await {
                cache.set_directory_listing(&key, listing);
            }
        });
        if let Err(err) = submitted {
            warn!(path = %path, error = %err, "Dropped directory listing fetch");
        }
    }

    /// Fetch a listing and wait a bounded interval for it.
    ///
    /// The provider call runs as its own task on the executor runtime, so a
    /// caller that times out still leaves the fetch running; when it lands
    /// in the cache the OS's next attempt succeeds without a provider
    /// round-trip.
    pub fn fetch_directory_listing_wait(
        &self,
        path: &VirtualPath,
        timeout: Duration,
    ) -> Option<DirectoryListing> {
        let provider: Arc<dyn DataProvider> = self.provider.clone();
        let cache: Arc<ContentCache> = self.cache.clone();
        let key: String = path.as_str().to_string();

        let result = self.executor.block_on_timeout(
            async move {
                let handle = tokio::spawn(async move {
                    let listing: Option<DirectoryListing> =
                        provider.get_directory_listing(&key).await;
                    if let Some(ref listing) = listing {
                        cache.set_directory_listing(&key, listing.clone());
                    }
                    listing
                });
                handle.await.ok().flatten()
            },
            timeout,
        );

        match result {
            Ok(listing) => listing,
            Err(err) => {
                debug!(path = %path, error = %err, "Listing fetch did not complete in time");
                None
            }
        }
    }

    // ========================================================================
    // Write-intent queue
    // ========================================================================

    /// Buffer a local write for the next drain.
    pub fn queue_write(&self, intent: WriteIntent) {
        self.write_queue.lock().push_back(intent);
    }

    /// Number of writes awaiting delivery.
    pub fn pending_writes(&self) -> usize {
        self.write_queue.lock().len()
    }

    /// Deliver all queued writes to the data provider.
    ///
    /// Creates are forwarded; updates and deletes have no provider-side
    /// operation yet and are dropped with a warning so the gap is visible
    /// rather than silent.
    pub fn drain_writes(&self) {
        let drained: Vec<WriteIntent> = {
            let mut queue = self.write_queue.lock();
            queue.drain(..).collect()
        };

        for intent in drained {
            match intent {
                WriteIntent::Create { path, data } => {
                    let provider: Arc<dyn DataProvider> = self.provider.clone();
                    let submitted = self.executor.submit(async move {
                        let accepted: bool = provider.create_file(&path, data).await;
                        if !accepted {
                            warn!(path, "Data provider rejected created file");
                        }
                    });
                    if let Err(err) = submitted {
                        warn!(error = %err, "Dropped queued create");
                    }
                }
                other => {
                    warn!(path = other.path(), "Unsupported write intent dropped");
                    self.emit_debug(&format!(
                        "Unsupported write intent dropped for {}",
                        other.path()
                    ));
                }
            }
        }
    }

    /// Stop the drain thread after delivering remaining writes.
    pub fn shutdown(&self) {
        self.drain_stop.store(true, Ordering::Release);
        let thread: Option<JoinHandle<()>> = self.drain_thread.lock().take();
        if let Some(thread) = thread {
            let _ = thread.join();
        }
        self.drain_writes();
    }
}

impl Drop for AsyncBridge {
    fn drop(&mut self) {
        self.drain_stop.store(true, Ordering::Release);
        // The drain thread holds only a Weak; it exits on its own once the
        // last strong reference is gone. Join only if shutdown() was skipped
        // and the thread already observed the stop flag.
        if let Some(thread) = self.drain_thread.lock().take() {
            let _ = thread.join();
        }
    }
}
