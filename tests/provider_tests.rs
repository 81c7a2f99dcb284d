//! End-to-end tests driving the engine exactly as an OS binding would:
//! callback entry points on one side, host control surface on the other,
//! with a scripted data provider behind the bridge.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use tempfile::TempDir;

use projected_vfs::{
    BasicFileInfo, CallbackError, DataProvider, DirEntrySink, DirectoryListing, FileInfo,
    ObjectType, ProviderOptions, SessionId, VirtProvider, WriteIntent, ROOT_VIRTUAL_DIRS,
};

// ============================================================================
// Test fixtures
// ============================================================================

/// Scripted provider with per-operation call counters.
#[derive(Default)]
struct ScriptedProvider {
    listings: Mutex<HashMap<String, DirectoryListing>>,
    contents: Mutex<HashMap<String, Vec<u8>>>,
    infos: Mutex<HashMap<String, FileInfo>>,
    listing_calls: AtomicUsize,
    content_calls: AtomicUsize,
    info_calls: AtomicUsize,
    create_calls: AtomicUsize,
    delay: Option<Duration>,
}

impl ScriptedProvider {
    fn with_listing(self, path: &str, names: &[&str]) -> Self {
        let entries: Vec<FileInfo> = names
            .iter()
            .map(|name| FileInfo {
                name: name.to_string(),
                size: 1,
                ..Default::default()
            })
            .collect();
        self.listings
            .lock()
            .insert(path.to_string(), DirectoryListing::new(entries));
        self
    }

    fn with_content(self, path: &str, data: &[u8]) -> Self {
        self.contents.lock().insert(path.to_string(), data.to_vec());
        self
    }

    fn with_info(self, path: &str, size: u64) -> Self {
        let name: String = path.rsplit('/').next().unwrap_or("").to_string();
        self.infos.lock().insert(
            path.to_string(),
            FileInfo {
                name,
                size,
                is_directory: Some(false),
                ..Default::default()
            },
        );
        self
    }
}

#[async_trait]
impl DataProvider for ScriptedProvider {
    async fn get_file_info(&self, path: &str) -> Option<FileInfo> {
        self.info_calls.fetch_add(1, Ordering::SeqCst);
        self.infos.lock().get(path).cloned()
    }

    async fn get_directory_listing(&self, path: &str) -> Option<DirectoryListing> {
        self.listing_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.listings.lock().get(path).cloned()
    }

    async fn get_file_content(&self, path: &str) -> Option<Vec<u8>> {
        self.content_calls.fetch_add(1, Ordering::SeqCst);
        self.contents.lock().get(path).cloned()
    }

    async fn create_file(&self, _path: &str, _data: Vec<u8>) -> bool {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        true
    }
}

/// OS-buffer stand-in with a fixed entry capacity.
struct VecSink {
    capacity: usize,
    entries: Vec<BasicFileInfo>,
}

impl VecSink {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: Vec::new(),
        }
    }

    fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.name.as_str()).collect()
    }
}

impl DirEntrySink for VecSink {
    fn try_add(&mut self, entry: &BasicFileInfo) -> bool {
        if self.entries.len() >= self.capacity {
            return false;
        }
        self.entries.push(entry.clone());
        true
    }
}

fn test_hash(seed: u8) -> String {
    format!("{:02x}", seed).repeat(32)
}

struct Fixture {
    dir: TempDir,
    provider: Arc<ScriptedProvider>,
    engine: VirtProvider,
}

fn fixture(provider: ScriptedProvider) -> Fixture {
    let dir = TempDir::new().unwrap();
    let provider = Arc::new(provider);
    let options = ProviderOptions::default()
        .with_listing_fetch_timeout(Duration::from_millis(500))
        .with_enumeration_wait_timeout(Duration::from_millis(500))
        .with_write_drain_interval(Duration::from_millis(20));
    let engine = VirtProvider::new(
        dir.path().join("instance").as_path(),
        dir.path().join("mount"),
        provider.clone(),
        options,
    )
    .unwrap();
    Fixture {
        dir,
        provider,
        engine,
    }
}

fn write_object(fixture: &Fixture, hash: &str, content: &[u8]) {
    std::fs::write(
        fixture.dir.path().join("instance").join("objects").join(hash),
        content,
    )
    .unwrap();
}

fn wait_for<F: Fn() -> bool>(cond: F) {
    let deadline = Instant::now() + Duration::from_secs(2);
    while !cond() {
        assert!(Instant::now() < deadline, "condition never met");
        std::thread::sleep(Duration::from_millis(5));
    }
}

// ============================================================================
// Object store resolution
// ============================================================================

#[test]
fn stored_object_resolves_and_reads_locally() {
    let fx = fixture(ScriptedProvider::default());
    let hash: String = test_hash(0xab);
    write_object(&fx, &hash, b"hello");

    let path: String = format!("objects/{}", hash);
    let info = fx.engine.placeholder_info(&path).unwrap();
    assert!(!info.is_directory);
    assert_eq!(info.size, 5);

    assert_eq!(fx.engine.file_data(&path, 0, 100).unwrap(), b"hello");
    assert_eq!(fx.engine.file_data(&path, 1, 3).unwrap(), b"ell");

    // Everything was answered locally.
    assert_eq!(fx.provider.info_calls.load(Ordering::SeqCst), 0);
    assert_eq!(fx.provider.content_calls.load(Ordering::SeqCst), 0);
}

#[test]
fn object_store_miss_triggers_single_fetch_then_materializes() {
    let hash: String = test_hash(0xcd);
    let path: String = format!("objects/{}", hash);
    let virt: String = format!("/objects/{}", hash);
    let fx = fixture(
        ScriptedProvider::default()
            .with_info(&virt, 5)
            .with_content(&virt, b"bytes"),
    );

    // Not stored locally: the miss delegates to the provider like any
    // other path, with exactly one fetch for the one query.
    assert_eq!(fx.engine.placeholder_info(&path), Err(CallbackError::NotFound));
    wait_for(|| fx.provider.info_calls.load(Ordering::SeqCst) == 1);
    std::thread::sleep(Duration::from_millis(100));

    let info = fx.engine.placeholder_info(&path).unwrap();
    assert_eq!(info.size, 5);
    assert_eq!(fx.provider.info_calls.load(Ordering::SeqCst), 1);

    assert_eq!(fx.engine.file_data(&path, 0, 10), Err(CallbackError::NotFound));
    wait_for(|| fx.provider.content_calls.load(Ordering::SeqCst) == 1);
    std::thread::sleep(Duration::from_millis(100));
    assert_eq!(fx.engine.file_data(&path, 0, 10).unwrap(), b"bytes");
    assert_eq!(fx.provider.content_calls.load(Ordering::SeqCst), 1);
}

#[test]
fn object_type_classification_from_header() {
    let fx = fixture(ScriptedProvider::default());
    let blob: String = test_hash(1);
    let typed: String = test_hash(2);
    write_object(&fx, &blob, b"hello");
    write_object(&fx, &typed, b"<div itemscope itemtype=\"//refin.io/Person\">");

    let store =
        projected_vfs::ObjectStore::new(fx.dir.path().join("instance").as_path()).unwrap();
    let blob_meta = store.get_object_metadata(&blob);
    assert_eq!(blob_meta.object_type, ObjectType::Blob);
    assert_eq!(blob_meta.object_type.to_string(), "BLOB");
    assert_eq!(
        store.get_object_metadata(&typed).object_type,
        ObjectType::Typed("Person".to_string())
    );

    // The engine serves the same objects over the callback surface.
    assert!(fx
        .engine
        .placeholder_info(&format!("objects/{}", typed))
        .is_ok());
}

// ============================================================================
// Async fetch and retry
// ============================================================================

#[test]
fn first_access_not_found_then_retry_hits_cache() {
    let fx = fixture(
        ScriptedProvider::default()
            .with_info("/chats/general", 42)
            .with_content("/chats/general", b"chat history"),
    );

    // First access misses and triggers exactly one fetch.
    assert_eq!(
        fx.engine.placeholder_info("chats/general"),
        Err(CallbackError::NotFound)
    );
    wait_for(|| fx.provider.info_calls.load(Ordering::SeqCst) == 1);
    std::thread::sleep(Duration::from_millis(100));

    // The OS-style retry is a cache hit; no further fetch.
    let info = fx.engine.placeholder_info("chats/general").unwrap();
    assert_eq!(info.size, 42);
    assert_eq!(fx.provider.info_calls.load(Ordering::SeqCst), 1);

    assert_eq!(fx.engine.file_data("chats/general", 0, 100), Err(CallbackError::NotFound));
    wait_for(|| fx.provider.content_calls.load(Ordering::SeqCst) == 1);
    std::thread::sleep(Duration::from_millis(100));
    assert_eq!(fx.engine.file_data("chats/general", 5, 7).unwrap(), b"history");
    assert_eq!(fx.provider.content_calls.load(Ordering::SeqCst), 1);
}

#[test]
fn primed_cache_answers_without_provider() {
    let fx = fixture(ScriptedProvider::default());
    fx.engine.set_cached_content("/chats/pinned", b"pinned message".to_vec());

    assert_eq!(fx.engine.file_data("chats/pinned", 0, 6).unwrap(), b"pinned");
    assert_eq!(fx.provider.content_calls.load(Ordering::SeqCst), 0);
}

#[test]
fn stopped_engine_fetches_fail_safe() {
    let fx = fixture(ScriptedProvider::default().with_info("/chats/late", 1));
    fx.engine.start().unwrap();
    fx.engine.stop().unwrap();

    // The executor is gone; the miss still answers NotFound and the cache
    // stays cold instead of wedging or panicking.
    assert_eq!(
        fx.engine.placeholder_info("chats/late"),
        Err(CallbackError::NotFound)
    );
    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(
        fx.engine.placeholder_info("chats/late"),
        Err(CallbackError::NotFound)
    );
    assert_eq!(fx.provider.info_calls.load(Ordering::SeqCst), 0);
}

// ============================================================================
// Enumeration
// ============================================================================

#[test]
fn root_enumeration_is_fixed_and_local() {
    let fx = fixture(ScriptedProvider::default());
    let id = SessionId(1);
    fx.engine.start_enumeration(id, "");

    let mut sink = VecSink::new(16);
    let added = fx.engine.enumeration_batch(id, None, false, &mut sink).unwrap();
    assert_eq!(added, 5);
    assert_eq!(sink.names(), ROOT_VIRTUAL_DIRS);
    assert!(sink.entries.iter().all(|e| e.is_directory));

    fx.engine.end_enumeration(id);
    assert_eq!(fx.provider.listing_calls.load(Ordering::SeqCst), 0);
}

#[test]
fn objects_enumeration_lists_store() {
    let fx = fixture(ScriptedProvider::default());
    let hash: String = test_hash(0x11);
    write_object(&fx, &hash, b"abc");

    let id = SessionId(2);
    fx.engine.start_enumeration(id, "objects");
    let mut sink = VecSink::new(16);
    let added = fx.engine.enumeration_batch(id, None, false, &mut sink).unwrap();
    fx.engine.end_enumeration(id);

    assert_eq!(added, 1);
    assert_eq!(sink.names(), [hash.as_str()]);
    assert_eq!(sink.entries[0].size, 3);
}

#[test]
fn primed_objects_listing_wins_over_store() {
    let fx = fixture(ScriptedProvider::default());
    let stored: String = test_hash(0x21);
    write_object(&fx, &stored, b"abc");

    // Host-seeded listing takes precedence over the on-disk scan.
    let seeded: String = test_hash(0x22);
    fx.engine.set_cached_directory(
        "/objects",
        vec![FileInfo {
            name: seeded.clone(),
            size: 9,
            ..Default::default()
        }],
    );

    let id = SessionId(13);
    fx.engine.start_enumeration(id, "objects");
    let mut sink = VecSink::new(16);
    assert_eq!(fx.engine.enumeration_batch(id, None, false, &mut sink).unwrap(), 1);
    assert_eq!(sink.names(), [seeded.as_str()]);
    fx.engine.end_enumeration(id);
}

#[test]
fn delegated_enumeration_paginates_and_restarts() {
    let fx = fixture(
        ScriptedProvider::default().with_listing("/chats", &["a.txt", "b.txt", "c.log", "d.txt"]),
    );
    let id = SessionId(3);
    fx.engine.start_enumeration(id, "chats");

    let mut page1 = VecSink::new(2);
    assert_eq!(fx.engine.enumeration_batch(id, None, false, &mut page1).unwrap(), 2);
    assert_eq!(page1.names(), ["a.txt", "b.txt"]);

    let mut page2 = VecSink::new(16);
    assert_eq!(fx.engine.enumeration_batch(id, None, false, &mut page2).unwrap(), 2);
    assert_eq!(page2.names(), ["c.log", "d.txt"]);

    // Pagination used a single provider round-trip.
    assert_eq!(fx.provider.listing_calls.load(Ordering::SeqCst), 1);

    // Restart scan: cursor back to zero, new pattern honored.
    let mut filtered = VecSink::new(16);
    assert_eq!(
        fx.engine
            .enumeration_batch(id, Some("*.txt"), true, &mut filtered)
            .unwrap(),
        3
    );
    assert_eq!(filtered.names(), ["a.txt", "b.txt", "d.txt"]);

    fx.engine.end_enumeration(id);
}

#[test]
fn single_entry_buffer_yields_one_entry_per_batch() {
    let provider = ScriptedProvider::default();
    provider.listings.lock().insert(
        "/foo".to_string(),
        DirectoryListing::new(vec![
            FileInfo {
                name: "a.txt".to_string(),
                size: 3,
                ..Default::default()
            },
            FileInfo {
                name: "b".to_string(),
                is_directory: Some(true),
                ..Default::default()
            },
        ]),
    );
    let fx = fixture(provider);
    let id = SessionId(11);
    fx.engine.start_enumeration(id, "foo");

    let mut first = VecSink::new(1);
    assert_eq!(fx.engine.enumeration_batch(id, None, false, &mut first).unwrap(), 1);
    assert_eq!(first.names(), ["a.txt"]);
    assert!(!first.entries[0].is_directory);
    assert_eq!(first.entries[0].size, 3);

    let mut second = VecSink::new(1);
    assert_eq!(fx.engine.enumeration_batch(id, None, false, &mut second).unwrap(), 1);
    assert_eq!(second.names(), ["b"]);
    assert!(second.entries[0].is_directory);

    // The session is exhausted: a further call adds nothing.
    let mut third = VecSink::new(1);
    assert_eq!(fx.engine.enumeration_batch(id, None, false, &mut third).unwrap(), 0);
    fx.engine.end_enumeration(id);
}

#[test]
fn buffer_too_small_does_not_lose_entries() {
    let fx = fixture(ScriptedProvider::default().with_listing("/chats", &["only.txt"]));
    let id = SessionId(4);
    fx.engine.start_enumeration(id, "chats");

    let mut zero = VecSink::new(0);
    assert_eq!(
        fx.engine.enumeration_batch(id, None, false, &mut zero),
        Err(CallbackError::BufferTooSmall)
    );

    let mut retry = VecSink::new(4);
    assert_eq!(fx.engine.enumeration_batch(id, None, false, &mut retry).unwrap(), 1);
    assert_eq!(retry.names(), ["only.txt"]);
    fx.engine.end_enumeration(id);
}

#[test]
fn batch_on_unknown_session_is_empty_success() {
    let fx = fixture(ScriptedProvider::default());
    let mut sink = VecSink::new(16);
    assert_eq!(
        fx.engine
            .enumeration_batch(SessionId(99), None, false, &mut sink)
            .unwrap(),
        0
    );

    // Same after a session ends: no defensive recreation.
    let id = SessionId(5);
    fx.engine.start_enumeration(id, "");
    fx.engine.end_enumeration(id);
    assert_eq!(fx.engine.enumeration_batch(id, None, false, &mut sink).unwrap(), 0);
}

#[test]
fn concurrent_sessions_do_not_interfere() {
    let fx = fixture(
        ScriptedProvider::default()
            .with_listing("/chats", &["x", "y"])
            .with_listing("/invites", &["i1", "i2", "i3"]),
    );
    let chats = SessionId(6);
    let invites = SessionId(7);
    fx.engine.start_enumeration(chats, "chats");
    fx.engine.start_enumeration(invites, "invites");

    let mut a = VecSink::new(1);
    let mut b = VecSink::new(1);
    fx.engine.enumeration_batch(chats, None, false, &mut a).unwrap();
    fx.engine.enumeration_batch(invites, None, false, &mut b).unwrap();
    assert_eq!(a.names(), ["x"]);
    assert_eq!(b.names(), ["i1"]);

    let mut rest = VecSink::new(16);
    fx.engine.enumeration_batch(invites, None, false, &mut rest).unwrap();
    assert_eq!(rest.names(), ["i2", "i3"]);

    fx.engine.end_enumeration(chats);
    fx.engine.end_enumeration(invites);
}

#[test]
fn slow_listing_times_out_then_retry_succeeds() {
    let mut provider =
        ScriptedProvider::default().with_listing("/chats", &["late.txt"]);
    provider.delay = Some(Duration::from_millis(200));
    let dir = TempDir::new().unwrap();
    let provider = Arc::new(provider);
    let engine = VirtProvider::new(
        dir.path().join("instance").as_path(),
        dir.path().join("mount"),
        provider.clone(),
        ProviderOptions::default().with_listing_fetch_timeout(Duration::from_millis(20)),
    )
    .unwrap();

    let id = SessionId(8);
    engine.start_enumeration(id, "chats");
    let mut sink = VecSink::new(16);
    // The bounded wait elapses before the provider answers.
    assert_eq!(engine.enumeration_batch(id, None, false, &mut sink).unwrap(), 0);
    engine.end_enumeration(id);

    // The fetch kept running and warmed the cache; a fresh session sees it.
    wait_for(|| {
        let id = SessionId(9);
        engine.start_enumeration(id, "chats");
        let mut sink = VecSink::new(16);
        let added = engine.enumeration_batch(id, None, false, &mut sink).unwrap();
        engine.end_enumeration(id);
        added == 1
    });
}

// ============================================================================
// Write path and notifications
// ============================================================================

#[test]
fn creates_are_delivered_updates_dropped() {
    let fx = fixture(ScriptedProvider::default());
    fx.engine.queue_write(WriteIntent::Create {
        path: "/chats/new.txt".to_string(),
        data: b"hello".to_vec(),
    });
    fx.engine.queue_write(WriteIntent::Update {
        path: "/chats/old.txt".to_string(),
        data: b"x".to_vec(),
    });
    fx.engine.queue_write(WriteIntent::Delete {
        path: "/chats/gone.txt".to_string(),
    });

    wait_for(|| fx.provider.create_calls.load(Ordering::SeqCst) == 1);
    // Updates and deletes never reach the provider.
    std::thread::sleep(Duration::from_millis(100));
    assert_eq!(fx.provider.create_calls.load(Ordering::SeqCst), 1);
}

// ============================================================================
// Statistics
// ============================================================================

#[test]
fn stats_reflect_callback_traffic() {
    let fx = fixture(ScriptedProvider::default());
    let hash: String = test_hash(0x77);
    write_object(&fx, &hash, b"12345678");
    let path: String = format!("objects/{}", hash);

    fx.engine.placeholder_info(&path).unwrap();
    fx.engine.file_data(&path, 0, 8).unwrap();

    let id = SessionId(10);
    fx.engine.start_enumeration(id, "");
    let mut sink = VecSink::new(16);
    fx.engine.enumeration_batch(id, None, false, &mut sink).unwrap();
    fx.engine.end_enumeration(id);

    let stats = fx.engine.stats();
    assert_eq!(stats.placeholder_requests, 1);
    assert_eq!(stats.file_data_requests, 1);
    assert_eq!(stats.directory_enumerations, 1);
    assert_eq!(stats.enumeration_callbacks, 1);
    assert_eq!(stats.active_enumerations, 0);
    assert_eq!(stats.bytes_read, 8);
}
