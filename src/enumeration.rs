//! Directory enumeration sessions.
//!
//! The OS enumerates a directory as a session: open, then one or more
//! get-batch calls filling a bounded buffer, then close. Sessions are
//! keyed by an OS-assigned identifier and survive across calls, so the
//! table tracks a cursor per session:
//!
//! ```text
//! open ──► entries not loaded ──► loading ──► paginating ──► close
//!                  ▲                              │
//!                  └───────── restart scan ◄──────┘
//! ```
//!
//! Loading runs outside the table lock. Concurrent get-batch calls for the
//! same session wait on a condvar for the loading thread, with a bounded
//! timeout so a stalled load degrades to an empty result instead of
//! wedging an OS worker thread.
//!
//! Two failure-containment rules apply throughout: a get-batch for an
//! unknown session is answered with an empty success (the OS ends the
//! enumeration cleanly), and a per-session call cap cuts off pathological
//! callback loops.

use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant, SystemTime};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, warn};

use crate::error::CallbackError;
use crate::path::VirtualPath;

/// OS-assigned enumeration session identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(pub u128);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

/// Directory entry in the shape the OS consumes.
///
/// Fully normalized at load time; pagination never re-derives anything.
/// Virtual nodes have no stored timestamps, so entries carry their creation
/// instant and the OS presents every node as "recently changed".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicFileInfo {
    pub name: String,
    pub is_directory: bool,
    pub size: u64,
    pub timestamp: SystemTime,
}

impl BasicFileInfo {
    pub fn file(name: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            is_directory: false,
            size,
            timestamp: SystemTime::now(),
        }
    }

    pub fn directory(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_directory: true,
            size: 0,
            timestamp: SystemTime::now(),
        }
    }
}

/// Receiver for enumeration output, modeling the OS's bounded buffer.
pub trait DirEntrySink {
    /// Attempt to append one entry.
    ///
    /// # Returns
    /// false when the buffer is full; the entry was NOT accepted.
    fn try_add(&mut self, entry: &BasicFileInfo) -> bool;
}

/// Per-session cursor state.
struct EnumerationState {
    path: VirtualPath,
    /// None until the first get-batch loads the listing.
    entries: Option<Vec<BasicFileInfo>>,
    next_index: usize,
    /// Search expression captured on the first get-batch; None matches all.
    pattern: Option<String>,
    pattern_captured: bool,
    is_loading: bool,
    call_count: u32,
}

impl EnumerationState {
    fn new(path: VirtualPath) -> Self {
        Self {
            path,
            entries: None,
            next_index: 0,
            pattern: None,
            pattern_captured: false,
            is_loading: false,
            call_count: 0,
        }
    }
}

/// Outcome of a get-batch call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchResult {
    /// Entries accepted by the sink during this call.
    pub added: usize,
}

/// Table of live enumeration sessions.
pub struct SessionTable {
    sessions: Mutex<HashMap<SessionId, EnumerationState>>,
    load_complete: Condvar,
    /// Bounded wait for another thread's in-flight load.
    wait_timeout: Duration,
    /// Hard cap on get-batch calls per session.
    max_calls: u32,
}

impl SessionTable {
    /// # Arguments
    /// * `wait_timeout` - Maximum wait for a concurrent first-page load
    /// * `max_calls` - Get-batch call cap per session
    pub fn new(wait_timeout: Duration, max_calls: u32) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            load_complete: Condvar::new(),
            wait_timeout,
            max_calls,
        }
    }

    /// Open a session. An existing session under the same id is replaced.
    pub fn open(&self, id: SessionId, path: VirtualPath) {
        let mut sessions = self.sessions.lock();
        if sessions
            .insert(id, EnumerationState::new(path.clone()))
            .is_some()
        {
            warn!(session = %id, path = %path, "Replaced existing enumeration session");
        }
    }

    /// Close a session.
    ///
    /// # Returns
    /// true if the session existed.
    pub fn close(&self, id: SessionId) -> bool {
        let existed: bool = self.sessions.lock().remove(&id).is_some();
        if !existed {
            debug!(session = %id, "Close for unknown enumeration session");
        }
        existed
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.lock().is_empty()
    }

    /// Serve one get-batch call for a session.
    ///
    /// `loader` produces the directory listing on first use (and again
    /// after a restart scan); it runs without the table lock held, so it
    /// may block on I/O or a bounded fetch wait.
    ///
    /// # Arguments
    /// * `id` - Session identifier from the OS
    /// * `search_expression` - Wildcard filter; captured on first call
    /// * `restart` - OS requested a restart scan
    /// * `sink` - Output buffer
    /// * `loader` - Listing producer for the session's path
    ///
    /// # Returns
    /// The number of entries added, or [`CallbackError::BufferTooSmall`]
    /// when the buffer cannot hold even one entry.
    pub fn get_batch<L>(
        &self,
        id: SessionId,
        search_expression: Option<&str>,
        restart: bool,
        sink: &mut dyn DirEntrySink,
        loader: L,
    ) -> Result<BatchResult, CallbackError>
    where
        L: FnOnce(&VirtualPath) -> Vec<BasicFileInfo>,
    {
        let mut sessions = self.sessions.lock();

        let state = match sessions.get_mut(&id) {
            Some(state) => state,
            None => {
                // Unknown session: answer empty so the OS ends cleanly
                // instead of surfacing an error to the application.
                warn!(session = %id, "Get-batch for unknown enumeration session");
                return Ok(BatchResult { added: 0 });
            }
        };

        // A restart scan re-enters the freshly-created state, including the
        // call counter, before this call is counted.
        if restart {
            state.next_index = 0;
            state.entries = None;
            state.call_count = 0;
            state.pattern = search_expression.map(str::to_string);
            state.pattern_captured = true;
        } else if !state.pattern_captured {
            state.pattern = search_expression.map(str::to_string);
            state.pattern_captured = true;
        }

        state.call_count += 1;
        if state.call_count > self.max_calls {
            warn!(
                session = %id,
                path = %state.path,
                calls = state.call_count,
                "Enumeration call cap exceeded; terminating session output"
            );
            return Ok(BatchResult { added: 0 });
        }

        // Load phase. Exactly one thread loads; others wait bounded.
        if state.entries.is_none() {
            if state.is_loading {
                let deadline: Instant = Instant::now() + self.wait_timeout;
                loop {
                    if self
                        .load_complete
                        .wait_until(&mut sessions, deadline)
                        .timed_out()
                    {
                        warn!(session = %id, "Timed out waiting for concurrent listing load");
                        return Ok(BatchResult { added: 0 });
                    }
                    match sessions.get(&id) {
                        Some(state) if state.entries.is_some() => break,
                        Some(_) => continue,
                        None => {
                            // Closed while we waited.
                            return Ok(BatchResult { added: 0 });
                        }
                    }
                }
            } else {
                state.is_loading = true;
                let path: VirtualPath = state.path.clone();
                drop(sessions);

                let entries: Vec<BasicFileInfo> = loader(&path);

                sessions = self.sessions.lock();
                match sessions.get_mut(&id) {
                    Some(state) => {
                        state.entries = Some(entries);
                        state.is_loading = false;
                    }
                    None => {
                        // Closed mid-load; nothing to paginate.
                        self.load_complete.notify_all();
                        return Ok(BatchResult { added: 0 });
                    }
                }
                self.load_complete.notify_all();
            }
        }

        // Pagination phase.
        let state = match sessions.get_mut(&id) {
            Some(state) => state,
            None => return Ok(BatchResult { added: 0 }),
        };
        let entries: &[BasicFileInfo] = state.entries.as_deref().unwrap_or(&[]);

        let mut added: usize = 0;
        let mut index: usize = state.next_index;
        while index < entries.len() {
            let entry: &BasicFileInfo = &entries[index];
            let matches: bool = match state.pattern.as_deref() {
                Some(pattern) => wildcard_match(pattern, &entry.name),
                None => true,
            };
            if !matches {
                // Filtered entries are consumed by the cursor.
                index += 1;
                continue;
            }
            if sink.try_add(entry) {
                added += 1;
                index += 1;
            } else {
                break;
            }
        }
        state.next_index = index;

        if added == 0 && index < entries.len() {
            // Buffer cannot hold even one entry. The cursor did not move,
            // so the OS can retry with a larger buffer.
            return Err(CallbackError::BufferTooSmall);
        }

        Ok(BatchResult { added })
    }
}

/// Case-insensitive wildcard match supporting `*` and `?`.
///
/// Two-pointer scan backtracking only to the most recent star, so the cost
/// stays linear-ish in `pattern.len() * name.len()` even for adversarial
/// multi-star patterns arriving from arbitrary applications.
pub fn wildcard_match(pattern: &str, name: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let name: Vec<char> = name.chars().collect();

    let mut p: usize = 0;
    let mut n: usize = 0;
    let mut star: Option<usize> = None;
    let mut star_mark: usize = 0;

    while n < name.len() {
        let literal_match: bool = p < pattern.len()
            && (pattern[p] == '?' || chars_equal_fold(pattern[p], name[n]));
        if literal_match {
            p += 1;
            n += 1;
        } else if p < pattern.len() && pattern[p] == '*' {
            star = Some(p);
            star_mark = n;
            p += 1;
        } else if let Some(star_pos) = star {
            // Widen what the last star consumed and rescan from there.
            p = star_pos + 1;
            star_mark += 1;
            n = star_mark;
        } else {
            return false;
        }
    }

    pattern[p..].iter().all(|&c| c == '*')
}

fn chars_equal_fold(a: char, b: char) -> bool {
    a == b || a.to_lowercase().eq(b.to_lowercase())
}
