//! Dedicated async executor for bridging OS callbacks to the data provider.
//!
//! OS virtualization callbacks arrive on threads owned by the OS and must
//! never block indefinitely, while the external data provider is async. The
//! executor owns a background thread with its own Tokio runtime, completely
//! separate from any ambient runtime, so nothing here can deadlock a host
//! runtime's worker threads.
//!
//! ```text
//! OS callback thread                 Executor thread
//! ──────────────────                 ───────────────
//!       │                                 │
//!       │ submit(future) ────────────────►│
//!       │                                 │ spawn task
//!       │ (fire-and-forget: return now)   │
//!       │                                 │
//!       │ blocking_recv() ◄───────────────│ send result (bounded-wait path)
//! ```
//!
//! Two submission modes match the two callback contracts:
//! - [`AsyncExecutor::submit`] fires and forgets; used by the fetch paths
//!   that answer the OS with "not found, retry" and warm the cache for the
//!   next access.
//! - [`AsyncExecutor::block_on_timeout`] blocks the calling thread on a
//!   typed oneshot channel (a plain condvar wait, no runtime involvement)
//!   up to a deadline; reserved for first-page enumeration loading, the one
//!   operation whose OS contract has no retry path.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

/// Errors from executor submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutorError {
    /// The executor has been shut down or its thread died.
    Shutdown,
    /// The submission queue is full; the work was not accepted.
    QueueFull,
    /// The bounded wait elapsed before the operation completed.
    Timeout {
        /// The timeout that was exceeded.
        duration: Duration,
    },
}

impl fmt::Display for ExecutorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutorError::Shutdown => write!(f, "Executor has been shut down"),
            ExecutorError::QueueFull => write!(f, "Executor queue is full"),
            ExecutorError::Timeout { duration } => {
                write!(f, "Operation timed out after {:?}", duration)
            }
        }
    }
}

impl std::error::Error for ExecutorError {}

/// Configuration for the async executor.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Number of Tokio worker threads.
    pub worker_threads: usize,
    /// Channel buffer size for work submission.
    pub queue_size: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            worker_threads: 2,
            queue_size: 1024,
        }
    }
}

impl ExecutorConfig {
    /// Set the number of Tokio worker threads.
    pub fn with_worker_threads(mut self, worker_threads: usize) -> Self {
        self.worker_threads = worker_threads;
        self
    }

    /// Set the submission queue size.
    pub fn with_queue_size(mut self, queue_size: usize) -> Self {
        self.queue_size = queue_size;
        self
    }
}

/// Type-erased work item; results flow through typed per-call channels.
struct WorkItem {
    work: BoxFuture<'static, ()>,
}

/// Async executor running on a dedicated background thread.
pub struct AsyncExecutor {
    tx: mpsc::Sender<WorkItem>,
    cancel_token: CancellationToken,
    thread: Option<JoinHandle<()>>,
    running: Arc<AtomicBool>,
}

impl AsyncExecutor {
    /// Create a new executor with a dedicated runtime thread.
    ///
    /// # Arguments
    /// * `config` - Executor configuration
    pub fn new(config: ExecutorConfig) -> Self {
        let (tx, rx) = mpsc::channel::<WorkItem>(config.queue_size);
        let cancel_token = CancellationToken::new();
        let token_clone: CancellationToken = cancel_token.clone();
        let worker_threads: usize = config.worker_threads;
        let running = Arc::new(AtomicBool::new(true));
        let running_clone: Arc<AtomicBool> = running.clone();

        let thread: JoinHandle<()> = std::thread::Builder::new()
            .name("vfs-async-bridge".to_string())
            .spawn(move || {
                let rt: tokio::runtime::Runtime = tokio::runtime::Builder::new_multi_thread()
                    .worker_threads(worker_threads)
                    .thread_name("vfs-bridge-worker")
                    .enable_all()
                    .build()
                    .expect("Failed to create bridge runtime");

                rt.block_on(async move {
                    let mut rx: mpsc::Receiver<WorkItem> = rx;

                    loop {
                        tokio::select! {
                            biased;

                            _ = token_clone.cancelled() => {
                                break; // Graceful shutdown
                            }
                            item = rx.recv() => {
                                match item {
                                    Some(work_item) => {
                                        tokio::spawn(work_item.work);
                                    }
                                    None => break, // Channel closed
                                }
                            }
                        }
                    }
                });

                // Dropping the runtime here abandons any still-pending
                // provider futures; shutdown does not wait for them.
                running_clone.store(false, Ordering::Release);
            })
            .expect("Failed to spawn executor thread");

        Self {
            tx,
            cancel_token,
            thread: Some(thread),
            running,
        }
    }

    /// Create executor with default settings.
    pub fn with_defaults() -> Self {
        Self::new(ExecutorConfig::default())
    }

    /// Submit fire-and-forget work.
    ///
    /// Never blocks the caller: uses a non-blocking send so OS callback
    /// threads cannot stall on a full queue.
    ///
    /// # Returns
    /// Err if the executor is shut down or the queue is full; the work is
    /// dropped in that case.
    pub fn submit<F>(&self, future: F) -> Result<(), ExecutorError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if !self.running.load(Ordering::Acquire) {
            return Err(ExecutorError::Shutdown);
        }

        match self.tx.try_send(WorkItem { work: future.boxed() }) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => Err(ExecutorError::QueueFull),
            Err(mpsc::error::TrySendError::Closed(_)) => Err(ExecutorError::Shutdown),
        }
    }

    /// Execute an async operation and block until complete or the deadline.
    ///
    /// Safe to call from OS callback threads: the wait is a plain oneshot
    /// channel receive, not a runtime `block_on`. On timeout the result is
    /// discarded, but work the future already spawned onto the executor
    /// runtime keeps running (this is how a timed-out listing fetch still
    /// warms the cache for the OS's retry).
    ///
    /// # Arguments
    /// * `future` - The async operation to execute
    /// * `timeout` - Maximum time to wait for completion
    pub fn block_on_timeout<F, T>(&self, future: F, timeout: Duration) -> Result<T, ExecutorError>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        if !self.running.load(Ordering::Acquire) {
            return Err(ExecutorError::Shutdown);
        }

        // Typed oneshot channel created per call.
        let (result_tx, result_rx) = oneshot::channel::<Result<T, ExecutorError>>();

        let work: BoxFuture<'static, ()> = async move {
            let result: Result<T, ExecutorError> =
                match tokio::time::timeout(timeout, future).await {
                    Ok(value) => Ok(value),
                    Err(_) => Err(ExecutorError::Timeout { duration: timeout }),
                };
            // Ignore send errors - caller may have dropped
            let _ = result_tx.send(result);
        }
        .boxed();

        if self.tx.blocking_send(WorkItem { work }).is_err() {
            return Err(ExecutorError::Shutdown);
        }

        match result_rx.blocking_recv() {
            Ok(result) => result,
            Err(_) => Err(ExecutorError::Shutdown),
        }
    }

    /// Signal shutdown to the executor loop.
    pub fn cancel_all(&self) {
        self.cancel_token.cancel();
    }

    /// Check if the executor is still running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

impl Drop for AsyncExecutor {
    fn drop(&mut self) {
        self.cancel_token.cancel();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}
