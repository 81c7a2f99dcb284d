//! On-demand filesystem virtualization engine.
//!
//! Projects a virtual directory tree whose content lives in three places: a
//! local content-addressed object store, an in-memory content cache, and an
//! external asynchronous data provider reached over an embedding boundary.
//! The OS virtualization layer (a native binding around ProjFS or similar)
//! drives the engine through synchronous callbacks; the engine answers from
//! local state and falls back to asynchronous fetches with "not found,
//! retry" semantics.
//!
//! # Architecture
//!
//! ```text
//!            OS virtualization layer (external binding)
//!     placeholder │ file data │ enumeration │ notifications
//!                 ▼           ▼           ▼
//!          ┌─────────────────────────────────────┐
//!          │            VirtProvider             │
//!          │  ┌───────────┐      ┌────────────┐  │
//!          │  │ObjectStore│      │SessionTable│  │
//!          │  └───────────┘      └────────────┘  │
//!          │  ┌────────────┐     ┌────────────┐  │
//!          │  │ContentCache│◄────│AsyncBridge │  │
//!          │  └────────────┘     └─────┬──────┘  │
//!          └───────────────────────────┼─────────┘
//!                                      ▼
//!                         AsyncExecutor (dedicated runtime)
//!                                      ▼
//!                         DataProvider (host, async)
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//! use projected_vfs::{DataProvider, ProviderOptions, VirtProvider};
//!
//! struct MyProvider;
//!
//! #[async_trait::async_trait]
//! impl DataProvider for MyProvider {}
//!
//! # fn main() -> Result<(), projected_vfs::ProviderError> {
//! let provider = VirtProvider::new(
//!     Path::new("/var/lib/my-instance"),
//!     "/mnt/virtual",
//!     Arc::new(MyProvider),
//!     ProviderOptions::default(),
//! )?;
//! provider.start()?;
//! # Ok(())
//! # }
//! ```

pub mod bridge;
pub mod cache;
pub mod enumeration;
pub mod error;
pub mod executor;
pub mod options;
pub mod path;
pub mod provider;
pub mod stats;
pub mod store;

pub use bridge::{AsyncBridge, DataProvider, DebugSink, WriteIntent};
pub use cache::{ContentCache, DirectoryListing, FileContent, FileInfo};
pub use enumeration::{BasicFileInfo, DirEntrySink, SessionId, SessionTable};
pub use error::{CallbackError, ProviderError};
pub use executor::{AsyncExecutor, ExecutorConfig, ExecutorError};
pub use options::ProviderOptions;
pub use path::{VirtualPath, ROOT_VIRTUAL_DIRS};
pub use provider::{NotificationKind, VirtProvider};
pub use stats::{ProviderStats, StatsSnapshot};
pub use store::{ObjectMetadata, ObjectStore, ObjectType};
