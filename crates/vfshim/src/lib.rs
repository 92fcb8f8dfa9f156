//! Virtual filesystem interposition.
//!
//! Lets a runtime serve files, directory listings and metadata from
//! pluggable virtual backends, either instead of or layered over the real
//! filesystem, while keeping native error codes and sync/async pairing.
//! Key components:
//!
//! - [`VfsBackend`] - Contract a virtual filesystem implements
//! - [`Registry`] - Ordered set of registered backends
//! - [`Router`] - Picks the backend that answers for a path
//! - [`FilesystemProvider`] - The filesystem surface callers use
//! - [`Interceptor`] - Captures the native provider and installs routing
//! - [`loader`] - Module stat and resolve/load hooks
//!
//! ## Dispatch policy
//!
//! - **Mounted** backends own their subtree. A path under the mount that
//!   the backend does not have is `ENOENT`; the real filesystem is never
//!   consulted.
//! - **Overlay** backends answer only for paths they contain. Everything
//!   else, including paths an overlay fails to decide on, falls through.
//! - **First match wins**, in registration order.
//! - **Directories fall through for content requests** so the caller's own
//!   directory handling (index files, package manifests) still runs.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use vfshim::{MemoryBackend, ReadOptions, interceptor};
//!
//! let backend = MemoryBackend::mounted("/virtual").with_file("/virtual/a.js", "1");
//! interceptor::register_backend(Arc::new(backend));
//!
//! let content = interceptor::fs().read_file("/virtual/a.js", &ReadOptions::default());
//! assert!(content.is_ok());
//! ```

pub mod backends;
pub mod config;
pub mod error;
pub mod interceptor;
pub mod loader;
pub mod native;
pub mod path;
pub mod provider;

mod backend;
mod registry;
mod router;
mod types;
mod watch;

pub use backend::{BackendPolicy, VfsBackend};
pub use backends::MemoryBackend;
pub use config::{ConfigError, LoaderConfig, VfsConfig, WatchConfig};
pub use error::{VfsError, VfsResult};
pub use interceptor::Interceptor;
pub use native::NativeFs;
pub use provider::{FilesystemProvider, RoutingProvider};
pub use registry::{Registry, Snapshot};
pub use router::{Claim, Router};
pub use types::{
    DirEntry, Encoding, FileContent, FileType, ReadOptions, StatClassification, Stats,
};
pub use watch::{
    DEFAULT_POLL_INTERVAL, ListenerId, StatListener, VfsWatcher, WatchEvent, WatchEventKind,
    WatchFileOptions, WatchOptions, WatchSender,
};
