//! Bundled backends.
//!
//! Backends implement [`VfsBackend`](crate::VfsBackend). Real deployments
//! bring their own; the in-memory one serves tests and small embedded trees.

mod memory;

pub use memory::{MAX_SYMLINK_DEPTH, MemoryBackend};
