//! Backend contract.
//!
//! A backend is a virtual filesystem instance the router can hand requests
//! to. Backends are built and owned by the caller; the layer only holds
//! `Arc`s to them while they are registered.
//!
//! Every path a backend receives is a canonical absolute path (see
//! [`crate::path::normalize`]), never a URL or a relative path.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use strum::{Display, EnumString};

use crate::error::{VfsError, VfsResult};
use crate::types::{DirEntry, FileContent, ReadOptions, StatClassification, Stats};
use crate::watch::{ListenerId, StatListener, VfsWatcher, WatchFileOptions, WatchOptions};

/// How a backend relates to the real filesystem beneath it.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum BackendPolicy {
    /// Owns its subtree outright. Paths it handles never reach the real
    /// filesystem, even when the backend says they do not exist.
    Mounted,
    /// Shadows the real filesystem only for paths it actually contains.
    Overlay,
}

/// Virtual filesystem backend.
///
/// The synchronous primitives are mandatory. Async and watch primitives
/// have defaults so simple backends only implement what they store.
#[async_trait]
pub trait VfsBackend: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str {
        "vfs"
    }

    /// Dispatch policy. Must not change while registered.
    fn policy(&self) -> BackendPolicy;

    /// Whether this backend is willing to answer for `path` at all.
    ///
    /// For a mounted backend this is "is `path` under my mount point". An
    /// overlay may answer true more broadly; the router still checks
    /// [`try_exists`](Self::try_exists) before committing to it.
    fn should_handle(&self, path: &Path) -> bool;

    /// What is at `path`.
    fn classify(&self, path: &Path) -> StatClassification;

    /// Whole-file read. Fails with `ReadFailure` when `classify` said
    /// `File` but the bytes cannot be produced.
    fn read_file_sync(&self, path: &Path, opts: &ReadOptions) -> VfsResult<FileContent>;

    /// Resolve symlinks within the backend.
    fn realpath_sync(&self, path: &Path) -> VfsResult<std::path::PathBuf>;

    /// Stat, following symlinks.
    fn stat_sync(&self, path: &Path) -> VfsResult<Stats>;

    /// Stat without following a final symlink.
    fn lstat_sync(&self, path: &Path) -> VfsResult<Stats>;

    /// List a directory.
    fn readdir_sync(&self, path: &Path) -> VfsResult<Vec<DirEntry>>;

    // ========================================================================
    // Provided
    // ========================================================================

    /// Existence check. Agrees with `classify` unless overridden, and an
    /// override must keep agreeing with it.
    fn exists_sync(&self, path: &Path) -> bool {
        self.classify(path).exists()
    }

    /// Target of the symlink at `path`.
    ///
    /// Backends without links report `EINVAL` for anything that exists.
    fn readlink_sync(&self, path: &Path) -> VfsResult<std::path::PathBuf> {
        if self.exists_sync(path) {
            Err(VfsError::invalid_argument("readlink", path.display().to_string()))
        } else {
            Err(VfsError::not_found("readlink", path.display().to_string()))
        }
    }

    /// Accessibility check. Virtual entries carry no permissions, so this
    /// is an existence check.
    fn access_sync(&self, path: &Path) -> VfsResult<()> {
        if self.exists_sync(path) {
            Ok(())
        } else {
            Err(VfsError::not_found("access", path.display().to_string()))
        }
    }

    /// Existence check that may fail.
    ///
    /// The router calls this when deciding whether an overlay claims a
    /// path; an `Err` means "could not decide" and the overlay is skipped.
    fn try_exists(&self, path: &Path) -> VfsResult<bool> {
        Ok(self.exists_sync(path))
    }

    /// Async directory listing.
    async fn readdir(&self, path: &Path) -> VfsResult<Vec<DirEntry>> {
        self.readdir_sync(path)
    }

    /// Async lstat.
    async fn lstat(&self, path: &Path) -> VfsResult<Stats> {
        self.lstat_sync(path)
    }

    /// Watch `path` for changes.
    fn watch(&self, path: &Path, _opts: &WatchOptions) -> VfsResult<VfsWatcher> {
        Err(VfsError::unsupported("watch", path.display().to_string()))
    }

    /// Poll `path`'s stats and call `listener` when they change.
    fn watch_file(
        &self,
        path: &Path,
        _opts: &WatchFileOptions,
        _listener: StatListener,
    ) -> VfsResult<ListenerId> {
        Err(VfsError::unsupported("watch", path.display().to_string()))
    }

    /// Drop one listener, or every listener on `path` when `None`.
    fn unwatch_file(&self, _path: &Path, _listener: Option<ListenerId>) -> VfsResult<()> {
        Ok(())
    }
}
