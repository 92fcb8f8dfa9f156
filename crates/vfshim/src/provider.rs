//! The process filesystem surface.
//!
//! [`FilesystemProvider`] is the set of primitives callers (and module
//! loaders) use to touch the filesystem. [`crate::native::NativeFs`] is the
//! real implementation; [`RoutingProvider`] wraps a captured provider and
//! gives registered backends the first chance to answer.
//!
//! Inputs are `&str` because callers pass whatever they were given: plain
//! paths, relative paths or `file:` URLs.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{VfsError, VfsResult};
use crate::path;
use crate::router::{Claim, Router};
use crate::types::{DirEntry, FileContent, ReadOptions, StatClassification, Stats};
use crate::watch::{ListenerId, StatListener, VfsWatcher, WatchFileOptions, WatchOptions};

/// Filesystem primitives, sync and async.
#[async_trait]
pub trait FilesystemProvider: Send + Sync {
    fn exists(&self, path: &str) -> bool;

    /// Existence check with a native error on failure.
    fn access(&self, path: &str) -> VfsResult<()>;

    fn read_file(&self, path: &str, opts: &ReadOptions) -> VfsResult<FileContent>;

    fn realpath(&self, path: &str) -> VfsResult<PathBuf>;

    fn readlink(&self, path: &str) -> VfsResult<PathBuf>;

    fn stat(&self, path: &str) -> VfsResult<Stats>;

    fn lstat(&self, path: &str) -> VfsResult<Stats>;

    fn readdir(&self, path: &str) -> VfsResult<Vec<DirEntry>>;

    /// Module-loader stat: never fails, reports the classification.
    fn module_stat(&self, path: &str) -> StatClassification;

    fn watch(&self, path: &str, opts: &WatchOptions) -> VfsResult<VfsWatcher>;

    fn watch_file(
        &self,
        path: &str,
        opts: &WatchFileOptions,
        listener: StatListener,
    ) -> VfsResult<ListenerId>;

    fn unwatch_file(&self, path: &str, listener: Option<ListenerId>) -> VfsResult<()>;

    /// Current working directory.
    fn cwd(&self) -> VfsResult<PathBuf>;

    /// Change the working directory.
    fn chdir(&self, path: &str) -> VfsResult<()>;

    async fn access_async(&self, path: &str) -> VfsResult<()>;

    async fn read_file_async(&self, path: &str, opts: &ReadOptions) -> VfsResult<FileContent>;

    async fn stat_async(&self, path: &str) -> VfsResult<Stats>;

    async fn lstat_async(&self, path: &str) -> VfsResult<Stats>;

    async fn readdir_async(&self, path: &str) -> VfsResult<Vec<DirEntry>>;

    async fn readlink_async(&self, path: &str) -> VfsResult<PathBuf>;

    async fn realpath_async(&self, path: &str) -> VfsResult<PathBuf>;
}

/// Provider that routes through registered backends before falling back to
/// the captured originals.
///
/// Input that cannot be normalized, and input no backend claims, goes to
/// the originals untouched so native error messages stay native.
///
/// With a virtual working directory enabled, `chdir` into a backend
/// directory is kept here instead of changing the process directory, and
/// relative paths routed to backends resolve against it.
pub struct RoutingProvider {
    router: Router,
    originals: Arc<dyn FilesystemProvider>,
    virtual_cwd_enabled: bool,
    virtual_cwd: RwLock<Option<PathBuf>>,
}

impl std::fmt::Debug for RoutingProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoutingProvider")
            .field("router", &self.router)
            .field("virtual_cwd", &*self.virtual_cwd.read())
            .finish_non_exhaustive()
    }
}

impl RoutingProvider {
    /// Wrap `originals`.
    pub fn new(router: Router, originals: Arc<dyn FilesystemProvider>) -> Self {
        Self {
            router,
            originals,
            virtual_cwd_enabled: false,
            virtual_cwd: RwLock::new(None),
        }
    }

    /// Enable or disable the virtual working directory.
    pub fn with_virtual_cwd(mut self, enabled: bool) -> Self {
        self.virtual_cwd_enabled = enabled;
        self
    }

    /// The router in front of the originals.
    pub fn router(&self) -> &Router {
        &self.router
    }

    /// The captured originals.
    pub fn originals(&self) -> &Arc<dyn FilesystemProvider> {
        &self.originals
    }

    /// The virtual working directory, if one is set.
    pub fn virtual_cwd(&self) -> Option<PathBuf> {
        self.virtual_cwd.read().clone()
    }

    fn normalize(&self, input: &str) -> VfsResult<PathBuf> {
        match self.virtual_cwd.read().as_deref() {
            Some(cwd) => path::normalize_from(input, cwd),
            None => path::normalize(input),
        }
    }

    /// Route `input` through `op`; `None` means fall through.
    fn route<T>(&self, input: &str, op: impl FnOnce(&Router, &Path) -> Claim<T>) -> Option<VfsResult<T>> {
        let normalized = self.normalize(input).ok()?;
        op(&self.router, &normalized).into_outcome()
    }
}

#[async_trait]
impl FilesystemProvider for RoutingProvider {
    fn exists(&self, path: &str) -> bool {
        match self.route(path, |r, p| r.exists(p)) {
            Some(outcome) => outcome.unwrap_or(false),
            None => self.originals.exists(path),
        }
    }

    fn access(&self, path: &str) -> VfsResult<()> {
        match self.route(path, |r, p| r.access(p)) {
            Some(outcome) => outcome,
            None => self.originals.access(path),
        }
    }

    fn read_file(&self, path: &str, opts: &ReadOptions) -> VfsResult<FileContent> {
        match self.route(path, |r, p| r.read_file(p, opts)) {
            Some(outcome) => outcome,
            None => self.originals.read_file(path, opts),
        }
    }

    fn realpath(&self, path: &str) -> VfsResult<PathBuf> {
        match self.route(path, |r, p| r.realpath(p)) {
            Some(outcome) => outcome,
            None => self.originals.realpath(path),
        }
    }

    fn readlink(&self, path: &str) -> VfsResult<PathBuf> {
        match self.route(path, |r, p| r.readlink(p)) {
            Some(outcome) => outcome,
            None => self.originals.readlink(path),
        }
    }

    fn stat(&self, path: &str) -> VfsResult<Stats> {
        match self.route(path, |r, p| r.stat(p)) {
            Some(outcome) => outcome,
            None => self.originals.stat(path),
        }
    }

    fn lstat(&self, path: &str) -> VfsResult<Stats> {
        match self.route(path, |r, p| r.lstat(p)) {
            Some(outcome) => outcome,
            None => self.originals.lstat(path),
        }
    }

    fn readdir(&self, path: &str) -> VfsResult<Vec<DirEntry>> {
        match self.route(path, |r, p| r.readdir(p)) {
            Some(outcome) => outcome,
            None => self.originals.readdir(path),
        }
    }

    fn module_stat(&self, path: &str) -> StatClassification {
        match self.route(path, |r, p| r.classify(p)) {
            Some(outcome) => outcome.unwrap_or(StatClassification::NotFound),
            None => self.originals.module_stat(path),
        }
    }

    fn watch(&self, path: &str, opts: &WatchOptions) -> VfsResult<VfsWatcher> {
        match self.route(path, |r, p| r.watch(p, opts)) {
            Some(outcome) => outcome,
            None => self.originals.watch(path, opts),
        }
    }

    fn watch_file(
        &self,
        path: &str,
        opts: &WatchFileOptions,
        listener: StatListener,
    ) -> VfsResult<ListenerId> {
        // The listener moves into whichever side ends up answering.
        let Ok(normalized) = self.normalize(path) else {
            return self.originals.watch_file(path, opts, listener);
        };
        let fallback = Arc::clone(&listener);
        match self.router.watch_file(&normalized, opts, listener).into_outcome() {
            Some(outcome) => outcome,
            None => self.originals.watch_file(path, opts, fallback),
        }
    }

    fn unwatch_file(&self, path: &str, listener: Option<ListenerId>) -> VfsResult<()> {
        if let Ok(normalized) = self.normalize(path) {
            self.router.unwatch_file(&normalized, listener)?;
        }
        self.originals.unwatch_file(path, listener)
    }

    fn cwd(&self) -> VfsResult<PathBuf> {
        match self.virtual_cwd() {
            Some(cwd) => Ok(cwd),
            None => self.originals.cwd(),
        }
    }

    fn chdir(&self, path: &str) -> VfsResult<()> {
        if !self.virtual_cwd_enabled {
            return self.originals.chdir(path);
        }
        let Ok(target) = self.normalize(path) else {
            return self.originals.chdir(path);
        };

        match self.router.stat(&target).into_outcome() {
            Some(outcome) => {
                if !outcome?.is_dir() {
                    return Err(VfsError::not_a_directory("chdir", path));
                }
                tracing::debug!(cwd = %target.display(), "virtual chdir");
                *self.virtual_cwd.write() = Some(target);
                Ok(())
            }
            None => {
                self.originals.chdir(&target.to_string_lossy())?;
                *self.virtual_cwd.write() = None;
                Ok(())
            }
        }
    }

    async fn access_async(&self, path: &str) -> VfsResult<()> {
        match self.route(path, |r, p| r.access(p)) {
            Some(outcome) => outcome,
            None => self.originals.access_async(path).await,
        }
    }

    async fn read_file_async(&self, path: &str, opts: &ReadOptions) -> VfsResult<FileContent> {
        match self.route(path, |r, p| r.read_file(p, opts)) {
            Some(outcome) => outcome,
            None => self.originals.read_file_async(path, opts).await,
        }
    }

    async fn stat_async(&self, path: &str) -> VfsResult<Stats> {
        match self.route(path, |r, p| r.stat(p)) {
            Some(outcome) => outcome,
            None => self.originals.stat_async(path).await,
        }
    }

    async fn lstat_async(&self, path: &str) -> VfsResult<Stats> {
        if let Ok(normalized) = self.normalize(path) {
            if let Some(outcome) = self.router.lstat_async(&normalized).await.into_outcome() {
                return outcome;
            }
        }
        self.originals.lstat_async(path).await
    }

    async fn readdir_async(&self, path: &str) -> VfsResult<Vec<DirEntry>> {
        if let Ok(normalized) = self.normalize(path) {
            if let Some(outcome) = self.router.readdir_async(&normalized).await.into_outcome() {
                return outcome;
            }
        }
        self.originals.readdir_async(path).await
    }

    async fn readlink_async(&self, path: &str) -> VfsResult<PathBuf> {
        match self.route(path, |r, p| r.readlink(p)) {
            Some(outcome) => outcome,
            None => self.originals.readlink_async(path).await,
        }
    }

    async fn realpath_async(&self, path: &str) -> VfsResult<PathBuf> {
        match self.route(path, |r, p| r.realpath(p)) {
            Some(outcome) => outcome,
            None => self.originals.realpath_async(path).await,
        }
    }
}
