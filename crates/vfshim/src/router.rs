//! Dispatch router.
//!
//! Decides, per request, which registered backend answers for a path. The
//! registry is walked in priority order and the first backend that claims
//! the path wins:
//!
//! - a **mounted** backend claims every path it handles, including paths it
//!   does not contain (those fail with `ENOENT` instead of reaching the real
//!   filesystem);
//! - an **overlay** claims a path only once `try_exists` affirms it. An
//!   overlay that cannot decide is skipped.
//!
//! Content requests (whole-file reads, module resolution) also look at the
//! classification: a directory is never claimed, so the caller's own
//! directory handling runs.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::backend::{BackendPolicy, VfsBackend};
use crate::error::{VfsError, VfsResult};
use crate::registry::Registry;
use crate::types::{DirEntry, FileContent, ReadOptions, StatClassification, Stats};
use crate::watch::{ListenerId, StatListener, VfsWatcher, WatchFileOptions, WatchOptions};

/// Outcome of routing one request.
pub enum Claim<T> {
    /// No backend took the request; the caller falls through to the real
    /// filesystem.
    Unclaimed,
    /// `backend` answered. An `Err` outcome is final and must surface.
    Claimed {
        backend: Arc<dyn VfsBackend>,
        outcome: VfsResult<T>,
    },
}

impl<T: fmt::Debug> fmt::Debug for Claim<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Claim::Unclaimed => f.write_str("Unclaimed"),
            Claim::Claimed { backend, outcome } => f
                .debug_struct("Claimed")
                .field("backend", &backend.name())
                .field("outcome", outcome)
                .finish(),
        }
    }
}

impl<T> Claim<T> {
    /// Returns true if a backend answered.
    pub fn is_claimed(&self) -> bool {
        matches!(self, Claim::Claimed { .. })
    }

    /// The backend's answer, or `None` when unclaimed.
    pub fn into_outcome(self) -> Option<VfsResult<T>> {
        match self {
            Claim::Unclaimed => None,
            Claim::Claimed { outcome, .. } => Some(outcome),
        }
    }

    /// Map a successful outcome, keeping the claim.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Claim<U> {
        match self {
            Claim::Unclaimed => Claim::Unclaimed,
            Claim::Claimed { backend, outcome } => Claim::Claimed {
                backend,
                outcome: outcome.map(f),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Access {
    /// Metadata and listing: directories are fair game.
    Metadata,
    /// Content: only files are claimed.
    Content,
}

enum Selection {
    Backend(Arc<dyn VfsBackend>),
    Refused(Arc<dyn VfsBackend>, VfsError),
    Fallthrough,
}

fn display(path: &Path) -> String {
    path.display().to_string()
}

/// Routes requests over a [`Registry`].
#[derive(Clone)]
pub struct Router {
    registry: Arc<Registry>,
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router")
            .field("registry", &self.registry)
            .finish()
    }
}

impl Router {
    /// Create a router over `registry`.
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }

    /// The registry being routed over.
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    fn select(&self, path: &Path, access: Access, syscall: &'static str) -> Selection {
        for backend in self.registry.snapshot().iter() {
            if !backend.should_handle(path) {
                continue;
            }

            match backend.policy() {
                BackendPolicy::Mounted => {
                    if access == Access::Metadata {
                        return self.chose(backend, path, syscall);
                    }
                    return match backend.classify(path) {
                        StatClassification::File => self.chose(backend, path, syscall),
                        StatClassification::Directory => {
                            tracing::trace!(
                                backend = backend.name(),
                                path = %path.display(),
                                syscall,
                                "directory in mount, falling through"
                            );
                            Selection::Fallthrough
                        }
                        StatClassification::NotFound => {
                            tracing::trace!(
                                backend = backend.name(),
                                path = %path.display(),
                                syscall,
                                "missing in mount, refusing"
                            );
                            Selection::Refused(
                                Arc::clone(backend),
                                VfsError::not_found(syscall, display(path)),
                            )
                        }
                    };
                }
                BackendPolicy::Overlay => {
                    match backend.try_exists(path) {
                        Ok(true) => {}
                        Ok(false) => continue,
                        Err(e) => {
                            tracing::debug!(
                                backend = backend.name(),
                                path = %path.display(),
                                error = %e,
                                "overlay failed to decide, skipping"
                            );
                            continue;
                        }
                    }

                    if access == Access::Metadata {
                        return self.chose(backend, path, syscall);
                    }
                    match backend.classify(path) {
                        StatClassification::File => return self.chose(backend, path, syscall),
                        StatClassification::Directory => {
                            tracing::trace!(
                                backend = backend.name(),
                                path = %path.display(),
                                syscall,
                                "directory in overlay, falling through"
                            );
                            return Selection::Fallthrough;
                        }
                        StatClassification::NotFound => {
                            tracing::warn!(
                                backend = backend.name(),
                                path = %path.display(),
                                "overlay reports the path exists but classifies it as missing"
                            );
                        }
                    }
                }
            }
        }

        tracing::trace!(path = %path.display(), syscall, "unclaimed");
        Selection::Fallthrough
    }

    fn chose(&self, backend: &Arc<dyn VfsBackend>, path: &Path, syscall: &'static str) -> Selection {
        tracing::trace!(
            backend = backend.name(),
            policy = %backend.policy(),
            path = %path.display(),
            syscall,
            "claimed"
        );
        Selection::Backend(Arc::clone(backend))
    }

    fn dispatch<T>(
        &self,
        path: &Path,
        access: Access,
        syscall: &'static str,
        op: impl FnOnce(&dyn VfsBackend) -> VfsResult<T>,
    ) -> Claim<T> {
        match self.select(path, access, syscall) {
            Selection::Backend(backend) => {
                let outcome = op(backend.as_ref());
                Claim::Claimed { backend, outcome }
            }
            Selection::Refused(backend, err) => Claim::Claimed {
                backend,
                outcome: Err(err),
            },
            Selection::Fallthrough => Claim::Unclaimed,
        }
    }

    /// Existence check. A mount answers for every path it handles.
    pub fn exists(&self, path: &Path) -> Claim<bool> {
        self.dispatch(path, Access::Metadata, "access", |b| Ok(b.exists_sync(path)))
    }

    /// Classification, as reported by the module-stat hook.
    pub fn classify(&self, path: &Path) -> Claim<StatClassification> {
        self.dispatch(path, Access::Metadata, "stat", |b| Ok(b.classify(path)))
    }

    /// Whole-file read.
    pub fn read_file(&self, path: &Path, opts: &ReadOptions) -> Claim<FileContent> {
        self.dispatch(path, Access::Content, "open", |b| b.read_file_sync(path, opts))
    }

    pub fn realpath(&self, path: &Path) -> Claim<PathBuf> {
        self.dispatch(path, Access::Metadata, "realpath", |b| b.realpath_sync(path))
    }

    pub fn stat(&self, path: &Path) -> Claim<Stats> {
        self.dispatch(path, Access::Metadata, "stat", |b| b.stat_sync(path))
    }

    pub fn lstat(&self, path: &Path) -> Claim<Stats> {
        self.dispatch(path, Access::Metadata, "lstat", |b| b.lstat_sync(path))
    }

    pub fn readlink(&self, path: &Path) -> Claim<PathBuf> {
        self.dispatch(path, Access::Metadata, "readlink", |b| b.readlink_sync(path))
    }

    pub fn access(&self, path: &Path) -> Claim<()> {
        self.dispatch(path, Access::Metadata, "access", |b| b.access_sync(path))
    }

    pub fn readdir(&self, path: &Path) -> Claim<Vec<DirEntry>> {
        self.dispatch(path, Access::Metadata, "scandir", |b| b.readdir_sync(path))
    }

    pub fn watch(&self, path: &Path, opts: &WatchOptions) -> Claim<VfsWatcher> {
        self.dispatch(path, Access::Metadata, "watch", |b| b.watch(path, opts))
    }

    pub fn watch_file(
        &self,
        path: &Path,
        opts: &WatchFileOptions,
        listener: StatListener,
    ) -> Claim<ListenerId> {
        self.dispatch(path, Access::Metadata, "watch", |b| {
            b.watch_file(path, opts, listener)
        })
    }

    /// Drop stat listeners from every registered backend.
    ///
    /// Not routed: the watched path may no longer exist, and an overlay
    /// only claims paths that do. Listener ids are unique, so backends that
    /// never saw `listener` ignore it.
    pub fn unwatch_file(&self, path: &Path, listener: Option<ListenerId>) -> VfsResult<()> {
        for backend in self.registry.snapshot().iter() {
            backend.unwatch_file(path, listener)?;
        }
        Ok(())
    }

    /// Async listing. Selection is synchronous; only the chosen backend is
    /// awaited.
    pub async fn readdir_async(&self, path: &Path) -> Claim<Vec<DirEntry>> {
        match self.select(path, Access::Metadata, "scandir") {
            Selection::Backend(backend) => {
                let outcome = backend.readdir(path).await;
                Claim::Claimed { backend, outcome }
            }
            Selection::Refused(backend, err) => Claim::Claimed {
                backend,
                outcome: Err(err),
            },
            Selection::Fallthrough => Claim::Unclaimed,
        }
    }

    /// Async lstat. Same selection rules as [`readdir_async`](Self::readdir_async).
    pub async fn lstat_async(&self, path: &Path) -> Claim<Stats> {
        match self.select(path, Access::Metadata, "lstat") {
            Selection::Backend(backend) => {
                let outcome = backend.lstat(path).await;
                Claim::Claimed { backend, outcome }
            }
            Selection::Refused(backend, err) => Claim::Claimed {
                backend,
                outcome: Err(err),
            },
            Selection::Fallthrough => Claim::Unclaimed,
        }
    }
}
