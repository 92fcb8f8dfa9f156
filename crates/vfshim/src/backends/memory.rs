//! In-memory filesystem backend.
//!
//! Used as a fixture and as the reference backend. All data is ephemeral.
//!
//! Entries are stored under their path *inside* the backend, rooted at `/`.
//! A backend mounted at `/virt` stores `/virt/lib/a.js` as `/lib/a.js`, and
//! an absolute symlink target such as `/lib/a.js` is read the same way,
//! relative to the mount point.

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::ffi::OsString;
use std::path::{Component, Path, PathBuf};

use crate::backend::{BackendPolicy, VfsBackend};
use crate::error::{VfsError, VfsResult};
use crate::path;
use crate::types::{DirEntry, FileContent, FileType, ReadOptions, StatClassification, Stats};
use crate::watch::{
    ListenerId, StatListener, VfsWatcher, WatchEvent, WatchEventKind, WatchFileOptions,
    WatchOptions, WatchSender,
};

/// Symlink hops allowed before giving up with ELOOP.
pub const MAX_SYMLINK_DEPTH: usize = 40;

/// Entry in the memory filesystem.
#[derive(Debug, Clone)]
enum Entry {
    File { data: Vec<u8>, stats: Stats },
    Directory { stats: Stats },
    Symlink { target: PathBuf, stats: Stats },
}

impl Entry {
    fn stats(&self) -> &Stats {
        match self {
            Entry::File { stats, .. } => stats,
            Entry::Directory { stats } => stats,
            Entry::Symlink { stats, .. } => stats,
        }
    }

    fn kind(&self) -> FileType {
        self.stats().kind
    }
}

struct Subscription {
    path: PathBuf,
    recursive: bool,
    tx: WatchSender,
}

/// In-memory filesystem backend.
///
/// Thread-safe via internal locks. All data is lost when dropped.
pub struct MemoryBackend {
    name: String,
    policy: BackendPolicy,
    mount_point: PathBuf,
    entries: RwLock<HashMap<PathBuf, Entry>>,
    subscriptions: Mutex<Vec<Subscription>>,
    stat_listeners: DashMap<PathBuf, Vec<(ListenerId, StatListener)>>,
}

impl std::fmt::Debug for MemoryBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryBackend")
            .field("name", &self.name)
            .field("policy", &self.policy)
            .field("mount_point", &self.mount_point)
            .field("entries", &self.entries.read().len())
            .finish_non_exhaustive()
    }
}

impl MemoryBackend {
    fn new(policy: BackendPolicy, mount_point: impl AsRef<Path>) -> Self {
        let raw = mount_point.as_ref().to_string_lossy();
        let mount_point =
            path::normalize_from(&raw, Path::new("/")).unwrap_or_else(|_| PathBuf::from("/"));

        let mut entries = HashMap::new();
        // Root directory always exists
        entries.insert(
            PathBuf::from("/"),
            Entry::Directory {
                stats: Stats::directory(0o755),
            },
        );
        Self {
            name: "memory".to_string(),
            policy,
            mount_point,
            entries: RwLock::new(entries),
            subscriptions: Mutex::new(Vec::new()),
            stat_listeners: DashMap::new(),
        }
    }

    /// Backend that owns everything under `mount_point`.
    pub fn mounted(mount_point: impl AsRef<Path>) -> Self {
        Self::new(BackendPolicy::Mounted, mount_point)
    }

    /// Overlay over the whole filesystem.
    pub fn overlay() -> Self {
        Self::new(BackendPolicy::Overlay, "/")
    }

    /// Overlay limited to paths under `mount_point`.
    pub fn overlay_at(mount_point: impl AsRef<Path>) -> Self {
        Self::new(BackendPolicy::Overlay, mount_point)
    }

    /// Set the name used in logs.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn mount_point(&self) -> &Path {
        &self.mount_point
    }

    /// Builder form of [`write_file`](Self::write_file).
    pub fn with_file(self, path: impl AsRef<Path>, content: impl Into<Vec<u8>>) -> Self {
        if let Err(e) = self.write_file(&path, content) {
            tracing::warn!(path = %path.as_ref().display(), error = %e, "memory backend: skipped file");
        }
        self
    }

    /// Builder form of [`mkdir`](Self::mkdir).
    pub fn with_directory(self, path: impl AsRef<Path>) -> Self {
        if let Err(e) = self.mkdir(&path) {
            tracing::warn!(path = %path.as_ref().display(), error = %e, "memory backend: skipped directory");
        }
        self
    }

    /// Builder form of [`symlink`](Self::symlink).
    pub fn with_symlink(self, path: impl AsRef<Path>, target: impl AsRef<Path>) -> Self {
        if let Err(e) = self.symlink(&path, target) {
            tracing::warn!(path = %path.as_ref().display(), error = %e, "memory backend: skipped symlink");
        }
        self
    }

    // ========================================================================
    // Paths
    // ========================================================================

    /// Internal path for an external one, if it lies under the mount.
    fn internal(&self, path: &Path) -> Option<PathBuf> {
        path::relative_to_mount(path, &self.mount_point)
    }

    fn external(&self, internal: &Path) -> PathBuf {
        path::join_mount_path(&self.mount_point, internal)
    }

    /// Internal path for caller input to the mutation API.
    fn internal_for_write(&self, path: &Path, syscall: &'static str) -> VfsResult<PathBuf> {
        let raw = path.to_string_lossy();
        let normalized = path::normalize_from(&raw, &self.mount_point)?;
        self.internal(&normalized)
            .ok_or_else(|| VfsError::invalid_argument(syscall, raw.into_owned()))
    }

    /// Path segments as a stack: the first segment is popped first.
    fn segments_reversed(path: &Path) -> Vec<OsString> {
        let mut segments: Vec<OsString> = path
            .components()
            .filter_map(|c| match c {
                Component::Normal(s) => Some(s.to_os_string()),
                Component::ParentDir => Some(OsString::from("..")),
                _ => None,
            })
            .collect();
        segments.reverse();
        segments
    }

    /// Follow symlinks along `internal`.
    ///
    /// Intermediate symlinks are always followed, the last component only
    /// when `follow_last` is set. The result may name a missing entry.
    fn resolve(
        entries: &HashMap<PathBuf, Entry>,
        internal: &Path,
        follow_last: bool,
        syscall: &'static str,
        display: &Path,
    ) -> VfsResult<PathBuf> {
        let mut pending = Self::segments_reversed(internal);

        let mut current = PathBuf::from("/");
        let mut hops = 0;

        while let Some(component) = pending.pop() {
            if component == ".." {
                current.pop();
                continue;
            }

            let candidate = current.join(&component);
            let is_last = pending.is_empty();
            match entries.get(&candidate) {
                Some(Entry::Symlink { target, .. }) if !is_last || follow_last => {
                    hops += 1;
                    if hops > MAX_SYMLINK_DEPTH {
                        return Err(VfsError::symlink_loop(syscall, display.display().to_string()));
                    }
                    if target.has_root() {
                        current = PathBuf::from("/");
                    }
                    pending.extend(Self::segments_reversed(target));
                }
                Some(Entry::File { .. }) if !is_last => {
                    return Err(VfsError::not_a_directory(syscall, display.display().to_string()));
                }
                _ => current = candidate,
            }
        }

        Ok(current)
    }

    /// Resolve external `path` and run `f` on the entry it lands on.
    fn with_entry<T>(
        &self,
        path: &Path,
        follow_last: bool,
        syscall: &'static str,
        f: impl FnOnce(&Path, Option<&Entry>) -> VfsResult<T>,
    ) -> VfsResult<T> {
        let Some(internal) = self.internal(path) else {
            return Err(VfsError::not_found(syscall, path.display().to_string()));
        };
        let entries = self.entries.read();
        let resolved = Self::resolve(&entries, &internal, follow_last, syscall, path)?;
        f(&resolved, entries.get(&resolved))
    }

    // ========================================================================
    // Mutation
    // ========================================================================

    /// Create parents of `internal` as directories.
    fn ensure_parents(
        entries: &mut HashMap<PathBuf, Entry>,
        internal: &Path,
        syscall: &'static str,
    ) -> VfsResult<()> {
        let mut current = PathBuf::from("/");
        for component in internal.parent().into_iter().flat_map(|p| p.components()) {
            if let Component::Normal(s) = component {
                current.push(s);
                match entries.get(&current) {
                    Some(Entry::Directory { .. }) => {}
                    Some(_) => {
                        return Err(VfsError::not_a_directory(
                            syscall,
                            current.display().to_string(),
                        ));
                    }
                    None => {
                        entries.insert(
                            current.clone(),
                            Entry::Directory {
                                stats: Stats::directory(0o755),
                            },
                        );
                    }
                }
            }
        }
        Ok(())
    }

    /// Store the entry built by `make` at `path`, creating parents, then
    /// tell watchers and stat listeners.
    fn insert(
        &self,
        path: &Path,
        syscall: &'static str,
        make: impl FnOnce(Option<&Entry>) -> VfsResult<Entry>,
    ) -> VfsResult<()> {
        let internal = self.internal_for_write(path, syscall)?;
        let (previous, current) = {
            let mut entries = self.entries.write();
            Self::ensure_parents(&mut entries, &internal, syscall)?;
            let previous = entries.get(&internal).cloned();
            let entry = make(previous.as_ref())?;
            let current = entry.stats().clone();
            entries.insert(internal.clone(), entry);
            (previous, current)
        };

        let kind = if previous.is_some() {
            WatchEventKind::Change
        } else {
            WatchEventKind::Rename
        };
        self.notify(&internal, kind);
        let prev_stats = previous.map(|e| e.stats().clone()).unwrap_or_else(Stats::absent);
        self.notify_stat(&internal, &current, &prev_stats);
        Ok(())
    }

    /// Create or replace a file. Missing parents are created.
    pub fn write_file(&self, path: impl AsRef<Path>, content: impl Into<Vec<u8>>) -> VfsResult<()> {
        let path = path.as_ref();
        let data = content.into();
        self.insert(path, "open", |previous| match previous {
            Some(Entry::Directory { .. }) => {
                Err(VfsError::is_a_directory("open", path.display().to_string()))
            }
            Some(Entry::File { stats, .. }) => {
                let stats = Stats::file(data.len() as u64, stats.mode);
                Ok(Entry::File { data, stats })
            }
            _ => {
                let stats = Stats::file(data.len() as u64, 0o644);
                Ok(Entry::File { data, stats })
            }
        })
    }

    /// Create a directory and any missing parents. Existing directories
    /// are left alone.
    pub fn mkdir(&self, path: impl AsRef<Path>) -> VfsResult<()> {
        let path = path.as_ref();
        let internal = self.internal_for_write(path, "mkdir")?;
        if matches!(self.entries.read().get(&internal), Some(Entry::Directory { .. })) {
            return Ok(());
        }
        self.insert(path, "mkdir", |previous| match previous {
            None => Ok(Entry::Directory {
                stats: Stats::directory(0o755),
            }),
            Some(_) => Err(VfsError::Io {
                syscall: "mkdir",
                path: path.display().to_string(),
                source: std::io::Error::from(std::io::ErrorKind::AlreadyExists),
            }),
        })
    }

    /// Create a symlink at `path` pointing to `target`.
    ///
    /// Absolute targets are paths inside this backend; relative targets
    /// resolve against the link's parent directory.
    pub fn symlink(&self, path: impl AsRef<Path>, target: impl AsRef<Path>) -> VfsResult<()> {
        let path = path.as_ref();
        let target = target.as_ref().to_path_buf();
        self.insert(path, "symlink", |previous| match previous {
            None => Ok(Entry::Symlink {
                stats: Stats::symlink(target.as_os_str().len() as u64),
                target,
            }),
            Some(_) => Err(VfsError::Io {
                syscall: "symlink",
                path: path.display().to_string(),
                source: std::io::Error::from(std::io::ErrorKind::AlreadyExists),
            }),
        })
    }

    /// Remove `path` and everything beneath it.
    pub fn remove(&self, path: impl AsRef<Path>) -> VfsResult<()> {
        let path = path.as_ref();
        let internal = self.internal_for_write(path, "rm")?;
        if internal == Path::new("/") {
            return Err(VfsError::invalid_argument("rm", path.display().to_string()));
        }

        let previous = {
            let mut entries = self.entries.write();
            let Some(previous) = entries.remove(&internal) else {
                return Err(VfsError::not_found("rm", path.display().to_string()));
            };
            entries.retain(|p, _| !p.starts_with(&internal));
            previous
        };

        self.notify(&internal, WatchEventKind::Rename);
        self.notify_stat(&internal, &Stats::absent(), previous.stats());
        Ok(())
    }

    /// Target of the symlink at `path`.
    pub fn readlink(&self, path: &Path) -> VfsResult<PathBuf> {
        self.with_entry(path, false, "readlink", |_, entry| match entry {
            Some(Entry::Symlink { target, .. }) => Ok(target.clone()),
            Some(_) => Err(VfsError::invalid_argument("readlink", path.display().to_string())),
            None => Err(VfsError::not_found("readlink", path.display().to_string())),
        })
    }

    // ========================================================================
    // Notification
    // ========================================================================

    fn notify(&self, internal: &Path, kind: WatchEventKind) {
        let mut subs = self.subscriptions.lock();
        subs.retain(|sub| {
            let filename = if internal == sub.path {
                internal.file_name().map(|n| n.to_string_lossy().into_owned())
            } else if internal.parent() == Some(sub.path.as_path())
                || (sub.recursive && internal.starts_with(&sub.path))
            {
                internal
                    .strip_prefix(&sub.path)
                    .ok()
                    .map(|rel| rel.to_string_lossy().into_owned())
            } else {
                return !sub.tx.is_closed();
            };
            sub.tx.send(WatchEvent { kind, filename }).is_ok()
        });
    }

    fn notify_stat(&self, internal: &Path, current: &Stats, previous: &Stats) {
        let listeners: Vec<StatListener> = match self.stat_listeners.get(internal) {
            Some(entry) => entry.value().iter().map(|(_, l)| l.clone()).collect(),
            None => return,
        };
        for listener in listeners {
            listener(current, previous);
        }
    }
}

impl VfsBackend for MemoryBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn policy(&self) -> BackendPolicy {
        self.policy
    }

    fn should_handle(&self, path: &Path) -> bool {
        match self.policy {
            BackendPolicy::Mounted => path::is_under_mount_point(path, &self.mount_point),
            BackendPolicy::Overlay => {
                path::is_under_mount_point(path, &self.mount_point) && self.exists_sync(path)
            }
        }
    }

    fn classify(&self, path: &Path) -> StatClassification {
        self.with_entry(path, true, "stat", |_, entry| {
            Ok(match entry {
                Some(Entry::File { .. }) => StatClassification::File,
                Some(Entry::Directory { .. }) => StatClassification::Directory,
                _ => StatClassification::NotFound,
            })
        })
        .unwrap_or(StatClassification::NotFound)
    }

    fn read_file_sync(&self, path: &Path, opts: &ReadOptions) -> VfsResult<FileContent> {
        self.with_entry(path, true, "open", |_, entry| match entry {
            Some(Entry::File { data, .. }) => Ok(FileContent::from_bytes(data.clone(), opts)),
            Some(Entry::Directory { .. }) => {
                Err(VfsError::is_a_directory("read", path.display().to_string()))
            }
            _ => Err(VfsError::not_found("open", path.display().to_string())),
        })
    }

    fn realpath_sync(&self, path: &Path) -> VfsResult<PathBuf> {
        self.with_entry(path, true, "realpath", |resolved, entry| match entry {
            Some(_) => Ok(self.external(resolved)),
            None => Err(VfsError::not_found("realpath", path.display().to_string())),
        })
    }

    fn stat_sync(&self, path: &Path) -> VfsResult<Stats> {
        self.with_entry(path, true, "stat", |_, entry| match entry {
            Some(e) if e.kind() != FileType::Symlink => Ok(e.stats().clone()),
            _ => Err(VfsError::not_found("stat", path.display().to_string())),
        })
    }

    fn lstat_sync(&self, path: &Path) -> VfsResult<Stats> {
        self.with_entry(path, false, "lstat", |_, entry| match entry {
            Some(e) => Ok(e.stats().clone()),
            None => Err(VfsError::not_found("lstat", path.display().to_string())),
        })
    }

    fn readlink_sync(&self, path: &Path) -> VfsResult<PathBuf> {
        self.readlink(path)
    }

    fn readdir_sync(&self, path: &Path) -> VfsResult<Vec<DirEntry>> {
        let Some(internal) = self.internal(path) else {
            return Err(VfsError::not_found("scandir", path.display().to_string()));
        };
        let entries = self.entries.read();
        let dir = Self::resolve(&entries, &internal, true, "scandir", path)?;

        match entries.get(&dir) {
            Some(Entry::Directory { .. }) => {}
            Some(_) => return Err(VfsError::not_a_directory("scandir", path.display().to_string())),
            None => return Err(VfsError::not_found("scandir", path.display().to_string())),
        }

        let mut result: Vec<DirEntry> = entries
            .iter()
            .filter(|(p, _)| p.parent() == Some(dir.as_path()))
            .filter_map(|(p, e)| {
                p.file_name()
                    .map(|name| DirEntry::new(name.to_string_lossy(), e.kind()))
            })
            .collect();

        // Sort for consistent ordering
        result.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(result)
    }

    fn watch(&self, path: &Path, opts: &WatchOptions) -> VfsResult<VfsWatcher> {
        let internal = self.with_entry(path, true, "watch", |resolved, entry| match entry {
            Some(_) => Ok(resolved.to_path_buf()),
            None => Err(VfsError::not_found("watch", path.display().to_string())),
        })?;

        let (tx, watcher) = VfsWatcher::channel();
        self.subscriptions.lock().push(Subscription {
            path: internal,
            recursive: opts.recursive,
            tx,
        });
        tracing::debug!(backend = %self.name, path = %path.display(), "memory watch started");
        Ok(watcher)
    }

    fn watch_file(
        &self,
        path: &Path,
        _opts: &WatchFileOptions,
        listener: StatListener,
    ) -> VfsResult<ListenerId> {
        let Some(internal) = self.internal(path) else {
            return Err(VfsError::not_found("watch", path.display().to_string()));
        };
        let id = ListenerId::next();
        self.stat_listeners
            .entry(internal)
            .or_default()
            .push((id, listener));
        Ok(id)
    }

    fn unwatch_file(&self, path: &Path, listener: Option<ListenerId>) -> VfsResult<()> {
        let Some(internal) = self.internal(path) else {
            return Ok(());
        };
        match listener {
            None => {
                self.stat_listeners.remove(&internal);
            }
            Some(id) => {
                self.stat_listeners.remove_if_mut(&internal, |_, listeners| {
                    listeners.retain(|(lid, _)| *lid != id);
                    listeners.is_empty()
                });
            }
        }
        Ok(())
    }
}
