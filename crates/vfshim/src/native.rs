//! Native filesystem provider.
//!
//! Plain pass-through to the operating system. This is what gets captured
//! as "the originals" when the interceptor installs, so its error shapes
//! are the reference every virtual backend imitates.

use async_trait::async_trait;
use dashmap::DashMap;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::os::unix::fs::{MetadataExt, PermissionsExt};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::fs;
use tokio::task::AbortHandle;
use tokio::time::MissedTickBehavior;

use crate::error::{VfsError, VfsResult};
use crate::path;
use crate::provider::FilesystemProvider;
use crate::types::{DirEntry, FileContent, FileType, ReadOptions, StatClassification, Stats};
use crate::watch::{
    ListenerId, StatListener, VfsWatcher, WatchEvent, WatchEventKind, WatchFileOptions,
    WatchOptions,
};

/// A `watch_file` poll task. Dropping it stops the task.
struct StatWatch {
    id: ListenerId,
    task: AbortHandle,
}

impl Drop for StatWatch {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Operating-system filesystem.
///
/// Relative paths resolve against the process working directory, exactly as
/// the OS would. `file:` URLs are accepted and converted first.
#[derive(Default)]
pub struct NativeFs {
    /// Active `watch_file` pollers, keyed by the path they were given.
    stat_watchers: DashMap<PathBuf, Vec<StatWatch>>,
}

impl std::fmt::Debug for NativeFs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeFs")
            .field("stat_watchers", &self.stat_watchers.len())
            .finish()
    }
}

impl NativeFs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Turn caller input into something `std::fs` accepts.
    fn resolve(input: &str) -> VfsResult<PathBuf> {
        if path::has_file_scheme(input) {
            path::file_url_to_path(input)
        } else if input.is_empty() || input.contains('\0') {
            Err(VfsError::invalid_path(input))
        } else {
            Ok(PathBuf::from(input))
        }
    }

    fn kind_of(ft: std::fs::FileType) -> FileType {
        if ft.is_dir() {
            FileType::Directory
        } else if ft.is_symlink() {
            FileType::Symlink
        } else if ft.is_file() {
            FileType::File
        } else {
            FileType::Other
        }
    }

    /// Convert std::fs::Metadata to Stats.
    fn metadata_to_stats(meta: &std::fs::Metadata) -> Stats {
        let mtime = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        Stats {
            size: meta.len(),
            kind: Self::kind_of(meta.file_type()),
            mode: meta.permissions().mode(),
            mtime,
            atime: meta.accessed().unwrap_or(mtime),
            ctime: meta.created().unwrap_or(mtime),
            nlink: meta.nlink(),
            uid: meta.uid(),
            gid: meta.gid(),
        }
    }

    /// Reads of a directory fail at `read`, not `open`.
    fn read_error(input: &str, err: std::io::Error) -> VfsError {
        let syscall = if err.kind() == std::io::ErrorKind::IsADirectory {
            "read"
        } else {
            "open"
        };
        VfsError::from_io(syscall, input, err)
    }

    fn notify_error(input: &str, err: notify::Error) -> VfsError {
        match err.kind {
            notify::ErrorKind::Io(io) => VfsError::from_io("watch", input, io),
            notify::ErrorKind::PathNotFound => VfsError::not_found("watch", input),
            other => VfsError::Io {
                syscall: "watch",
                path: input.to_string(),
                source: std::io::Error::other(notify::Error::new(other)),
            },
        }
    }

    fn stat_or_absent(path: &Path) -> Stats {
        std::fs::metadata(path)
            .map(|m| Self::metadata_to_stats(&m))
            .unwrap_or_else(|_| Stats::absent())
    }

    async fn stat_or_absent_async(path: &Path) -> Stats {
        fs::metadata(path)
            .await
            .map(|m| Self::metadata_to_stats(&m))
            .unwrap_or_else(|_| Stats::absent())
    }

    /// Number of live `watch_file` registrations.
    pub fn stat_watcher_count(&self) -> usize {
        self.stat_watchers.iter().map(|e| e.value().len()).sum()
    }
}

#[async_trait]
impl FilesystemProvider for NativeFs {
    fn exists(&self, input: &str) -> bool {
        Self::resolve(input)
            .map(|p| std::fs::metadata(p).is_ok())
            .unwrap_or(false)
    }

    fn access(&self, input: &str) -> VfsResult<()> {
        let path = Self::resolve(input)?;
        std::fs::metadata(&path)
            .map(|_| ())
            .map_err(|e| VfsError::from_io("access", input, e))
    }

    fn read_file(&self, input: &str, opts: &ReadOptions) -> VfsResult<FileContent> {
        let path = Self::resolve(input)?;
        let bytes = std::fs::read(&path).map_err(|e| Self::read_error(input, e))?;
        Ok(FileContent::from_bytes(bytes, opts))
    }

    fn realpath(&self, input: &str) -> VfsResult<PathBuf> {
        let path = Self::resolve(input)?;
        dunce::canonicalize(&path).map_err(|e| VfsError::from_io("realpath", input, e))
    }

    fn readlink(&self, input: &str) -> VfsResult<PathBuf> {
        let path = Self::resolve(input)?;
        std::fs::read_link(&path).map_err(|e| VfsError::from_io("readlink", input, e))
    }

    fn stat(&self, input: &str) -> VfsResult<Stats> {
        let path = Self::resolve(input)?;
        let meta = std::fs::metadata(&path).map_err(|e| VfsError::from_io("stat", input, e))?;
        Ok(Self::metadata_to_stats(&meta))
    }

    fn lstat(&self, input: &str) -> VfsResult<Stats> {
        let path = Self::resolve(input)?;
        let meta =
            std::fs::symlink_metadata(&path).map_err(|e| VfsError::from_io("lstat", input, e))?;
        Ok(Self::metadata_to_stats(&meta))
    }

    fn readdir(&self, input: &str) -> VfsResult<Vec<DirEntry>> {
        let path = Self::resolve(input)?;
        let mut entries = Vec::new();
        let iter = std::fs::read_dir(&path).map_err(|e| VfsError::from_io("scandir", input, e))?;
        for entry in iter {
            let entry = entry.map_err(|e| VfsError::from_io("scandir", input, e))?;
            let kind = entry
                .file_type()
                .map(Self::kind_of)
                .map_err(|e| VfsError::from_io("scandir", input, e))?;
            entries.push(DirEntry::new(entry.file_name().to_string_lossy(), kind));
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    fn module_stat(&self, input: &str) -> StatClassification {
        match Self::resolve(input).and_then(|p| {
            std::fs::metadata(p).map_err(|e| VfsError::from_io("stat", input, e))
        }) {
            Ok(meta) if meta.is_dir() => StatClassification::Directory,
            Ok(_) => StatClassification::File,
            Err(_) => StatClassification::NotFound,
        }
    }

    fn watch(&self, input: &str, opts: &WatchOptions) -> VfsResult<VfsWatcher> {
        let path = Self::resolve(input)?;
        let (tx, watcher) = VfsWatcher::channel();
        let root = path.clone();

        let mut os_watcher = RecommendedWatcher::new(
            move |result: Result<Event, notify::Error>| {
                let Ok(event) = result else { return };
                let kind = match event.kind {
                    EventKind::Create(_) | EventKind::Remove(_) => WatchEventKind::Rename,
                    EventKind::Modify(notify::event::ModifyKind::Name(_)) => WatchEventKind::Rename,
                    EventKind::Modify(_) => WatchEventKind::Change,
                    _ => return,
                };
                for changed in event.paths {
                    let filename = changed
                        .strip_prefix(&root)
                        .ok()
                        .filter(|rel| !rel.as_os_str().is_empty())
                        .or_else(|| changed.file_name().map(Path::new))
                        .map(|p| p.to_string_lossy().into_owned());
                    let _ = tx.send(WatchEvent { kind, filename });
                }
            },
            notify::Config::default(),
        )
        .map_err(|e| Self::notify_error(input, e))?;

        let mode = if opts.recursive {
            RecursiveMode::Recursive
        } else {
            RecursiveMode::NonRecursive
        };
        os_watcher
            .watch(&path, mode)
            .map_err(|e| Self::notify_error(input, e))?;

        tracing::debug!(path = %path.display(), recursive = opts.recursive, "native watch started");
        Ok(watcher.with_guard(os_watcher))
    }

    /// Polls with `tokio::time::interval`, so it needs a running runtime.
    /// The first comparison is against the stats at call time, which may be
    /// absent: creating the file later is reported as `(current, absent)`.
    fn watch_file(
        &self,
        input: &str,
        opts: &WatchFileOptions,
        listener: StatListener,
    ) -> VfsResult<ListenerId> {
        let path = Self::resolve(input)?;
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| VfsError::unsupported("watch", input))?;

        let target = path.clone();
        let period = opts.interval.max(Duration::from_millis(1));
        let mut prev = Self::stat_or_absent(&path);
        let task = runtime.spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let curr = Self::stat_or_absent_async(&target).await;
                if curr != prev {
                    listener(&curr, &prev);
                    prev = curr;
                }
            }
        });

        let id = ListenerId::next();
        tracing::debug!(path = %path.display(), interval = ?period, "native stat poll started");
        self.stat_watchers.entry(path).or_default().push(StatWatch {
            id,
            task: task.abort_handle(),
        });
        Ok(id)
    }

    fn unwatch_file(&self, input: &str, listener: Option<ListenerId>) -> VfsResult<()> {
        let path = Self::resolve(input)?;
        match listener {
            None => {
                self.stat_watchers.remove(&path);
            }
            Some(id) => {
                let now_empty = match self.stat_watchers.get_mut(&path) {
                    Some(mut watches) => {
                        watches.retain(|w| w.id != id);
                        watches.is_empty()
                    }
                    None => false,
                };
                if now_empty {
                    self.stat_watchers.remove(&path);
                }
            }
        }
        Ok(())
    }

    fn cwd(&self) -> VfsResult<PathBuf> {
        std::env::current_dir().map_err(|e| VfsError::from_io("uv_cwd", "", e))
    }

    fn chdir(&self, input: &str) -> VfsResult<()> {
        let path = Self::resolve(input)?;
        std::env::set_current_dir(&path).map_err(|e| VfsError::from_io("chdir", input, e))
    }

    async fn access_async(&self, input: &str) -> VfsResult<()> {
        let path = Self::resolve(input)?;
        fs::metadata(&path)
            .await
            .map(|_| ())
            .map_err(|e| VfsError::from_io("access", input, e))
    }

    async fn read_file_async(&self, input: &str, opts: &ReadOptions) -> VfsResult<FileContent> {
        let path = Self::resolve(input)?;
        let bytes = fs::read(&path).await.map_err(|e| Self::read_error(input, e))?;
        Ok(FileContent::from_bytes(bytes, opts))
    }

    async fn stat_async(&self, input: &str) -> VfsResult<Stats> {
        let path = Self::resolve(input)?;
        let meta = fs::metadata(&path)
            .await
            .map_err(|e| VfsError::from_io("stat", input, e))?;
        Ok(Self::metadata_to_stats(&meta))
    }

    async fn lstat_async(&self, input: &str) -> VfsResult<Stats> {
        let path = Self::resolve(input)?;
        let meta = fs::symlink_metadata(&path)
            .await
            .map_err(|e| VfsError::from_io("lstat", input, e))?;
        Ok(Self::metadata_to_stats(&meta))
    }

    async fn readdir_async(&self, input: &str) -> VfsResult<Vec<DirEntry>> {
        let path = Self::resolve(input)?;
        let mut entries = Vec::new();
        let mut dir = fs::read_dir(&path)
            .await
            .map_err(|e| VfsError::from_io("scandir", input, e))?;

        while let Some(entry) = dir
            .next_entry()
            .await
            .map_err(|e| VfsError::from_io("scandir", input, e))?
        {
            let kind = entry
                .file_type()
                .await
                .map(Self::kind_of)
                .map_err(|e| VfsError::from_io("scandir", input, e))?;
            entries.push(DirEntry::new(entry.file_name().to_string_lossy(), kind));
        }

        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    async fn readlink_async(&self, input: &str) -> VfsResult<PathBuf> {
        let path = Self::resolve(input)?;
        fs::read_link(&path)
            .await
            .map_err(|e| VfsError::from_io("readlink", input, e))
    }

    async fn realpath_async(&self, input: &str) -> VfsResult<PathBuf> {
        let path = Self::resolve(input)?;
        let canonical = fs::canonicalize(&path)
            .await
            .map_err(|e| VfsError::from_io("realpath", input, e))?;
        Ok(dunce::simplified(&canonical).to_path_buf())
    }
}
