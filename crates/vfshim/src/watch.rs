//! Watch types shared by backends and the native provider.
//!
//! `watch` hands back a [`VfsWatcher`] that yields [`WatchEvent`]s over an
//! unbounded tokio channel. `watch_file` registers a [`StatListener`] that
//! is called with `(current, previous)` stats whenever a poll notices a
//! change; the returned [`ListenerId`] is what `unwatch_file` takes.

use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use strum::Display;
use tokio::sync::mpsc;

use crate::types::Stats;

/// Kind of change reported by `watch`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum WatchEventKind {
    /// Entry created, removed or renamed.
    Rename,
    /// Content or metadata changed.
    Change,
}

/// One event from a `watch` stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchEvent {
    pub kind: WatchEventKind,
    /// Name relative to the watched path, when known.
    pub filename: Option<String>,
}

impl WatchEvent {
    pub fn rename(filename: impl Into<String>) -> Self {
        Self {
            kind: WatchEventKind::Rename,
            filename: Some(filename.into()),
        }
    }

    pub fn change(filename: impl Into<String>) -> Self {
        Self {
            kind: WatchEventKind::Change,
            filename: Some(filename.into()),
        }
    }
}

/// Options for `watch`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchOptions {
    /// Report changes anywhere beneath a watched directory.
    pub recursive: bool,
    /// Keep the process alive while watching. Advisory only.
    pub persistent: bool,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            recursive: false,
            persistent: true,
        }
    }
}

/// Options for `watch_file`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchFileOptions {
    /// Poll interval.
    pub interval: Duration,
    pub persistent: bool,
}

/// Poll interval used when none is given.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(5007);

impl Default for WatchFileOptions {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            persistent: true,
        }
    }
}

/// Listener for `watch_file`: called with `(current, previous)`.
pub type StatListener = Arc<dyn Fn(&Stats, &Stats) + Send + Sync>;

/// Handle identifying one `watch_file` registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl ListenerId {
    /// Allocate a process-unique id.
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// Sending half of a watch stream.
pub type WatchSender = mpsc::UnboundedSender<WatchEvent>;

/// Receiving half of a watch stream.
///
/// Dropping (or closing) the watcher stops delivery. Whatever keeps the
/// underlying source alive (an OS watcher, say) is held as the guard.
pub struct VfsWatcher {
    rx: mpsc::UnboundedReceiver<WatchEvent>,
    _guard: Option<Box<dyn Any + Send>>,
}

impl fmt::Debug for VfsWatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VfsWatcher")
            .field("guarded", &self._guard.is_some())
            .finish_non_exhaustive()
    }
}

impl VfsWatcher {
    /// Create a connected sender/watcher pair.
    pub fn channel() -> (WatchSender, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (tx, Self { rx, _guard: None })
    }

    /// Attach something that must outlive the stream.
    pub fn with_guard(mut self, guard: impl Any + Send) -> Self {
        self._guard = Some(Box::new(guard));
        self
    }

    /// Wait for the next event. `None` once every sender is gone.
    pub async fn recv(&mut self) -> Option<WatchEvent> {
        self.rx.recv().await
    }

    /// Next event if one is already queued.
    pub fn try_recv(&mut self) -> Option<WatchEvent> {
        self.rx.try_recv().ok()
    }

    /// Stop receiving. Queued events can still be drained.
    pub fn close(&mut self) {
        self.rx.close();
        self._guard = None;
    }
}
