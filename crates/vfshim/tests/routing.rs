//! End-to-end dispatch through an interceptor's provider, with real files
//! on disk next to virtual ones.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tempfile::TempDir;
use tracing_subscriber::EnvFilter;
use vfshim::{
    BackendPolicy, DirEntry, Encoding, FileContent, FilesystemProvider, Interceptor,
    MemoryBackend, NativeFs, ReadOptions, StatClassification, Stats, VfsBackend, VfsError,
    VfsResult, WatchEvent, WatchFileOptions, WatchOptions, path,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_test_writer()
        .try_init();
}

fn utf8() -> ReadOptions {
    ReadOptions::encoding(Encoding::Utf8)
}

fn read_text(fs: &dyn FilesystemProvider, path: &Path) -> VfsResult<String> {
    fs.read_file(&path.to_string_lossy(), &utf8())
        .map(|c| c.as_text().unwrap_or_default().to_string())
}

fn interceptor() -> Interceptor {
    Interceptor::new(Arc::new(NativeFs::new()))
}

#[test]
fn scenario_mounted_backend() {
    init_tracing();
    let disk = TempDir::new().unwrap();
    let real = disk.path().join("real/file.txt");
    std::fs::create_dir_all(real.parent().unwrap()).unwrap();
    std::fs::write(&real, "on disk").unwrap();

    let virt = disk.path().join("virt");
    let interceptor = interceptor();
    interceptor.register_backend(Arc::new(
        MemoryBackend::mounted(&virt).with_file(virt.join("a.js"), "module.exports = 1;"),
    ));
    let fs = interceptor.provider();

    assert_eq!(read_text(fs.as_ref(), &virt.join("a.js")).unwrap(), "module.exports = 1;");

    let err = read_text(fs.as_ref(), &virt.join("missing.js")).unwrap_err();
    assert_eq!(err.code(), "ENOENT");
    assert_eq!(err.syscall(), Some("open"));

    assert_eq!(read_text(fs.as_ref(), &real).unwrap(), "on disk");
}

#[test]
fn scenario_overlay_backend() {
    init_tracing();
    let disk = TempDir::new().unwrap();
    let proj = disk.path().join("proj");
    std::fs::create_dir_all(&proj).unwrap();
    std::fs::write(proj.join("config.json"), r#"{"mode":"prod"}"#).unwrap();
    std::fs::write(proj.join("other.json"), r#"{"other":true}"#).unwrap();

    let interceptor = interceptor();
    interceptor.register_backend(Arc::new(
        MemoryBackend::overlay().with_file(proj.join("config.json"), r#"{"mode":"test"}"#),
    ));
    let fs = interceptor.provider();

    assert_eq!(read_text(fs.as_ref(), &proj.join("config.json")).unwrap(), r#"{"mode":"test"}"#);
    assert_eq!(read_text(fs.as_ref(), &proj.join("other.json")).unwrap(), r#"{"other":true}"#);

    let err = read_text(fs.as_ref(), &proj.join("missing.json")).unwrap_err();
    assert!(err.is_not_found());

    // Same shape the native provider produces on its own.
    let native = NativeFs::new()
        .read_file(&proj.join("missing.json").to_string_lossy(), &utf8())
        .unwrap_err();
    assert_eq!(err.to_string(), native.to_string());
}

#[test]
fn first_registered_backend_answers() {
    let interceptor = interceptor();
    let a = Arc::new(MemoryBackend::mounted("/shared").with_file("/shared/x.js", "from a"));
    let b = Arc::new(MemoryBackend::overlay().with_file("/shared/x.js", "from b"));
    interceptor.register_backend(a);
    interceptor.register_backend(b);

    let fs = interceptor.provider();
    assert_eq!(read_text(fs.as_ref(), Path::new("/shared/x.js")).unwrap(), "from a");
    // A mounted miss is still A's answer.
    assert!(!fs.exists("/shared/y.js"));
}

#[test]
fn mount_never_falls_through_to_disk() {
    let disk = TempDir::new().unwrap();
    let v = disk.path().join("v");
    std::fs::create_dir_all(&v).unwrap();
    std::fs::write(v.join("missing.txt"), "shadowed").unwrap();

    let interceptor = interceptor();
    interceptor.register_backend(Arc::new(MemoryBackend::mounted(&v)));
    let fs = interceptor.provider();

    let target = v.join("missing.txt");
    assert!(read_text(fs.as_ref(), &target).unwrap_err().is_not_found());
    assert!(!fs.exists(&target.to_string_lossy()));
    assert!(fs.stat(&target.to_string_lossy()).unwrap_err().is_not_found());
    assert!(fs.readdir(&v.to_string_lossy()).unwrap().is_empty());
    assert_eq!(fs.module_stat(&target.to_string_lossy()), StatClassification::NotFound);
}

#[test]
fn overlay_is_transparent_for_other_paths() {
    let disk = TempDir::new().unwrap();
    let x = disk.path().join("x");
    std::fs::create_dir_all(&x).unwrap();
    std::fs::write(x.join("b.txt"), "disk b").unwrap();

    let interceptor = interceptor();
    interceptor.register_backend(Arc::new(
        MemoryBackend::overlay().with_file(x.join("a.txt"), "virtual a"),
    ));
    let fs = interceptor.provider();

    assert_eq!(read_text(fs.as_ref(), &x.join("a.txt")).unwrap(), "virtual a");
    assert_eq!(read_text(fs.as_ref(), &x.join("b.txt")).unwrap(), "disk b");
    assert_eq!(fs.stat(&x.join("b.txt").to_string_lossy()).unwrap().size, 6);
    // The overlay holds x as a directory too, so listing it shows the
    // overlay's view.
    let names: Vec<_> = fs
        .readdir(&x.to_string_lossy())
        .unwrap()
        .into_iter()
        .map(|e| e.name)
        .collect();
    assert_eq!(names, vec!["a.txt"]);
}

#[test]
fn exists_matches_classification() {
    let interceptor = interceptor();
    let mount: Arc<dyn VfsBackend> = Arc::new(
        MemoryBackend::mounted("/m")
            .with_file("/m/f.js", "f")
            .with_directory("/m/d")
            .with_symlink("/m/link", "f.js")
            .with_symlink("/m/dangling", "nowhere"),
    );
    let overlay: Arc<dyn VfsBackend> =
        Arc::new(MemoryBackend::overlay_at("/o").with_file("/o/f.js", "f"));
    interceptor.register_backend(Arc::clone(&mount));
    interceptor.register_backend(Arc::clone(&overlay));
    let fs = interceptor.provider();

    for p in ["/m", "/m/f.js", "/m/d", "/m/link", "/m/dangling", "/m/none", "/o/f.js", "/o"] {
        let path = Path::new(p);
        let handled = [&mount, &overlay].iter().any(|b| b.should_handle(path));
        assert!(handled, "{p} should be handled");
        assert_eq!(
            fs.exists(p),
            fs.module_stat(p) != StatClassification::NotFound,
            "{p}"
        );
    }
}

#[test]
fn file_urls_and_relative_input_are_normalized() {
    let interceptor = interceptor();
    interceptor.register_backend(Arc::new(
        MemoryBackend::mounted("/virt").with_file("/virt/dir/a b.js", "spaced"),
    ));
    let fs = interceptor.provider();

    assert!(fs.exists("file:///virt/dir/a%20b.js"));
    assert!(fs.exists("/virt//dir/./x/../a b.js"));
    // Unnormalizable input reaches the native provider untouched.
    assert!(!fs.exists("https://example.com/virt/dir/a%20b.js"));
}

#[tokio::test]
async fn async_primitives_route_like_sync_ones() {
    let interceptor = interceptor();
    interceptor.register_backend(Arc::new(
        MemoryBackend::mounted("/virt")
            .with_file("/virt/lib/a.js", "a")
            .with_symlink("/virt/lib/alias.js", "a.js"),
    ));
    let fs = interceptor.provider();

    let content = fs.read_file_async("/virt/lib/a.js", &ReadOptions::default()).await.unwrap();
    assert_eq!(content.into_bytes(), b"a");

    let entries = fs.readdir_async("/virt/lib").await.unwrap();
    assert_eq!(entries.len(), 2);

    assert!(fs.lstat_async("/virt/lib/alias.js").await.unwrap().is_symlink());
    assert!(fs.stat_async("/virt/lib/alias.js").await.unwrap().is_file());
    assert_eq!(
        fs.realpath_async("/virt/lib/alias.js").await.unwrap(),
        Path::new("/virt/lib/a.js")
    );

    let err = fs.readdir_async("/virt/none").await.unwrap_err();
    assert_eq!(err.syscall(), Some("scandir"));
}

#[tokio::test]
async fn watch_goes_to_the_owning_backend() {
    let interceptor = interceptor();
    let backend = Arc::new(MemoryBackend::mounted("/virt").with_directory("/virt/src"));
    interceptor.register_backend(backend.clone());
    let fs = interceptor.provider();

    let mut watcher = fs.watch("/virt/src", &WatchOptions::default()).unwrap();
    backend.write_file("/virt/src/main.js", "1").unwrap();
    assert_eq!(watcher.recv().await, Some(WatchEvent::rename("main.js")));

    let err = fs.watch("/virt/ghost", &WatchOptions::default()).unwrap_err();
    assert!(err.is_not_found());
}

#[test]
fn unregistered_backend_stops_answering() {
    let interceptor = interceptor();
    let backend: Arc<dyn VfsBackend> =
        Arc::new(MemoryBackend::mounted("/gone").with_file("/gone/a.js", "a"));
    interceptor.register_backend(Arc::clone(&backend));
    let fs = interceptor.provider();
    assert!(fs.exists("/gone/a.js"));

    assert!(interceptor.unregister_backend(&backend));
    assert!(!fs.exists("/gone/a.js"));
    assert!(interceptor.is_installed());
}

/// Overlay holding exactly one file whose bytes it cannot produce.
struct UnreadableOverlay {
    file: PathBuf,
}

impl VfsBackend for UnreadableOverlay {
    fn policy(&self) -> BackendPolicy {
        BackendPolicy::Overlay
    }
    fn should_handle(&self, path: &Path) -> bool {
        path == self.file
    }
    fn classify(&self, path: &Path) -> StatClassification {
        if path == self.file {
            StatClassification::File
        } else {
            StatClassification::NotFound
        }
    }
    fn read_file_sync(&self, path: &Path, _: &ReadOptions) -> VfsResult<FileContent> {
        Err(VfsError::read_failure(path.display().to_string(), "blob store offline"))
    }
    fn realpath_sync(&self, path: &Path) -> VfsResult<PathBuf> {
        Ok(path.to_path_buf())
    }
    fn stat_sync(&self, _: &Path) -> VfsResult<Stats> {
        Ok(Stats::file(0, 0o644))
    }
    fn lstat_sync(&self, _: &Path) -> VfsResult<Stats> {
        Ok(Stats::file(0, 0o644))
    }
    fn readdir_sync(&self, path: &Path) -> VfsResult<Vec<DirEntry>> {
        Err(VfsError::not_a_directory("scandir", path.display().to_string()))
    }
}

/// Mount that claims every file under it and refuses to open any.
struct LockedMount {
    mount: PathBuf,
}

impl VfsBackend for LockedMount {
    fn policy(&self) -> BackendPolicy {
        BackendPolicy::Mounted
    }
    fn should_handle(&self, path: &Path) -> bool {
        path::is_under_mount_point(path, &self.mount)
    }
    fn classify(&self, _: &Path) -> StatClassification {
        StatClassification::File
    }
    fn read_file_sync(&self, path: &Path, _: &ReadOptions) -> VfsResult<FileContent> {
        Err(VfsError::Io {
            syscall: "open",
            path: path.display().to_string(),
            source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        })
    }
    fn realpath_sync(&self, path: &Path) -> VfsResult<PathBuf> {
        Ok(path.to_path_buf())
    }
    fn stat_sync(&self, _: &Path) -> VfsResult<Stats> {
        Ok(Stats::file(0, 0o400))
    }
    fn lstat_sync(&self, _: &Path) -> VfsResult<Stats> {
        Ok(Stats::file(0, 0o400))
    }
    fn readdir_sync(&self, _: &Path) -> VfsResult<Vec<DirEntry>> {
        Ok(Vec::new())
    }
}

#[tokio::test]
async fn claimed_overlay_read_failure_surfaces() {
    let disk = TempDir::new().unwrap();
    let file = disk.path().join("data.txt");
    std::fs::write(&file, "from disk").unwrap();

    let interceptor = interceptor();
    interceptor.register_backend(Arc::new(UnreadableOverlay { file: file.clone() }));
    let fs = interceptor.provider();
    let input = file.to_string_lossy();

    let err = fs.read_file(&input, &utf8()).unwrap_err();
    assert_eq!(err.code(), "EIO");
    assert_eq!(err.syscall(), Some("read"));
    assert_eq!(err.path(), Some(&*input));

    let err = fs.read_file_async(&input, &utf8()).await.unwrap_err();
    assert_eq!(err.code(), "EIO");

    // The overlay still answers metadata for the path it claimed.
    assert_eq!(fs.stat(&input).unwrap().size, 0);
}

#[test]
fn mounted_backend_error_reaches_caller_unchanged() {
    let disk = TempDir::new().unwrap();
    let locked = disk.path().join("locked");
    std::fs::create_dir_all(&locked).unwrap();
    std::fs::write(locked.join("secret.txt"), "readable on disk").unwrap();

    let interceptor = interceptor();
    interceptor.register_backend(Arc::new(LockedMount {
        mount: locked.clone(),
    }));
    let fs = interceptor.provider();
    let input = locked.join("secret.txt").to_string_lossy().into_owned();

    let err = fs.read_file(&input, &utf8()).unwrap_err();
    assert_eq!((err.code(), err.syscall()), ("EACCES", Some("open")));
    assert_eq!(err.path(), Some(input.as_str()));
    assert!(matches!(err, VfsError::Io { .. }));
}

#[test]
fn unwatch_reaches_overlay_after_file_is_gone() {
    let interceptor = interceptor();
    let backend = Arc::new(MemoryBackend::overlay_at("/o").with_file("/o/a.txt", "a"));
    interceptor.register_backend(backend.clone());
    let fs = interceptor.provider();

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let id = fs
        .watch_file(
            "/o/a.txt",
            &WatchFileOptions::default(),
            Arc::new(move |_: &Stats, _: &Stats| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        )
        .unwrap();

    backend.remove("/o/a.txt").unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(!fs.exists("/o/a.txt"));

    fs.unwatch_file("/o/a.txt", Some(id)).unwrap();
    backend.write_file("/o/a.txt", "back again").unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn readlink_and_access_follow_dispatch() {
    let disk = TempDir::new().unwrap();
    let real_link = disk.path().join("real-link");
    std::os::unix::fs::symlink("target.txt", &real_link).unwrap();

    let interceptor = interceptor();
    interceptor.register_backend(Arc::new(
        MemoryBackend::mounted("/virt")
            .with_file("/virt/a.js", "a")
            .with_symlink("/virt/alias.js", "a.js"),
    ));
    let fs = interceptor.provider();

    assert_eq!(fs.readlink("/virt/alias.js").unwrap(), PathBuf::from("a.js"));
    assert!(fs.readlink("/virt/none.js").unwrap_err().is_not_found());
    // Unclaimed paths reach the real filesystem.
    assert_eq!(
        fs.readlink(&real_link.to_string_lossy()).unwrap(),
        PathBuf::from("target.txt")
    );

    fs.access("/virt/alias.js").unwrap();
    let err = fs.access("/virt/none.js").unwrap_err();
    assert_eq!((err.code(), err.syscall()), ("ENOENT", Some("access")));
    // A dangling link on disk is inaccessible.
    assert!(fs.access(&real_link.to_string_lossy()).unwrap_err().is_not_found());
}
