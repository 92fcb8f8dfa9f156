//! The process-wide interceptor. Everything touching it lives in one test
//! so ordering within this binary cannot matter.

use std::sync::Arc;

use vfshim::{MemoryBackend, ReadOptions, VfsBackend, interceptor};

#[test]
fn global_install_is_idempotent() {
    let global = interceptor::global();
    assert!(!global.is_installed());
    assert_eq!(global.capture_count(), 0);

    let backends: Vec<Arc<dyn VfsBackend>> = (0..4)
        .map(|i| {
            let mount = format!("/global-{i}");
            Arc::new(
                MemoryBackend::mounted(&mount)
                    .named(format!("mem-{i}"))
                    .with_file(format!("{mount}/index.js"), format!("module.exports = {i};")),
            ) as Arc<dyn VfsBackend>
        })
        .collect();

    for backend in &backends {
        assert!(interceptor::register_backend(Arc::clone(backend)));
    }
    assert_eq!(global.capture_count(), 1);
    assert_eq!(global.registry().len(), 4);

    // Re-registering is a no-op.
    assert!(!interceptor::register_backend(Arc::clone(&backends[2])));
    assert_eq!(global.registry().len(), 4);
    assert_eq!(global.capture_count(), 1);

    let fs = interceptor::fs();
    let content = fs
        .read_file("/global-3/index.js", &ReadOptions::default())
        .unwrap()
        .into_bytes();
    assert_eq!(content, b"module.exports = 3;");

    for backend in &backends {
        assert!(interceptor::unregister_backend(backend));
    }
    assert!(!fs.exists("/global-3/index.js"));
    assert!(global.is_installed());

    assert!(interceptor::register_backend(Arc::clone(&backends[0])));
    assert_eq!(global.capture_count(), 1);
    assert!(fs.exists("/global-0/index.js"));
}
