//! Installing the routing layer.
//!
//! An [`Interceptor`] owns a registry and the provider it will capture. On
//! first backend registration it installs: the current provider is captured
//! as the originals, a [`RoutingProvider`] is built in front of it, and the
//! loader adapters are wired to the same router. Installation happens once
//! per interceptor and is never undone, even if every backend is later
//! unregistered.
//!
//! Most code uses the process-wide instance through [`global`], [`fs`] and
//! [`register_backend`]. Tests and embedders can build their own.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, LazyLock, OnceLock};

use crate::backend::VfsBackend;
use crate::config::VfsConfig;
use crate::loader::{FsModuleLoader, HookChain, ModuleStat, VfsModuleHooks};
use crate::native::NativeFs;
use crate::provider::{FilesystemProvider, RoutingProvider};
use crate::registry::Registry;
use crate::router::Router;
use crate::watch::WatchFileOptions;

struct Installed {
    originals: Arc<dyn FilesystemProvider>,
    routing: Arc<RoutingProvider>,
    /// Absent when module hooks are disabled in the config.
    hooks: Option<Arc<VfsModuleHooks>>,
    module_stat: Option<Arc<ModuleStat>>,
}

/// Owner of the routing layer for one provider.
pub struct Interceptor {
    registry: Arc<Registry>,
    native: Arc<dyn FilesystemProvider>,
    config: VfsConfig,
    installed: OnceLock<Installed>,
    captures: AtomicUsize,
}

impl std::fmt::Debug for Interceptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Interceptor")
            .field("registry", &self.registry)
            .field("installed", &self.is_installed())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Interceptor {
    /// Interceptor that will capture `native` on install.
    pub fn new(native: Arc<dyn FilesystemProvider>) -> Self {
        Self::with_config(native, VfsConfig::default())
    }

    pub fn with_config(native: Arc<dyn FilesystemProvider>, config: VfsConfig) -> Self {
        Self {
            registry: Arc::new(Registry::new()),
            native,
            config,
            installed: OnceLock::new(),
            captures: AtomicUsize::new(0),
        }
    }

    fn installed(&self) -> &Installed {
        self.installed.get_or_init(|| {
            self.captures.fetch_add(1, Ordering::SeqCst);
            let originals = Arc::clone(&self.native);
            let router = Router::new(Arc::clone(&self.registry));
            let routing = Arc::new(
                RoutingProvider::new(router.clone(), Arc::clone(&originals))
                    .with_virtual_cwd(self.config.virtual_cwd),
            );
            let (hooks, module_stat) = if self.config.loader.module_hooks {
                (
                    Some(Arc::new(VfsModuleHooks::new(router.clone(), self.config.loader.clone()))),
                    Some(Arc::new(ModuleStat::new(router, Arc::clone(&originals)))),
                )
            } else {
                (None, None)
            };
            tracing::info!(
                module_hooks = hooks.is_some(),
                virtual_cwd = self.config.virtual_cwd,
                "vfs interceptor installed"
            );
            Installed {
                originals,
                routing,
                hooks,
                module_stat,
            }
        })
    }

    /// Install the routing layer if it is not installed yet.
    pub fn install_once(&self) {
        self.installed();
    }

    pub fn is_installed(&self) -> bool {
        self.installed.get().is_some()
    }

    /// How many times the originals have been captured. Never above 1.
    pub fn capture_count(&self) -> usize {
        self.captures.load(Ordering::SeqCst)
    }

    pub fn config(&self) -> &VfsConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Register `backend` at lowest priority, installing on first use.
    ///
    /// Returns `false` if it was already registered.
    pub fn register_backend(&self, backend: Arc<dyn VfsBackend>) -> bool {
        let name = backend.name().to_string();
        let policy = backend.policy();
        let added = self.registry.register(backend);
        self.install_once();
        if added {
            tracing::info!(backend = %name, %policy, total = self.registry.len(), "registered vfs backend");
        }
        added
    }

    /// Unregister `backend`. The routing layer stays installed.
    pub fn unregister_backend(&self, backend: &Arc<dyn VfsBackend>) -> bool {
        let removed = self.registry.unregister(backend);
        if removed {
            tracing::info!(backend = backend.name(), total = self.registry.len(), "unregistered vfs backend");
        }
        removed
    }

    /// The provider callers should use: routing once installed, the native
    /// one before.
    pub fn provider(&self) -> Arc<dyn FilesystemProvider> {
        match self.installed.get() {
            Some(installed) => Arc::clone(&installed.routing) as Arc<dyn FilesystemProvider>,
            None => Arc::clone(&self.native),
        }
    }

    /// Provider captured at install, if installed.
    pub fn originals(&self) -> Option<Arc<dyn FilesystemProvider>> {
        self.installed.get().map(|i| Arc::clone(&i.originals))
    }

    /// Loader middleware, if installed and enabled.
    pub fn module_hooks(&self) -> Option<Arc<VfsModuleHooks>> {
        self.installed.get().and_then(|i| i.hooks.clone())
    }

    /// Loader stat hook, if installed and enabled.
    pub fn module_stat(&self) -> Option<Arc<ModuleStat>> {
        self.installed.get().and_then(|i| i.module_stat.clone())
    }

    /// A loader chain with the vfs hooks in front of a provider-backed
    /// terminal. Installs if needed. With module hooks disabled the chain
    /// is the terminal alone, which still reads through the routing
    /// provider.
    pub fn loader_chain(&self) -> HookChain {
        let installed = self.installed();
        let terminal = FsModuleLoader::new(
            Arc::clone(&installed.routing) as Arc<dyn FilesystemProvider>,
            self.config.loader.clone(),
        );
        let mut chain = HookChain::new(Arc::new(terminal));
        if let Some(hooks) = &installed.hooks {
            chain.register_hooks(hooks.clone());
        }
        chain
    }

    /// `watch_file` options with the configured poll interval.
    pub fn watch_file_options(&self) -> WatchFileOptions {
        self.config.watch.file_options()
    }
}

static GLOBAL: LazyLock<Interceptor> = LazyLock::new(|| Interceptor::new(Arc::new(NativeFs::new())));

/// Process-wide interceptor.
pub fn global() -> &'static Interceptor {
    &GLOBAL
}

/// Register `backend` with the process-wide interceptor.
pub fn register_backend(backend: Arc<dyn VfsBackend>) -> bool {
    global().register_backend(backend)
}

/// Unregister `backend` from the process-wide interceptor.
pub fn unregister_backend(backend: &Arc<dyn VfsBackend>) -> bool {
    global().unregister_backend(backend)
}

/// The process filesystem provider.
pub fn fs() -> Arc<dyn FilesystemProvider> {
    global().provider()
}
