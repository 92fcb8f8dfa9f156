//! Resolve/load middleware chain.
//!
//! Hooks are registered once and composed into a [`HookChain`]. Each hook
//! receives a [`Next`] that continues with the hooks registered before it
//! and finally the [`DefaultLoader`]. The most recently registered hook
//! runs first, matching the host's `registerHooks` ordering.

use async_trait::async_trait;
use futures::future::BoxFuture;
use std::sync::Arc;

use super::format::ModuleFormat;
use crate::error::VfsResult;

/// Context passed to `resolve`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolveContext {
    /// URL of the importing module, if any.
    pub parent_url: Option<String>,
    /// Export conditions (`import`, `require`, `node`, ...).
    pub conditions: Vec<String>,
}

impl ResolveContext {
    /// Context for an import from `parent_url`.
    pub fn from_parent(parent_url: impl Into<String>) -> Self {
        Self {
            parent_url: Some(parent_url.into()),
            conditions: Vec::new(),
        }
    }
}

/// Result of `resolve`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub url: String,
    /// Format hint for `load`.
    pub format: Option<ModuleFormat>,
    /// Set when a hook answered without calling `next`.
    pub short_circuit: bool,
}

/// Context passed to `load`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadContext {
    /// Format hint from `resolve`.
    pub format: Option<ModuleFormat>,
    pub conditions: Vec<String>,
}

/// Result of `load`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedModule {
    pub format: ModuleFormat,
    /// Module source; `None` for builtins.
    pub source: Option<Vec<u8>>,
    pub short_circuit: bool,
}

/// A resolve/load middleware.
///
/// Both methods default to passing straight through.
#[async_trait]
pub trait ModuleHooks: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str {
        "hooks"
    }

    async fn resolve(
        &self,
        specifier: &str,
        ctx: &ResolveContext,
        next: Next<'_>,
    ) -> VfsResult<Resolution> {
        next.resolve(specifier, ctx).await
    }

    async fn load(&self, url: &str, ctx: &LoadContext, next: Next<'_>) -> VfsResult<LoadedModule> {
        next.load(url, ctx).await
    }
}

/// The loader at the end of the chain.
#[async_trait]
pub trait DefaultLoader: Send + Sync {
    async fn resolve(&self, specifier: &str, ctx: &ResolveContext) -> VfsResult<Resolution>;

    async fn load(&self, url: &str, ctx: &LoadContext) -> VfsResult<LoadedModule>;
}

/// Continuation handed to a hook: the rest of the chain.
#[derive(Clone, Copy)]
pub struct Next<'a> {
    hooks: &'a [Arc<dyn ModuleHooks>],
    terminal: &'a dyn DefaultLoader,
}

impl<'a> Next<'a> {
    /// Continue resolution with the remaining hooks.
    pub fn resolve<'b>(
        self,
        specifier: &'b str,
        ctx: &'b ResolveContext,
    ) -> BoxFuture<'b, VfsResult<Resolution>>
    where
        'a: 'b,
    {
        match self.hooks.split_first() {
            Some((hook, rest)) => hook.resolve(
                specifier,
                ctx,
                Next {
                    hooks: rest,
                    terminal: self.terminal,
                },
            ),
            None => self.terminal.resolve(specifier, ctx),
        }
    }

    /// Continue loading with the remaining hooks.
    pub fn load<'b>(self, url: &'b str, ctx: &'b LoadContext) -> BoxFuture<'b, VfsResult<LoadedModule>>
    where
        'a: 'b,
    {
        match self.hooks.split_first() {
            Some((hook, rest)) => hook.load(
                url,
                ctx,
                Next {
                    hooks: rest,
                    terminal: self.terminal,
                },
            ),
            None => self.terminal.load(url, ctx),
        }
    }
}

/// Registered hooks in front of a terminal loader.
pub struct HookChain {
    /// Most recently registered first.
    hooks: Vec<Arc<dyn ModuleHooks>>,
    terminal: Arc<dyn DefaultLoader>,
}

impl std::fmt::Debug for HookChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.hooks.iter().map(|h| h.name()).collect();
        f.debug_struct("HookChain").field("hooks", &names).finish_non_exhaustive()
    }
}

impl HookChain {
    /// A chain with no hooks: every call goes to `terminal`.
    pub fn new(terminal: Arc<dyn DefaultLoader>) -> Self {
        Self {
            hooks: Vec::new(),
            terminal,
        }
    }

    /// Register `hooks` ahead of everything already registered.
    pub fn register_hooks(&mut self, hooks: Arc<dyn ModuleHooks>) {
        tracing::debug!(hooks = hooks.name(), "registered module hooks");
        self.hooks.insert(0, hooks);
    }

    /// Number of registered hooks.
    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    /// Returns true if no hooks are registered.
    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    fn head(&self) -> Next<'_> {
        Next {
            hooks: &self.hooks,
            terminal: self.terminal.as_ref(),
        }
    }

    /// Resolve `specifier` through the whole chain.
    pub async fn resolve(&self, specifier: &str, ctx: &ResolveContext) -> VfsResult<Resolution> {
        self.head().resolve(specifier, ctx).await
    }

    /// Load `url` through the whole chain.
    pub async fn load(&self, url: &str, ctx: &LoadContext) -> VfsResult<LoadedModule> {
        self.head().load(url, ctx).await
    }
}
