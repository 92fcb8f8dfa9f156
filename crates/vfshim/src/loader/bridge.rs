//! Loader adapters that consult the router before the host's own logic.

use async_trait::async_trait;
use std::sync::Arc;

use super::chain::{LoadContext, LoadedModule, ModuleHooks, Next, ResolveContext, Resolution};
use super::format::{infer_format, is_builtin};
use super::specifier_to_path;
use crate::config::LoaderConfig;
use crate::error::VfsResult;
use crate::path;
use crate::provider::FilesystemProvider;
use crate::router::{Claim, Router};
use crate::types::{ReadOptions, StatClassification};

/// Synchronous loader stat query.
///
/// Backends answer first; anything unclaimed goes to the provider captured
/// at install time.
pub struct ModuleStat {
    router: Router,
    original: Arc<dyn FilesystemProvider>,
}

impl std::fmt::Debug for ModuleStat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleStat")
            .field("router", &self.router)
            .finish_non_exhaustive()
    }
}

impl ModuleStat {
    pub fn new(router: Router, original: Arc<dyn FilesystemProvider>) -> Self {
        Self { router, original }
    }

    pub fn stat(&self, input: &str) -> StatClassification {
        if let Ok(normalized) = path::normalize(input) {
            if let Some(outcome) = self.router.classify(&normalized).into_outcome() {
                return outcome.unwrap_or(StatClassification::NotFound);
            }
        }
        self.original.module_stat(input)
    }

    /// Legacy numeric form of [`stat`](Self::stat).
    pub fn stat_code(&self, input: &str) -> i32 {
        self.stat(input).code()
    }
}

/// Resolve/load middleware serving files held by registered backends.
#[derive(Debug)]
pub struct VfsModuleHooks {
    router: Router,
    config: LoaderConfig,
}

impl VfsModuleHooks {
    pub fn new(router: Router, config: LoaderConfig) -> Self {
        Self { router, config }
    }
}

#[async_trait]
impl ModuleHooks for VfsModuleHooks {
    fn name(&self) -> &str {
        "vfs"
    }

    async fn resolve(
        &self,
        specifier: &str,
        ctx: &ResolveContext,
        next: Next<'_>,
    ) -> VfsResult<Resolution> {
        if is_builtin(specifier, &self.config.builtins) {
            return next.resolve(specifier, ctx).await;
        }
        let Some(target) = specifier_to_path(specifier, ctx.parent_url.as_deref()) else {
            return next.resolve(specifier, ctx).await;
        };

        let claimed_file = matches!(
            self.router.classify(&target),
            Claim::Claimed {
                outcome: Ok(StatClassification::File),
                ..
            }
        );
        if !claimed_file {
            return next.resolve(specifier, ctx).await;
        }

        tracing::debug!(specifier, path = %target.display(), "resolved from vfs");
        Ok(Resolution {
            url: path::path_to_file_url(&target)?,
            format: Some(infer_format(&target, self.config.default_format)),
            short_circuit: true,
        })
    }

    async fn load(&self, url: &str, ctx: &LoadContext, next: Next<'_>) -> VfsResult<LoadedModule> {
        if !path::has_file_scheme(url) {
            return next.load(url, ctx).await;
        }
        let Ok(target) = path::file_url_to_path(url) else {
            return next.load(url, ctx).await;
        };

        match self.router.read_file(&target, &ReadOptions::default()) {
            Claim::Unclaimed => next.load(url, ctx).await,
            Claim::Claimed { backend, outcome } => {
                let content = outcome?;
                tracing::debug!(backend = backend.name(), url, "loaded from vfs");
                // The extension decides, whatever format hint came along.
                Ok(LoadedModule {
                    format: infer_format(&target, self.config.default_format),
                    source: Some(content.into_bytes()),
                    short_circuit: true,
                })
            }
        }
    }
}
