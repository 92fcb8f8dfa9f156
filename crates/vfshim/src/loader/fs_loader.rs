//! Terminal loader over a [`FilesystemProvider`].
//!
//! Resolution is deliberately small: exact file, extension probing,
//! directory `package.json` `"main"`, then `index.*`. Bare specifiers are
//! not searched for. When the provider is the routing one, virtual files
//! resolve exactly like real ones.

use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::chain::{DefaultLoader, LoadContext, LoadedModule, ResolveContext, Resolution};
use super::format::{ModuleFormat, builtin_url, infer_format, is_builtin};
use super::specifier_to_path;
use crate::config::LoaderConfig;
use crate::error::{VfsError, VfsResult};
use crate::path;
use crate::provider::FilesystemProvider;
use crate::types::{ReadOptions, StatClassification};

#[derive(Debug, Default, Deserialize)]
struct PackageManifest {
    #[serde(default)]
    main: Option<String>,
}

/// Default resolve/load backed by a filesystem provider.
pub struct FsModuleLoader {
    provider: Arc<dyn FilesystemProvider>,
    config: LoaderConfig,
}

impl std::fmt::Debug for FsModuleLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FsModuleLoader")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl FsModuleLoader {
    pub fn new(provider: Arc<dyn FilesystemProvider>, config: LoaderConfig) -> Self {
        Self { provider, config }
    }

    fn classify(&self, path: &Path) -> StatClassification {
        self.provider.module_stat(&path.to_string_lossy())
    }

    fn is_file(&self, path: &Path) -> bool {
        self.classify(path) == StatClassification::File
    }

    /// Exact match, then `path` + each configured extension.
    fn try_file(&self, path: &Path) -> Option<PathBuf> {
        if self.is_file(path) {
            return Some(path.to_path_buf());
        }
        self.config.extensions.iter().find_map(|ext| {
            let candidate = PathBuf::from(format!("{}{ext}", path.display()));
            self.is_file(&candidate).then_some(candidate)
        })
    }

    fn try_index(&self, dir: &Path) -> Option<PathBuf> {
        self.config.extensions.iter().find_map(|ext| {
            let candidate = dir.join(format!("index{ext}"));
            self.is_file(&candidate).then_some(candidate)
        })
    }

    async fn manifest_main(&self, dir: &Path) -> Option<String> {
        let manifest = dir.join("package.json");
        if !self.is_file(&manifest) {
            return None;
        }
        let content = self
            .provider
            .read_file_async(&manifest.to_string_lossy(), &ReadOptions::default())
            .await
            .ok()?;
        match serde_json::from_slice::<PackageManifest>(&content.into_bytes()) {
            Ok(pkg) => pkg.main,
            Err(e) => {
                tracing::warn!(path = %manifest.display(), error = %e, "ignoring unparsable package.json");
                None
            }
        }
    }

    async fn resolve_path(&self, path: &Path) -> Option<PathBuf> {
        if let Some(found) = self.try_file(path) {
            return Some(found);
        }
        if self.classify(path) != StatClassification::Directory {
            return None;
        }

        if let Some(main) = self.manifest_main(path).await {
            let target = path::normalize_from(&main, path).ok()?;
            if let Some(found) = self.try_file(&target) {
                return Some(found);
            }
            if let Some(found) = self.try_index(&target) {
                return Some(found);
            }
        }
        self.try_index(path)
    }

    fn not_found(specifier: &str, ctx: &ResolveContext) -> VfsError {
        VfsError::ModuleNotFound {
            specifier: specifier.to_string(),
            parent: ctx
                .parent_url
                .clone()
                .unwrap_or_else(|| "<entry>".to_string()),
        }
    }
}

#[async_trait]
impl DefaultLoader for FsModuleLoader {
    async fn resolve(&self, specifier: &str, ctx: &ResolveContext) -> VfsResult<Resolution> {
        if is_builtin(specifier, &self.config.builtins) {
            return Ok(Resolution {
                url: builtin_url(specifier),
                format: Some(ModuleFormat::Builtin),
                short_circuit: false,
            });
        }

        let Some(path) = specifier_to_path(specifier, ctx.parent_url.as_deref()) else {
            return Err(Self::not_found(specifier, ctx));
        };
        let Some(found) = self.resolve_path(&path).await else {
            return Err(Self::not_found(specifier, ctx));
        };

        tracing::trace!(specifier, path = %found.display(), "resolved");
        Ok(Resolution {
            url: path::path_to_file_url(&found)?,
            format: Some(infer_format(&found, self.config.default_format)),
            short_circuit: false,
        })
    }

    async fn load(&self, url: &str, ctx: &LoadContext) -> VfsResult<LoadedModule> {
        if url.starts_with("node:") {
            return Ok(LoadedModule {
                format: ModuleFormat::Builtin,
                source: None,
                short_circuit: false,
            });
        }
        if !path::has_file_scheme(url) {
            return Err(VfsError::host_hook(url, "only file: and node: URLs can be loaded"));
        }

        let file = path::file_url_to_path(url)?;
        let content = self
            .provider
            .read_file_async(url, &ReadOptions::default())
            .await?;
        Ok(LoadedModule {
            format: ctx
                .format
                .unwrap_or_else(|| infer_format(&file, self.config.default_format)),
            source: Some(content.into_bytes()),
            short_circuit: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::native::NativeFs;
    use tempfile::TempDir;

    fn setup() -> (FsModuleLoader, TempDir) {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        std::fs::write(root.join("main.js"), "require('./lib')").unwrap();
        std::fs::create_dir_all(root.join("lib")).unwrap();
        std::fs::write(root.join("lib/index.mjs"), "export default 1").unwrap();
        std::fs::create_dir_all(root.join("pkg/dist")).unwrap();
        std::fs::write(root.join("pkg/package.json"), r#"{"main": "dist/entry"}"#).unwrap();
        std::fs::write(root.join("pkg/dist/entry.cjs"), "module.exports = 2").unwrap();
        let loader = FsModuleLoader::new(Arc::new(NativeFs::new()), LoaderConfig::default());
        (loader, dir)
    }

    fn parent(dir: &TempDir) -> ResolveContext {
        let url = path::path_to_file_url(&dir.path().join("main.js")).unwrap();
        ResolveContext::from_parent(url)
    }

    #[tokio::test]
    async fn test_resolve_tries_extensions_and_index() {
        let (loader, dir) = setup();
        let ctx = parent(&dir);

        let res = loader.resolve("./main", &ctx).await.unwrap();
        assert!(res.url.ends_with("/main.js"));
        assert_eq!(res.format, Some(ModuleFormat::CommonJs));

        let res = loader.resolve("./lib", &ctx).await.unwrap();
        assert!(res.url.ends_with("/lib/index.mjs"));
        assert_eq!(res.format, Some(ModuleFormat::Module));
    }

    #[tokio::test]
    async fn test_resolve_package_main() {
        let (loader, dir) = setup();
        let res = loader.resolve("./pkg", &parent(&dir)).await.unwrap();
        assert!(res.url.ends_with("/pkg/dist/entry.cjs"));
    }

    #[tokio::test]
    async fn test_builtins_and_bare_specifiers() {
        let (loader, dir) = setup();
        let ctx = parent(&dir);

        let res = loader.resolve("fs", &ctx).await.unwrap();
        assert_eq!(res.url, "node:fs");
        assert_eq!(res.format, Some(ModuleFormat::Builtin));

        let loaded = loader.load("node:fs", &LoadContext::default()).await.unwrap();
        assert!(loaded.source.is_none());

        let err = loader.resolve("left-pad", &ctx).await.unwrap_err();
        assert_eq!(err.code(), "ERR_MODULE_NOT_FOUND");
        let err = loader.resolve("./nowhere", &ctx).await.unwrap_err();
        assert_eq!(err.code(), "ERR_MODULE_NOT_FOUND");
    }

    #[tokio::test]
    async fn test_load_reads_source() {
        let (loader, dir) = setup();
        let url = path::path_to_file_url(&dir.path().join("lib/index.mjs")).unwrap();
        let loaded = loader.load(&url, &LoadContext::default()).await.unwrap();
        assert_eq!(loaded.format, ModuleFormat::Module);
        assert_eq!(loaded.source.as_deref(), Some(&b"export default 1"[..]));

        let err = loader
            .load("https://cdn.example/x.js", &LoadContext::default())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "ERR_VFS_HOOK");
    }
}
