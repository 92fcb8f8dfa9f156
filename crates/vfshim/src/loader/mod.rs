//! Module-loader bridge.
//!
//! Connects registered backends to the host's module loaders:
//!
//! - [`ModuleStat`] answers the synchronous loader's stat query;
//! - [`VfsModuleHooks`] is a resolve/load middleware for the asynchronous
//!   loader;
//! - [`HookChain`] composes middlewares in front of a [`DefaultLoader`],
//!   normally the provider-backed [`FsModuleLoader`].

mod bridge;
mod chain;
mod format;
mod fs_loader;

pub use bridge::{ModuleStat, VfsModuleHooks};
pub use chain::{
    DefaultLoader, HookChain, LoadContext, LoadedModule, ModuleHooks, Next, ResolveContext,
    Resolution,
};
pub use format::{DEFAULT_BUILTINS, ModuleFormat, builtin_url, infer_format, is_builtin};
pub use fs_loader::FsModuleLoader;

use std::path::{Path, PathBuf};

use crate::path;

/// Path a specifier points at, if it points at one.
///
/// Absolute paths, `file:` URLs and `./`/`../` relative specifiers resolve;
/// relative ones against the directory of `parent_url` (or the working
/// directory without a parent). Bare specifiers and other URL schemes give
/// `None`.
pub(crate) fn specifier_to_path(specifier: &str, parent_url: Option<&str>) -> Option<PathBuf> {
    if path::has_file_scheme(specifier) {
        return path::file_url_to_path(specifier).ok();
    }
    if specifier.starts_with('/') {
        return path::normalize_from(specifier, Path::new("/")).ok();
    }

    let relative = specifier == "."
        || specifier == ".."
        || specifier.starts_with("./")
        || specifier.starts_with("../");
    if !relative {
        return None;
    }

    match parent_url {
        Some(parent) => {
            let parent = path::normalize(parent).ok()?;
            let base = parent.parent().unwrap_or(Path::new("/"));
            path::normalize_from(specifier, base).ok()
        }
        None => path::normalize(specifier).ok(),
    }
}
