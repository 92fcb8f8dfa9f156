//! Module formats and builtin detection.

use serde::{Deserialize, Serialize};
use std::path::Path;
use strum::{Display, EnumString};

/// How a loaded module's source is to be evaluated.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ModuleFormat {
    /// ES module.
    Module,
    /// CommonJS.
    #[default]
    CommonJs,
    Json,
    /// Provided by the host; has no source.
    Builtin,
}

/// Format for `path` by extension, `default` when the extension says
/// nothing.
pub fn infer_format(path: &Path, default: ModuleFormat) -> ModuleFormat {
    match path.extension().and_then(|e| e.to_str()) {
        Some("mjs") => ModuleFormat::Module,
        Some("cjs") => ModuleFormat::CommonJs,
        Some("json") => ModuleFormat::Json,
        _ => default,
    }
}

/// Host builtin module names.
pub const DEFAULT_BUILTINS: &[&str] = &[
    "assert",
    "async_hooks",
    "buffer",
    "child_process",
    "cluster",
    "console",
    "constants",
    "crypto",
    "dgram",
    "dns",
    "domain",
    "events",
    "fs",
    "fs/promises",
    "http",
    "http2",
    "https",
    "inspector",
    "module",
    "net",
    "os",
    "path",
    "perf_hooks",
    "process",
    "punycode",
    "querystring",
    "readline",
    "repl",
    "stream",
    "stream/web",
    "string_decoder",
    "sys",
    "timers",
    "timers/promises",
    "tls",
    "trace_events",
    "tty",
    "url",
    "util",
    "v8",
    "vm",
    "wasi",
    "worker_threads",
    "zlib",
];

/// A specifier names a builtin if it carries the `node:` scheme or is one
/// of `builtins`.
pub fn is_builtin<S: AsRef<str>>(specifier: &str, builtins: &[S]) -> bool {
    specifier.starts_with("node:") || builtins.iter().any(|b| b.as_ref() == specifier)
}

/// `node:<name>` form of a builtin specifier.
pub fn builtin_url(specifier: &str) -> String {
    if specifier.starts_with("node:") {
        specifier.to_string()
    } else {
        format!("node:{specifier}")
    }
}
