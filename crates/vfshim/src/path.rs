//! Path normalization.
//!
//! Every path handed to a backend or to the router goes through here first,
//! so backends can compare plain absolute paths without worrying about
//! `file:` URLs, backslashes or `..` segments.
//!
//! Normalization is purely lexical. Nothing here touches the filesystem and
//! symlinks are never followed.

use std::path::{Path, PathBuf};

use url::Url;

use crate::error::{VfsError, VfsResult};

/// Normalize `input` against the process working directory.
pub fn normalize(input: &str) -> VfsResult<PathBuf> {
    let cwd = std::env::current_dir().map_err(|e| VfsError::from_io("cwd", input, e))?;
    normalize_from(input, &cwd)
}

/// Normalize `input`, resolving a relative path against `base`.
///
/// Accepts plain paths and `file:` URLs. The result is absolute, uses `/`
/// separators, has no `.`/`..`/empty segments and no trailing slash (the
/// root itself excepted).
pub fn normalize_from(input: &str, base: &Path) -> VfsResult<PathBuf> {
    if !is_normalizable(input) {
        return Err(VfsError::invalid_path(input));
    }

    if has_file_scheme(input) {
        return file_url_to_path(input);
    }

    let unified = input.replace('\\', "/");
    if unified.starts_with('/') {
        Ok(collapse(&unified))
    } else {
        let base = base.to_string_lossy().replace('\\', "/");
        Ok(collapse(&format!("{base}/{unified}")))
    }
}

/// Whether `input` can be turned into a path at all.
///
/// Empty strings, strings containing NUL, drive-letter paths (`C:\x`),
/// URLs with a scheme other than `file:` and `file:` URLs pointing at a
/// remote host are rejected.
pub fn is_normalizable(input: &str) -> bool {
    if input.is_empty() || input.contains('\0') || has_drive_letter(input) {
        return false;
    }

    match scheme_of(input) {
        None => true,
        Some(scheme) if scheme.eq_ignore_ascii_case("file") => match Url::parse(input) {
            Ok(url) => url
                .host_str()
                .is_none_or(|host| host.is_empty() || host == "localhost"),
            Err(_) => false,
        },
        Some(_) => false,
    }
}

/// Convert a `file:` URL into a normalized absolute path.
pub fn file_url_to_path(input: &str) -> VfsResult<PathBuf> {
    let url = Url::parse(input).map_err(|_| VfsError::invalid_path(input))?;
    if url.scheme() != "file" {
        return Err(VfsError::invalid_path(input));
    }
    let path = url
        .to_file_path()
        .map_err(|_| VfsError::invalid_path(input))?;
    Ok(collapse(&path.to_string_lossy().replace('\\', "/")))
}

/// Render an absolute path as a `file:` URL.
pub fn path_to_file_url(path: &Path) -> VfsResult<String> {
    Url::from_file_path(path)
        .map(String::from)
        .map_err(|_| VfsError::invalid_path(path.display().to_string()))
}

/// True when `path` is `mount` or lies beneath it (component-wise, so
/// `/virtual-other` is not under `/virtual`).
pub fn is_under_mount_point(path: &Path, mount: &Path) -> bool {
    path.starts_with(mount)
}

/// Path of `path` relative to `mount`, rooted at `/`.
///
/// `/virt/lib/a.js` under `/virt` becomes `/lib/a.js`; the mount point
/// itself becomes `/`. Returns `None` when `path` is outside the mount.
pub fn relative_to_mount(path: &Path, mount: &Path) -> Option<PathBuf> {
    let rest = path.strip_prefix(mount).ok()?;
    let mut internal = PathBuf::from("/");
    if !rest.as_os_str().is_empty() {
        internal.push(rest);
    }
    Some(internal)
}

/// Inverse of [`relative_to_mount`].
pub fn join_mount_path(mount: &Path, internal: &Path) -> PathBuf {
    let rest = internal.strip_prefix("/").unwrap_or(internal);
    if rest.as_os_str().is_empty() {
        mount.to_path_buf()
    } else {
        mount.join(rest)
    }
}

/// Returns true if `input` starts with a `file:` scheme.
pub(crate) fn has_file_scheme(input: &str) -> bool {
    scheme_of(input).is_some_and(|s| s.eq_ignore_ascii_case("file"))
}

/// `C:`, `C:\x` or `c:/x`. These name another volume, which a `/`-rooted
/// path cannot express.
fn has_drive_letter(input: &str) -> bool {
    let bytes = input.as_bytes();
    bytes.len() >= 2
        && bytes[0].is_ascii_alphabetic()
        && bytes[1] == b':'
        && bytes.get(2).is_none_or(|&b| matches!(b, b'/' | b'\\'))
}

/// URL scheme of `input`, if it has one.
///
/// Single-letter schemes are treated as drive letters (`C:\...`), not URLs.
fn scheme_of(input: &str) -> Option<&str> {
    let colon = input.find(':')?;
    let scheme = &input[..colon];
    let mut chars = scheme.chars();
    let first = chars.next()?;
    if scheme.len() < 2 || !first.is_ascii_alphabetic() {
        return None;
    }
    chars
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        .then_some(scheme)
}

/// Collapse `.`, `..` and repeated separators in an absolute `/` path.
fn collapse(path: &str) -> PathBuf {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }
    PathBuf::from(format!("/{}", segments.join("/")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_collapses_segments() {
        let base = Path::new("/work");
        assert_eq!(
            normalize_from("/virt//lib/./x/../a.js", base).unwrap(),
            PathBuf::from("/virt/lib/a.js")
        );
        assert_eq!(normalize_from("/virt/", base).unwrap(), PathBuf::from("/virt"));
        assert_eq!(normalize_from("/../..", base).unwrap(), PathBuf::from("/"));
    }

    #[test]
    fn test_normalize_relative_and_backslashes() {
        let base = Path::new("/work/app");
        assert_eq!(
            normalize_from("src\\index.js", base).unwrap(),
            PathBuf::from("/work/app/src/index.js")
        );
        assert_eq!(
            normalize_from("../lib", base).unwrap(),
            PathBuf::from("/work/lib")
        );
    }

    #[test]
    fn test_normalize_file_url() {
        let base = Path::new("/");
        assert_eq!(
            normalize_from("file:///virt/a%20b.js", base).unwrap(),
            PathBuf::from("/virt/a b.js")
        );
        assert_eq!(
            normalize_from("file://localhost/virt/x.mjs", base).unwrap(),
            PathBuf::from("/virt/x.mjs")
        );
    }

    #[test]
    fn test_is_normalizable() {
        assert!(is_normalizable("/a"));
        assert!(is_normalizable("relative/b"));
        assert!(is_normalizable("file:///a"));
        assert!(!is_normalizable("C:\\temp"));
        assert!(!is_normalizable("c:/temp"));
        assert!(!is_normalizable("D:"));
        assert!(is_normalizable("a:b"));
        assert!(!is_normalizable(""));
        assert!(!is_normalizable("/a\0b"));
        assert!(!is_normalizable("https://example.com/a.js"));
        assert!(!is_normalizable("node:fs"));
        assert!(!is_normalizable("file://remote-host/share/a.js"));

        let err = normalize_from("https://example.com/a.js", Path::new("/")).unwrap_err();
        assert_eq!(err.code(), "ERR_INVALID_ARG_VALUE");
        let err = normalize_from("C:\\x", Path::new("/home")).unwrap_err();
        assert_eq!(err.code(), "ERR_INVALID_ARG_VALUE");
    }

    #[test]
    fn test_mount_helpers() {
        let mount = Path::new("/virtual");
        assert!(is_under_mount_point(Path::new("/virtual/a.js"), mount));
        assert!(is_under_mount_point(Path::new("/virtual"), mount));
        assert!(!is_under_mount_point(Path::new("/virtual-other/a.js"), mount));

        assert_eq!(
            relative_to_mount(Path::new("/virtual/lib/a.js"), mount),
            Some(PathBuf::from("/lib/a.js"))
        );
        assert_eq!(
            relative_to_mount(Path::new("/virtual"), mount),
            Some(PathBuf::from("/"))
        );
        assert_eq!(relative_to_mount(Path::new("/elsewhere"), mount), None);

        assert_eq!(
            join_mount_path(mount, Path::new("/lib/a.js")),
            PathBuf::from("/virtual/lib/a.js")
        );
        assert_eq!(join_mount_path(mount, Path::new("/")), PathBuf::from("/virtual"));
    }

    #[test]
    fn test_path_to_file_url() {
        assert_eq!(
            path_to_file_url(Path::new("/virt/a b.js")).unwrap(),
            "file:///virt/a%20b.js"
        );
        assert!(path_to_file_url(Path::new("relative")).is_err());
    }
}
