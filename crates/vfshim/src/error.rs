//! VFS error types.
//!
//! Every variant carries the same shape as a native filesystem error (code,
//! syscall, path) so callers that only know the real filesystem can handle
//! virtual failures without special-casing them.

use std::io;
use thiserror::Error;

/// VFS error type.
#[derive(Debug, Error)]
pub enum VfsError {
    /// File or directory not found.
    #[error("ENOENT: no such file or directory, {syscall} '{path}'")]
    NotFound { syscall: &'static str, path: String },

    /// Expected a file, found a directory.
    #[error("EISDIR: illegal operation on a directory, {syscall} '{path}'")]
    IsADirectory { syscall: &'static str, path: String },

    /// Expected a directory.
    #[error("ENOTDIR: not a directory, {syscall} '{path}'")]
    NotADirectory { syscall: &'static str, path: String },

    /// Too many symbolic links.
    #[error("ELOOP: too many symbolic links encountered, {syscall} '{path}'")]
    Loop { syscall: &'static str, path: String },

    /// Invalid argument (e.g. readlink on something that is not a link).
    #[error("EINVAL: invalid argument, {syscall} '{path}'")]
    InvalidArgument { syscall: &'static str, path: String },

    /// The backend does not implement an optional capability.
    #[error("ENOSYS: function not implemented, {syscall} '{path}'")]
    Unsupported { syscall: &'static str, path: String },

    /// Backend classified a path as a file but cannot produce its content.
    #[error("EIO: i/o error, read '{path}': {reason}")]
    ReadFailure { path: String, reason: String },

    /// A module hook or an async backend step rejected.
    #[error("module hook failed for '{specifier}': {reason}")]
    HostHook { specifier: String, reason: String },

    /// The terminal module loader could not resolve a specifier.
    #[error("Cannot find module '{specifier}' imported from {parent}")]
    ModuleNotFound { specifier: String, parent: String },

    /// Input could not be normalized into a path.
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// Other native I/O error.
    #[error("{syscall} '{path}': {source}")]
    Io {
        syscall: &'static str,
        path: String,
        #[source]
        source: io::Error,
    },
}

impl VfsError {
    /// Create a NotFound error.
    pub fn not_found(syscall: &'static str, path: impl Into<String>) -> Self {
        Self::NotFound { syscall, path: path.into() }
    }

    /// Create an IsADirectory error.
    pub fn is_a_directory(syscall: &'static str, path: impl Into<String>) -> Self {
        Self::IsADirectory { syscall, path: path.into() }
    }

    /// Create a NotADirectory error.
    pub fn not_a_directory(syscall: &'static str, path: impl Into<String>) -> Self {
        Self::NotADirectory { syscall, path: path.into() }
    }

    /// Create a Loop error.
    pub fn symlink_loop(syscall: &'static str, path: impl Into<String>) -> Self {
        Self::Loop { syscall, path: path.into() }
    }

    /// Create an InvalidArgument error.
    pub fn invalid_argument(syscall: &'static str, path: impl Into<String>) -> Self {
        Self::InvalidArgument { syscall, path: path.into() }
    }

    /// Create an Unsupported error.
    pub fn unsupported(syscall: &'static str, path: impl Into<String>) -> Self {
        Self::Unsupported { syscall, path: path.into() }
    }

    /// Create a ReadFailure error.
    pub fn read_failure(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ReadFailure { path: path.into(), reason: reason.into() }
    }

    /// Create a HostHook error.
    pub fn host_hook(specifier: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::HostHook { specifier: specifier.into(), reason: reason.into() }
    }

    /// Create an InvalidPath error.
    pub fn invalid_path(input: impl Into<String>) -> Self {
        Self::InvalidPath(input.into())
    }

    /// Fold a native I/O error into the matching variant.
    ///
    /// Kinds that have a dedicated variant map onto it, so a native ENOENT and
    /// a virtual ENOENT compare equal by `code()`.
    pub fn from_io(syscall: &'static str, path: impl Into<String>, err: io::Error) -> Self {
        let path = path.into();
        match err.kind() {
            io::ErrorKind::NotFound => Self::NotFound { syscall, path },
            io::ErrorKind::IsADirectory => Self::IsADirectory { syscall, path },
            io::ErrorKind::NotADirectory => Self::NotADirectory { syscall, path },
            _ => Self::Io { syscall, path, source: err },
        }
    }

    /// Native-style error code (`ENOENT`, `EISDIR`, ...).
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "ENOENT",
            Self::IsADirectory { .. } => "EISDIR",
            Self::NotADirectory { .. } => "ENOTDIR",
            Self::Loop { .. } => "ELOOP",
            Self::InvalidArgument { .. } => "EINVAL",
            Self::Unsupported { .. } => "ENOSYS",
            Self::ReadFailure { .. } => "EIO",
            Self::HostHook { .. } => "ERR_VFS_HOOK",
            Self::ModuleNotFound { .. } => "ERR_MODULE_NOT_FOUND",
            Self::InvalidPath(_) => "ERR_INVALID_ARG_VALUE",
            Self::Io { source, .. } => match source.kind() {
                io::ErrorKind::PermissionDenied => "EACCES",
                io::ErrorKind::AlreadyExists => "EEXIST",
                io::ErrorKind::DirectoryNotEmpty => "ENOTEMPTY",
                io::ErrorKind::InvalidInput => "EINVAL",
                _ => "EIO",
            },
        }
    }

    /// Name of the syscall that failed, when the error came from one.
    pub fn syscall(&self) -> Option<&'static str> {
        match self {
            Self::NotFound { syscall, .. }
            | Self::IsADirectory { syscall, .. }
            | Self::NotADirectory { syscall, .. }
            | Self::Loop { syscall, .. }
            | Self::InvalidArgument { syscall, .. }
            | Self::Unsupported { syscall, .. }
            | Self::Io { syscall, .. } => Some(syscall),
            Self::ReadFailure { .. } => Some("read"),
            Self::HostHook { .. } | Self::ModuleNotFound { .. } | Self::InvalidPath(_) => None,
        }
    }

    /// Path the error refers to.
    pub fn path(&self) -> Option<&str> {
        match self {
            Self::NotFound { path, .. }
            | Self::IsADirectory { path, .. }
            | Self::NotADirectory { path, .. }
            | Self::Loop { path, .. }
            | Self::InvalidArgument { path, .. }
            | Self::Unsupported { path, .. }
            | Self::ReadFailure { path, .. }
            | Self::Io { path, .. } => Some(path),
            Self::InvalidPath(input) => Some(input),
            Self::HostHook { .. } | Self::ModuleNotFound { .. } => None,
        }
    }

    /// Returns true for ENOENT.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Convert VfsError to std::io::Error for compatibility.
impl From<VfsError> for io::Error {
    fn from(e: VfsError) -> Self {
        match e {
            VfsError::NotFound { .. } => io::Error::new(io::ErrorKind::NotFound, e.to_string()),
            VfsError::IsADirectory { .. } => {
                io::Error::new(io::ErrorKind::IsADirectory, e.to_string())
            }
            VfsError::NotADirectory { .. } => {
                io::Error::new(io::ErrorKind::NotADirectory, e.to_string())
            }
            VfsError::InvalidArgument { .. } | VfsError::InvalidPath(_) => {
                io::Error::new(io::ErrorKind::InvalidInput, e.to_string())
            }
            VfsError::Unsupported { .. } => {
                io::Error::new(io::ErrorKind::Unsupported, e.to_string())
            }
            VfsError::ModuleNotFound { .. } => {
                io::Error::new(io::ErrorKind::NotFound, e.to_string())
            }
            VfsError::Io { source, .. } => source,
            VfsError::Loop { .. } | VfsError::ReadFailure { .. } | VfsError::HostHook { .. } => {
                io::Error::other(e.to_string())
            }
        }
    }
}

/// VFS result type.
pub type VfsResult<T> = Result<T, VfsError>;
