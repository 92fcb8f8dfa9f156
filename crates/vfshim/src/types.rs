//! Core VFS types.
//!
//! These mirror what the native filesystem surface returns (stats, directory
//! entries, file content) so a virtual answer and a native answer are
//! interchangeable for the caller.

use std::time::SystemTime;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Three-way answer to "what is at this path?".
///
/// The numeric form is the legacy encoding module loaders expect from
/// their stat hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StatClassification {
    /// Nothing at the path.
    NotFound,
    /// A regular file.
    File,
    /// A directory.
    Directory,
}

impl StatClassification {
    /// Legacy numeric encoding: -2 missing, 0 file, 1 directory.
    pub fn code(self) -> i32 {
        match self {
            StatClassification::NotFound => -2,
            StatClassification::File => 0,
            StatClassification::Directory => 1,
        }
    }

    /// Decode the legacy numeric form. Unknown codes mean "not found".
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => StatClassification::File,
            1 => StatClassification::Directory,
            _ => StatClassification::NotFound,
        }
    }

    /// Returns true for anything but `NotFound`.
    pub fn exists(self) -> bool {
        !matches!(self, StatClassification::NotFound)
    }
}

/// File type enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileType {
    /// Regular file.
    File,
    /// Directory.
    Directory,
    /// Symbolic link.
    Symlink,
    /// Sockets, fifos, devices.
    Other,
}

impl FileType {
    /// Returns true if this is a regular file.
    pub fn is_file(&self) -> bool {
        matches!(self, FileType::File)
    }

    /// Returns true if this is a directory.
    pub fn is_dir(&self) -> bool {
        matches!(self, FileType::Directory)
    }

    /// Returns true if this is a symbolic link.
    pub fn is_symlink(&self) -> bool {
        matches!(self, FileType::Symlink)
    }
}

/// Stat result, shaped like the native one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stats {
    /// Size in bytes.
    pub size: u64,
    /// File type.
    pub kind: FileType,
    /// Unix permission bits (e.g., 0o644).
    pub mode: u32,
    /// Last modification time.
    pub mtime: SystemTime,
    /// Last access time.
    pub atime: SystemTime,
    /// Last status change time.
    pub ctime: SystemTime,
    /// Number of hard links.
    pub nlink: u64,
    /// Owner user ID (0 for virtual entries).
    pub uid: u32,
    /// Owner group ID (0 for virtual entries).
    pub gid: u32,
}

impl Stats {
    fn with_kind(kind: FileType, size: u64, mode: u32, nlink: u64) -> Self {
        let now = SystemTime::now();
        Self {
            size,
            kind,
            mode,
            mtime: now,
            atime: now,
            ctime: now,
            nlink,
            uid: 0,
            gid: 0,
        }
    }

    /// Stats for a regular file.
    pub fn file(size: u64, mode: u32) -> Self {
        Self::with_kind(FileType::File, size, mode, 1)
    }

    /// Stats for a directory.
    pub fn directory(mode: u32) -> Self {
        Self::with_kind(FileType::Directory, 0, mode, 2) // . and ..
    }

    /// Stats for a symlink; size is the target length.
    pub fn symlink(target_len: u64) -> Self {
        Self::with_kind(FileType::Symlink, target_len, 0o777, 1)
    }

    /// All-zero stats, reported to `watch_file` listeners for a path that
    /// does not exist.
    pub fn absent() -> Self {
        Self {
            size: 0,
            kind: FileType::File,
            mode: 0,
            mtime: SystemTime::UNIX_EPOCH,
            atime: SystemTime::UNIX_EPOCH,
            ctime: SystemTime::UNIX_EPOCH,
            nlink: 0,
            uid: 0,
            gid: 0,
        }
    }

    /// Returns true if this is a regular file.
    pub fn is_file(&self) -> bool {
        self.kind.is_file()
    }

    /// Returns true if this is a directory.
    pub fn is_dir(&self) -> bool {
        self.kind.is_dir()
    }

    /// Returns true if this is a symbolic link.
    pub fn is_symlink(&self) -> bool {
        self.kind.is_symlink()
    }

    /// Collapse to the module-stat view. Anything that is not a directory
    /// counts as a file.
    pub fn classification(&self) -> StatClassification {
        if self.is_dir() {
            StatClassification::Directory
        } else {
            StatClassification::File
        }
    }
}

/// Directory entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirEntry {
    /// Entry name (not full path).
    pub name: String,
    /// Entry type.
    pub kind: FileType,
}

impl DirEntry {
    /// Create a new directory entry.
    pub fn new(name: impl Into<String>, kind: FileType) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    /// Create a file entry.
    pub fn file(name: impl Into<String>) -> Self {
        Self::new(name, FileType::File)
    }

    /// Create a directory entry.
    pub fn directory(name: impl Into<String>) -> Self {
        Self::new(name, FileType::Directory)
    }
}

/// Text encodings accepted by `read_file`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Encoding {
    #[strum(serialize = "utf8", serialize = "utf-8")]
    Utf8,
    #[strum(serialize = "latin1", serialize = "binary")]
    Latin1,
    Hex,
    Base64,
}

impl Encoding {
    /// Decode raw bytes into text.
    pub fn decode(self, bytes: &[u8]) -> String {
        match self {
            Encoding::Utf8 => String::from_utf8_lossy(bytes).into_owned(),
            Encoding::Latin1 => bytes.iter().map(|&b| b as char).collect(),
            Encoding::Hex => hex::encode(bytes),
            Encoding::Base64 => BASE64.encode(bytes),
        }
    }
}

/// Options for `read_file`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadOptions {
    /// When set, content comes back as text in this encoding.
    pub encoding: Option<Encoding>,
}

impl ReadOptions {
    /// Read as text in `encoding`.
    pub fn encoding(encoding: Encoding) -> Self {
        Self {
            encoding: Some(encoding),
        }
    }
}

/// Result of `read_file`: raw bytes, or text when an encoding was requested.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileContent {
    Bytes(Vec<u8>),
    Text(String),
}

impl FileContent {
    /// Shape raw bytes according to `opts`.
    pub fn from_bytes(bytes: Vec<u8>, opts: &ReadOptions) -> Self {
        match opts.encoding {
            None => FileContent::Bytes(bytes),
            Some(encoding) => FileContent::Text(encoding.decode(&bytes)),
        }
    }

    /// Text view, if this is text.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FileContent::Text(s) => Some(s),
            FileContent::Bytes(_) => None,
        }
    }

    /// Byte view. Text is returned in its encoded form.
    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            FileContent::Bytes(b) => b,
            FileContent::Text(s) => s.into_bytes(),
        }
    }

    /// Length of the payload in bytes.
    pub fn len(&self) -> usize {
        match self {
            FileContent::Bytes(b) => b.len(),
            FileContent::Text(s) => s.len(),
        }
    }

    /// Returns true if the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
