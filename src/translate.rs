//! Translation of library-native results into caller-visible values
//!
//! Pure functions only: no I/O, no shared state. Native records are taken by
//! value, so each one is released exactly once whether translation succeeds
//! or not.

use crate::dispatch::OpKind;
use crate::error::{BridgeError, Result};
use crate::remote::native::{KIND_DIRECTORY, KIND_FILE};
use crate::remote::NativeFileInfo;
use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Kind of a remote path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileKind {
    /// Regular file
    File,
    /// Directory
    Directory,
    /// Anything else the service reports
    Other,
}

impl FileKind {
    /// Map a native kind byte
    #[must_use]
    pub const fn from_native(kind: u8) -> Self {
        match kind {
            KIND_FILE => Self::File,
            KIND_DIRECTORY => Self::Directory,
            _ => Self::Other,
        }
    }

    /// Name as shown to callers: `file`, `directory` or `other`
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Directory => "directory",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable snapshot of a remote path's status
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStatus {
    /// File, directory or other
    pub kind: FileKind,
    /// Full path as reported by the service
    pub path: String,
    /// Size in bytes
    pub size: u64,
    /// Replication factor
    pub replication: u16,
    /// Block size in bytes
    pub block_size: u64,
    /// Owning user
    pub owner: String,
    /// Owning group
    pub group: String,
    /// Permission bits
    pub permissions: u16,
    /// Last modification time
    pub modified: SystemTime,
    /// Last access time
    pub accessed: SystemTime,
}

impl FileStatus {
    /// Whether this is a regular file
    #[must_use]
    pub fn is_file(&self) -> bool {
        self.kind == FileKind::File
    }

    /// Whether this is a directory
    #[must_use]
    pub fn is_dir(&self) -> bool {
        self.kind == FileKind::Directory
    }
}

impl From<NativeFileInfo> for FileStatus {
    fn from(info: NativeFileInfo) -> Self {
        Self {
            kind: FileKind::from_native(info.kind),
            path: info.name,
            size: u64::try_from(info.size).unwrap_or(0),
            replication: u16::try_from(info.replication).unwrap_or(0),
            block_size: u64::try_from(info.block_size).unwrap_or(0),
            owner: info.owner,
            group: info.group,
            #[allow(clippy::cast_sign_loss)] // permission bits are a bit pattern
            permissions: info.permissions as u16,
            modified: epoch_seconds(info.last_mod),
            accessed: epoch_seconds(info.last_access),
        }
    }
}

/// Directory contents, in the order the service returned them
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectoryListing {
    entries: Vec<FileStatus>,
}

impl DirectoryListing {
    /// Translate a native listing
    #[must_use]
    pub fn from_native(records: Vec<NativeFileInfo>) -> Self {
        Self {
            entries: records.into_iter().map(FileStatus::from).collect(),
        }
    }

    /// Entries in service order
    #[must_use]
    pub fn entries(&self) -> &[FileStatus] {
        &self.entries
    }

    /// Number of entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the listing is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over entries
    pub fn iter(&self) -> std::slice::Iter<'_, FileStatus> {
        self.entries.iter()
    }

    /// Take the entries
    #[must_use]
    pub fn into_vec(self) -> Vec<FileStatus> {
        self.entries
    }
}

impl IntoIterator for DirectoryListing {
    type Item = FileStatus;
    type IntoIter = std::vec::IntoIter<FileStatus>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<'a> IntoIterator for &'a DirectoryListing {
    type Item = &'a FileStatus;
    type IntoIter = std::slice::Iter<'a, FileStatus>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// Status of one path; `None` means the path does not exist
///
/// # Errors
///
/// Returns `PathNotFound` when the client returned no record.
pub fn status(path: String, info: Option<NativeFileInfo>) -> Result<FileStatus> {
    info.map(FileStatus::from).ok_or(BridgeError::PathNotFound(path))
}

/// Listing of one directory; `None` means the path does not exist
///
/// # Errors
///
/// Returns `PathNotFound` when the client returned no listing.
pub fn listing(path: String, records: Option<Vec<NativeFileInfo>>) -> Result<DirectoryListing> {
    records
        .map(DirectoryListing::from_native)
        .ok_or(BridgeError::PathNotFound(path))
}

/// Bytes read by a positional read
///
/// The buffer is cut down to what was actually read, so a read at or past end
/// of file yields an empty buffer.
///
/// # Errors
///
/// Returns `Remote` when the client reported a negative count.
pub fn read_bytes(count: i32, mut buffer: Vec<u8>) -> Result<Vec<u8>> {
    let count = usize::try_from(count).map_err(|_| BridgeError::Remote {
        op: OpKind::Read,
        code: count,
    })?;
    buffer.truncate(count);
    Ok(buffer)
}

/// Bytes written by a write followed by a flush
///
/// # Errors
///
/// Returns `Remote` when the write count is negative or the flush failed.
pub fn written_bytes(count: i32, flush_code: i32) -> Result<usize> {
    let count = usize::try_from(count).map_err(|_| BridgeError::Remote {
        op: OpKind::Write,
        code: count,
    })?;
    if flush_code != 0 {
        return Err(BridgeError::Remote {
            op: OpKind::Write,
            code: flush_code,
        });
    }
    Ok(count)
}

fn epoch_seconds(seconds: i64) -> SystemTime {
    UNIX_EPOCH + Duration::from_secs(u64::try_from(seconds).unwrap_or(0))
}
