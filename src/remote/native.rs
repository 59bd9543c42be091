//! Native status records as handed back by the client library

/// Kind byte for regular files
pub const KIND_FILE: u8 = b'F';

/// Kind byte for directories
pub const KIND_DIRECTORY: u8 = b'D';

/// A library-native file status record
///
/// Field widths follow the library's own types. The record is an owned value:
/// whoever consumes it releases it, so passing it by value into the translator
/// frees it exactly once on every path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeFileInfo {
    /// `F` for files, `D` for directories, anything else for other kinds
    pub kind: u8,
    /// Full path of the entry
    pub name: String,
    /// Last modification time, seconds since the epoch
    pub last_mod: i64,
    /// Size in bytes
    pub size: i64,
    /// Replication factor
    pub replication: i16,
    /// Block size in bytes
    pub block_size: i64,
    /// Owning user
    pub owner: String,
    /// Owning group
    pub group: String,
    /// Permission bits
    pub permissions: i16,
    /// Last access time, seconds since the epoch
    pub last_access: i64,
}
