//! Blocking client and session traits
//!
//! These traits describe the consumed library exactly at its interface
//! boundary. Every method may block; the bridge only ever calls them from a
//! worker thread.

use super::{NativeFileInfo, OpenFlags};

/// Factory for remote sessions
///
/// # Examples
///
/// ```rust,ignore
/// use ahdfs::remote::RemoteClient;
///
/// let session = client.connect("namenode", 8020).expect("connect");
/// ```
pub trait RemoteClient: Send + Sync + 'static {
    /// Session type produced by [`RemoteClient::connect`]
    type Session: RemoteSession;

    /// Establish a session with the remote service
    ///
    /// Blocks while the connection is negotiated. Returns `None` when the
    /// session cannot be established.
    fn connect(&self, host: &str, port: u16) -> Option<Self::Session>;

    /// Short backend name for logging
    fn name(&self) -> &'static str {
        "unknown"
    }
}

/// An established session with the remote service
///
/// A session is shared by every in-flight request scoped to one connection, so
/// implementations must tolerate concurrent calls from several workers.
pub trait RemoteSession: Send + Sync + 'static {
    /// Open file type
    type File: Send + Sync + 'static;

    /// Tear the session down
    ///
    /// Returns 0 on success. Called exactly once, after the last request and
    /// the last open file referencing the session are gone.
    fn disconnect(&self) -> i32;

    /// Open a remote file
    ///
    /// Returns `None` if the path does not exist (read) or cannot be created
    /// (write), or if the flag combination is unsupported.
    fn open_file(&self, path: &str, flags: OpenFlags) -> Option<Self::File>;

    /// Close a remote file; returns 0 on success
    fn close_file(&self, file: &Self::File) -> i32;

    /// Read up to `buf.len()` bytes at `position`
    ///
    /// Returns the number of bytes read (0 at or beyond end of file), or a
    /// negative value on failure.
    fn pread(&self, file: &Self::File, position: u64, buf: &mut [u8]) -> i32;

    /// Append `buf` to the file; returns bytes written or a negative value
    fn write(&self, file: &Self::File, buf: &[u8]) -> i32;

    /// Push buffered data to the service; returns 0 on success
    fn flush(&self, file: &Self::File) -> i32;

    /// Fetch the status record of a path, `None` if it does not exist
    fn get_path_info(&self, path: &str) -> Option<NativeFileInfo>;

    /// List a directory, `None` if the path does not exist
    fn list_directory(&self, path: &str) -> Option<Vec<NativeFileInfo>>;

    /// Create a directory and its parents; returns 0 on success
    fn create_directory(&self, path: &str) -> i32;

    /// Check a path; returns 0 if it exists
    fn exists(&self, path: &str) -> i32;

    /// Delete a path recursively; returns 0 on success
    fn delete(&self, path: &str) -> i32;
}
