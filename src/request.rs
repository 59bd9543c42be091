//! Callback-style surface over the operation catalog
//!
//! [`Connection::submit`] takes a [`Request`] and a completion callback. The
//! request is validated synchronously; invalid requests are rejected with
//! `InvalidArgument` and the callback is never called. Valid requests run on a
//! detached task of the caller's runtime, and the callback receives exactly
//! one [`Reply`] or error, on the caller's thread, once the worker finishes.

use crate::connection::{validate_host, validate_length, validate_path, Connection};
use crate::dispatch::{deliver, OpKind};
use crate::error::Result;
use crate::handle_table::HandleId;
use crate::remote::{OpenFlags, RemoteClient};
use crate::translate::{DirectoryListing, FileStatus};
use std::sync::Arc;
use tracing::trace;

/// One catalog operation with its owned inputs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// Establish the session
    Connect {
        /// Remote host
        host: String,
        /// Remote port
        port: u16,
    },
    /// Release the session
    Disconnect,
    /// Status of a path
    Stat {
        /// Remote path
        path: String,
    },
    /// Directory listing
    List {
        /// Remote path
        path: String,
    },
    /// Open a file
    Open {
        /// Remote path
        path: String,
        /// Open flags
        flags: OpenFlags,
    },
    /// Close a file
    Close {
        /// Handle to close
        handle: HandleId,
    },
    /// Positional read
    Read {
        /// Handle to read from
        handle: HandleId,
        /// Byte offset
        offset: u64,
        /// Maximum bytes to read
        length: usize,
    },
    /// Write and flush
    Write {
        /// Handle to write to
        handle: HandleId,
        /// Bytes to write
        data: Vec<u8>,
    },
    /// Create a directory
    Mkdir {
        /// Remote path
        path: String,
    },
    /// Check a path
    Exists {
        /// Remote path
        path: String,
    },
    /// Delete a path
    Delete {
        /// Remote path
        path: String,
    },
}

impl Request {
    /// Operation kind
    #[must_use]
    pub const fn kind(&self) -> OpKind {
        match self {
            Self::Connect { .. } => OpKind::Connect,
            Self::Disconnect => OpKind::Disconnect,
            Self::Stat { .. } => OpKind::Stat,
            Self::List { .. } => OpKind::List,
            Self::Open { .. } => OpKind::Open,
            Self::Close { .. } => OpKind::Close,
            Self::Read { .. } => OpKind::Read,
            Self::Write { .. } => OpKind::Write,
            Self::Mkdir { .. } => OpKind::Mkdir,
            Self::Exists { .. } => OpKind::Exists,
            Self::Delete { .. } => OpKind::Delete,
        }
    }

    /// Check parameters without touching any connection state
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for an empty host, an empty path or one with
    /// a NUL byte, open flags with conflicting access modes, or a transfer
    /// longer than `i32::MAX` bytes.
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Connect { host, .. } => validate_host(host),
            Self::Open { path, flags } => {
                validate_path(path)?;
                flags.validate().map(|_| ())
            }
            Self::Stat { path }
            | Self::List { path }
            | Self::Mkdir { path }
            | Self::Exists { path }
            | Self::Delete { path } => validate_path(path),
            Self::Read { length, .. } => validate_length(OpKind::Read, *length),
            Self::Write { data, .. } => validate_length(OpKind::Write, data.len()),
            Self::Disconnect | Self::Close { .. } => Ok(()),
        }
    }
}

/// Typed success value of a [`Request`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Session established; failures surface as errors, not a flag
    Connected,
    /// Session released
    Disconnected,
    /// Result of `Stat`
    Status(FileStatus),
    /// Result of `List`
    Listing(DirectoryListing),
    /// Result of `Open`
    Opened(HandleId),
    /// Result of `Close`
    Closed,
    /// Result of `Read`
    Data(Vec<u8>),
    /// Result of `Write`: bytes written and flushed
    Written(usize),
    /// Native result code of `Mkdir`, `Exists` or `Delete`
    Code(i32),
}

impl<C: RemoteClient> Connection<C> {
    /// Run a request to completion
    ///
    /// # Errors
    ///
    /// Whatever the corresponding catalog operation returns.
    pub async fn execute(&self, request: Request) -> Result<Reply> {
        match request {
            Request::Connect { host, port } => {
                self.connect(&host, port).await.map(|()| Reply::Connected)
            }
            Request::Disconnect => self.disconnect().await.map(|()| Reply::Disconnected),
            Request::Stat { path } => self.stat(&path).await.map(Reply::Status),
            Request::List { path } => self.list(&path).await.map(Reply::Listing),
            Request::Open { path, flags } => self.open(&path, flags).await.map(Reply::Opened),
            Request::Close { handle } => self.close(handle).await.map(|()| Reply::Closed),
            Request::Read {
                handle,
                offset,
                length,
            } => self.read(handle, offset, length).await.map(Reply::Data),
            Request::Write { handle, data } => self.write(handle, data).await.map(Reply::Written),
            Request::Mkdir { path } => self.mkdir(&path).await.map(Reply::Code),
            Request::Exists { path } => self.exists(&path).await.map(Reply::Code),
            Request::Delete { path } => self.delete(&path).await.map(Reply::Code),
        }
    }

    /// Schedule a request and deliver its outcome to `callback`
    ///
    /// Returns once the request is scheduled; the callback runs later on this
    /// runtime, exactly once. A panicking callback is handled according to
    /// the connection's panic policy.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` synchronously if the request is malformed.
    /// The callback is dropped without being called in that case.
    pub fn submit<F>(&self, request: Request, callback: F) -> Result<()>
    where
        F: FnOnce(Result<Reply>) + 'static,
    {
        request.validate()?;
        let op = request.kind();
        let connection = self.clone();
        let stats = Arc::clone(self.shared_stats());
        let policy = self.options().panic_policy();
        trace!(%op, "request submitted");

        compio::runtime::spawn(async move {
            let result = connection.execute(request).await;
            deliver(&stats, policy, op, callback, result);
        })
        .detach();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Request::Connect { host: String::new(), port: 1 }, false)]
    #[case(Request::Connect { host: "nn".to_string(), port: 8020 }, true)]
    #[case(Request::Stat { path: String::new() }, false)]
    #[case(Request::Delete { path: "/a\0".to_string() }, false)]
    #[case(Request::Open { path: "/a".to_string(), flags: OpenFlags::RDONLY }, true)]
    #[case(Request::Open { path: "/a".to_string(), flags: OpenFlags::WRONLY | OpenFlags::RDWR }, false)]
    #[case(Request::Close { handle: HandleId::new(999) }, true)]
    #[case(Request::Read { handle: HandleId::new(0), offset: 0, length: usize::MAX }, false)]
    #[case(Request::Disconnect, true)]
    fn test_validate(#[case] request: Request, #[case] ok: bool) {
        assert_eq!(request.validate().is_ok(), ok, "{request:?}");
    }

    #[test]
    fn test_kind_names() {
        assert_eq!(Request::Mkdir { path: "/d".into() }.kind().as_str(), "mkdir");
        assert_eq!(
            Request::Write { handle: HandleId::new(0), data: vec![] }.kind(),
            OpKind::Write
        );
    }
}
