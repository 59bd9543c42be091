//! Error types for the remote filesystem bridge
//!
//! Every failure the bridge can report is a [`BridgeError`]. Argument errors are
//! returned synchronously at submission; everything else travels through the
//! same completion path as a successful result.

use crate::dispatch::OpKind;
use crate::handle_table::HandleId;
use crate::remote::OpenFlags;

/// Errors produced by the bridge
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// An operation other than `connect` was issued without a live session
    #[error("not connected")]
    NotConnected,

    /// `connect` was called while a session exists or is being established
    #[error("already connected to {0}")]
    AlreadyConnected(String),

    /// The remote client could not establish a session
    #[error("failed to connect to {host}:{port}")]
    ConnectFailed {
        /// Host that was requested
        host: String,
        /// Port that was requested
        port: u16,
    },

    /// The handle id is out of range or not currently allocated
    #[error("invalid file handle: {0}")]
    InvalidHandle(HandleId),

    /// The handle table has no free slot left
    #[error("too many open files (capacity {0})")]
    CapacityExceeded(usize),

    /// The remote path does not exist
    #[error("path does not exist: {0}")]
    PathNotFound(String),

    /// The remote client refused to open a path for writing
    #[error("failed to open {path} with flags {flags}")]
    OpenFailed {
        /// Path that was requested
        path: String,
        /// Flags that were requested
        flags: OpenFlags,
    },

    /// Malformed parameters, rejected before any worker dispatch
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The remote client reported a failure code
    #[error("{op} failed with code {code}")]
    Remote {
        /// Operation that failed
        op: OpKind,
        /// Native return code
        code: i32,
    },

    /// The blocking call panicked on its worker
    #[error("worker panicked during {op}: {message}")]
    WorkerPanicked {
        /// Operation that was running
        op: OpKind,
        /// Panic payload rendered as text
        message: String,
    },

    /// Local I/O failure (local side of a transfer)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    /// Whether this error was raised synchronously by argument validation
    #[must_use]
    pub const fn is_argument_error(&self) -> bool {
        matches!(self, Self::InvalidArgument(_))
    }
}

/// Result alias used across the crate
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Build an [`BridgeError::InvalidArgument`] from anything printable
pub(crate) fn invalid_argument(message: impl Into<String>) -> BridgeError {
    BridgeError::InvalidArgument(message.into())
}
