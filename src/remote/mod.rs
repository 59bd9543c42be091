//! Boundary to the blocking remote filesystem client library
//!
//! The bridge never talks to the network itself. It drives an implementation of
//! [`RemoteClient`] / [`RemoteSession`], whose methods block for the full
//! duration of the remote call and signal failure through sentinel returns:
//! `None` for handle- and record-producing calls, a negative count for byte
//! transfers, and a non-zero code for path operations.
//!
//! Concrete implementations live in [`crate::backends`].

pub mod flags;
pub mod native;
pub mod session;

pub use flags::OpenFlags;
pub use native::NativeFileInfo;
pub use session::{RemoteClient, RemoteSession};

/// Session type produced by a client
pub type SessionOf<C> = <C as RemoteClient>::Session;

/// File type produced by a client's sessions
pub type FileOf<C> = <SessionOf<C> as RemoteSession>::File;
