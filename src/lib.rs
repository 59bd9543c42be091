//! # ahdfs
//!
//! Non-blocking access to a remote filesystem through a blocking client
//! library.
//!
//! The remote client blocks for the duration of every call. This crate runs
//! each call on compio's blocking worker pool, keeps the connection and the
//! touched resources alive while the call is in flight, and hands the
//! translated result back to the caller's runtime. Open files are exposed as
//! small integer [`HandleId`]s drawn from a fixed-capacity [`HandleTable`].
//!
//! Two call styles are available:
//!
//! - `async` methods on [`Connection`] (and the lazily connecting [`Client`])
//! - [`Connection::submit`], which takes a [`Request`] and a completion
//!   callback invoked exactly once with the [`Reply`] or the error
//!
//! ## Modules
//!
//! - [`remote`]: the blocking client interface and its native records
//! - [`backends`]: in-memory and local-directory clients
//! - [`handle_table`]: handle id allocation
//! - [`dispatch`]: worker dispatch and callback delivery
//! - [`translate`]: native results to [`FileStatus`] / [`DirectoryListing`]
//! - [`connection`]: the operation catalog
//! - [`request`]: the callback surface
//! - [`client`], [`stream`], [`transfer`]: conveniences built on top

pub mod backends;
pub mod cli;
pub mod client;
pub mod connection;
pub mod dispatch;
pub mod error;
pub mod handle_table;
pub mod remote;
pub mod request;
pub mod stats;
pub mod stream;
pub mod transfer;
pub mod translate;

pub use backends::{LocalClient, MemoryClient, MemoryStore};
pub use client::{Client, ClientOptions};
pub use connection::{BridgeOptions, Connection};
pub use dispatch::{OpKind, PanicPolicy};
pub use error::{BridgeError, Result};
pub use handle_table::{HandleId, HandleTable};
pub use remote::{NativeFileInfo, OpenFlags, RemoteClient, RemoteSession};
pub use request::{Reply, Request};
pub use stats::DispatchStats;
pub use stream::{RemoteReader, RemoteWriter};
pub use transfer::{copy_from_local, copy_to_local};
pub use translate::{DirectoryListing, FileKind, FileStatus};
