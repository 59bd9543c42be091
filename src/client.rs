//! High-level client with lazy connection
//!
//! [`Client`] wraps a [`Connection`] together with the endpoint it should talk
//! to. Every operation connects first if needed, so callers never sequence
//! `connect` themselves. Concurrent operations on a fresh client share a
//! single connect.

use crate::connection::{BridgeOptions, Connection};
use crate::error::{BridgeError, Result};
use crate::handle_table::HandleId;
use crate::remote::{OpenFlags, RemoteClient};
use crate::stream::{RemoteReader, RemoteWriter};
use crate::translate::{DirectoryListing, FileStatus};
use futures::lock::Mutex;
use std::sync::Arc;
use tracing::debug;

/// Client configuration options
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientOptions {
    /// Remote host (`default` lets the client library pick its configured service)
    pub host: String,
    /// Remote port (0 = client library default)
    pub port: u16,
    /// Bytes requested per read by [`RemoteReader`]
    pub chunk_size: usize,
    /// Buffered bytes that trigger a write in [`RemoteWriter`]
    pub flush_threshold: usize,
    /// Options of the underlying connection
    pub bridge: BridgeOptions,
}

impl ClientOptions {
    /// Default read chunk size: 1 MiB
    pub const DEFAULT_CHUNK_SIZE: usize = 1024 * 1024;
    /// Default write flush threshold: 64 KiB
    pub const DEFAULT_FLUSH_THRESHOLD: usize = 64 * 1024;

    /// Options for `host:port` with default sizes
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            host: "default".to_string(),
            port: 0,
            chunk_size: Self::DEFAULT_CHUNK_SIZE,
            flush_threshold: Self::DEFAULT_FLUSH_THRESHOLD,
            bridge: BridgeOptions::default(),
        }
    }
}

/// Remote filesystem client that connects on first use
pub struct Client<C: RemoteClient> {
    connection: Connection<C>,
    options: ClientOptions,
    connecting: Arc<Mutex<()>>,
}

impl<C: RemoteClient> Clone for Client<C> {
    fn clone(&self) -> Self {
        Self {
            connection: self.connection.clone(),
            options: self.options.clone(),
            connecting: Arc::clone(&self.connecting),
        }
    }
}

impl<C: RemoteClient> Client<C> {
    /// Create a client; nothing is contacted until the first operation
    #[must_use]
    pub fn new(client: C, options: ClientOptions) -> Self {
        Self {
            connection: Connection::with_options(client, options.bridge),
            options,
            connecting: Arc::new(Mutex::new(())),
        }
    }

    /// The underlying connection
    #[must_use]
    pub const fn connection(&self) -> &Connection<C> {
        &self.connection
    }

    /// Options this client was built with
    #[must_use]
    pub const fn options(&self) -> &ClientOptions {
        &self.options
    }

    /// Connect unless already connected
    ///
    /// # Errors
    ///
    /// Returns `ConnectFailed` if the client library could not connect.
    pub async fn ensure_connected(&self) -> Result<()> {
        if self.connection.is_connected() {
            return Ok(());
        }
        let _connecting = self.connecting.lock().await;
        if self.connection.is_connected() {
            return Ok(());
        }
        debug!(host = %self.options.host, port = self.options.port, "connecting lazily");
        match self.connection.connect(&self.options.host, self.options.port).await {
            Ok(()) | Err(BridgeError::AlreadyConnected(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Release the session if there is one
    ///
    /// # Errors
    ///
    /// See [`Connection::disconnect`].
    pub async fn disconnect(&self) -> Result<()> {
        self.connection.disconnect().await
    }

    /// Status of a path
    ///
    /// # Errors
    ///
    /// Connection errors, or `PathNotFound`.
    pub async fn stat(&self, path: &str) -> Result<FileStatus> {
        self.ensure_connected().await?;
        self.connection.stat(path).await
    }

    /// Contents of a directory
    ///
    /// # Errors
    ///
    /// Connection errors, or `PathNotFound`.
    pub async fn list(&self, path: &str) -> Result<DirectoryListing> {
        self.ensure_connected().await?;
        self.connection.list(path).await
    }

    /// Open a file
    ///
    /// # Errors
    ///
    /// See [`Connection::open`].
    pub async fn open(&self, path: &str, flags: OpenFlags) -> Result<HandleId> {
        self.ensure_connected().await?;
        self.connection.open(path, flags).await
    }

    /// Close a file
    ///
    /// # Errors
    ///
    /// See [`Connection::close`].
    pub async fn close(&self, id: HandleId) -> Result<()> {
        self.ensure_connected().await?;
        self.connection.close(id).await
    }

    /// Positional read
    ///
    /// # Errors
    ///
    /// See [`Connection::read`].
    pub async fn read(&self, id: HandleId, offset: u64, length: usize) -> Result<Vec<u8>> {
        self.ensure_connected().await?;
        self.connection.read(id, offset, length).await
    }

    /// Write and flush
    ///
    /// # Errors
    ///
    /// See [`Connection::write`].
    pub async fn write(&self, id: HandleId, data: Vec<u8>) -> Result<usize> {
        self.ensure_connected().await?;
        self.connection.write(id, data).await
    }

    /// Create a directory and its parents; `true` on success
    ///
    /// # Errors
    ///
    /// Connection or argument errors only; a remote failure is `false`.
    pub async fn mkdir(&self, path: &str) -> Result<bool> {
        self.ensure_connected().await?;
        Ok(self.connection.mkdir(path).await? == 0)
    }

    /// Whether a path exists
    ///
    /// # Errors
    ///
    /// Connection or argument errors only.
    pub async fn exists(&self, path: &str) -> Result<bool> {
        self.ensure_connected().await?;
        Ok(self.connection.exists(path).await? == 0)
    }

    /// Delete a path recursively; `true` on success
    ///
    /// # Errors
    ///
    /// Connection or argument errors only; a remote failure is `false`.
    pub async fn delete(&self, path: &str) -> Result<bool> {
        self.ensure_connected().await?;
        Ok(self.connection.delete(path).await? == 0)
    }

    /// Chunked reader over a remote file
    ///
    /// # Errors
    ///
    /// Connection errors, or `PathNotFound`.
    pub async fn reader(&self, path: &str) -> Result<RemoteReader<C>> {
        self.ensure_connected().await?;
        RemoteReader::open(self.connection.clone(), path, self.options.chunk_size).await
    }

    /// Buffered writer that creates or truncates a remote file
    ///
    /// # Errors
    ///
    /// Connection errors, or `OpenFailed`.
    pub async fn writer(&self, path: &str) -> Result<RemoteWriter<C>> {
        self.writer_with(path, OpenFlags::WRONLY | OpenFlags::CREATE).await
    }

    /// Buffered writer that appends to a remote file
    ///
    /// # Errors
    ///
    /// Connection errors, or `OpenFailed`.
    pub async fn appender(&self, path: &str) -> Result<RemoteWriter<C>> {
        self.writer_with(path, OpenFlags::WRONLY | OpenFlags::APPEND)
            .await
    }

    async fn writer_with(&self, path: &str, flags: OpenFlags) -> Result<RemoteWriter<C>> {
        self.ensure_connected().await?;
        RemoteWriter::open(
            self.connection.clone(),
            path,
            flags,
            self.options.flush_threshold,
        )
        .await
    }
}
