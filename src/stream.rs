//! Sequential readers and writers over remote files
//!
//! A [`RemoteReader`] issues positional reads of a fixed chunk size from
//! successive offsets and closes its handle as soon as it sees a short chunk.
//! A [`RemoteWriter`] batches small writes into one write per threshold.
//!
//! Neither type closes its handle on drop; call [`RemoteReader::close`] or
//! [`RemoteWriter::finish`], or the id stays allocated until `disconnect`.

use crate::connection::Connection;
use crate::error::{invalid_argument, Result};
use crate::handle_table::HandleId;
use crate::remote::{OpenFlags, RemoteClient};
use futures::Stream;
use tracing::debug;

/// Chunked sequential reader
pub struct RemoteReader<C: RemoteClient> {
    connection: Connection<C>,
    handle: Option<HandleId>,
    offset: u64,
    chunk_size: usize,
}

impl<C: RemoteClient> RemoteReader<C> {
    /// Open `path` read-only
    ///
    /// A `chunk_size` of zero is raised to one byte.
    ///
    /// # Errors
    ///
    /// See [`Connection::open`].
    pub async fn open(connection: Connection<C>, path: &str, chunk_size: usize) -> Result<Self> {
        let handle = connection.open(path, OpenFlags::RDONLY).await?;
        Ok(Self {
            connection,
            handle: Some(handle),
            offset: 0,
            chunk_size: chunk_size.max(1),
        })
    }

    /// Bytes returned so far
    #[must_use]
    pub const fn offset(&self) -> u64 {
        self.offset
    }

    /// Whether the handle has been released
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.handle.is_none()
    }

    /// Next chunk, or `None` once the file is exhausted
    ///
    /// The handle is closed when a read comes back short, and also when a
    /// read fails.
    ///
    /// # Errors
    ///
    /// See [`Connection::read`].
    pub async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>> {
        let Some(handle) = self.handle else {
            return Ok(None);
        };
        let chunk = match self
            .connection
            .read(handle, self.offset, self.chunk_size)
            .await
        {
            Ok(chunk) => chunk,
            Err(e) => {
                self.close().await.ok();
                return Err(e);
            }
        };
        self.offset += chunk.len() as u64;
        if chunk.len() < self.chunk_size {
            debug!(%handle, total = self.offset, "reader reached end of file");
            self.close().await?;
        }
        Ok((!chunk.is_empty()).then_some(chunk))
    }

    /// Read everything that is left
    ///
    /// # Errors
    ///
    /// See [`Connection::read`].
    pub async fn read_to_end(mut self) -> Result<Vec<u8>> {
        let mut contents = Vec::new();
        while let Some(chunk) = self.next_chunk().await? {
            contents.extend_from_slice(&chunk);
        }
        Ok(contents)
    }

    /// Release the handle early; closing twice is fine
    ///
    /// # Errors
    ///
    /// See [`Connection::close`].
    pub async fn close(&mut self) -> Result<()> {
        match self.handle.take() {
            Some(handle) => self.connection.close(handle).await,
            None => Ok(()),
        }
    }

    /// Turn the reader into a stream of chunks
    ///
    /// The stream ends after the last chunk, or right after yielding an error.
    pub fn into_stream(self) -> impl Stream<Item = Result<Vec<u8>>> {
        futures::stream::unfold(Some(self), |state| async move {
            let mut reader = state?;
            match reader.next_chunk().await {
                Ok(Some(chunk)) => Some((Ok(chunk), Some(reader))),
                Ok(None) => None,
                Err(e) => Some((Err(e), None)),
            }
        })
    }
}

/// Buffered sequential writer
pub struct RemoteWriter<C: RemoteClient> {
    connection: Connection<C>,
    handle: HandleId,
    buffer: Vec<u8>,
    threshold: usize,
    written: u64,
}

impl<C: RemoteClient> RemoteWriter<C> {
    /// Largest threshold; a single native write reports at most `i32::MAX` bytes
    pub const MAX_THRESHOLD: usize = i32::MAX.unsigned_abs() as usize;

    /// Open `path` with write `flags`
    ///
    /// `threshold` is clamped to `1..=MAX_THRESHOLD`.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for read-only flags, otherwise see [`Connection::open`].
    pub async fn open(
        connection: Connection<C>,
        path: &str,
        flags: OpenFlags,
        threshold: usize,
    ) -> Result<Self> {
        if flags.is_read_only() {
            return Err(invalid_argument(format!(
                "writer needs write access, got flags {flags}"
            )));
        }
        let handle = connection.open(path, flags).await?;
        Ok(Self {
            connection,
            handle,
            buffer: Vec::new(),
            threshold: threshold.clamp(1, Self::MAX_THRESHOLD),
            written: 0,
        })
    }

    /// Bytes acknowledged by the remote side so far
    #[must_use]
    pub const fn written(&self) -> u64 {
        self.written
    }

    /// Buffered bytes that trigger a write
    #[must_use]
    pub const fn threshold(&self) -> usize {
        self.threshold
    }

    /// Bytes waiting in the local buffer
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Queue `data`, writing the buffer out once it reaches the threshold
    ///
    /// # Errors
    ///
    /// See [`Connection::write`].
    pub async fn write(&mut self, data: &[u8]) -> Result<()> {
        self.buffer.extend_from_slice(data);
        if self.buffer.len() >= self.threshold {
            self.flush().await?;
        }
        Ok(())
    }

    /// Write out whatever is buffered
    ///
    /// # Errors
    ///
    /// See [`Connection::write`].
    pub async fn flush(&mut self) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let data = std::mem::take(&mut self.buffer);
        let count = self.connection.write(self.handle, data).await?;
        self.written += count as u64;
        Ok(())
    }

    /// Flush, close the handle, and return the total bytes written
    ///
    /// The handle is closed even when the final flush fails.
    ///
    /// # Errors
    ///
    /// See [`Connection::write`] and [`Connection::close`].
    pub async fn finish(mut self) -> Result<u64> {
        let flushed = self.flush().await;
        let closed = self.connection.close(self.handle).await;
        flushed?;
        closed?;
        debug!(handle = %self.handle, total = self.written, "writer finished");
        Ok(self.written)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::backends::MemoryClient;
    use futures::StreamExt;

    async fn connected() -> (MemoryClient, Connection<MemoryClient>) {
        let client = MemoryClient::new();
        let connection = Connection::new(client.clone());
        connection.connect("localhost", 8020).await.unwrap();
        (client, connection)
    }

    #[compio::test]
    async fn test_reader_chunks_and_closes() {
        let (client, connection) = connected().await;
        client.store().insert_file("/data", b"abcdefghij");

        let mut reader = RemoteReader::open(connection.clone(), "/data", 4).await.unwrap();
        assert_eq!(reader.next_chunk().await.unwrap().unwrap(), b"abcd");
        assert_eq!(reader.next_chunk().await.unwrap().unwrap(), b"efgh");
        assert_eq!(reader.next_chunk().await.unwrap().unwrap(), b"ij");
        assert!(reader.is_closed());
        assert!(reader.next_chunk().await.unwrap().is_none());
        assert_eq!(reader.offset(), 10);
        assert!(connection.open_handles().is_empty());
    }

    #[compio::test]
    async fn test_reader_exact_multiple_ends_with_empty_read() {
        let (client, connection) = connected().await;
        client.store().insert_file("/data", b"abcdefgh");

        let chunks: Vec<_> = RemoteReader::open(connection.clone(), "/data", 4)
            .await
            .unwrap()
            .into_stream()
            .map(|chunk| chunk.unwrap())
            .collect()
            .await;
        assert_eq!(chunks, vec![b"abcd".to_vec(), b"efgh".to_vec()]);
        assert!(connection.open_handles().is_empty());
    }

    #[compio::test]
    async fn test_writer_batches_until_threshold() {
        let (client, connection) = connected().await;
        let store = client.store();

        let mut writer = RemoteWriter::open(
            connection.clone(),
            "/out",
            OpenFlags::WRONLY | OpenFlags::CREATE,
            8,
        )
        .await
        .unwrap();
        writer.write(b"abc").await.unwrap();
        assert_eq!(writer.buffered(), 3);
        assert_eq!(store.contents("/out").unwrap(), b"");

        writer.write(b"defgh").await.unwrap();
        assert_eq!(writer.buffered(), 0);
        assert_eq!(writer.written(), 8);

        writer.write(b"ij").await.unwrap();
        assert_eq!(writer.finish().await.unwrap(), 10);
        assert_eq!(store.contents("/out").unwrap(), b"abcdefghij");
        assert!(connection.open_handles().is_empty());
        assert_eq!(store.open_files(), 0);
    }

    #[compio::test]
    async fn test_writer_threshold_is_clamped() {
        let (_client, connection) = connected().await;
        let huge = RemoteWriter::open(
            connection.clone(),
            "/huge",
            OpenFlags::WRONLY | OpenFlags::CREATE,
            usize::MAX,
        )
        .await
        .unwrap();
        assert_eq!(huge.threshold(), i32::MAX as usize);
        assert_eq!(huge.finish().await.unwrap(), 0);

        let tiny = RemoteWriter::open(connection, "/tiny", OpenFlags::WRONLY | OpenFlags::CREATE, 0)
            .await
            .unwrap();
        assert_eq!(tiny.threshold(), 1);
        tiny.finish().await.unwrap();
    }

    #[compio::test]
    async fn test_writer_rejects_read_only_flags() {
        let (_client, connection) = connected().await;
        let err = RemoteWriter::open(connection, "/x", OpenFlags::RDONLY, 8)
            .await
            .err()
            .unwrap();
        assert!(err.is_argument_error());
    }
}
