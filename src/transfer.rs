//! Copies between the remote store and local files
//!
//! The remote side goes through a [`Client`]; the local side uses compio's
//! positional file I/O on the caller's runtime. Progress is reported as the
//! running byte total after every chunk.

use crate::client::Client;
use crate::error::{BridgeError, Result};
use crate::remote::RemoteClient;
use compio::fs::File;
use compio::io::{AsyncReadAt, AsyncWriteAtExt};
use std::path::Path;
use tracing::{debug, info, warn};

/// Copy a remote file to a local path, replacing it
///
/// Returns the number of bytes copied.
///
/// # Errors
///
/// Remote errors from [`Client::reader`], or `Io` for local failures. The
/// remote handle is released on every path.
pub async fn copy_to_local<C, F>(
    client: &Client<C>,
    remote: &str,
    local: impl AsRef<Path>,
    mut progress: F,
) -> Result<u64>
where
    C: RemoteClient,
    F: FnMut(u64),
{
    let local = local.as_ref();
    let mut reader = client.reader(remote).await?;

    let copied = async {
        let mut file = File::create(local).await?;
        let mut position = 0u64;
        while let Some(chunk) = reader.next_chunk().await? {
            let length = chunk.len() as u64;
            let result = file.write_all_at(chunk, position).await;
            result.0?;
            position += length;
            progress(position);
        }
        file.sync_all().await?;
        file.close().await?;
        Ok::<_, BridgeError>(position)
    }
    .await;

    // Local failures leave the reader open
    reader.close().await?;
    let copied = copied?;
    info!(remote, local = %local.display(), bytes = copied, "copied to local");
    Ok(copied)
}

/// Copy a local file to a remote path, replacing it
///
/// Returns the number of bytes the remote side acknowledged.
///
/// # Errors
///
/// `Io` for local failures, or remote errors from [`Client::writer`].
pub async fn copy_from_local<C, F>(
    client: &Client<C>,
    local: impl AsRef<Path>,
    remote: &str,
    mut progress: F,
) -> Result<u64>
where
    C: RemoteClient,
    F: FnMut(u64),
{
    let local = local.as_ref();
    let file = File::open(local).await?;
    let chunk_size = client.options().chunk_size.max(1);
    let mut writer = client.writer(remote).await?;

    let sent = async {
        let mut buffer = vec![0u8; chunk_size];
        let mut offset = 0u64;
        loop {
            let result = file.read_at(buffer, offset).await;
            let read = result.0?;
            buffer = result.1;
            if read == 0 {
                break;
            }
            writer.write(&buffer[..read]).await?;
            offset += read as u64;
            progress(offset);
            debug!(offset, "queued local chunk");
            buffer.resize(chunk_size, 0);
        }
        Ok::<_, BridgeError>(offset)
    }
    .await;

    let finished = writer.finish().await;
    let sent = sent?;
    let written = finished?;
    if sent != written {
        warn!(sent, written, remote, "remote acknowledged fewer bytes than were sent");
    }
    info!(local = %local.display(), remote, bytes = written, "copied from local");
    Ok(written)
}
