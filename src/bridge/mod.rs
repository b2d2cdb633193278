//! Streaming bridge between chunked transports and the blocking blob store
//!
//! Uploads arrive as an ordered sequence of [`UploadMessage`]s: the first
//! one carries the [`UploadHeader`], every later one a raw chunk. [`upload`]
//! feeds the chunks through a bounded [`pipe::chunk_pipe`] into
//! [`BlobStorage::save`] running on the blocking pool, so neither side ever
//! holds more than the pipe capacity in memory.
//!
//! Downloads go the other way: [`download`] reads fixed-size blocks from
//! [`BlobStorage::load`] and hands them out as a [`DownloadStream`].

pub mod pipe;

use crate::storage::path::validate_owner_id;
use crate::storage::{BlobStorage, IoStep, StorageError, StoragePath, StoredObject};
use bytes::Bytes;
use futures::{Stream, StreamExt};
use log::{debug, error, info, warn};
use pipe::{chunk_pipe, PipeWriter};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::{self, Read};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::mpsc;

pub const DEFAULT_BLOCK_SIZE: usize = 32 * 1024;
pub const DEFAULT_PIPE_CAPACITY: usize = 16;

/// Metadata sent once at the start of an upload
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadHeader {
    pub title: String,
    /// Original path of the file on the client
    pub client_path: Option<String>,
    pub metadata: HashMap<String, String>,
}

/// One message of an inbound upload sequence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadMessage {
    /// Present on the first message only
    pub header: Option<UploadHeader>,
    pub chunk: Bytes,
}

impl UploadMessage {
    /// Metadata-only opening message
    pub fn header(header: UploadHeader) -> Self {
        Self {
            header: Some(header),
            chunk: Bytes::new(),
        }
    }

    pub fn chunk(chunk: impl Into<Bytes>) -> Self {
        Self {
            header: None,
            chunk: chunk.into(),
        }
    }
}

/// Run blocking `work` with the `owner` MDC entry set on this thread
pub(crate) fn with_owner_tag<T>(owner: &str, work: impl FnOnce() -> T) -> T {
    log_mdc::insert("owner", owner);
    let result = work();
    log_mdc::remove("owner");
    result
}

/// Store an inbound message sequence as a new object owned by `owner_id`.
///
/// The header and owner are validated before any filesystem work. An error
/// from `messages` aborts the save and is returned as [`StorageError::Stream`];
/// in every failure case no object is left behind. Dropping the returned
/// future mid-upload aborts the save the same way.
pub async fn upload<S>(
    store: Arc<dyn BlobStorage>,
    owner_id: &str,
    mut messages: S,
    pipe_capacity: usize,
) -> Result<(UploadHeader, StoredObject), StorageError>
where
    S: Stream<Item = io::Result<UploadMessage>> + Unpin,
{
    validate_owner_id(owner_id)?;

    let first = match messages.next().await {
        Some(Ok(message)) => message,
        Some(Err(e)) => return Err(StorageError::Stream(e)),
        None => {
            return Err(StorageError::InvalidInput(
                "upload ended before the metadata message".into(),
            ))
        }
    };
    let header = first.header.ok_or_else(|| {
        StorageError::InvalidInput("first upload message must carry metadata".into())
    })?;
    if header.title.trim().is_empty() {
        return Err(StorageError::InvalidInput("upload title must not be empty".into()));
    }

    let (writer, mut reader) = chunk_pipe(pipe_capacity);
    let owner = owner_id.to_string();
    let save = tokio::task::spawn_blocking(move || {
        with_owner_tag(&owner, || store.save(&owner, &mut reader))
    });

    let pumped = pump_chunks(writer, first.chunk, &mut messages).await;

    let stored = save
        .await
        .map_err(|e| StorageError::Internal(format!("save task failed: {}", e)))?;
    pumped?;
    let stored = stored?;

    info!(
        "Upload {:?} for owner {} stored as {} ({} bytes)",
        header.title, owner_id, stored.path, stored.size
    );
    Ok((header, stored))
}

/// Forward chunks into the pipe until the inbound sequence ends.
///
/// Transport errors are handed to the reader; only protocol violations are
/// returned here.
async fn pump_chunks<S>(writer: PipeWriter, first_chunk: Bytes, messages: &mut S) -> Result<(), StorageError>
where
    S: Stream<Item = io::Result<UploadMessage>> + Unpin,
{
    // A failed write means the save already ended; its own result says why.
    if writer.write_chunk(first_chunk).await.is_err() {
        return Ok(());
    }

    while let Some(message) = messages.next().await {
        let message = match message {
            Ok(message) => message,
            Err(e) => {
                warn!("Upload stream failed: {}", e);
                writer.abort(e).await;
                return Ok(());
            }
        };
        if message.header.is_some() {
            writer
                .abort(io::Error::new(io::ErrorKind::InvalidData, "metadata repeated mid-upload"))
                .await;
            return Err(StorageError::InvalidInput(
                "only the first upload message may carry metadata".into(),
            ));
        }
        if writer.write_chunk(message.chunk).await.is_err() {
            return Ok(());
        }
    }

    if writer.finish().await.is_err() {
        debug!("Save ended before the end of the upload stream");
    }
    Ok(())
}

/// Read `reader` in blocks of at most `block_size` bytes, passing each
/// non-empty block to `emit`. Returns the number of bytes forwarded.
pub fn forward_blocks<F>(reader: &mut dyn Read, block_size: usize, mut emit: F) -> io::Result<u64>
where
    F: FnMut(Bytes) -> io::Result<()>,
{
    let mut buffer = vec![0u8; block_size.max(1)];
    let mut total = 0u64;
    loop {
        let n = match reader.read(&mut buffer) {
            Ok(0) => return Ok(total),
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        emit(Bytes::copy_from_slice(&buffer[..n]))?;
        total += n as u64;
    }
}

/// Outbound chunk sequence of a download.
///
/// Yields blocks of at most the configured size; a read failure midway is
/// yielded as a final `Err` item. Dropping the stream stops the reader.
pub struct DownloadStream {
    rx: mpsc::Receiver<Result<Bytes, StorageError>>,
}

impl Stream for DownloadStream {
    type Item = Result<Bytes, StorageError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

/// Open `path` and stream it out in blocks of `block_size` bytes.
///
/// Opening happens before this returns, so a missing object is reported as
/// [`StorageError::NotFound`] rather than inside the stream. At most
/// `capacity` blocks are read ahead of the consumer.
pub async fn download(
    store: Arc<dyn BlobStorage>,
    path: StoragePath,
    block_size: usize,
    capacity: usize,
) -> Result<DownloadStream, StorageError> {
    let opened = {
        let path = path.clone();
        tokio::task::spawn_blocking(move || with_owner_tag(path.owner_id(), || store.load(&path)))
            .await
            .map_err(|e| StorageError::Internal(format!("load task failed: {}", e)))??
    };

    let (tx, rx) = mpsc::channel(capacity.max(1));
    tokio::task::spawn_blocking(move || with_owner_tag(path.owner_id(), || {
        let mut reader = opened;
        let mut receiver_gone = false;
        let result = forward_blocks(&mut reader, block_size, |block| {
            tx.blocking_send(Ok(block)).map_err(|_| {
                receiver_gone = true;
                io::Error::new(io::ErrorKind::BrokenPipe, "download receiver dropped")
            })
        });
        drop(reader);

        match result {
            Ok(total) => debug!("Streamed {} ({} bytes)", path, total),
            Err(_) if receiver_gone => info!("Download of {} abandoned by receiver", path),
            Err(e) => {
                error!("Failed to read {}: {}", path, e);
                let _ = tx.blocking_send(Err(StorageError::io(IoStep::ReadObject, path.to_string(), e)));
            }
        }
    }));

    Ok(DownloadStream { rx })
}
