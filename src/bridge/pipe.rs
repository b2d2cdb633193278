//! Bounded chunk pipe between an async producer and a blocking reader
//!
//! The writer half lives on the async side and awaits whenever `capacity`
//! chunks are already queued; the reader half implements [`std::io::Read`]
//! for a blocking consumer such as [`crate::storage::BlobStorage::save`].
//! A slow consumer therefore throttles the producer, and memory held by the
//! pipe never exceeds `capacity` chunks.

use bytes::{Buf, Bytes};
use std::io::{self, Read};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

enum Frame {
    Data(Bytes),
    End,
    Abort(io::Error),
}

/// Create a pipe that holds at most `capacity` chunks in flight
pub fn chunk_pipe(capacity: usize) -> (PipeWriter, PipeReader) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let high_water = Arc::new(AtomicUsize::new(0));
    (
        PipeWriter {
            tx,
            high_water: Arc::clone(&high_water),
        },
        PipeReader {
            rx,
            current: Bytes::new(),
            finished: false,
        },
    )
}

/// Async write half. Dropping it without [`PipeWriter::finish`] aborts the stream.
pub struct PipeWriter {
    tx: mpsc::Sender<Frame>,
    high_water: Arc<AtomicUsize>,
}

impl PipeWriter {
    /// Queue one chunk, waiting while the pipe is full.
    ///
    /// Fails with `BrokenPipe` once the reader has gone away.
    pub async fn write_chunk(&self, chunk: Bytes) -> io::Result<()> {
        if chunk.is_empty() {
            return Ok(());
        }
        self.send(Frame::Data(chunk)).await?;
        self.high_water.fetch_max(self.buffered(), Ordering::Relaxed);
        Ok(())
    }

    /// Signal a clean end of stream
    pub async fn finish(self) -> io::Result<()> {
        self.send(Frame::End).await
    }

    /// End the stream with `error`, surfaced to the reader on its next read
    pub async fn abort(self, error: io::Error) {
        // Nobody left to tell if the reader is already gone.
        let _ = self.send(Frame::Abort(error)).await;
    }

    /// Chunks currently queued and not yet taken by the reader
    pub fn buffered(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    /// Largest number of queued chunks observed after a write
    pub fn high_water(&self) -> usize {
        self.high_water.load(Ordering::Relaxed)
    }

    async fn send(&self, frame: Frame) -> io::Result<()> {
        self.tx
            .send(frame)
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "pipe reader closed"))
    }
}

/// Blocking read half. Must not be read from inside an async task.
pub struct PipeReader {
    rx: mpsc::Receiver<Frame>,
    current: Bytes,
    finished: bool,
}

impl Read for PipeReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        loop {
            if !self.current.is_empty() {
                let n = buf.len().min(self.current.len());
                buf[..n].copy_from_slice(&self.current[..n]);
                self.current.advance(n);
                return Ok(n);
            }
            if self.finished {
                return Ok(0);
            }
            match self.rx.blocking_recv() {
                Some(Frame::Data(chunk)) => self.current = chunk,
                Some(Frame::End) => {
                    self.finished = true;
                    return Ok(0);
                }
                Some(Frame::Abort(e)) => return Err(e),
                None => {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "chunk stream closed before completion",
                    ))
                }
            }
        }
    }
}
