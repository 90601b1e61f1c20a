//! Dedicated writer task serializing all socket writes of a session.
//!
//! Every frame a session emits - user data, protocol replies, heartbeats,
//! multi-block chunks - funnels through an mpsc channel into one task that
//! owns the write half. That task batches ready frames and writes them with
//! scatter/gather I/O, so concurrent senders never interleave partial
//! frames on the wire.
//!
//! ```text
//! API caller  ─┐
//! dispatcher  ─┼─► mpsc::Sender<WriterCommand> ─► Writer Task ─► socket
//! mb worker   ─┘
//! ```

use std::io::IoSlice;

use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::{Result, SessionError};
use crate::protocol::{MessageHeader, END_MARKER_SIZE, HEADER_SIZE, MESSAGE_END_MARKER};

/// Channel capacity; senders feel backpressure when the socket lags.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Maximum frames to batch in a single write operation.
const MAX_BATCH_SIZE: usize = 64;

/// End marker bytes appended to every frame.
const END_MARKER_BYTES: [u8; END_MARKER_SIZE] = MESSAGE_END_MARKER.to_le_bytes();

/// A frame ready to be written to the socket.
#[derive(Debug)]
pub struct OutboundFrame {
    /// Pre-encoded header (24 bytes).
    header: [u8; HEADER_SIZE],
    /// Body bytes (may be empty for heartbeats and replies).
    body: Bytes,
}

impl OutboundFrame {
    /// Create a new outbound frame.
    #[inline]
    pub fn new(header: &MessageHeader, body: Bytes) -> Self {
        Self {
            header: header.encode(),
            body,
        }
    }

    /// Total wire size of this frame.
    #[inline]
    pub fn size(&self) -> usize {
        HEADER_SIZE + self.body.len() + END_MARKER_SIZE
    }
}

/// What the writer task can be asked to do.
#[derive(Debug)]
enum WriterCommand {
    Frame(OutboundFrame),
    /// Flush and shut the write half down, then exit.
    Shutdown,
}

/// Handle for sending frames to the writer task.
///
/// Cheaply cloneable; shared by the session, the dispatcher and the
/// multi-block worker.
#[derive(Clone)]
pub struct WriterHandle {
    tx: mpsc::Sender<WriterCommand>,
}

impl WriterHandle {
    /// Queue a frame, waiting for channel capacity if necessary.
    pub async fn send(&self, frame: OutboundFrame) -> Result<()> {
        self.tx
            .send(WriterCommand::Frame(frame))
            .await
            .map_err(|_| SessionError::ConnectionClosed)
    }

    /// Queue a frame without waiting; fails when the channel is full.
    pub fn try_send(&self, frame: OutboundFrame) -> Result<()> {
        self.tx
            .try_send(WriterCommand::Frame(frame))
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => {
                    SessionError::Protocol("writer queue full".to_string())
                }
                mpsc::error::TrySendError::Closed(_) => SessionError::ConnectionClosed,
            })
    }

    /// Ask the writer task to flush, close the socket write half and exit.
    ///
    /// Queued frames ahead of the shutdown are still written.
    pub fn shutdown(&self) {
        let _ = self.tx.try_send(WriterCommand::Shutdown);
    }
}

/// Spawn the writer task and return a handle for sending frames.
pub fn spawn_writer_task<W>(writer: W) -> (WriterHandle, JoinHandle<Result<()>>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(DEFAULT_CHANNEL_CAPACITY);
    let task = tokio::spawn(writer_loop(rx, writer));
    (WriterHandle { tx }, task)
}

/// Main writer loop - receives frames and writes them to the socket.
async fn writer_loop<W>(mut rx: mpsc::Receiver<WriterCommand>, mut writer: W) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    loop {
        let first = match rx.recv().await {
            Some(WriterCommand::Frame(f)) => f,
            Some(WriterCommand::Shutdown) | None => {
                let _ = writer.shutdown().await;
                return Ok(());
            }
        };

        // Collect additional ready frames without blocking.
        let mut batch = Vec::with_capacity(MAX_BATCH_SIZE);
        batch.push(first);
        let mut shutdown_after = false;

        while batch.len() < MAX_BATCH_SIZE {
            match rx.try_recv() {
                Ok(WriterCommand::Frame(f)) => batch.push(f),
                Ok(WriterCommand::Shutdown) => {
                    shutdown_after = true;
                    break;
                }
                Err(_) => break,
            }
        }

        write_batch(&mut writer, &batch).await?;

        if shutdown_after {
            let _ = writer.shutdown().await;
            return Ok(());
        }
    }
}

/// Write a batch of frames using scatter/gather I/O.
///
/// Each frame contributes up to three slices (header, body, end marker);
/// partial writes fall back to rebuilding the remaining slices.
async fn write_batch<W>(writer: &mut W, batch: &[OutboundFrame]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    if batch.is_empty() {
        return Ok(());
    }

    let total_size: usize = batch.iter().map(|f| f.size()).sum();
    let slices = build_remaining_slices(batch, 0);

    let written = writer.write_vectored(&slices).await?;
    if written == 0 {
        return Err(SessionError::Io(std::io::Error::new(
            std::io::ErrorKind::WriteZero,
            "write_vectored returned 0",
        )));
    }

    let mut total_written = written;
    while total_written < total_size {
        let remaining = build_remaining_slices(batch, total_written);
        if remaining.is_empty() {
            break;
        }

        let written = writer.write_vectored(&remaining).await?;
        if written == 0 {
            return Err(SessionError::Io(std::io::Error::new(
                std::io::ErrorKind::WriteZero,
                "write_vectored returned 0",
            )));
        }
        total_written += written;
    }

    writer.flush().await?;
    Ok(())
}

/// Build the IoSlice array for the batch, skipping `skip_bytes` already
/// written bytes.
fn build_remaining_slices(batch: &[OutboundFrame], skip_bytes: usize) -> Vec<IoSlice<'_>> {
    let mut slices = Vec::with_capacity(batch.len() * 3);
    let mut offset = 0;

    for frame in batch {
        for part in [&frame.header[..], &frame.body[..], &END_MARKER_BYTES[..]] {
            if part.is_empty() {
                continue;
            }
            let end = offset + part.len();
            if skip_bytes < end {
                let start_in_part = skip_bytes.saturating_sub(offset);
                slices.push(IoSlice::new(&part[start_in_part..]));
            }
            offset = end;
        }
    }

    slices
}
