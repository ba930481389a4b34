//! Byte transport to the logger.
//!
//! A [`Transport`] owns the port. A background task reads whatever the
//! device sends and queues it, so no byte is lost while the caller is busy.
//! The caller pulls bytes with [`Transport::read`] under a fixed deadline.

#[cfg(test)]
pub(crate) mod mock;
pub mod serial;

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};

pub use serial::{SerialConfig, open};

/// How long [`Transport::read`] waits for the requested bytes.
pub const READ_DEADLINE: Duration = Duration::from_secs(1);

/// Bytes requested from the port per read attempt.
pub const READ_CHUNK_SIZE: usize = 2048;

/// Pause before retrying a read that would block.
pub const POLL_DELAY: Duration = Duration::from_millis(1);

/// A bidirectional byte stream the logger is attached to.
pub trait Port: AsyncRead + AsyncWrite + Send + Unpin + 'static {
    /// Drops data pending in OS buffers, called when the transport closes.
    ///
    /// # Errors
    ///
    /// Returns an error if the buffers cannot be cleared.
    fn discard_buffers(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Port for tokio::io::DuplexStream {}

type BoxedPort = Box<dyn Port>;

/// Handle to an open port with a running background reader.
pub struct Transport {
    writer: Option<WriteHalf<BoxedPort>>,
    reader_task: Option<JoinHandle<ReadHalf<BoxedPort>>>,
    chunks: mpsc::UnboundedReceiver<Bytes>,
    leftover: Bytes,
    cancel: CancellationToken,
    lost: Arc<AtomicBool>,
}

impl Transport {
    /// Takes ownership of a port and starts the background reader.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(port: impl Port) -> Self {
        let port: BoxedPort = Box::new(port);
        let (reader, writer) = tokio::io::split(port);
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let lost = Arc::new(AtomicBool::new(false));

        let reader_task = tokio::spawn(read_loop(reader, tx, cancel.clone(), lost.clone()));

        Self {
            writer: Some(writer),
            reader_task: Some(reader_task),
            chunks: rx,
            leftover: Bytes::new(),
            cancel,
            lost,
        }
    }

    /// Returns true until the transport is closed or the port is gone.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.writer.is_some() && !self.lost.load(Ordering::Acquire)
    }

    /// Reads up to `len` bytes.
    ///
    /// Returns early with fewer bytes, possibly none, once [`READ_DEADLINE`]
    /// has passed since the call started.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionLost`] after [`close`](Self::close), or
    /// when the port went away and all bytes it delivered were consumed.
    pub async fn read(&mut self, len: usize) -> Result<Bytes> {
        if self.writer.is_none() {
            return Err(Error::ConnectionLost);
        }

        if self.leftover.len() >= len {
            return Ok(self.leftover.split_to(len));
        }

        let deadline = Instant::now() + READ_DEADLINE;
        let mut data = BytesMut::with_capacity(len);
        while data.len() < len {
            if self.leftover.is_empty() {
                match tokio::time::timeout_at(deadline, self.chunks.recv()).await {
                    Ok(Some(chunk)) => self.leftover = chunk,
                    Ok(None) => return Err(Error::ConnectionLost),
                    Err(_) => break,
                }
            }
            let take = (len - data.len()).min(self.leftover.len());
            data.extend_from_slice(&self.leftover.split_to(take));
        }

        Ok(data.freeze())
    }

    /// Writes all bytes and flushes them.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionLost`] after close or once the port is
    /// gone, [`Error::Io`] if writing fails.
    pub async fn write(&mut self, data: &[u8]) -> Result<()> {
        if self.lost.load(Ordering::Acquire) {
            return Err(Error::ConnectionLost);
        }
        let writer = self.writer.as_mut().ok_or(Error::ConnectionLost)?;
        writer.write_all(data).await?;
        writer.flush().await?;
        Ok(())
    }

    /// Stops the reader and releases the port.
    ///
    /// Calling it more than once is harmless.
    pub async fn close(&mut self) {
        let Some(writer) = self.writer.take() else {
            return;
        };

        self.cancel.cancel();
        self.chunks.close();
        self.leftover.clear();

        if let Some(task) = self.reader_task.take() {
            match task.await {
                Ok(reader) => {
                    let mut port = reader.unsplit(writer);
                    if let Err(e) = port.discard_buffers() {
                        tracing::warn!("failed to discard port buffers: {}", e);
                    }
                }
                Err(e) => tracing::warn!("reader task failed: {}", e),
            }
        }

        tracing::info!("transport closed");
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("connected", &self.is_connected())
            .field("leftover", &self.leftover.len())
            .finish_non_exhaustive()
    }
}

/// Background read loop, hands the read half back once it stops.
async fn read_loop(
    mut reader: ReadHalf<BoxedPort>,
    chunks: mpsc::UnboundedSender<Bytes>,
    cancel: CancellationToken,
    lost: Arc<AtomicBool>,
) -> ReadHalf<BoxedPort> {
    let mut buf = vec![0u8; READ_CHUNK_SIZE];

    loop {
        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            result = reader.read(&mut buf) => result,
        };

        match result {
            Ok(0) => {
                tracing::debug!("port closed by peer");
                lost.store(true, Ordering::Release);
                break;
            }
            Ok(n) => {
                tracing::trace!("received {} bytes", n);
                if chunks.send(Bytes::copy_from_slice(&buf[..n])).is_err() {
                    break;
                }
            }
            Err(e) if is_transient(e.kind()) => {
                tokio::time::sleep(POLL_DELAY).await;
            }
            Err(e) => {
                tracing::error!("port read error: {}", e);
                lost.store(true, Ordering::Release);
                break;
            }
        }
    }

    reader
}

fn is_transient(kind: io::ErrorKind) -> bool {
    matches!(kind, io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted)
}
