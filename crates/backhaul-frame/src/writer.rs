use std::io::{ErrorKind, Write};

use bytes::BytesMut;
use tracing::warn;

use crate::codec::{encode_frame, FrameConfig};
use crate::error::{FrameError, Result};
use crate::reader::FrameListener;

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;

/// Bytes written per syscall in the partial-write loop.
pub const WRITE_CHUNK_SIZE: usize = 1024;

/// Writes complete frames to any `Write` stream.
///
/// Encodes once, then drives a chunked partial-write loop until the whole
/// frame is on the wire. Socket backpressure surfaces as `WouldBlock` or
/// `TimedOut` (with a bounded write timeout set on the socket) and is
/// retried; anything else aborts the write.
pub struct FrameWriter<T> {
    inner: T,
    buf: BytesMut,
    config: FrameConfig,
}

impl<T: Write> FrameWriter<T> {
    /// Create a writer with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a writer with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
        }
    }

    /// Frame and transmit one payload (blocking).
    ///
    /// Succeeds only once every encoded byte has been written and flushed.
    pub fn write(&mut self, payload: &[u8]) -> Result<()> {
        if payload.is_empty() || payload.len() > self.config.max_message_length {
            return Err(FrameError::InvalidLength {
                length: payload.len(),
                max: self.config.max_message_length,
            });
        }

        self.buf.clear();
        encode_frame(payload, &mut self.buf);

        let mut offset = 0usize;
        while offset < self.buf.len() {
            let end = (offset + WRITE_CHUNK_SIZE).min(self.buf.len());
            match self.inner.write(&self.buf[offset..end]) {
                Ok(0) => return Err(FrameError::ConnectionClosed),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err)
                    if err.kind() == ErrorKind::WouldBlock
                        || err.kind() == ErrorKind::TimedOut =>
                {
                    continue;
                }
                Err(err) => return Err(FrameError::Io(err)),
            }
        }

        self.flush()
    }

    /// Flush the underlying stream.
    pub fn flush(&mut self) -> Result<()> {
        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err)
                    if err.kind() == ErrorKind::WouldBlock
                        || err.kind() == ErrorKind::TimedOut =>
                {
                    continue;
                }
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the writer and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Current writer configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

/// Relay wiring: a writer registered as a listener re-frames and echoes
/// every completed payload back out.
impl<T: Write> FrameListener for FrameWriter<T> {
    fn on_frame(&mut self, payload: &[u8]) {
        if let Err(err) = self.write(payload) {
            warn!(%err, "relay write failed");
        }
    }
}
