use std::cell::RefCell;
use std::io::{ErrorKind, Read};
use std::rc::Rc;

use bytes::BytesMut;
use tracing::trace;

use crate::codec::{extract_frame, FrameConfig};
use crate::error::{FrameError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;

/// Maximum bytes accepted per [`StreamReader::pull`] call.
pub(crate) const MAX_READ_CHUNK: usize = 64 * 1024;

/// Receives every completed frame payload, in stream order.
pub trait FrameListener {
    fn on_frame(&mut self, payload: &[u8]);
}

/// Turns a byte stream into validated frame payloads.
///
/// Owns the stream buffer (append at tail, consume at head) and an ordered
/// broadcast list of listeners. `pull` moves bytes from the stream into the
/// buffer; `drain` extracts every complete frame currently buffered and
/// dispatches it synchronously to all listeners in registration order.
pub struct StreamReader<T> {
    inner: T,
    buf: BytesMut,
    config: FrameConfig,
    listeners: Vec<Rc<RefCell<dyn FrameListener>>>,
}

impl<T: Read> StreamReader<T> {
    /// Create a reader with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a reader with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
            listeners: Vec::new(),
        }
    }

    /// Register a listener. All listeners see every frame (broadcast).
    pub fn add_listener(&mut self, listener: Rc<RefCell<dyn FrameListener>>) {
        self.listeners.push(listener);
    }

    /// One blocking read of up to `max_bytes`, appended to the buffer.
    ///
    /// Returns the number of bytes read. `Ok(0)` means the read timed out or
    /// would block — try again. EOF before any bytes is
    /// [`FrameError::ConnectionClosed`]: the peer hung up.
    pub fn pull(&mut self, max_bytes: usize) -> Result<usize> {
        let mut chunk = vec![0u8; max_bytes.clamp(1, MAX_READ_CHUNK)];
        loop {
            match self.inner.read(&mut chunk) {
                Ok(0) => return Err(FrameError::ConnectionClosed),
                Ok(n) => {
                    self.buf.extend_from_slice(&chunk[..n]);
                    trace!(bytes = n, buffered = self.buf.len(), "pulled from stream");
                    return Ok(n);
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err)
                    if err.kind() == ErrorKind::WouldBlock
                        || err.kind() == ErrorKind::TimedOut =>
                {
                    return Ok(0);
                }
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }

    /// Extract and dispatch every complete frame in the buffer. Never blocks.
    ///
    /// Returns the number of frames dispatched. A malformed frame propagates
    /// as an error after the codec has advanced the buffer by one byte;
    /// callers treat that as connection-fatal.
    pub fn drain(&mut self) -> Result<usize> {
        let mut dispatched = 0;
        while let Some(payload) = extract_frame(&mut self.buf, self.config.max_message_length)? {
            for listener in &self.listeners {
                listener.borrow_mut().on_frame(&payload);
            }
            dispatched += 1;
        }
        Ok(dispatched)
    }

    /// Bytes currently buffered but not yet consumed.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Current reader configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::codec::encode_frame;

    #[derive(Default)]
    struct Collector {
        frames: Vec<Vec<u8>>,
    }

    impl FrameListener for Collector {
        fn on_frame(&mut self, payload: &[u8]) {
            self.frames.push(payload.to_vec());
        }
    }

    fn wire(payloads: &[&[u8]]) -> Vec<u8> {
        let mut buf = BytesMut::new();
        for payload in payloads {
            encode_frame(payload, &mut buf);
        }
        buf.to_vec()
    }

    #[test]
    fn pull_then_drain_dispatches_frame() {
        let mut reader = StreamReader::new(Cursor::new(wire(&[b"hello"])));
        let collector = Rc::new(RefCell::new(Collector::default()));
        reader.add_listener(collector.clone());

        let n = reader.pull(1024).unwrap();
        assert!(n > 0);
        assert_eq!(reader.drain().unwrap(), 1);
        assert_eq!(collector.borrow().frames, vec![b"hello".to_vec()]);
    }

    #[test]
    fn drain_handles_multiple_buffered_frames() {
        let mut reader = StreamReader::new(Cursor::new(wire(&[b"one", b"two", b"three"])));
        let collector = Rc::new(RefCell::new(Collector::default()));
        reader.add_listener(collector.clone());

        reader.pull(4096).unwrap();
        assert_eq!(reader.drain().unwrap(), 3);
        assert_eq!(
            collector.borrow().frames,
            vec![b"one".to_vec(), b"two".to_vec(), b"three".to_vec()]
        );
    }

    #[test]
    fn broadcast_reaches_all_listeners_in_order() {
        struct Tagger {
            tag: u8,
            log: Rc<RefCell<Vec<u8>>>,
        }
        impl FrameListener for Tagger {
            fn on_frame(&mut self, _payload: &[u8]) {
                self.log.borrow_mut().push(self.tag);
            }
        }

        let log = Rc::new(RefCell::new(Vec::new()));
        let mut reader = StreamReader::new(Cursor::new(wire(&[b"x"])));
        reader.add_listener(Rc::new(RefCell::new(Tagger {
            tag: 1,
            log: log.clone(),
        })));
        reader.add_listener(Rc::new(RefCell::new(Tagger {
            tag: 2,
            log: log.clone(),
        })));

        reader.pull(1024).unwrap();
        reader.drain().unwrap();
        assert_eq!(*log.borrow(), vec![1, 2]);
    }

    #[test]
    fn byte_at_a_time_dispatches_exactly_once_at_final_byte() {
        let frame = wire(&[b"slow"]);
        let total = frame.len();

        let mut reader = StreamReader::new(ByteByByteReader {
            bytes: frame,
            pos: 0,
        });
        let collector = Rc::new(RefCell::new(Collector::default()));
        reader.add_listener(collector.clone());

        for fed in 1..=total {
            assert_eq!(reader.pull(1024).unwrap(), 1);
            let dispatched = reader.drain().unwrap();
            if fed < total {
                assert_eq!(dispatched, 0, "dispatched before byte {fed}/{total}");
            } else {
                assert_eq!(dispatched, 1);
            }
        }

        assert_eq!(collector.borrow().frames, vec![b"slow".to_vec()]);
    }

    #[test]
    fn garbage_prefix_resyncs_to_frame() {
        let mut stream = b"!! not a frame !!".to_vec();
        stream.extend_from_slice(&wire(&[b"payload"]));

        let mut reader = StreamReader::new(Cursor::new(stream));
        let collector = Rc::new(RefCell::new(Collector::default()));
        reader.add_listener(collector.clone());

        reader.pull(4096).unwrap();
        assert_eq!(reader.drain().unwrap(), 1);
        assert_eq!(collector.borrow().frames, vec![b"payload".to_vec()]);
    }

    #[test]
    fn eof_is_connection_closed() {
        let mut reader = StreamReader::new(Cursor::new(Vec::<u8>::new()));
        let err = reader.pull(1024).unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
    }

    #[test]
    fn would_block_returns_zero() {
        struct WouldBlockReader;
        impl Read for WouldBlockReader {
            fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
                Err(std::io::Error::from(ErrorKind::WouldBlock))
            }
        }

        let mut reader = StreamReader::new(WouldBlockReader);
        assert_eq!(reader.pull(1024).unwrap(), 0);
    }

    #[test]
    fn interrupted_read_retries() {
        let mut reader = StreamReader::new(InterruptedThenData {
            interrupted: false,
            bytes: wire(&[b"ok"]),
            pos: 0,
        });
        let collector = Rc::new(RefCell::new(Collector::default()));
        reader.add_listener(collector.clone());

        assert!(reader.pull(1024).unwrap() > 0);
        reader.drain().unwrap();
        assert_eq!(collector.borrow().frames, vec![b"ok".to_vec()]);
    }

    #[test]
    fn io_error_propagates_with_os_details() {
        struct BrokenReader;
        impl Read for BrokenReader {
            fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
                Err(std::io::Error::from_raw_os_error(32)) // EPIPE
            }
        }

        let mut reader = StreamReader::new(BrokenReader);
        let err = reader.pull(1024).unwrap_err();
        assert!(matches!(err, FrameError::Io(e) if e.raw_os_error() == Some(32)));
    }

    #[test]
    fn drain_propagates_protocol_error_and_keeps_resync_progress() {
        let mut frame = wire(&[b"payload"]);
        let last = frame.len() - 1;
        frame[last] ^= 0xFF;

        let mut reader = StreamReader::new(Cursor::new(frame.clone()));
        reader.pull(4096).unwrap();
        let buffered = reader.buffered();

        let err = reader.drain().unwrap_err();
        assert!(err.is_protocol_error());
        assert_eq!(reader.buffered(), buffered - 1);
    }

    #[test]
    fn pull_respects_max_bytes() {
        let mut reader = StreamReader::new(Cursor::new(vec![0u8; 100]));
        assert_eq!(reader.pull(10).unwrap(), 10);
        assert_eq!(reader.buffered(), 10);
    }

    struct ByteByByteReader {
        bytes: Vec<u8>,
        pos: usize,
    }

    impl Read for ByteByByteReader {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.pos >= self.bytes.len() || buf.is_empty() {
                return Ok(0);
            }
            buf[0] = self.bytes[self.pos];
            self.pos += 1;
            Ok(1)
        }
    }

    struct InterruptedThenData {
        interrupted: bool,
        bytes: Vec<u8>,
        pos: usize,
    }

    impl Read for InterruptedThenData {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if !self.interrupted {
                self.interrupted = true;
                return Err(std::io::Error::from(ErrorKind::Interrupted));
            }
            if self.pos >= self.bytes.len() {
                return Ok(0);
            }
            let n = (self.bytes.len() - self.pos).min(buf.len());
            buf[..n].copy_from_slice(&self.bytes[self.pos..self.pos + n]);
            self.pos += n;
            Ok(n)
        }
    }
}
