use std::path::Path;
use std::time::Duration;

use backhaul_frame::{FrameConfig, FrameWriter, StreamReader};
use backhaul_transport::{connect, SocketStream};
use tracing::debug;

use crate::error::Result;

/// One logical session with the daemon.
///
/// Exclusively owns the socket handle. The reader and writer are built
/// eagerly at open time from one clone each of the stream (there is no lazy
/// accessor state to get wrong), and the whole connection is replaced
/// wholesale when the client reconnects.
pub struct Connection {
    reader: StreamReader<SocketStream>,
    writer: FrameWriter<SocketStream>,
}

impl Connection {
    /// Connect to the daemon socket and wire up framing.
    ///
    /// `io_timeout` bounds each blocking read/write syscall; `None` blocks
    /// indefinitely (the daemon is trusted local infrastructure).
    pub fn open(
        path: &Path,
        frame_config: FrameConfig,
        io_timeout: Option<Duration>,
    ) -> Result<Self> {
        let stream = connect(path)?;
        stream.set_read_timeout(io_timeout)?;
        stream.set_write_timeout(io_timeout)?;
        let reader_stream = stream.try_clone()?;

        debug!(?path, "session opened");
        Ok(Self {
            reader: StreamReader::with_config(reader_stream, frame_config.clone()),
            writer: FrameWriter::with_config(stream, frame_config),
        })
    }

    /// The frame reader bound to this connection.
    pub fn reader(&mut self) -> &mut StreamReader<SocketStream> {
        &mut self.reader
    }

    /// The frame writer bound to this connection.
    pub fn writer(&mut self) -> &mut FrameWriter<SocketStream> {
        &mut self.writer
    }

    /// Best-effort shutdown; idempotent, close-time errors are swallowed.
    pub fn close(&self) {
        self.writer.get_ref().close();
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.close();
    }
}
