//! Self-resynchronizing message framing for the backhaul wire protocol.
//!
//! Every message is framed with:
//! - A 4-byte delimiter ("BKP1") for stream synchronization
//! - A 4-byte big-endian payload length
//! - The payload itself
//! - The same 4-byte length repeated as an integrity trailer
//!
//! The delimiter doubles as the recovery mechanism: after corruption or a
//! misaligned start, the reader scans forward byte by byte until the next
//! delimiter and picks up framing from there without dropping the
//! connection.

pub mod codec;
pub mod error;
pub mod reader;
pub mod writer;

pub use codec::{
    encode_frame, extract_frame, FrameConfig, DEFAULT_MAX_MESSAGE_LENGTH, DELIMITER,
    FRAME_OVERHEAD, HEADER_SIZE, MIN_FRAME_LEN, TRAILER_SIZE,
};
pub use error::{FrameError, Result};
pub use reader::{FrameListener, StreamReader};
pub use writer::{FrameWriter, WRITE_CHUNK_SIZE};
