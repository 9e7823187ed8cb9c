use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};

/// Frame delimiter: "BKP1" as a big-endian u32.
pub const DELIMITER: u32 = 0x424B_5031;

/// Header: delimiter (4) + length (4).
pub const HEADER_SIZE: usize = 8;

/// Trailer: length repeated (4).
pub const TRAILER_SIZE: usize = 4;

/// Non-payload bytes per frame.
pub const FRAME_OVERHEAD: usize = HEADER_SIZE + TRAILER_SIZE;

/// Smallest complete frame: overhead plus a 1-byte payload.
pub const MIN_FRAME_LEN: usize = FRAME_OVERHEAD + 1;

/// Default maximum payload size: 16 MiB.
pub const DEFAULT_MAX_MESSAGE_LENGTH: usize = 16 * 1024 * 1024;

/// Configuration for the frame codec.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum payload size in bytes. Default: 16 MiB.
    pub max_message_length: usize,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_message_length: DEFAULT_MAX_MESSAGE_LENGTH,
        }
    }
}

/// Encode a frame into the wire format.
///
/// Wire format (all integers big-endian):
/// ```text
/// ┌──────────────┬───────────┬──────────────────┬───────────┐
/// │ Delimiter    │ Length    │ Payload          │ Length    │
/// │ "BKP1" (4B)  │ (4B BE)   │ (Length bytes)   │ (4B BE)   │
/// └──────────────┴───────────┴──────────────────┴───────────┘
/// ```
///
/// No length limit is enforced here; writers constrain upstream.
pub fn encode_frame(payload: &[u8], dst: &mut BytesMut) {
    dst.reserve(FRAME_OVERHEAD + payload.len());
    dst.put_u32(DELIMITER);
    dst.put_u32(payload.len() as u32);
    dst.put_slice(payload);
    dst.put_u32(payload.len() as u32);
}

/// Extract the next complete frame payload from a stream buffer.
///
/// Returns `Ok(None)` if the buffer does not yet hold a complete frame
/// (more data is needed); the only bytes consumed in that case are garbage
/// ahead of a found delimiter. On success, consumes the whole frame.
///
/// On a malformed frame (`InvalidLength`, `LengthMismatch`) the buffer head
/// is advanced by exactly one byte before the error is returned, so a
/// subsequent scan re-attempts synchronization one byte later.
pub fn extract_frame(src: &mut BytesMut, max_len: usize) -> Result<Option<Bytes>> {
    let Some(start) = find_delimiter(src) else {
        return Ok(None); // No delimiter yet; keep accumulating
    };
    if start > 0 {
        // Discard garbage so the delimiter sits at the head.
        src.advance(start);
    }

    if src.len() < MIN_FRAME_LEN {
        return Ok(None); // Cannot read length (or any payload) yet
    }

    let length = u32::from_be_bytes(src[4..8].try_into().unwrap()) as usize;
    if length == 0 || length > max_len {
        src.advance(1);
        return Err(FrameError::InvalidLength {
            length,
            max: max_len,
        });
    }

    let total = FRAME_OVERHEAD + length;
    if src.len() < total {
        return Ok(None); // Payload or trailer still in flight
    }

    let trailer =
        u32::from_be_bytes(src[HEADER_SIZE + length..total].try_into().unwrap()) as usize;
    if trailer != length {
        src.advance(1);
        return Err(FrameError::LengthMismatch {
            expected: length,
            found: trailer,
        });
    }

    src.advance(HEADER_SIZE);
    let payload = src.split_to(length).freeze();
    src.advance(TRAILER_SIZE);

    Ok(Some(payload))
}

/// Locate the delimiter with a rolling 4-byte big-endian accumulator.
///
/// Returns the offset of the first delimiter byte.
fn find_delimiter(src: &[u8]) -> Option<usize> {
    let mut acc: u32 = 0;
    for (i, &byte) in src.iter().enumerate() {
        acc = (acc << 8) | u32::from(byte);
        if i >= 3 && acc == DELIMITER {
            return Some(i - 3);
        }
    }
    None
}
