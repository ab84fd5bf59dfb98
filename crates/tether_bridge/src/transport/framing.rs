//! # Stream Framing
//!
//! Carries one bridge frame per transport frame over a byte stream.
//!
//! ```text
//! ┌──────────┬──────────────┬─────────────────┐
//! │ kind u8  │ len u32 (LE) │ payload         │
//! │ 0 = text │              │ len bytes       │
//! │ 1 = bin  │              │                 │
//! └──────────┴──────────────┴─────────────────┘
//! ```

use std::io::{self, Read, Write};

use crate::error::TransportError;
use crate::protocol::Frame;

/// Kind byte for text frames.
pub const KIND_TEXT: u8 = 0;

/// Kind byte for binary frames.
pub const KIND_BINARY: u8 = 1;

/// Bytes before the payload.
pub const HEADER_SIZE: usize = 5;

/// Default payload limit: 16 MiB.
pub const DEFAULT_MAX_FRAME_BYTES: usize = 16 * 1024 * 1024;

/// Writes one frame and flushes.
pub fn write_frame<W: Write>(writer: &mut W, frame: &Frame) -> Result<usize, TransportError> {
    let (kind, payload) = match frame {
        Frame::Text(text) => (KIND_TEXT, text.as_bytes()),
        Frame::Binary(bytes) => (KIND_BINARY, bytes.as_slice()),
    };
    let len = u32::try_from(payload.len()).map_err(|_| TransportError::FrameTooLarge {
        len: payload.len(),
        limit: u32::MAX as usize,
    })?;

    let mut header = [0u8; HEADER_SIZE];
    header[0] = kind;
    header[1..].copy_from_slice(&len.to_le_bytes());
    writer.write_all(&header)?;
    writer.write_all(payload)?;
    writer.flush()?;
    Ok(HEADER_SIZE + payload.len())
}

/// Reads one frame, blocking until it is complete.
///
/// A clean end of stream before a header starts is [`TransportError::Closed`].
pub fn read_frame<R: Read>(reader: &mut R, max_frame_bytes: usize) -> Result<Frame, TransportError> {
    let mut header = [0u8; HEADER_SIZE];
    if let Err(err) = reader.read_exact(&mut header) {
        return Err(if err.kind() == io::ErrorKind::UnexpectedEof {
            TransportError::Closed
        } else {
            TransportError::Io(err)
        });
    }

    let kind = header[0];
    let len = u32::from_le_bytes([header[1], header[2], header[3], header[4]]) as usize;
    if len > max_frame_bytes {
        return Err(TransportError::FrameTooLarge {
            len,
            limit: max_frame_bytes,
        });
    }
    if kind != KIND_TEXT && kind != KIND_BINARY {
        return Err(TransportError::UnknownFrameKind(kind));
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload)?;

    if kind == KIND_BINARY {
        return Ok(Frame::Binary(payload));
    }
    match String::from_utf8(payload) {
        Ok(text) => Ok(Frame::Text(text)),
        // Not UTF-8: pass up as binary and let the decoder drop it.
        Err(err) => Ok(Frame::Binary(err.into_bytes())),
    }
}
