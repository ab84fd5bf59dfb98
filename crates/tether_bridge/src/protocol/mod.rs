//! # Bridge Protocol
//!
//! Two message shapes share one connection.
//!
//! ## Frame Shapes
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ Text command   name SOH arg SOH arg ...                      │
//! ├──────────────────────────────────────────────────────────────┤
//! │ Text bundle    timestamp STX command STX command ...         │
//! ├──────────────────────────────────────────────────────────────┤
//! │ Binary         "timestamp" STX "updateGeometry" ETX records  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Which shape a frame has is decided by the transport's frame kind, never
//! by sniffing the bytes.

pub mod commands;
pub mod geometry;
mod serialization;
pub mod wire;

pub use geometry::{
    decode_geometry_records, encode_geometry_frame, AxisUpdate, BinaryFrame, GeometryDecoder,
    GeometryRecord, GeometryUpdate, GEOMETRY_COMMAND, LEGACY_GEOMETRY_COMMAND,
};
pub use serialization::{ByteReader, ByteWriter};
pub use wire::{
    decode_bundle, decode_command, decode_text, encode_bundle, encode_command, parse_floats,
    parse_number, parse_numbers, parse_timestamp, Arg, Command, TextFrame,
};

use crate::error::DecodeError;

/// A frame as carried by the transport.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Frame {
    /// Text command or bundle.
    Text(String),
    /// Binary frame with an ASCII header.
    Binary(Vec<u8>),
}

impl Frame {
    /// Payload size in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Text(text) => text.len(),
            Self::Binary(bytes) => bytes.len(),
        }
    }

    /// True for a zero-length payload.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A decoded inbound frame.
#[derive(Clone, Debug, PartialEq)]
pub enum Decoded {
    /// Text commands (one, or a bundle).
    Text(TextFrame),
    /// A binary geometry batch. Records after a decode fault are lost; the
    /// fault, if any, is reported alongside the good records.
    Geometry {
        /// Sender's virtual time.
        timestamp: i64,
        /// Records decoded before any fault.
        records: Vec<GeometryRecord>,
        /// First decode fault, if the payload was damaged.
        fault: Option<DecodeError>,
    },
    /// A binary frame naming some other command; payload is passed on raw.
    OtherBinary {
        /// Sender's virtual time.
        timestamp: i64,
        /// Header command.
        command: String,
        /// Raw payload.
        payload: Vec<u8>,
    },
}

/// Decodes one transport frame.
pub fn decode_frame(frame: &Frame) -> Result<Decoded, DecodeError> {
    match frame {
        Frame::Text(text) => decode_text(text).map(Decoded::Text),
        Frame::Binary(bytes) => {
            let binary = BinaryFrame::parse(bytes)?;
            if !binary.is_geometry() {
                return Ok(Decoded::OtherBinary {
                    timestamp: binary.timestamp,
                    command: binary.command.to_owned(),
                    payload: binary.payload.to_vec(),
                });
            }
            let mut records = Vec::new();
            let mut fault = None;
            for result in binary.records() {
                match result {
                    Ok(record) => records.push(record),
                    Err(err) => fault = Some(err),
                }
            }
            Ok(Decoded::Geometry {
                timestamp: binary.timestamp,
                records,
                fault,
            })
        }
    }
}
