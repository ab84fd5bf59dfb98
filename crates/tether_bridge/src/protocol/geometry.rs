//! # Geometry Batch Codec
//!
//! Packs transform deltas for many objects into one binary frame.
//!
//! ## Frame Layout
//!
//! ```text
//! "<timestamp>" STX "updateGeometry" ETX
//! ┌────────────────────────────┬─────────┬───────────┬─────────────┐
//! │ header u32 (handle<<6|bits)│ scale?  │ rotation? │ translation?│  ... repeated
//! │                            │ 3 x f32 │ 4 x f32   │ 3 x f32     │
//! └────────────────────────────┴─────────┴───────────┴─────────────┘
//! ```
//!
//! Header bits (low to high): translation snap, translation present,
//! rotation snap, rotation present, scale snap, scale present. A snap bit is
//! only meaningful together with its present bit. All values little-endian.
//!
//! The float count of a record depends only on its header, so the decoder
//! can step over records for handles it does not know without losing sync.

use tether_shared::{ObjectHandle, Quaternion, Vec3};

use super::serialization::{ByteReader, ByteWriter};
use super::wire::{parse_timestamp, Arg};
use crate::error::DecodeError;

/// Command name written into binary geometry headers.
pub const GEOMETRY_COMMAND: &str = "updateGeometry";

/// Older spelling of [`GEOMETRY_COMMAND`], still accepted on decode.
pub const LEGACY_GEOMETRY_COMMAND: &str = "updateSpatial";

/// Translation snap bit.
pub const TRANSLATION_SNAP: u32 = 1;
/// Translation present bit.
pub const TRANSLATION: u32 = 2;
/// Rotation snap bit.
pub const ROTATION_SNAP: u32 = 4;
/// Rotation present bit.
pub const ROTATION: u32 = 8;
/// Scale snap bit.
pub const SCALE_SNAP: u32 = 16;
/// Scale present bit.
pub const SCALE: u32 = 32;

/// Number of low header bits used for flags.
pub const FLAG_BITS: u32 = 6;

const FLAG_MASK: u32 = (1 << FLAG_BITS) - 1;

/// Largest encoded record: header plus ten floats.
pub const MAX_RECORD_BYTES: usize = 4 + 10 * 4;

/// A new value for one transform axis.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AxisUpdate<T> {
    /// Target value.
    pub value: T,
    /// Apply immediately instead of interpolating toward it.
    pub snap: bool,
}

impl<T> AxisUpdate<T> {
    /// Smoothed update.
    #[inline]
    pub const fn smooth(value: T) -> Self {
        Self { value, snap: false }
    }

    /// Snap update.
    #[inline]
    pub const fn snap(value: T) -> Self {
        Self { value, snap: true }
    }
}

/// Pending transform change for one object.
///
/// Each axis holds at most one value, either smoothed or snapped; setting
/// one form replaces the other.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct GeometryUpdate {
    /// Scale change.
    pub scale: Option<AxisUpdate<Vec3>>,
    /// Rotation change.
    pub rotation: Option<AxisUpdate<Quaternion>>,
    /// Translation change.
    pub translation: Option<AxisUpdate<Vec3>>,
}

impl GeometryUpdate {
    /// An update touching no axis.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            scale: None,
            rotation: None,
            translation: None,
        }
    }

    /// Sets a smoothed scale.
    #[must_use]
    pub const fn with_scale(mut self, value: Vec3) -> Self {
        self.scale = Some(AxisUpdate::smooth(value));
        self
    }

    /// Sets a snapped scale.
    #[must_use]
    pub const fn with_scale_snap(mut self, value: Vec3) -> Self {
        self.scale = Some(AxisUpdate::snap(value));
        self
    }

    /// Sets a smoothed rotation.
    #[must_use]
    pub const fn with_rotation(mut self, value: Quaternion) -> Self {
        self.rotation = Some(AxisUpdate::smooth(value));
        self
    }

    /// Sets a snapped rotation.
    #[must_use]
    pub const fn with_rotation_snap(mut self, value: Quaternion) -> Self {
        self.rotation = Some(AxisUpdate::snap(value));
        self
    }

    /// Sets a smoothed translation.
    #[must_use]
    pub const fn with_translation(mut self, value: Vec3) -> Self {
        self.translation = Some(AxisUpdate::smooth(value));
        self
    }

    /// Sets a snapped translation.
    #[must_use]
    pub const fn with_translation_snap(mut self, value: Vec3) -> Self {
        self.translation = Some(AxisUpdate::snap(value));
        self
    }

    /// True if no axis is set.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.scale.is_none() && self.rotation.is_none() && self.translation.is_none()
    }

    /// Overwrites the axes present in `newer`, keeping the others.
    pub fn merge(&mut self, newer: &Self) {
        if newer.scale.is_some() {
            self.scale = newer.scale;
        }
        if newer.rotation.is_some() {
            self.rotation = newer.rotation;
        }
        if newer.translation.is_some() {
            self.translation = newer.translation;
        }
    }

    /// Flag bits for the binary record header.
    #[must_use]
    pub fn flag_bits(&self) -> u32 {
        let mut bits = 0;
        if let Some(axis) = self.scale {
            bits |= SCALE | if axis.snap { SCALE_SNAP } else { 0 };
        }
        if let Some(axis) = self.rotation {
            bits |= ROTATION | if axis.snap { ROTATION_SNAP } else { 0 };
        }
        if let Some(axis) = self.translation {
            bits |= TRANSLATION | if axis.snap { TRANSLATION_SNAP } else { 0 };
        }
        bits
    }

    /// Bytes this update occupies in a binary frame, header included.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        4 + payload_len(self.flag_bits())
    }

    /// Text-form arguments: `aspect, f, f, f[, f]` per axis, each float its
    /// own field.
    #[must_use]
    pub fn to_text_args(&self) -> Vec<Arg> {
        let mut args = Vec::new();
        if let Some(axis) = self.scale {
            args.push(Arg::from(if axis.snap { "scaleSnap" } else { "scale" }));
            args.extend(axis.value.to_array().map(Arg::from));
        }
        if let Some(axis) = self.rotation {
            args.push(Arg::from(if axis.snap { "rotationSnap" } else { "rotation" }));
            args.extend(axis.value.to_array().map(Arg::from));
        }
        if let Some(axis) = self.translation {
            args.push(Arg::from(if axis.snap { "translationSnap" } else { "translation" }));
            args.extend(axis.value.to_array().map(Arg::from));
        }
        args
    }

    /// Parses the text form produced by [`Self::to_text_args`].
    pub fn from_text_args<S: AsRef<str>>(args: &[S]) -> Result<Self, DecodeError> {
        let mut update = Self::new();
        let mut i = 0;
        while i < args.len() {
            let aspect = args[i].as_ref();
            let (name, arity, snap): (&'static str, usize, bool) = match aspect {
                "scale" => ("scale", 3, false),
                "scaleSnap" => ("scale", 3, true),
                "rotation" => ("rotation", 4, false),
                "rotationSnap" => ("rotation", 4, true),
                "translation" => ("translation", 3, false),
                "translationSnap" => ("translation", 3, true),
                other => return Err(DecodeError::UnknownAspect(other.to_owned())),
            };
            let values = args
                .get(i + 1..i + 1 + arity)
                .ok_or(DecodeError::WrongArity {
                    aspect: name,
                    expected: arity,
                    got: args.len() - i - 1,
                })?
                .iter()
                .map(|s| {
                    s.as_ref()
                        .trim()
                        .parse::<f32>()
                        .map_err(|_| DecodeError::InvalidNumber {
                            context: name,
                            value: s.as_ref().to_owned(),
                        })
                })
                .collect::<Result<Vec<f32>, _>>()?;
            update.set_axis(name, &values, snap)?;
            i += 1 + arity;
        }
        Ok(update)
    }

    /// Sets one axis from a float slice, by aspect name.
    pub(crate) fn set_axis(
        &mut self,
        aspect: &'static str,
        values: &[f32],
        snap: bool,
    ) -> Result<(), DecodeError> {
        let wrong = |expected| DecodeError::WrongArity {
            aspect,
            expected,
            got: values.len(),
        };
        match aspect {
            "scale" => {
                let value = Vec3::from_slice(values).ok_or_else(|| wrong(Vec3::LEN))?;
                self.scale = Some(AxisUpdate { value, snap });
            }
            "rotation" => {
                let value = Quaternion::from_slice(values).ok_or_else(|| wrong(Quaternion::LEN))?;
                self.rotation = Some(AxisUpdate { value, snap });
            }
            "translation" => {
                let value = Vec3::from_slice(values).ok_or_else(|| wrong(Vec3::LEN))?;
                self.translation = Some(AxisUpdate { value, snap });
            }
            other => return Err(DecodeError::UnknownAspect(other.to_owned())),
        }
        Ok(())
    }
}

/// Payload bytes implied by a record's flag bits.
#[inline]
#[must_use]
pub const fn payload_len(bits: u32) -> usize {
    let mut floats = 0;
    if bits & SCALE != 0 {
        floats += Vec3::LEN;
    }
    if bits & ROTATION != 0 {
        floats += Quaternion::LEN;
    }
    if bits & TRANSLATION != 0 {
        floats += Vec3::LEN;
    }
    floats * 4
}

/// One object's entry in a geometry batch.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GeometryRecord {
    /// Target object.
    pub handle: ObjectHandle,
    /// Axes to change.
    pub update: GeometryUpdate,
}

impl GeometryRecord {
    /// Creates a record.
    #[must_use]
    pub const fn new(handle: ObjectHandle, update: GeometryUpdate) -> Self {
        Self { handle, update }
    }

    /// Appends this record in binary form.
    ///
    /// Returns false, writing nothing, if the handle does not fit the header.
    pub fn write_to(&self, writer: &mut ByteWriter) -> bool {
        if !self.handle.fits_geometry_header() {
            return false;
        }
        writer.write_u32((self.handle.get() << FLAG_BITS) | self.update.flag_bits());
        if let Some(axis) = self.update.scale {
            writer.write_pod(&axis.value);
        }
        if let Some(axis) = self.update.rotation {
            writer.write_pod(&axis.value);
        }
        if let Some(axis) = self.update.translation {
            writer.write_pod(&axis.value);
        }
        true
    }
}

/// Writes a complete binary geometry frame into `writer`.
///
/// Records whose handle does not fit the header are skipped; the number
/// written is returned.
pub fn encode_geometry_frame<'r, I>(writer: &mut ByteWriter, timestamp: i64, records: I) -> usize
where
    I: IntoIterator<Item = &'r GeometryRecord>,
{
    writer.reset();
    writer.write_bytes(timestamp.to_string().as_bytes());
    writer.write_u8(tether_shared::BUNDLE_SEPARATOR);
    writer.write_bytes(GEOMETRY_COMMAND.as_bytes());
    writer.write_u8(tether_shared::HEADER_TERMINATOR);

    let mut written = 0;
    for record in records {
        if record.write_to(writer) {
            written += 1;
        } else {
            tracing::warn!(
                target: "tether::info",
                handle = %record.handle,
                "handle does not fit geometry header, record dropped"
            );
        }
    }
    written
}

/// A binary frame split into its ASCII header and raw payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BinaryFrame<'a> {
    /// Sender's virtual time.
    pub timestamp: i64,
    /// Command named in the header.
    pub command: &'a str,
    /// Bytes after the ETX terminator.
    pub payload: &'a [u8],
}

impl<'a> BinaryFrame<'a> {
    /// Splits a raw binary frame.
    pub fn parse(bytes: &'a [u8]) -> Result<Self, DecodeError> {
        let end = bytes
            .iter()
            .position(|&b| b == tether_shared::HEADER_TERMINATOR)
            .ok_or(DecodeError::MissingHeaderTerminator)?;
        let header =
            std::str::from_utf8(&bytes[..end]).map_err(|_| DecodeError::InvalidUtf8)?;
        let (timestamp, command) = header
            .split_once(tether_shared::constants::BUNDLE_SEPARATOR_CHAR)
            .ok_or_else(|| DecodeError::MalformedBinaryHeader(header.to_owned()))?;
        if command.is_empty() {
            return Err(DecodeError::MalformedBinaryHeader(header.to_owned()));
        }
        Ok(Self {
            timestamp: parse_timestamp(timestamp)?,
            command,
            payload: &bytes[end + 1..],
        })
    }

    /// True if the header names a geometry batch, in either spelling.
    #[must_use]
    pub fn is_geometry(&self) -> bool {
        self.command == GEOMETRY_COMMAND || self.command == LEGACY_GEOMETRY_COMMAND
    }

    /// Iterates the geometry records of the payload.
    #[must_use]
    pub fn records(&self) -> GeometryDecoder<'a> {
        GeometryDecoder::new(self.payload)
    }
}

/// Sequential decoder over a geometry payload.
///
/// Yields records until the payload is exhausted. A truncated record yields
/// one error and ends the iteration; nothing past the buffer is read.
#[derive(Debug, Clone)]
pub struct GeometryDecoder<'a> {
    reader: ByteReader<'a>,
    failed: bool,
}

impl<'a> GeometryDecoder<'a> {
    /// Creates a decoder over raw record bytes.
    #[must_use]
    pub const fn new(payload: &'a [u8]) -> Self {
        Self {
            reader: ByteReader::new(payload),
            failed: false,
        }
    }

    fn decode_next(&mut self) -> Result<GeometryRecord, DecodeError> {
        let remaining = self.reader.remaining();
        let header = self
            .reader
            .read_u32()
            .ok_or(DecodeError::TrailingBytes(remaining))?;
        let handle = ObjectHandle(header >> FLAG_BITS);
        let bits = header & FLAG_MASK;

        let needed = payload_len(bits);
        if self.reader.remaining() < needed {
            return Err(DecodeError::TruncatedRecord {
                handle,
                needed,
                remaining: self.reader.remaining(),
            });
        }

        let truncated = || DecodeError::TruncatedRecord {
            handle,
            needed,
            remaining: 0,
        };
        let mut update = GeometryUpdate::new();
        if bits & SCALE != 0 {
            let value = self.reader.read_pod::<Vec3>().ok_or_else(truncated)?;
            update.scale = Some(AxisUpdate {
                value,
                snap: bits & SCALE_SNAP != 0,
            });
        }
        if bits & ROTATION != 0 {
            let value = self.reader.read_pod::<Quaternion>().ok_or_else(truncated)?;
            update.rotation = Some(AxisUpdate {
                value,
                snap: bits & ROTATION_SNAP != 0,
            });
        }
        if bits & TRANSLATION != 0 {
            let value = self.reader.read_pod::<Vec3>().ok_or_else(truncated)?;
            update.translation = Some(AxisUpdate {
                value,
                snap: bits & TRANSLATION_SNAP != 0,
            });
        }
        Ok(GeometryRecord { handle, update })
    }
}

impl Iterator for GeometryDecoder<'_> {
    type Item = Result<GeometryRecord, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.reader.is_exhausted() {
            return None;
        }
        let result = self.decode_next();
        self.failed = result.is_err();
        Some(result)
    }
}

/// Decodes every record of a payload, failing on the first bad one.
pub fn decode_geometry_records(payload: &[u8]) -> Result<Vec<GeometryRecord>, DecodeError> {
    GeometryDecoder::new(payload).collect()
}
