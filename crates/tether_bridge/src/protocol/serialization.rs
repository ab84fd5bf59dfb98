//! # Byte Serialization
//!
//! Little-endian cursor writer and reader used by the binary geometry frame
//! and the transport framing.
//!
//! ## Design
//!
//! - The writer reuses its buffer between flushes (`reset` keeps capacity)
//! - The reader never panics: every read is bounds-checked and returns `None`
//!   past the end of the buffer
//! - Floats travel as raw IEEE-754 bits, never as text

use bytemuck::{bytes_of, Pod};

/// Growable little-endian byte writer.
///
/// Reused across flushes so the steady state does not allocate.
#[derive(Debug, Default, Clone)]
pub struct ByteWriter {
    buffer: Vec<u8>,
}

impl ByteWriter {
    /// Creates an empty writer.
    #[must_use]
    pub const fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    /// Creates a writer with room for `capacity` bytes.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(capacity),
        }
    }

    /// Clears the written bytes, keeping the allocation.
    #[inline]
    pub fn reset(&mut self) {
        self.buffer.clear();
    }

    /// Returns the number of bytes written.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Returns true if no bytes have been written.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Returns a slice of the written data.
    #[inline]
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.buffer
    }

    /// Consumes the writer and returns its bytes.
    #[must_use]
    pub fn into_inner(self) -> Vec<u8> {
        self.buffer
    }

    /// Writes a single byte.
    #[inline]
    pub fn write_u8(&mut self, value: u8) {
        self.buffer.push(value);
    }

    /// Writes a u32 in little-endian format.
    #[inline]
    pub fn write_u32(&mut self, value: u32) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Writes a f32 in little-endian format.
    #[inline]
    pub fn write_f32(&mut self, value: f32) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Writes every float of a slice in order.
    #[inline]
    pub fn write_f32_slice(&mut self, values: &[f32]) {
        for value in values {
            self.write_f32(*value);
        }
    }

    /// Writes a Pod value's bytes directly.
    ///
    /// Only valid for types whose in-memory layout is the wire layout
    /// (all-`f32` structs on little-endian targets).
    #[inline]
    pub fn write_pod<T: Pod>(&mut self, value: &T) {
        self.buffer.extend_from_slice(bytes_of(value));
    }

    /// Writes raw bytes.
    #[inline]
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }
}

/// Bounds-checked little-endian reader over a borrowed buffer.
#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    buffer: &'a [u8],
    position: usize,
}

impl<'a> ByteReader<'a> {
    /// Creates a reader positioned at the start of `buffer`.
    #[must_use]
    pub const fn new(buffer: &'a [u8]) -> Self {
        Self { buffer, position: 0 }
    }

    /// Returns the number of bytes remaining.
    #[inline]
    #[must_use]
    pub const fn remaining(&self) -> usize {
        self.buffer.len().saturating_sub(self.position)
    }

    /// Returns the current cursor position.
    #[inline]
    #[must_use]
    pub const fn position(&self) -> usize {
        self.position
    }

    /// Returns true when the whole buffer has been consumed.
    #[inline]
    #[must_use]
    pub const fn is_exhausted(&self) -> bool {
        self.remaining() == 0
    }

    /// Reads a single byte.
    #[inline]
    pub fn read_u8(&mut self) -> Option<u8> {
        let value = *self.buffer.get(self.position)?;
        self.position += 1;
        Some(value)
    }

    /// Reads a u32 in little-endian format.
    #[inline]
    pub fn read_u32(&mut self) -> Option<u32> {
        let bytes = self.take(4)?;
        Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Reads a f32 in little-endian format.
    #[inline]
    pub fn read_f32(&mut self) -> Option<f32> {
        self.read_u32().map(f32::from_bits)
    }

    /// Reads `N` consecutive floats.
    #[inline]
    pub fn read_f32_array<const N: usize>(&mut self) -> Option<[f32; N]> {
        if self.remaining() < N * 4 {
            return None;
        }
        let mut out = [0.0; N];
        for slot in &mut out {
            *slot = self.read_f32()?;
        }
        Some(out)
    }

    /// Reads a Pod type directly.
    #[inline]
    pub fn read_pod<T: Pod>(&mut self) -> Option<T> {
        let slice = self.take(std::mem::size_of::<T>())?;
        bytemuck::try_pod_read_unaligned(slice).ok()
    }

    /// Takes the next `len` bytes.
    #[inline]
    pub fn take(&mut self, len: usize) -> Option<&'a [u8]> {
        let end = self.position.checked_add(len)?;
        let slice = self.buffer.get(self.position..end)?;
        self.position = end;
        Some(slice)
    }

    /// Returns everything after the cursor without consuming it.
    #[inline]
    #[must_use]
    pub fn rest(&self) -> &'a [u8] {
        self.buffer.get(self.position..).unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tether_shared::Vec3;

    #[test]
    fn test_write_read_scalars() {
        let mut writer = ByteWriter::new();
        writer.write_u8(7);
        writer.write_u32(0xDEAD_BEEF);
        writer.write_f32(-1.5);

        assert_eq!(writer.len(), 9);

        let mut reader = ByteReader::new(writer.as_slice());
        assert_eq!(reader.read_u8(), Some(7));
        assert_eq!(reader.read_u32(), Some(0xDEAD_BEEF));
        assert_eq!(reader.read_f32(), Some(-1.5));
        assert!(reader.is_exhausted());
        assert_eq!(reader.read_u8(), None);
    }

    #[test]
    fn test_u32_is_little_endian() {
        let mut writer = ByteWriter::new();
        writer.write_u32(0x0403_0201);
        assert_eq!(writer.as_slice(), &[1, 2, 3, 4]);
    }

    #[test]
    fn test_pod_matches_float_layout() {
        let mut by_pod = ByteWriter::new();
        by_pod.write_pod(&Vec3::new(1.0, 2.0, 3.0));

        let mut by_floats = ByteWriter::new();
        by_floats.write_f32_slice(&[1.0, 2.0, 3.0]);

        assert_eq!(by_pod.as_slice(), by_floats.as_slice());

        let mut reader = ByteReader::new(by_pod.as_slice());
        let v: Vec3 = reader.read_pod().unwrap();
        assert_eq!(v, Vec3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn test_short_reads_do_not_advance() {
        let data = [1u8, 2, 3];
        let mut reader = ByteReader::new(&data);
        assert_eq!(reader.read_u32(), None);
        assert_eq!(reader.read_f32_array::<1>(), None);
        assert_eq!(reader.position(), 0);
        assert_eq!(reader.take(3), Some(&data[..]));
    }

    #[test]
    fn test_reset_keeps_capacity() {
        let mut writer = ByteWriter::with_capacity(64);
        writer.write_bytes(&[0; 32]);
        writer.reset();
        assert!(writer.is_empty());
        assert!(writer.into_inner().capacity() >= 64);
    }
}
