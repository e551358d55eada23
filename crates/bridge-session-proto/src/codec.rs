// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Packed little-endian codec helpers (fixed-width scalars, u32-prefixed strings).

use bridge_scene_port::{EntityId, IdWidth, WireVertex};
use core::str;
use thiserror::Error;

/// Upper bound on encoded names (object, mesh and light names).
pub const MAX_NAME_BYTES: usize = 64 * 1024;

/// Errors produced by codec readers and writers.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Attempted to read beyond the end of the buffer.
    #[error("buffer too short")]
    OutOfBounds,
    /// UTF-8 decoding failed.
    #[error("invalid utf-8")]
    InvalidUtf8,
    /// String length exceeded max bound.
    #[error("string too long ({len} bytes, max {max})")]
    StringTooLong {
        /// Encoded length.
        len: usize,
        /// Allowed maximum.
        max: usize,
    },
    /// Length prefix exceeded max bound.
    #[error("length too large")]
    LengthTooLarge,
    /// Enum decoding failed.
    #[error("invalid enum value {0}")]
    InvalidEnum(u8),
    /// Light kind has no wire representation.
    #[error("light kind {0:?} is not supported on the wire")]
    UnsupportedLight(bridge_scene_port::LightKind),
    /// Entity id does not fit the negotiated id width.
    #[error("id {0} does not fit the wire id width")]
    IdOutOfRange(u64),
    /// Mesh has more vertices than a u32 count can describe.
    #[error("too many vertices: {0}")]
    TooManyVertices(usize),
    /// A vertex does not match the layout flags of its mesh.
    #[error("vertex {index} does not match the mesh vertex layout")]
    VertexLayoutMismatch {
        /// Offending vertex index.
        index: usize,
    },
    /// Bytes left over after a fixed-size payload.
    #[error("{0} trailing bytes after payload")]
    TrailingBytes(usize),
}

/// Writer for little-endian scalars and length-prefixed strings.
#[derive(Debug, Default)]
pub struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    /// Create a new writer with a pre-allocated capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    /// Write raw bytes.
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Write a single byte.
    pub fn write_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    /// Write a boolean as one byte (0 or 1).
    pub fn write_bool(&mut self, value: bool) {
        self.buf.push(u8::from(value));
    }

    /// Write a little-endian u16.
    pub fn write_u16_le(&mut self, value: u16) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    /// Write a little-endian u32.
    pub fn write_u32_le(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    /// Write a little-endian i64.
    pub fn write_i64_le(&mut self, value: i64) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    /// Write a little-endian f32.
    pub fn write_f32_le(&mut self, value: f32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    /// Write a run of little-endian f32 values.
    pub fn write_f32s(&mut self, values: &[f32]) {
        for v in values {
            self.write_f32_le(*v);
        }
    }

    /// Write an entity id at the given width.
    ///
    /// Narrow ids are the low 32 bits reinterpreted as `int32`, so synthetic
    /// ids (sentinel bit set) come out negative, matching what peers expect.
    pub fn write_id(&mut self, id: EntityId, width: IdWidth) -> Result<(), CodecError> {
        match width {
            IdWidth::Narrow => {
                let raw = u32::try_from(id.0).map_err(|_| CodecError::IdOutOfRange(id.0))?;
                self.write_u32_le(raw);
            }
            IdWidth::Wide => self.buf.extend_from_slice(&id.0.to_le_bytes()),
        }
        Ok(())
    }

    /// Write a u32-length-prefixed UTF-8 string with a max bound.
    pub fn write_string(&mut self, value: &str, max_len: usize) -> Result<(), CodecError> {
        let bytes = value.as_bytes();
        if bytes.len() > max_len {
            return Err(CodecError::StringTooLong {
                len: bytes.len(),
                max: max_len,
            });
        }
        let len: u32 = bytes
            .len()
            .try_into()
            .map_err(|_| CodecError::LengthTooLarge)?;
        self.write_u32_le(len);
        self.write_bytes(bytes);
        Ok(())
    }

    /// Write one vertex in the layout given by `uv_channels` / `has_color`.
    pub fn write_vertex(
        &mut self,
        vertex: &WireVertex,
        uv_channels: u8,
        has_color: bool,
    ) -> Result<(), VertexMismatch> {
        if vertex.uvs.len() != usize::from(uv_channels) || vertex.color.is_some() != has_color {
            return Err(VertexMismatch);
        }
        self.write_f32s(&vertex.position);
        self.write_f32s(&vertex.normal);
        for uv in &vertex.uvs {
            self.write_f32s(uv);
        }
        if let Some(color) = vertex.color {
            self.write_bytes(&color);
        }
        Ok(())
    }

    /// Bytes written so far.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Whether nothing has been written.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Consume the writer and return the buffer.
    #[must_use]
    pub fn into_vec(self) -> Vec<u8> {
        self.buf
    }
}

/// Marker returned by [`Writer::write_vertex`]; callers attach the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexMismatch;

/// Reader for little-endian scalars and length-prefixed strings.
#[derive(Debug)]
pub struct Reader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    /// Create a reader over the provided byte slice.
    #[must_use]
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, offset: 0 }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], CodecError> {
        let end = self
            .offset
            .checked_add(len)
            .ok_or(CodecError::OutOfBounds)?;
        if end > self.bytes.len() {
            return Err(CodecError::OutOfBounds);
        }
        let out = &self.bytes[self.offset..end];
        self.offset = end;
        Ok(out)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], CodecError> {
        let chunk = self.take(N)?;
        chunk.try_into().map_err(|_| CodecError::OutOfBounds)
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.offset
    }

    /// Fail with [`CodecError::TrailingBytes`] unless the buffer is consumed.
    pub fn finish(&self) -> Result<(), CodecError> {
        match self.remaining() {
            0 => Ok(()),
            n => Err(CodecError::TrailingBytes(n)),
        }
    }

    /// Read raw bytes.
    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], CodecError> {
        self.take(len)
    }

    /// Read a single byte.
    pub fn read_u8(&mut self) -> Result<u8, CodecError> {
        Ok(self.array::<1>()?[0])
    }

    /// Read a boolean byte (any non-zero value is true).
    pub fn read_bool(&mut self) -> Result<bool, CodecError> {
        Ok(self.read_u8()? != 0)
    }

    /// Read a little-endian u16.
    pub fn read_u16_le(&mut self) -> Result<u16, CodecError> {
        Ok(u16::from_le_bytes(self.array()?))
    }

    /// Read a little-endian u32.
    pub fn read_u32_le(&mut self) -> Result<u32, CodecError> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    /// Read a little-endian i64.
    pub fn read_i64_le(&mut self) -> Result<i64, CodecError> {
        Ok(i64::from_le_bytes(self.array()?))
    }

    /// Read a little-endian f32.
    pub fn read_f32_le(&mut self) -> Result<f32, CodecError> {
        Ok(f32::from_le_bytes(self.array()?))
    }

    /// Read `N` consecutive f32 values.
    pub fn read_f32s<const N: usize>(&mut self) -> Result<[f32; N], CodecError> {
        let mut out = [0.0f32; N];
        for slot in &mut out {
            *slot = self.read_f32_le()?;
        }
        Ok(out)
    }

    /// Read an entity id at the given width.
    pub fn read_id(&mut self, width: IdWidth) -> Result<EntityId, CodecError> {
        Ok(match width {
            IdWidth::Narrow => EntityId(u64::from(self.read_u32_le()?)),
            IdWidth::Wide => EntityId(u64::from_le_bytes(self.array()?)),
        })
    }

    /// Read a u32-length-prefixed UTF-8 string with a max bound.
    pub fn read_string(&mut self, max_len: usize) -> Result<String, CodecError> {
        let len = self.read_u32_le()? as usize;
        if len > max_len {
            return Err(CodecError::LengthTooLarge);
        }
        let bytes = self.take(len)?;
        str::from_utf8(bytes)
            .map(ToString::to_string)
            .map_err(|_| CodecError::InvalidUtf8)
    }

    /// Read one vertex in the given layout.
    pub fn read_vertex(&mut self, uv_channels: u8, has_color: bool) -> Result<WireVertex, CodecError> {
        let position = self.read_f32s::<3>()?;
        let normal = self.read_f32s::<3>()?;
        let mut uvs = Vec::with_capacity(usize::from(uv_channels));
        for _ in 0..uv_channels {
            uvs.push(self.read_f32s::<2>()?);
        }
        let color = if has_color { Some(self.array::<4>()?) } else { None };
        Ok(WireVertex {
            position,
            normal,
            uvs,
            color,
        })
    }
}
