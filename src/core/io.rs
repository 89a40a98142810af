use integer_encoding::VarInt;
use num_enum::TryFromPrimitive;

use crate::base::DecodeError;

/// Protobuf wire types, as found in the lowest three bits of a field tag.
// These values are part of the wire format and shall never be changed.
#[repr(u8)]
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive)]
pub enum WireType {
    Varint = 0,
    Fixed64 = 1,
    LengthDelimited = 2,
    StartGroup = 3,
    EndGroup = 4,
    Fixed32 = 5,
}

/// Builds a field tag (key) out of the field number and its wire type.
#[inline]
pub(crate) const fn field_tag(field: u32, wire_type: WireType) -> u64 {
    ((field as u64) << 3) | (wire_type as u64)
}

/// The internal trait for any buffer that can be read from.
/// For an implementation, see [`SliceReader`].
pub(crate) trait TempoReader<'a> {
    /// Returns how many bytes the reader has left.
    fn bytes_left(&self) -> usize;

    /// Returns true, if the reader has reached the EOF.
    fn is_eof(&self) -> bool {
        self.bytes_left() == 0
    }

    /// Return the remaining bytes without advancing the reader.
    fn remaining(&self) -> &'a [u8];

    /// Reads the remaining bytes and advances the reader.
    fn read_remaining(&mut self) -> &'a [u8];

    /// Advances the reader by `len` bytes.
    fn advance(&mut self, len: usize) -> Result<(), DecodeError>;

    /// Reads exactly `len` bytes, advancing the reader past them.
    fn read_slice(&mut self, len: usize) -> Result<&'a [u8], DecodeError> {
        let slice = self.remaining().get(..len).ok_or(DecodeError::UnexpectedEof)?;
        self.advance(len)?;
        Ok(slice)
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        let mut bytes = [0u8; N];
        bytes.copy_from_slice(self.read_slice(N)?);
        Ok(bytes)
    }

    fn read_u32_be(&mut self) -> Result<u32, DecodeError> {
        Ok(u32::from_be_bytes(self.read_array()?))
    }

    /// Reads an unsigned LEB128 varint of at most 10 bytes.
    fn read_uvarint(&mut self) -> Result<u64, DecodeError> {
        let (val, read) = u64::decode_var(self.remaining()).ok_or_else(|| {
            // `decode_var` gives up both on truncated and on overlong input
            if self.remaining().iter().any(|b| b & 0x80 == 0) {
                DecodeError::InvalidVarint
            } else {
                DecodeError::UnexpectedEof
            }
        })?;
        self.advance(read)?;
        Ok(val)
    }

    /// Reads a field tag, splitting it into field number and wire type.
    fn read_field_tag(&mut self) -> Result<(u32, WireType), DecodeError> {
        let tag = self.read_uvarint()?;
        let wire_type = WireType::try_from((tag & 0b111) as u8)?;
        let field = u32::try_from(tag >> 3).map_err(|_| DecodeError::InvalidVarint)?;
        Ok((field, wire_type))
    }

    /// Skips over the value of a field with the given wire type.
    fn skip_field(&mut self, wire_type: WireType) -> Result<(), DecodeError> {
        match wire_type {
            WireType::Varint => self.read_uvarint().map(|_| ()),
            WireType::Fixed64 => self.advance(8),
            WireType::Fixed32 => self.advance(4),
            WireType::LengthDelimited => {
                let len = self.read_uvarint()?;
                let len = usize::try_from(len).map_err(|_| DecodeError::UnexpectedEof)?;
                self.advance(len)
            }
            WireType::StartGroup | WireType::EndGroup => {
                Err(DecodeError::UnsupportedWireType(wire_type))
            }
        }
    }
}

/// An implementation of the [`TempoReader`] trait over a byte-slice.
pub(crate) struct SliceReader<'a> {
    slice: &'a [u8],
    position: usize,
}

impl<'a> SliceReader<'a> {
    pub(crate) fn new(slice: &'a [u8]) -> Self {
        Self { slice, position: 0 }
    }
}

impl<'a> TempoReader<'a> for SliceReader<'a> {
    fn bytes_left(&self) -> usize {
        self.slice.len() - self.position
    }

    fn remaining(&self) -> &'a [u8] {
        &self.slice[self.position..]
    }

    fn read_remaining(&mut self) -> &'a [u8] {
        let slice = &self.slice[self.position..];
        self.position = self.slice.len();
        slice
    }

    fn advance(&mut self, len: usize) -> Result<(), DecodeError> {
        if len > self.bytes_left() {
            Err(DecodeError::UnexpectedEof)
        } else {
            self.position += len;
            Ok(())
        }
    }
}

/// The internal trait for any buffer that can be written to.
/// An implementation is provided for `Vec<u8>`.
pub(crate) trait TempoWriter {
    /// Reserves capacity for at least `additional` more elements in the internal buffer.
    fn reserve(&mut self, additional: usize);

    /// Writes a single byte.
    fn write_u8(&mut self, val: u8);

    /// Writes a slice of bytes.
    fn write_bytes(&mut self, bytes: &[u8]);

    fn write_u32_be(&mut self, val: u32) {
        self.write_bytes(&val.to_be_bytes());
    }

    /// Writes an unsigned LEB128 varint.
    fn write_uvarint(&mut self, val: u64) {
        let mut buf = [0u8; 10];
        let len = val.encode_var(&mut buf);
        self.write_bytes(&buf[..len]);
    }

    fn write_field_tag(&mut self, field: u32, wire_type: WireType) {
        self.write_uvarint(field_tag(field, wire_type));
    }
}

impl TempoWriter for Vec<u8> {
    fn reserve(&mut self, additional: usize) {
        Vec::reserve(self, additional);
    }

    fn write_u8(&mut self, val: u8) {
        self.push(val);
    }

    fn write_bytes(&mut self, bytes: &[u8]) {
        self.extend_from_slice(bytes);
    }
}
