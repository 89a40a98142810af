//! Serialized forms of a [`Timestamp`].
//!
//! ## Wire Format
//!
//! Compatible with the protobuf message
//!
//! ```not_rust
//! message Timestamp {
//!   int64 wall_time = 1;
//!   int32 logical = 2;
//!   uint32 flags = 3;
//! }
//! ```
//!
//! Fields holding their zero value are omitted, so [`Timestamp::ZERO`] encodes into zero bytes.
//!
//! ## Sortable Format
//!
//! A fixed [`SORTABLE_TIMESTAMP_SIZE`] byte layout, whose first 12 bytes sort in the same order as
//! [`Timestamp::compare`]. Used as the version suffix of MVCC keys.
//!
//! ```not_rust
//! [wall_time ^ sign: u64 BE][logical ^ sign: u32 BE][flags: u8]
//! ```

use bytes::Bytes;
use zerocopy::{BigEndian, FromBytes, Immutable, IntoBytes, KnownLayout, U32, U64};

use crate::{
    base::{DecodeError, TempoError, TempoResult},
    core::{
        SliceReader, TempoReader, TempoWriter, WireType,
        encoding::{
            decode_i32_sortable, decode_i64_sortable, encode_i32_sortable, encode_i64_sortable,
        },
    },
    ctrl::hlc::{Timestamp, TimestampFlags},
};

const WALL_TIME_FIELD: u32 = 1;
const LOGICAL_FIELD: u32 = 2;
const FLAGS_FIELD: u32 = 3;

/// Upper bound of the wire encoding: three one-byte tags, two 10-byte varints for the
/// (possibly negative) signed fields and a 2-byte varint for the flags.
pub const MAX_WIRE_TIMESTAMP_SIZE: usize = 3 + 10 + 10 + 2;

pub const SORTABLE_TIMESTAMP_SIZE: usize = 13;

impl Timestamp {
    /// Appends the wire encoding of this timestamp to `writer`.
    pub(crate) fn encode<W: TempoWriter>(&self, writer: &mut W) {
        writer.reserve(self.encoded_len());
        if self.wall_time() != 0 {
            writer.write_field_tag(WALL_TIME_FIELD, WireType::Varint);
            writer.write_uvarint(self.wall_time() as u64);
        }
        if self.logical() != 0 {
            writer.write_field_tag(LOGICAL_FIELD, WireType::Varint);
            // int32 is sign-extended to 64 bits on the wire
            writer.write_uvarint(self.logical() as i64 as u64);
        }
        if !self.flags().is_empty() {
            writer.write_field_tag(FLAGS_FIELD, WireType::Varint);
            writer.write_uvarint(self.flags().bits() as u64);
        }
    }

    /// Decodes a timestamp from the wire encoding, consuming the reader until EOF.
    pub(crate) fn decode<'a, R: TempoReader<'a>>(reader: &mut R) -> TempoResult<Self> {
        let mut wall_time = 0i64;
        let mut logical = 0i32;
        let mut flags = TimestampFlags::EMPTY;

        while !reader.is_eof() {
            let (field, wire_type) = reader.read_field_tag()?;
            let expect_varint = || -> Result<(), DecodeError> {
                if wire_type != WireType::Varint {
                    return Err(DecodeError::UnexpectedWireType {
                        field,
                        found: wire_type,
                    });
                }
                Ok(())
            };

            // repeated occurrences of a field override the earlier ones
            match field {
                WALL_TIME_FIELD => {
                    expect_varint()?;
                    wall_time = reader.read_uvarint()? as i64;
                }
                LOGICAL_FIELD => {
                    expect_varint()?;
                    logical = reader.read_uvarint()? as i32;
                }
                FLAGS_FIELD => {
                    expect_varint()?;
                    let raw = reader.read_uvarint()?;
                    let raw =
                        u32::try_from(raw).map_err(|_| TempoError::InvalidFlags(u32::MAX))?;
                    flags = TimestampFlags::try_from(raw)?;
                }
                _ => {
                    trace!(field, %wire_type, "skipping unknown timestamp field");
                    reader.skip_field(wire_type)?;
                }
            }
        }

        Ok(Timestamp::new(wall_time, logical).with_flags(flags))
    }

    /// Returns the length of the wire encoding in bytes.
    pub fn encoded_len(&self) -> usize {
        use integer_encoding::VarInt;

        let mut len = 0;
        if self.wall_time() != 0 {
            len += 1 + (self.wall_time() as u64).required_space();
        }
        if self.logical() != 0 {
            len += 1 + (self.logical() as i64 as u64).required_space();
        }
        if !self.flags().is_empty() {
            len += 1 + (self.flags().bits() as u64).required_space();
        }
        len
    }

    /// Encodes this timestamp into its wire format.
    pub fn to_wire_bytes(&self) -> Bytes {
        let mut buf = Vec::with_capacity(self.encoded_len());
        self.encode(&mut buf);
        Bytes::from(buf)
    }

    /// Decodes a timestamp from its wire format. The whole buffer has to be a single message.
    pub fn from_wire_bytes(buf: &[u8]) -> TempoResult<Self> {
        let mut reader = SliceReader::new(buf);
        Self::decode(&mut reader)
    }

    /// Encodes this timestamp into its fixed-size, order-preserving form.
    pub fn to_sortable_bytes(&self) -> [u8; SORTABLE_TIMESTAMP_SIZE] {
        let mut buf = [0u8; SORTABLE_TIMESTAMP_SIZE];
        buf.copy_from_slice(SortableTimestamp::from(*self).as_bytes());
        buf
    }

    /// Decodes a timestamp from its fixed-size, order-preserving form.
    pub fn from_sortable_bytes(buf: &[u8]) -> TempoResult<Self> {
        let sortable =
            SortableTimestamp::read_from_bytes(buf).map_err(|_| DecodeError::UnexpectedEof)?;
        Ok(sortable.into())
    }
}

#[derive(Debug, IntoBytes, FromBytes, KnownLayout, Immutable)]
#[repr(C)]
struct SortableTimestamp {
    wall_time: U64<BigEndian>,
    logical: U32<BigEndian>,
    flags: u8,
}

impl From<Timestamp> for SortableTimestamp {
    fn from(ts: Timestamp) -> Self {
        Self {
            wall_time: U64::from_bytes(encode_i64_sortable(ts.wall_time())),
            logical: U32::from_bytes(encode_i32_sortable(ts.logical())),
            flags: ts.flags().bits(),
        }
    }
}

impl From<SortableTimestamp> for Timestamp {
    fn from(sortable: SortableTimestamp) -> Self {
        let wall_time = decode_i64_sortable(sortable.wall_time.to_bytes());
        let logical = decode_i32_sortable(sortable.logical.to_bytes());
        // a single byte can never exceed the flag width
        let flags = TimestampFlags::from_bits_truncate(sortable.flags as u32);
        Timestamp::new(wall_time, logical).with_flags(flags)
    }
}

#[cfg(test)]
mod tests {
    use bincode::Options;
    use itertools::Itertools;
    use proptest::prelude::*;

    use super::*;
    use crate::base::bincode_options;

    fn ts(wall_time: i64, logical: i32) -> Timestamp {
        Timestamp::new(wall_time, logical)
    }

    #[test]
    fn test_zero_encodes_empty() {
        assert!(Timestamp::ZERO.to_wire_bytes().is_empty());
        assert_eq!(Timestamp::ZERO.encoded_len(), 0);
        assert!(Timestamp::from_wire_bytes(&[]).unwrap() == Timestamp::ZERO);
    }

    #[test]
    fn test_wire_golden_bytes() {
        let cases: &[(Timestamp, &[u8])] = &[
            (ts(1, 0), &[0x08, 0x01]),
            (ts(0, 2), &[0x10, 0x02]),
            (ts(1, 2).with_synthetic(), &[0x08, 0x01, 0x10, 0x02, 0x18, 0x01]),
            (ts(300, 0), &[0x08, 0xAC, 0x02]),
            (
                ts(0, -1),
                &[0x10, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x01],
            ),
        ];
        for (t, expected) in cases {
            let encoded = t.to_wire_bytes();
            assert_eq!(&encoded[..], *expected, "encoding of {t}");
            assert_eq!(t.encoded_len(), expected.len());
            assert!(Timestamp::from_wire_bytes(expected).unwrap() == *t);
        }
    }

    #[test]
    fn test_wire_roundtrip_extremes() {
        let cases = [
            Timestamp::MAX,
            ts(i64::MIN, i32::MIN).with_synthetic(),
            ts(-1, 1),
            ts(1_700_000_000_000_000_000, 7).with_flags(TimestampFlags::from_bits_truncate(0xFE)),
        ];
        for t in cases {
            let encoded = t.to_wire_bytes();
            assert!(encoded.len() <= MAX_WIRE_TIMESTAMP_SIZE);
            assert!(Timestamp::from_wire_bytes(&encoded).unwrap() == t);
        }
    }

    #[test]
    fn test_wire_skips_unknown_fields() {
        let mut buf = Vec::new();
        buf.write_field_tag(7, WireType::LengthDelimited);
        buf.write_uvarint(3);
        buf.write_bytes(b"xyz");
        ts(5, 6).encode(&mut buf);
        buf.write_field_tag(9, WireType::Fixed32);
        buf.write_bytes(&[1, 2, 3, 4]);

        assert!(Timestamp::from_wire_bytes(&buf).unwrap() == ts(5, 6));
    }

    #[test]
    fn test_wire_last_field_wins() {
        let mut buf = Vec::new();
        ts(5, 0).encode(&mut buf);
        ts(9, 0).encode(&mut buf);
        assert!(Timestamp::from_wire_bytes(&buf).unwrap() == ts(9, 0));
    }

    #[test]
    fn test_wire_rejects_invalid_flags() {
        let mut buf = Vec::new();
        buf.write_field_tag(FLAGS_FIELD, WireType::Varint);
        buf.write_uvarint(0x100);
        assert!(matches!(
            Timestamp::from_wire_bytes(&buf),
            Err(TempoError::InvalidFlags(0x100))
        ));

        buf.clear();
        buf.write_field_tag(FLAGS_FIELD, WireType::Varint);
        buf.write_uvarint(u64::MAX);
        assert!(matches!(
            Timestamp::from_wire_bytes(&buf),
            Err(TempoError::InvalidFlags(_))
        ));
    }

    #[test]
    fn test_wire_rejects_wrong_wire_type() {
        let mut buf = Vec::new();
        buf.write_field_tag(WALL_TIME_FIELD, WireType::Fixed64);
        buf.write_bytes(&[0u8; 8]);
        assert!(matches!(
            Timestamp::from_wire_bytes(&buf),
            Err(TempoError::DecodeError(DecodeError::UnexpectedWireType {
                field: WALL_TIME_FIELD,
                found: WireType::Fixed64,
            }))
        ));
    }

    #[test]
    fn test_wire_truncated() {
        let encoded = ts(1_000_000, 1).to_wire_bytes();
        assert!(matches!(
            Timestamp::from_wire_bytes(&encoded[..2]),
            Err(TempoError::DecodeError(DecodeError::UnexpectedEof))
        ));
    }

    #[test]
    fn test_sortable_layout() {
        assert_eq!(size_of::<SortableTimestamp>(), SORTABLE_TIMESTAMP_SIZE);

        let bytes = ts(0, 0).with_synthetic().to_sortable_bytes();
        assert_eq!(bytes, [0x80, 0, 0, 0, 0, 0, 0, 0, 0x80, 0, 0, 0, 0x01]);
    }

    #[test]
    fn test_sortable_order() {
        let timestamps = [
            ts(i64::MIN, 0),
            ts(-1, i32::MAX),
            ts(0, -1),
            ts(0, 0),
            ts(0, 1),
            ts(1, 0),
            ts(i64::MAX, i32::MAX),
        ];
        for (a, b) in timestamps.iter().tuple_windows() {
            assert!(a.to_sortable_bytes() < b.to_sortable_bytes());
        }
    }

    #[test]
    fn test_sortable_short_buffer() {
        assert!(Timestamp::from_sortable_bytes(&[0u8; 12]).is_err());
    }

    #[test]
    fn test_bincode_roundtrip() {
        let t = ts(123_456_789, 42).with_synthetic();
        let encoded = bincode_options().serialize(&t).unwrap();
        // fixint encoding: i64 + i32 + u32
        assert_eq!(encoded.len(), 16);
        let decoded: Timestamp = bincode_options().deserialize(&encoded).unwrap();
        assert!(decoded == t);
    }

    #[test]
    fn test_bincode_rejects_invalid_flags() {
        let mut encoded = bincode_options().serialize(&ts(1, 1)).unwrap();
        // flags are the trailing little-endian u32
        encoded[13] = 0x01;
        let decoded: Result<Timestamp, _> = bincode_options().deserialize(&encoded);
        assert!(decoded.is_err());
    }

    proptest! {
        #[test]
        fn prop_wire_roundtrip(wall in any::<i64>(), logical in any::<i32>(), flags in any::<u8>()) {
            let t = ts(wall, logical).with_flags(TimestampFlags::from_bits_truncate(flags as u32));
            let decoded = Timestamp::from_wire_bytes(&t.to_wire_bytes()).unwrap();
            prop_assert!(decoded == t);
        }

        #[test]
        fn prop_sortable_preserves_order(
            a in (any::<i64>(), any::<i32>()),
            b in (any::<i64>(), any::<i32>()),
        ) {
            let (a, b) = (ts(a.0, a.1), ts(b.0, b.1).with_synthetic());
            let (ab, bb) = (a.to_sortable_bytes(), b.to_sortable_bytes());
            prop_assert_eq!(ab[..12].cmp(&bb[..12]), a.compare(&b));
            prop_assert!(Timestamp::from_sortable_bytes(&bb).unwrap() == b);
        }
    }
}
