use std::{borrow::Cow, ops::Bound};

use bytes::Bytes;

use crate::{
    base::{DecodeError, PrettyBytes, TempoError, TempoResult},
    core::io::{SliceReader, TempoReader, TempoWriter},
    ctrl::hlc::{SORTABLE_TIMESTAMP_SIZE, Timestamp},
};

pub type TableId = u32;
pub type IndexId = u32;

pub(crate) fn successor(mut prefix: Vec<u8>) -> Option<Vec<u8>> {
    while let Some(last_byte) = prefix.pop() {
        if last_byte < 0xFF {
            // Found a byte we can increment
            prefix.push(last_byte + 1);
            return Some(prefix);
        }
        // If it was 0xFF, it stays popped (the carry)
    }
    // If the loop finishes, the prefix was all 0xFFs or empty
    None
}

pub(crate) fn prefix_range(prefix: Vec<u8>) -> (Bound<Vec<u8>>, Bound<Vec<u8>>) {
    let start = Bound::Included(prefix.clone());
    let end = match successor(prefix) {
        Some(succ) => Bound::Excluded(succ),
        None => Bound::Unbounded,
    };
    (start, end)
}

/// # Table Key
///
/// A key of a row within an index of a table, as reported by contention events.
///
/// ## Layout
///
/// `[TABLE_ID] + [INDEX_ID] + [INDEX_KEY]`:
///
/// - [`TABLE_ID`]: Big-endian `u32`, so that all keys of one table are adjacent.
/// - [`INDEX_ID`]: Big-endian `u32`, so that all keys of one index are adjacent.
/// - [`INDEX_KEY`]: The encoded index columns, opaque to Tempo. May contain `\0` bytes.
///
/// [`TABLE_ID`]: Self::table_id
/// [`INDEX_ID`]: Self::index_id
/// [`INDEX_KEY`]: Self::index_key
#[derive(Debug, Clone, PartialEq, Eq)]
#[debug(
    "TableKey(table={table_id}, index={index_id}, key={:?})",
    PrettyBytes(&**index_key)
)]
pub struct TableKey<'a> {
    table_id: TableId,
    index_id: IndexId,
    index_key: Cow<'a, [u8]>,
}

impl<'a> TableKey<'a> {
    /// Size of the `[TABLE_ID] + [INDEX_ID]` prefix.
    pub const PREFIX_SIZE: usize = 8;

    pub fn new(table_id: TableId, index_id: IndexId, index_key: impl Into<Cow<'a, [u8]>>) -> Self {
        Self {
            table_id,
            index_id,
            index_key: index_key.into(),
        }
    }

    #[inline]
    pub fn table_id(&self) -> TableId {
        self.table_id
    }

    #[inline]
    pub fn index_id(&self) -> IndexId {
        self.index_id
    }

    #[inline]
    pub fn index_key(&self) -> &[u8] {
        &self.index_key
    }

    pub(crate) fn encode_prefix<W: TempoWriter>(
        writer: &mut W,
        table_id: TableId,
        index_id: IndexId,
    ) {
        writer.reserve(Self::PREFIX_SIZE);
        writer.write_u32_be(table_id);
        writer.write_u32_be(index_id);
    }

    pub(crate) fn encode<W: TempoWriter>(&self, writer: &mut W) {
        writer.reserve(Self::PREFIX_SIZE + self.index_key.len());
        Self::encode_prefix(writer, self.table_id, self.index_id);
        writer.write_bytes(&self.index_key);
    }

    pub(crate) fn decode<R: TempoReader<'a>>(reader: &mut R) -> Result<Self, DecodeError> {
        let table_id = reader.read_u32_be()?;
        let index_id = reader.read_u32_be()?;
        let index_key = Cow::Borrowed(reader.read_remaining());
        Ok(Self {
            table_id,
            index_id,
            index_key,
        })
    }

    /// Decodes a table key from its encoded form, borrowing the index key from `buf`.
    pub fn from_bytes(buf: &'a [u8]) -> Result<Self, DecodeError> {
        Self::decode(&mut SliceReader::new(buf))
    }

    pub fn to_bytes(&self) -> Bytes {
        let mut buf = Vec::new();
        self.encode(&mut buf);
        Bytes::from(buf)
    }

    pub fn into_static(self) -> TableKey<'static> {
        TableKey {
            table_id: self.table_id,
            index_id: self.index_id,
            index_key: Cow::Owned(self.index_key.into_owned()),
        }
    }

    /// Returns the encoded prefix shared by all keys of an index.
    pub fn index_prefix(table_id: TableId, index_id: IndexId) -> Vec<u8> {
        let mut buf = Vec::new();
        Self::encode_prefix(&mut buf, table_id, index_id);
        buf
    }
}

/// Encodes an MVCC key: the user key, followed by the [sortable] timestamp (if any) and a single
/// byte holding the length of the timestamp. See [`MvccComparer`] for the resulting order.
///
/// [sortable]: Timestamp::to_sortable_bytes
/// [`MvccComparer`]: crate::base::MvccComparer
pub fn encode_mvcc_key(key: &[u8], ts: Option<Timestamp>) -> Bytes {
    let mut buf = Vec::with_capacity(key.len() + SORTABLE_TIMESTAMP_SIZE + 1);
    buf.write_bytes(key);
    match ts {
        Some(ts) => {
            buf.write_bytes(&ts.to_sortable_bytes());
            buf.write_u8(SORTABLE_TIMESTAMP_SIZE as u8);
        }
        None => buf.write_u8(0),
    }
    Bytes::from(buf)
}

/// Splits an MVCC key into the user key and its timestamp, if it has one.
pub fn decode_mvcc_key(buf: &[u8]) -> TempoResult<(&[u8], Option<Timestamp>)> {
    let (&suffix_len, rest) = buf.split_last().ok_or(DecodeError::UnexpectedEof)?;
    match suffix_len as usize {
        0 => Ok((rest, None)),
        SORTABLE_TIMESTAMP_SIZE => {
            let split = rest
                .len()
                .checked_sub(SORTABLE_TIMESTAMP_SIZE)
                .ok_or(DecodeError::UnexpectedEof)?;
            let (key, suffix) = rest.split_at(split);
            Ok((key, Some(Timestamp::from_sortable_bytes(suffix)?)))
        }
        _ => Err(TempoError::DecodeError(DecodeError::InvalidSuffixLength(
            suffix_len,
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_key_encode_decode() {
        let table_keys = [
            TableKey::new(42, 1, b"pk_bytes".as_slice()),
            TableKey::new(7, 2, b"\x00with\x00nulls\x00".to_vec()),
            TableKey::new(u32::MAX, 0, Vec::new()),
        ];

        let mut buf = Vec::new();
        for k in &table_keys {
            buf.clear();
            k.encode(&mut buf);
            let mut reader = SliceReader::new(&buf);
            let decoded = TableKey::decode(&mut reader).unwrap();
            assert_eq!(&decoded, k);
            assert!(
                reader.is_eof(),
                "reader should have reached end of byte sequence"
            );
        }
    }

    #[test]
    fn test_table_key_layout() {
        let key = TableKey::new(0x0102_0304, 5, b"abc".as_slice()).to_bytes();
        assert_eq!(&key[..], b"\x01\x02\x03\x04\x00\x00\x00\x05abc");
        assert!(key.starts_with(&TableKey::index_prefix(0x0102_0304, 5)));
    }

    #[test]
    fn test_table_key_too_short() {
        assert!(matches!(
            TableKey::from_bytes(b"\x00\x00\x00\x01\x00"),
            Err(DecodeError::UnexpectedEof)
        ));
    }

    #[test]
    fn test_table_key_debug() {
        let key = TableKey::new(1, 2, b"bob\x00".as_slice());
        assert_eq!(
            format!("{key:?}"),
            r#"TableKey(table=1, index=2, key=b"bob\x00")"#
        );
    }

    #[test]
    fn test_mvcc_key_roundtrip() {
        let ts = Timestamp::new(1_000, 3).with_synthetic();
        let encoded = encode_mvcc_key(b"user/1", Some(ts));
        let (key, decoded) = decode_mvcc_key(&encoded).unwrap();
        assert_eq!(key, b"user/1");
        assert!(decoded == Some(ts));

        let encoded = encode_mvcc_key(b"user/1", None);
        assert_eq!(decode_mvcc_key(&encoded).unwrap(), (&b"user/1"[..], None));
    }

    #[test]
    fn test_mvcc_key_malformed() {
        assert!(decode_mvcc_key(b"").is_err());
        // claims a timestamp, but is too short
        assert!(decode_mvcc_key(b"abc\x0d").is_err());
        assert!(matches!(
            decode_mvcc_key(b"abc\x05"),
            Err(TempoError::DecodeError(DecodeError::InvalidSuffixLength(5)))
        ));
    }

    #[test]
    fn test_successor_prefix() {
        // Standard case: increment last byte
        assert_eq!(successor(vec![1, 2, 3]), Some(vec![1, 2, 4]));

        // Incrementing 0x00 (shouldn't be different from the standard case)
        assert_eq!(successor(vec![1, 0]), Some(vec![1, 1]));

        // Ripple case: last byte is 0xFF, carry to the left
        assert_eq!(successor(vec![1, 2, 255]), Some(vec![1, 3]));

        // Multiple ripple case: multiple 0xFFs
        assert_eq!(successor(vec![1, 255, 255]), Some(vec![2]));

        // Ceiling case: all bytes are 0xFF
        assert_eq!(successor(vec![255, 255]), None);

        // Empty case
        assert_eq!(successor(vec![]), None);
    }

    #[test]
    fn test_prefix_range() {
        // Index prefix of table 1, index 1
        let prefix = TableKey::index_prefix(1, 1);
        let (start, end) = prefix_range(prefix.clone());

        assert_eq!(start, Bound::Included(vec![0, 0, 0, 1, 0, 0, 0, 1]));
        assert_eq!(end, Bound::Excluded(vec![0, 0, 0, 1, 0, 0, 0, 2]));

        // Prefix ending in 0xFF (ripple)
        let prefix_ff = TableKey::index_prefix(1, u32::MAX);
        let (_, end_ff) = prefix_range(prefix_ff);

        assert_eq!(end_ff, Bound::Excluded(vec![0, 0, 0, 2]));

        // Unbounded ceiling
        let prefix_max = TableKey::index_prefix(u32::MAX, u32::MAX);
        let (_, end_max) = prefix_range(prefix_max);

        assert_eq!(end_max, Bound::Unbounded);
    }
}
