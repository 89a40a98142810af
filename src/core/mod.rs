//! Binary building blocks: the reader and writer traits behind the wire formats, order
//! preserving integer encodings, and the key layouts.

pub mod encoding;
pub mod io;
pub mod key;

pub use io::WireType;
pub(crate) use io::{SliceReader, TempoReader, TempoWriter};
pub use key::{IndexId, TableId, TableKey, decode_mvcc_key, encode_mvcc_key};
pub(crate) use key::prefix_range;
