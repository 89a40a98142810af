use std::time::Duration;

use num_enum::TryFromPrimitiveError;

use crate::core::WireType;

#[derive(Debug, Display, Error, From)]
pub enum DecodeError {
    #[from(skip)]
    #[display("Unexpected end of input")]
    UnexpectedEof,

    #[from(skip)]
    #[display("Invalid Varint: Failed to decode.")]
    InvalidVarint,

    #[display("Invalid wire type: {}", _0.number)]
    InvalidWireType(TryFromPrimitiveError<WireType>),

    #[from(skip)]
    #[display("Unsupported wire type: {}", _0)]
    UnsupportedWireType(#[error(not(source))] WireType),

    #[from(skip)]
    #[display("Unexpected wire type {found} for field {field}")]
    UnexpectedWireType { field: u32, found: WireType },

    #[from(skip)]
    #[display("Invalid MVCC key suffix length: {}", _0)]
    InvalidSuffixLength(#[error(not(source))] u8),
}

#[derive(Debug, Display, Error, From)]
pub enum TempoError {
    #[from(skip)]
    #[display("Invalid timestamp flags {:#x}: only the lowest 8 bits may be set", _0)]
    InvalidFlags(#[error(not(source))] u32),

    #[from(skip)]
    #[display("Synthetic timestamps cannot be used as clock readings")]
    SyntheticClockTimestamp,

    #[from(skip)]
    #[display(
        "Remote wall time {remote_wall_time} is {}ns ahead of local physical time {physical_now}, exceeding max offset {:?}",
        remote_wall_time.saturating_sub(*physical_now), max_offset,
    )]
    UntrustworthyRemote {
        remote_wall_time: i64,
        physical_now: i64,
        max_offset: Duration,
    },

    #[from(skip)]
    #[display("Invalid timestamp string: {:?}", _0)]
    InvalidTimestampString(#[error(not(source))] String),

    #[display("Decode Error: {}", _0)]
    DecodeError(DecodeError),

    #[display("Failed to encode: {}", _0)]
    BincodeError(bincode::Error),
}

pub type TempoResult<T> = Result<T, TempoError>;
