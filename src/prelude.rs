pub use crate::{
    base::{TempoError, TempoResult},
    core::{TableKey, decode_mvcc_key, encode_mvcc_key},
    ctrl::{
        contention::{
            ContentionEvent, ContentionRegistry, RegistryConfig, SerializedRegistry, TxnId,
            merge_serialized,
        },
        hlc::{Clock, ClockConfig, ClockTimestamp, Timestamp, TimestampFlags, UncertaintyInterval},
    },
};
