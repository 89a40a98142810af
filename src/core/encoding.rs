/// A constant u64 that has the upper most bit set.
const UPPER_U64_BIT: u64 = 0x8000_0000_0000_0000;

/// A constant u32 that has the upper most bit set.
const UPPER_U32_BIT: u32 = 0x8000_0000;

pub(crate) fn encode_i64_sortable(val: i64) -> [u8; 8] {
    let unsigned = (val as u64) ^ UPPER_U64_BIT;
    unsigned.to_be_bytes()
}

pub(crate) fn decode_i64_sortable(bytes: [u8; 8]) -> i64 {
    let unsigned = u64::from_be_bytes(bytes);
    (unsigned ^ UPPER_U64_BIT) as i64
}

pub(crate) fn encode_i32_sortable(val: i32) -> [u8; 4] {
    let unsigned = (val as u32) ^ UPPER_U32_BIT;
    unsigned.to_be_bytes()
}

pub(crate) fn decode_i32_sortable(bytes: [u8; 4]) -> i32 {
    let unsigned = u32::from_be_bytes(bytes);
    (unsigned ^ UPPER_U32_BIT) as i32
}
