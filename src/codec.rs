//! Little-endian integer <-> byte sequence conversion for characteristic values.

use crate::error::RangeError;

/// Widest integer the codec carries (i128)
const MAX_WIDTH: usize = 16;

/// Encode `value` as `width` little-endian bytes
pub fn encode_int(value: i128, width: usize, signed: bool) -> Result<Vec<u8>, RangeError> {
    if !fits(value, width, signed) {
        return Err(RangeError { value, width, signed });
    }

    // Bytes past the 16th are pure sign extension
    let fill = if value < 0 { 0xFF } else { 0x00 };
    let mut bytes: Vec<u8> = value.to_le_bytes().iter().copied().take(width).collect();
    bytes.resize(width, fill);

    Ok(bytes)
}

/// Decode little-endian bytes of any length.
///
/// Only the first 16 bytes contribute. An unsigned value using all 128 bits
/// wraps into the negative range of the result.
pub fn decode_int(bytes: &[u8], signed: bool) -> i128 {
    let n = bytes.len().min(MAX_WIDTH);

    let mut raw = 0u128;
    for (i, &byte) in bytes[..n].iter().enumerate() {
        raw |= (byte as u128) << (8 * i);
    }

    // Sign-extend from the top bit of the last byte
    if signed && n > 0 && n < MAX_WIDTH && bytes[n - 1] & 0x80 != 0 {
        raw |= u128::MAX << (8 * n);
    }

    raw as i128
}

/// Count and Select wire representation
pub fn encode_u32(value: u32) -> Vec<u8> {
    encode_unsigned(value.into(), 4)
}

/// Mode wire representation
pub fn encode_u8(value: u8) -> Vec<u8> {
    encode_unsigned(value.into(), 1)
}

/// `value` always fits: callers pass a type no wider than `width`
fn encode_unsigned(value: i128, width: usize) -> Vec<u8> {
    match encode_int(value, width, false) {
        Ok(bytes) => bytes,
        Err(e) => unreachable!("{}", e),
    }
}

fn fits(value: i128, width: usize, signed: bool) -> bool {
    if width == 0 {
        return value == 0;
    }
    if width >= MAX_WIDTH {
        return signed || value >= 0;
    }

    let bits = 8 * width as u32;
    if signed {
        let limit = 1i128 << (bits - 1);
        (-limit..limit).contains(&value)
    } else {
        (0..1i128 << bits).contains(&value)
    }
}
