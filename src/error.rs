use thiserror::Error;

/// Malformed color format spec (fatal at startup)
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatError {
    #[error("color format spec is empty")]
    Empty,

    #[error("invalid character {ch:?} at position {position}")]
    InvalidCharacter { ch: char, position: usize },

    #[error("bit width at position {position} has no channel letter before it")]
    MissingChannel { position: usize },

    #[error("channel '{channel}' has no bit width")]
    MissingBits { channel: char },

    #[error("channel '{channel}' is declared more than once")]
    DuplicateChannel { channel: char },

    #[error("channel '{channel}' width {bits} is outside 1..=16 bits")]
    InvalidBitWidth { channel: char, bits: String },

    #[error("total color width of {0} bits exceeds 64")]
    TooWide(u32),
}

/// Integer does not fit the requested wire width
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{value} does not fit in {width} byte(s) (signed: {signed})")]
pub struct RangeError {
    pub value: i128,
    pub width: usize,
    pub signed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BufferError {
    #[error("pixel index {index} outside strand of {count} pixels")]
    Index { index: usize, count: usize },

    #[error("color is {actual} bytes, expected {expected}")]
    Length { expected: usize, actual: usize },
}

/// Attribute protocol errors a transport reports back to the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AttError {
    #[error("invalid handle")]
    InvalidHandle,

    #[error("read not permitted")]
    ReadNotPermitted,

    #[error("write not permitted")]
    WriteNotPermitted,

    #[error("request not supported")]
    RequestNotSupported,

    #[error("invalid attribute value length")]
    InvalidLength,
}

impl AttError {
    /// Wire code, numbered after the BLE ATT error codes
    pub fn code(self) -> u8 {
        match self {
            AttError::InvalidHandle => 0x01,
            AttError::ReadNotPermitted => 0x02,
            AttError::WriteNotPermitted => 0x03,
            AttError::RequestNotSupported => 0x06,
            AttError::InvalidLength => 0x0D,
        }
    }
}
