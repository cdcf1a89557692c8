//! Wire-level error types.

use thiserror::Error;

/// Errors raised while walking a TLV byte stream
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseError {
    /// Not enough bytes left for a 2-byte TLV header
    #[error("truncated tlv header")]
    Truncated,

    /// A length field points past the enclosing buffer, or a value is too
    /// short for the fields its type requires
    #[error("malformed tlv")]
    Malformed,
}

/// Errors raised while building TLVs
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodeError {
    /// Value does not fit the 1-byte length field
    #[error("tlv value too long: {0} bytes")]
    ValueTooLong(usize),
}

/// A type code this crate has no view for
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("unknown tlv type {0}")]
pub struct UnknownType(pub u8);
