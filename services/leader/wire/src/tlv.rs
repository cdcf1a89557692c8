//! Bounds-checked TLV reader.
//!
//! Every record is `type u8 | length u8 | value[length]`. Reads never go past
//! the end of the slice handed to the cursor: a header that does not fit is
//! [`ParseError::Truncated`], a length that runs past the end is
//! [`ParseError::Malformed`]. A cursor stops at the first error.

use crate::error::ParseError;
use std::iter::FusedIterator;

/// TLV header size in bytes
pub const TLV_HEADER_SIZE: usize = 2;

/// Largest value a 1-byte length field can describe
pub const MAX_TLV_VALUE_LENGTH: usize = u8::MAX as usize;

/// One TLV record borrowed from its enclosing buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tlv<'a> {
    typ: u8,
    value: &'a [u8],
    offset: usize,
}

impl<'a> Tlv<'a> {
    /// Raw type byte
    pub fn typ(&self) -> u8 {
        self.typ
    }

    /// Value bytes
    pub fn value(&self) -> &'a [u8] {
        self.value
    }

    /// Length of the value
    pub fn len(&self) -> usize {
        self.value.len()
    }

    /// Whether the value is empty
    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }

    /// Offset of the record header within the buffer it was read from
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Header plus value
    pub fn size(&self) -> usize {
        TLV_HEADER_SIZE + self.value.len()
    }
}

/// Read the record starting at `offset`.
///
/// Returns the record and the offset of the record that follows it.
pub fn read_tlv(buf: &[u8], offset: usize) -> Result<(Tlv<'_>, usize), ParseError> {
    let header_end = offset
        .checked_add(TLV_HEADER_SIZE)
        .ok_or(ParseError::Truncated)?;
    if header_end > buf.len() {
        return Err(ParseError::Truncated);
    }

    let length = buf[offset + 1] as usize;
    let next = header_end + length;
    if next > buf.len() {
        return Err(ParseError::Malformed);
    }

    Ok((
        Tlv {
            typ: buf[offset],
            value: &buf[header_end..next],
            offset,
        },
        next,
    ))
}

/// Sequential reader over a TLV buffer.
///
/// Cheap to create, so callers that need several passes over the same buffer
/// just build a fresh cursor per pass.
#[derive(Debug, Clone)]
pub struct TlvCursor<'a> {
    buf: &'a [u8],
    offset: usize,
    failed: bool,
}

impl<'a> TlvCursor<'a> {
    /// Create a cursor positioned at the start of `buf`
    pub fn new(buf: &'a [u8]) -> Self {
        Self {
            buf,
            offset: 0,
            failed: false,
        }
    }

    /// Offset of the next record to be read
    pub fn position(&self) -> usize {
        self.offset
    }

    /// Walk the whole buffer, failing on the first bad record
    pub fn validate(buf: &'a [u8]) -> Result<(), ParseError> {
        Self::new(buf).try_for_each(|tlv| tlv.map(|_| ()))
    }

    /// First record with the given type byte
    pub fn find(buf: &'a [u8], typ: u8) -> Result<Option<Tlv<'a>>, ParseError> {
        for tlv in Self::new(buf) {
            let tlv = tlv?;
            if tlv.typ() == typ {
                return Ok(Some(tlv));
            }
        }
        Ok(None)
    }
}

impl<'a> Iterator for TlvCursor<'a> {
    type Item = Result<Tlv<'a>, ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.offset >= self.buf.len() {
            return None;
        }

        match read_tlv(self.buf, self.offset) {
            Ok((tlv, next)) => {
                self.offset = next;
                Some(Ok(tlv))
            }
            Err(err) => {
                self.failed = true;
                Some(Err(err))
            }
        }
    }
}

impl FusedIterator for TlvCursor<'_> {}
