//! Store and validation errors

use netdata_wire::{EncodeError, ParseError};
use std::fmt;
use thiserror::Error;

/// Kind of top-level entry a validation error refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// Prefix TLV
    Prefix,
    /// Service TLV
    Service,
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryKind::Prefix => write!(f, "prefix"),
            EntryKind::Service => write!(f, "service"),
        }
    }
}

/// Reasons a router's TLV batch is refused
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Batch does not parse
    #[error("Malformed network data: {0}")]
    Parse(#[from] ParseError),
    /// Same prefix or service key appears twice
    #[error("Duplicate {kind} at offset {offset}")]
    DuplicateEntry {
        /// Entry kind
        kind: EntryKind,
        /// Offset of the second occurrence
        offset: usize,
    },
    /// Entry advertises a locator other than the registering router's
    #[error("Entry owned by {found:#06x}, registering router is {expected:#06x}")]
    OwnershipViolation {
        /// Registering router
        expected: u16,
        /// Locator found in the entry
        found: u16,
    },
    /// Entry shape is not acceptable
    #[error("Invalid {kind}: {reason}")]
    InvalidEntry {
        /// Entry kind
        kind: EntryKind,
        /// What is wrong with it
        reason: &'static str,
    },
}

/// Store errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Candidate batch failed validation
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),
    /// Result would exceed the Network Data capacity
    #[error("Network data full: {needed} bytes needed, capacity {capacity}")]
    NoBufs {
        /// Encoded size the update would produce
        needed: usize,
        /// Capacity
        capacity: usize,
    },
    /// All service ids are taken
    #[error("No free service id")]
    ServiceIdsExhausted,
    /// Encoding failed
    #[error("Encoding failed: {0}")]
    Encode(#[from] EncodeError),
    /// Stored or supplied bytes do not parse
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),
}
