//! TLV wire format for the leader's Network Data.
//!
//! This crate provides the low-level pieces every other leader crate builds on:
//! a bounds-checked TLV cursor, a TLV builder, and typed views over Thread
//! Network Data and MeshCoP TLVs.
//!
//! ## Wire Format
//!
//! ```text
//! +---------+-----------+---------------------------+
//! | type u8 | length u8 | value[length]             |
//! +---------+-----------+---------------------------+
//!
//! Network Data type byte:
//! +-------------------------------+--------+
//! | type (7 bits)                 | stable |
//! +-------------------------------+--------+
//! ```
//!
//! Prefix and Service TLVs carry fixed fields followed by nested sub-TLVs;
//! the Commissioning Data TLV carries a flat sequence of MeshCoP TLVs.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod builder;
pub mod error;
pub mod meshcop;
pub mod netdata;
pub mod tlv;

// Re-export main types
pub use builder::TlvBuilder;
pub use error::{EncodeError, ParseError, UnknownType};
pub use meshcop::{
    border_agent_locator, commissioner_id, commissioner_session_id, read_u16, MeshCopType, State,
    StateTlv, MAX_COMMISSIONER_ID_LENGTH, MAX_STEERING_DATA_LENGTH,
};
pub use netdata::{
    decode_border_router, decode_has_route, encode_service_header, find_sub_tlv,
    network_data_tlvs, prefix_bytes, prefix_matches, MAX_PREFIX_BITS, MAX_SERVICE_ID,
    BorderRouterEntry, BorderRouterFlags, ContextTlv, HasRouteEntry, NetworkDataTlv,
    NetworkDataType, PrefixTlv, ServerTlv, ServiceTlv, THREAD_ENTERPRISE_NUMBER,
};
pub use tlv::{read_tlv, Tlv, TlvCursor, MAX_TLV_VALUE_LENGTH, TLV_HEADER_SIZE};

/// Maximum size of the leader's Network Data, and of any inbound TLV batch
pub const MAX_NETWORK_DATA_SIZE: usize = 254;
