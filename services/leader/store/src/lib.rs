//! Versioned Network Data held by the leader.
//!
//! This crate owns the authoritative copy of the Network Data and decides
//! what may enter it:
//!
//! - **Validation**: a router's batch must be well formed, free of duplicate
//!   prefix/service keys and advertise only the registering router
//! - **Stable diff**: decides whether an update changes stable data and
//!   therefore the stable data version
//! - **Admission**: replace a router's entries atomically, within the
//!   Network Data capacity
//!
//! ## Example
//!
//! ```rust
//! use netdata_store::NetworkData;
//! use netdata_wire::{HasRouteEntry, TlvBuilder};
//!
//! let mut data = NetworkData::with_versions(0, 0);
//! let batch = TlvBuilder::new()
//!     .prefix(true, 0, &[0xFD, 0x00], 16, |b| {
//!         b.has_route(true, &[HasRouteEntry { rloc16: 0x0400, flags: 0 }])
//!     })
//!     .build()
//!     .unwrap();
//!
//! let result = data.register(0x0400, &batch).unwrap();
//! assert!(result.stable_changed);
//! assert_eq!(data.stable_version(), 1);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod commissioning;
pub mod diff;
pub mod error;
pub mod find;
pub mod store;
pub mod validator;

// Re-export main types
pub use commissioning::CommissioningData;
pub use diff::requires_version_bump;
pub use error::{EntryKind, StoreError, ValidationError};
pub use find::{find_prefix, find_service};
pub use store::{
    NetworkData, PrefixEntry, PrefixSubTlv, Registration, ServerEntry, ServiceEntry, Snapshot,
};
pub use validator::validate;
