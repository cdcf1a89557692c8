//! Commissioner arbitration and request handling for the leader.
//!
//! This crate sits on top of the Network Data store and provides:
//!
//! - **Commissioner session**: one active commissioner at a time, with
//!   petition, keep-alive, resign and timeout
//! - **Commissioning Data**: session-bound updates of the commissioning
//!   sub-tree
//! - **Dispatch**: [`Leader`] maps requests from peers to responses and
//!   Network Data snapshots
//!
//! ## Example
//!
//! ```rust
//! use netdata_leader::{
//!     CommissionerSession, FixedRole, Leader, Request, RequestKind, RlocLocatorSource,
//!     PETITION_TIMEOUT,
//! };
//! use netdata_store::NetworkData;
//! use netdata_wire::{State, TlvBuilder};
//! use std::net::Ipv6Addr;
//! use tokio::time::Instant;
//!
//! let mut leader = Leader::new(
//!     NetworkData::new(),
//!     CommissionerSession::new(PETITION_TIMEOUT),
//!     FixedRole::new(true),
//!     RlocLocatorSource::new(),
//! );
//!
//! let payload = TlvBuilder::new().commissioner_id(b"commissioner").build().unwrap();
//! let peer: Ipv6Addr = "fd00:db8::ff:fe00:400".parse().unwrap();
//! let response = leader.handle(
//!     &Request::new(RequestKind::Petition, payload),
//!     &peer,
//!     Instant::now(),
//! );
//! assert_eq!(response.state, Some(State::Accept));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod commissioning;
pub mod leader;
pub mod oracle;
pub mod request;
pub mod session;

// Re-export main types
pub use commissioning::{apply_commissioning_set, RejectReason};
pub use leader::Leader;
pub use oracle::{FixedRole, LocatorSource, RlocLocatorSource, RoleOracle};
pub use request::{Request, RequestError, RequestKind, Response, RESPONSE_FLAG};
pub use session::{
    ActiveSession, CommissionerSession, SessionError, SessionState, PETITION_TIMEOUT,
};
