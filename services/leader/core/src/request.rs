//! Leader requests and responses.
//!
//! ```text
//! request:  +---------+----------------------+
//!           | kind u8 | TLVs...              |
//!           +---------+----------------------+
//! response: +----------------+---------------+
//!           | kind|0x80 u8   | TLVs...       |
//!           +----------------+---------------+
//! ```

use bytes::{BufMut, Bytes, BytesMut};
use netdata_store::Snapshot;
use netdata_wire::{State, TlvBuilder, UnknownType};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

/// Flag marking a response datagram
pub const RESPONSE_FLAG: u8 = 0x80;

/// Request kinds
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RequestKind {
    /// Commissioner petition
    Petition = 1,
    /// Commissioner keep-alive
    KeepAlive = 2,
    /// Commissioner resign
    Resign = 3,
    /// Commissioning data set
    CommissioningSet = 4,
    /// Commissioning data get
    CommissioningGet = 5,
    /// Router server data registration
    ServerData = 6,
}

impl TryFrom<u8> for RequestKind {
    type Error = UnknownType;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(RequestKind::Petition),
            2 => Ok(RequestKind::KeepAlive),
            3 => Ok(RequestKind::Resign),
            4 => Ok(RequestKind::CommissioningSet),
            5 => Ok(RequestKind::CommissioningGet),
            6 => Ok(RequestKind::ServerData),
            _ => Err(UnknownType(value)),
        }
    }
}

/// Request decoding errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RequestError {
    /// Empty datagram
    #[error("Empty request")]
    Empty,
    /// Unknown request kind
    #[error("Unknown request kind {0}")]
    UnknownKind(u8),
}

/// Inbound request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// What is being asked
    pub kind: RequestKind,
    /// TLV payload
    pub payload: Bytes,
}

impl Request {
    /// Create a request
    pub fn new(kind: RequestKind, payload: Bytes) -> Self {
        Self { kind, payload }
    }

    /// Decode a request datagram
    pub fn decode(datagram: &[u8]) -> Result<Self, RequestError> {
        let (&kind, payload) = datagram.split_first().ok_or(RequestError::Empty)?;
        let kind = RequestKind::try_from(kind).map_err(|e| RequestError::UnknownKind(e.0))?;
        Ok(Self {
            kind,
            payload: Bytes::copy_from_slice(payload),
        })
    }

    /// Encode as a datagram
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(1 + self.payload.len());
        buf.put_u8(self.kind as u8);
        buf.put_slice(&self.payload);
        buf.freeze()
    }
}

/// Outcome of a request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Response {
    /// State reported to the peer, if any
    pub state: Option<State>,
    /// Response TLVs; `None` means no response is sent
    pub body: Option<Bytes>,
    /// Network Data after a mutation
    pub snapshot: Option<Snapshot>,
}

impl Response {
    /// No response
    pub fn elided() -> Self {
        Self::default()
    }

    /// Response carrying only a State TLV
    pub fn state(state: State) -> Self {
        Self::with_state(state, TlvBuilder::new())
    }

    /// Response whose body is a State TLV followed by `rest`
    pub fn with_state(state: State, rest: TlvBuilder) -> Self {
        let body = TlvBuilder::new().state(state);
        match rest.build() {
            Ok(rest) => Self::body(Some(state), body.raw(&rest)),
            Err(err) => {
                warn!("Dropping response: {}", err);
                Self::elided()
            }
        }
    }

    /// Response with an arbitrary body
    pub fn body(state: Option<State>, body: TlvBuilder) -> Self {
        match body.build() {
            Ok(body) => Self {
                state,
                body: Some(body),
                snapshot: None,
            },
            Err(err) => {
                warn!("Dropping response: {}", err);
                Self::elided()
            }
        }
    }

    /// Attach a snapshot
    pub fn with_snapshot(mut self, snapshot: Option<Snapshot>) -> Self {
        self.snapshot = snapshot;
        self
    }

    /// Whether a response is sent
    pub fn is_elided(&self) -> bool {
        self.body.is_none()
    }

    /// Encode as a datagram answering `kind`
    pub fn to_datagram(&self, kind: RequestKind) -> Option<Bytes> {
        let body = self.body.as_ref()?;
        let mut buf = BytesMut::with_capacity(1 + body.len());
        buf.put_u8(kind as u8 | RESPONSE_FLAG);
        buf.put_slice(body);
        Some(buf.freeze())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_request() {
        let request = Request::decode(&[4, 11, 2, 0x00, 0x01]).unwrap();
        assert_eq!(request.kind, RequestKind::CommissioningSet);
        assert_eq!(request.payload.as_ref(), &[11, 2, 0x00, 0x01]);
        assert_eq!(request.encode().as_ref(), &[4, 11, 2, 0x00, 0x01]);

        assert_eq!(Request::decode(&[]), Err(RequestError::Empty));
        assert_eq!(Request::decode(&[0x7F]), Err(RequestError::UnknownKind(0x7F)));
    }

    #[test]
    fn test_response_datagram() {
        let response = Response::state(State::Accept);
        assert_eq!(response.state, Some(State::Accept));
        assert_eq!(
            response.to_datagram(RequestKind::KeepAlive).unwrap().as_ref(),
            &[0x82, 16, 1, 0x01]
        );

        let response = Response::with_state(State::Reject, TlvBuilder::new().session_id(9));
        assert_eq!(
            response.body.unwrap().as_ref(),
            &[16, 1, 0xFF, 11, 2, 0x00, 0x09]
        );

        assert!(Response::elided().to_datagram(RequestKind::Petition).is_none());
    }

    #[test]
    fn test_oversized_body_is_dropped() {
        let response = Response::body(None, TlvBuilder::new().tlv(1, &[0u8; 300]));
        assert!(response.is_elided());
    }
}
