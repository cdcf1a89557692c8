//! MeshCoP TLVs carried in Commissioning Data and commissioner messages.

use crate::builder::TlvBuilder;
use crate::error::{ParseError, UnknownType};
use crate::tlv::Tlv;
use serde::{Deserialize, Serialize};

/// Longest commissioner id accepted
pub const MAX_COMMISSIONER_ID_LENGTH: usize = 64;

/// Longest steering data bloom filter
pub const MAX_STEERING_DATA_LENGTH: usize = 16;

/// MeshCoP TLV types used by the leader
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MeshCopType {
    /// Steering Data
    SteeringData = 8,
    /// Border Agent Locator
    BorderAgentLocator = 9,
    /// Commissioner ID
    CommissionerId = 10,
    /// Commissioner Session ID
    CommissionerSessionId = 11,
    /// Get (list of requested TLV types)
    Get = 13,
    /// State
    State = 16,
    /// Joiner UDP Port
    JoinerUdpPort = 18,
}

impl TryFrom<u8> for MeshCopType {
    type Error = UnknownType;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            8 => Ok(MeshCopType::SteeringData),
            9 => Ok(MeshCopType::BorderAgentLocator),
            10 => Ok(MeshCopType::CommissionerId),
            11 => Ok(MeshCopType::CommissionerSessionId),
            13 => Ok(MeshCopType::Get),
            16 => Ok(MeshCopType::State),
            18 => Ok(MeshCopType::JoinerUdpPort),
            _ => Err(UnknownType(value)),
        }
    }
}

impl MeshCopType {
    /// Type of a record, if known
    pub fn of(tlv: &Tlv<'_>) -> Option<Self> {
        Self::try_from(tlv.typ()).ok()
    }
}

/// Read a big-endian u16 value; the value must be at least two bytes long
pub fn read_u16(tlv: &Tlv<'_>) -> Result<u16, ParseError> {
    match tlv.value() {
        [hi, lo, ..] => Ok(u16::from_be_bytes([*hi, *lo])),
        _ => Err(ParseError::Malformed),
    }
}

/// Commissioner Session ID value
pub fn commissioner_session_id(tlv: &Tlv<'_>) -> Result<u16, ParseError> {
    read_u16(tlv)
}

/// Border Agent Locator value
pub fn border_agent_locator(tlv: &Tlv<'_>) -> Result<u16, ParseError> {
    read_u16(tlv)
}

/// Commissioner ID value; must be 1..=64 bytes
pub fn commissioner_id<'a>(tlv: &Tlv<'a>) -> Result<&'a [u8], ParseError> {
    let value = tlv.value();
    if value.is_empty() || value.len() > MAX_COMMISSIONER_ID_LENGTH {
        return Err(ParseError::Malformed);
    }
    Ok(value)
}

/// Response state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum State {
    /// Request rejected
    Reject,
    /// Request pending
    Pending,
    /// Request accepted
    Accept,
}

impl State {
    /// Wire value
    pub fn to_byte(self) -> u8 {
        match self {
            State::Reject => 0xFF,
            State::Pending => 0x00,
            State::Accept => 0x01,
        }
    }
}

impl TryFrom<u8> for State {
    type Error = ParseError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0xFF => Ok(State::Reject),
            0x00 => Ok(State::Pending),
            0x01 => Ok(State::Accept),
            _ => Err(ParseError::Malformed),
        }
    }
}

/// State TLV
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateTlv {
    /// Carried state
    pub state: State,
}

impl StateTlv {
    /// Accept state
    pub fn accept() -> Self {
        Self {
            state: State::Accept,
        }
    }

    /// Reject state
    pub fn reject() -> Self {
        Self {
            state: State::Reject,
        }
    }

    /// Decode from a State TLV record
    pub fn decode(tlv: &Tlv<'_>) -> Result<Self, ParseError> {
        let byte = *tlv.value().first().ok_or(ParseError::Malformed)?;
        Ok(Self {
            state: State::try_from(byte)?,
        })
    }

    /// Append this TLV to a builder
    pub fn append(&self, builder: TlvBuilder) -> TlvBuilder {
        builder.state(self.state)
    }
}

impl TlvBuilder {
    /// Append a MeshCoP record
    pub fn meshcop(self, typ: MeshCopType, value: &[u8]) -> Self {
        self.tlv(typ as u8, value)
    }

    /// Append a State TLV
    pub fn state(self, state: State) -> Self {
        self.meshcop(MeshCopType::State, &[state.to_byte()])
    }

    /// Append a Commissioner Session ID TLV
    pub fn session_id(self, session_id: u16) -> Self {
        self.meshcop(MeshCopType::CommissionerSessionId, &session_id.to_be_bytes())
    }

    /// Append a Border Agent Locator TLV
    pub fn border_agent_locator(self, rloc16: u16) -> Self {
        self.meshcop(MeshCopType::BorderAgentLocator, &rloc16.to_be_bytes())
    }

    /// Append a Steering Data TLV
    pub fn steering_data(self, bloom: &[u8]) -> Self {
        self.meshcop(MeshCopType::SteeringData, bloom)
    }

    /// Append a Commissioner ID TLV
    pub fn commissioner_id(self, id: &[u8]) -> Self {
        self.meshcop(MeshCopType::CommissionerId, id)
    }
}
