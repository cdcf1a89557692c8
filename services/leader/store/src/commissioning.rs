//! Read access to the Commissioning Data sub-tree

use netdata_wire::meshcop::{border_agent_locator, commissioner_session_id};
use netdata_wire::{MeshCopType, ParseError, Tlv, TlvCursor};

/// View over the MeshCoP TLVs held in the Commissioning Data TLV
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommissioningData<'a> {
    tlvs: &'a [u8],
}

impl<'a> CommissioningData<'a> {
    /// Wrap a Commissioning Data value
    pub fn new(tlvs: &'a [u8]) -> Self {
        Self { tlvs }
    }

    /// Raw MeshCoP TLVs
    pub fn tlvs(&self) -> &'a [u8] {
        self.tlvs
    }

    /// First record of the given type
    pub fn find(&self, typ: MeshCopType) -> Result<Option<Tlv<'a>>, ParseError> {
        TlvCursor::find(self.tlvs, typ as u8)
    }

    /// Commissioner Session ID, if present
    pub fn session_id(&self) -> Result<Option<u16>, ParseError> {
        self.find(MeshCopType::CommissionerSessionId)?
            .map(|tlv| commissioner_session_id(&tlv))
            .transpose()
    }

    /// Border Agent Locator, if present
    pub fn border_agent_locator(&self) -> Result<Option<u16>, ParseError> {
        self.find(MeshCopType::BorderAgentLocator)?
            .map(|tlv| border_agent_locator(&tlv))
            .transpose()
    }

    /// Steering Data, if present
    pub fn steering_data(&self) -> Result<Option<&'a [u8]>, ParseError> {
        Ok(self.find(MeshCopType::SteeringData)?.map(|tlv| tlv.value()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use netdata_wire::TlvBuilder;

    #[test]
    fn test_accessors() {
        let tlvs = TlvBuilder::new()
            .border_agent_locator(0x0400)
            .session_id(7)
            .steering_data(&[0xFF, 0x00])
            .build()
            .unwrap();
        let data = CommissioningData::new(&tlvs);

        assert_eq!(data.border_agent_locator(), Ok(Some(0x0400)));
        assert_eq!(data.session_id(), Ok(Some(7)));
        assert_eq!(data.steering_data(), Ok(Some(&[0xFF, 0x00][..])));
    }

    #[test]
    fn test_missing_and_short_values() {
        let tlvs = [11, 1, 0x00];
        let data = CommissioningData::new(&tlvs);
        assert_eq!(data.border_agent_locator(), Ok(None));
        assert_eq!(data.session_id(), Err(ParseError::Malformed));
    }
}
