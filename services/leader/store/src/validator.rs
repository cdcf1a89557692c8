//! Admission checks for a router's Network Data batch.
//!
//! A batch is accepted only when every Prefix and Service TLV is well formed,
//! appears once, and advertises nothing but the registering router. Duplicate
//! detection looks only at records before the current one: each record is
//! compared against a fresh cursor over `batch[..offset]`.

use crate::error::{EntryKind, ValidationError};
use crate::find::{find_prefix, find_service};
use netdata_wire::{
    decode_border_router, decode_has_route, network_data_tlvs, NetworkDataType, PrefixTlv,
    ServerTlv, ServiceTlv,
};
use tracing::debug;

/// Validate `batch` as Network Data registered by `claimed_rloc`
pub fn validate(batch: &[u8], claimed_rloc: u16) -> Result<(), ValidationError> {
    for tlv in network_data_tlvs(batch) {
        let tlv = tlv?;
        match tlv.kind() {
            Some(NetworkDataType::Prefix) => {
                let prefix = PrefixTlv::decode(&tlv)?;
                let earlier = &batch[..tlv.offset()];
                if find_prefix(earlier, prefix.prefix, prefix.prefix_bits)?.is_some() {
                    return Err(ValidationError::DuplicateEntry {
                        kind: EntryKind::Prefix,
                        offset: tlv.offset(),
                    });
                }
                validate_prefix(&prefix, claimed_rloc)?;
            }
            Some(NetworkDataType::Service) => {
                let service = ServiceTlv::decode(&tlv)?;
                let earlier = &batch[..tlv.offset()];
                if find_service(earlier, service.enterprise_number, service.service_data)?
                    .is_some()
                {
                    return Err(ValidationError::DuplicateEntry {
                        kind: EntryKind::Service,
                        offset: tlv.offset(),
                    });
                }
                validate_service(&service, claimed_rloc)?;
            }
            _ => debug!(
                "Validator passing through type={} offset={}",
                tlv.raw_kind(),
                tlv.offset()
            ),
        }
    }
    Ok(())
}

/// Per-flag occupancy of a prefix's BorderRouter and HasRoute slots
#[derive(Default)]
struct PrefixSlots {
    border_router: [bool; 2],
    has_route: [bool; 2],
}

impl PrefixSlots {
    fn claim(slots: &mut [bool; 2], stable: bool) -> Result<(), ValidationError> {
        let slot = &mut slots[stable as usize];
        if *slot {
            return Err(invalid_prefix("repeated sub-TLV with the same stable flag"));
        }
        *slot = true;
        Ok(())
    }

    fn is_empty(&self) -> bool {
        !self.border_router.iter().chain(self.has_route.iter()).any(|s| *s)
    }
}

fn validate_prefix(prefix: &PrefixTlv<'_>, claimed_rloc: u16) -> Result<(), ValidationError> {
    let mut slots = PrefixSlots::default();

    for sub in prefix.sub_tlvs() {
        let sub = sub?;
        if sub.is_stable() && !prefix.stable {
            return Err(invalid_prefix("stable sub-TLV in temporary prefix"));
        }
        let owner = match sub.kind() {
            Some(NetworkDataType::BorderRouter) => {
                PrefixSlots::claim(&mut slots.border_router, sub.is_stable())?;
                match decode_border_router(sub.value())?.as_slice() {
                    [entry] => entry.rloc16,
                    _ => return Err(invalid_prefix("border router sub-TLV needs one entry")),
                }
            }
            Some(NetworkDataType::HasRoute) => {
                PrefixSlots::claim(&mut slots.has_route, sub.is_stable())?;
                match decode_has_route(sub.value())?.as_slice() {
                    [entry] => entry.rloc16,
                    _ => return Err(invalid_prefix("has route sub-TLV needs one entry")),
                }
            }
            _ => continue,
        };
        check_owner(owner, claimed_rloc)?;
    }

    if slots.is_empty() {
        return Err(invalid_prefix("no border router or has route sub-TLV"));
    }
    Ok(())
}

fn validate_service(service: &ServiceTlv<'_>, claimed_rloc: u16) -> Result<(), ValidationError> {
    let mut servers = 0;

    for sub in service.sub_tlvs() {
        let sub = sub?;
        if sub.kind() != Some(NetworkDataType::Server) {
            continue;
        }
        if sub.is_stable() && !service.stable {
            return Err(invalid_service("stable server in temporary service"));
        }
        servers += 1;
        if servers > 1 {
            return Err(invalid_service("more than one server sub-TLV"));
        }
        let server = ServerTlv::decode(&sub)?;
        check_owner(server.rloc16, claimed_rloc)?;
    }

    if servers == 0 {
        return Err(invalid_service("no server sub-TLV"));
    }
    Ok(())
}

fn check_owner(found: u16, expected: u16) -> Result<(), ValidationError> {
    if found != expected {
        return Err(ValidationError::OwnershipViolation { expected, found });
    }
    Ok(())
}

fn invalid_prefix(reason: &'static str) -> ValidationError {
    ValidationError::InvalidEntry {
        kind: EntryKind::Prefix,
        reason,
    }
}

fn invalid_service(reason: &'static str) -> ValidationError {
    ValidationError::InvalidEntry {
        kind: EntryKind::Service,
        reason,
    }
}
