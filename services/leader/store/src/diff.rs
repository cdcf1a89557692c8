//! Stable-data comparison.
//!
//! [`requires_version_bump`] answers one question: does `candidate` carry
//! stable data that `base` does not hold byte-for-byte? Callers that need a
//! symmetric answer run it both ways.

use crate::find::{find_prefix, find_service};
use netdata_wire::{
    network_data_tlvs, NetworkDataTlv, NetworkDataType, ParseError, PrefixTlv, ServerTlv,
    ServiceTlv,
};
use tracing::debug;

/// Whether `candidate` has stable content missing from or different in `base`.
///
/// Malformed input on either side yields `false`.
pub fn requires_version_bump(candidate: &[u8], base: &[u8]) -> bool {
    match stable_changed(candidate, base) {
        Ok(changed) => changed,
        Err(err) => {
            debug!("Stable diff aborted: {}", err);
            false
        }
    }
}

fn stable_changed(candidate: &[u8], base: &[u8]) -> Result<bool, ParseError> {
    for tlv in network_data_tlvs(candidate) {
        let tlv = tlv?;
        if !tlv.is_stable() {
            continue;
        }
        let changed = match tlv.kind() {
            Some(NetworkDataType::Prefix) => prefix_changed(&PrefixTlv::decode(&tlv)?, base)?,
            Some(NetworkDataType::Service) => service_changed(&ServiceTlv::decode(&tlv)?, base)?,
            _ => false,
        };
        if changed {
            return Ok(true);
        }
    }
    Ok(false)
}

fn prefix_changed(prefix: &PrefixTlv<'_>, base: &[u8]) -> Result<bool, ParseError> {
    let border_router = prefix.find_sub_tlv(NetworkDataType::BorderRouter, true)?;
    let has_route = prefix.find_sub_tlv(NetworkDataType::HasRoute, true)?;

    // A context-bearing prefix only counts once a stable border router backs it
    if prefix.find_context()?.is_some() && border_router.is_none() {
        return Ok(false);
    }

    let Some(base_prefix) = find_prefix(base, prefix.prefix, prefix.prefix_bits)? else {
        return Ok(true);
    };

    if let Some(sub) = border_router {
        let other = base_prefix.find_sub_tlv(NetworkDataType::BorderRouter, true)?;
        if differs(&sub, other.as_ref()) {
            return Ok(true);
        }
    }
    if let Some(sub) = has_route {
        let other = base_prefix.find_sub_tlv(NetworkDataType::HasRoute, true)?;
        if differs(&sub, other.as_ref()) {
            return Ok(true);
        }
    }
    Ok(false)
}

fn service_changed(service: &ServiceTlv<'_>, base: &[u8]) -> Result<bool, ParseError> {
    let base_service = match find_service(base, service.enterprise_number, service.service_data)? {
        Some(found) if found.stable => found,
        _ => return Ok(true),
    };

    for sub in service.sub_tlvs() {
        let sub = sub?;
        if !sub.is_stable() || sub.kind() != Some(NetworkDataType::Server) {
            continue;
        }
        let server = ServerTlv::decode(&sub)?;
        if !has_server(&base_service, &server)? {
            return Ok(true);
        }
    }
    Ok(false)
}

fn has_server(service: &ServiceTlv<'_>, server: &ServerTlv<'_>) -> Result<bool, ParseError> {
    for sub in service.sub_tlvs() {
        let sub = sub?;
        if !sub.is_stable() || sub.kind() != Some(NetworkDataType::Server) {
            continue;
        }
        let other = ServerTlv::decode(&sub)?;
        if other.rloc16 == server.rloc16 && other.server_data == server.server_data {
            return Ok(true);
        }
    }
    Ok(false)
}

fn differs(sub: &NetworkDataTlv<'_>, other: Option<&NetworkDataTlv<'_>>) -> bool {
    other.map_or(true, |other| other.value() != sub.value())
}
