//! Key lookups over encoded Network Data

use netdata_wire::{network_data_tlvs, NetworkDataType, ParseError, PrefixTlv, ServiceTlv};

/// First Prefix TLV in `buf` with the given prefix and length
pub fn find_prefix<'a>(
    buf: &'a [u8],
    prefix: &[u8],
    prefix_bits: u8,
) -> Result<Option<PrefixTlv<'a>>, ParseError> {
    for tlv in network_data_tlvs(buf) {
        let tlv = tlv?;
        if tlv.kind() != Some(NetworkDataType::Prefix) {
            continue;
        }
        let candidate = PrefixTlv::decode(&tlv)?;
        if candidate.matches(prefix, prefix_bits) {
            return Ok(Some(candidate));
        }
    }
    Ok(None)
}

/// First Service TLV in `buf` with the given enterprise number and service data
pub fn find_service<'a>(
    buf: &'a [u8],
    enterprise_number: u32,
    service_data: &[u8],
) -> Result<Option<ServiceTlv<'a>>, ParseError> {
    for tlv in network_data_tlvs(buf) {
        let tlv = tlv?;
        if tlv.kind() != Some(NetworkDataType::Service) {
            continue;
        }
        let candidate = ServiceTlv::decode(&tlv)?;
        if candidate.matches(enterprise_number, service_data) {
            return Ok(Some(candidate));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use netdata_wire::{HasRouteEntry, TlvBuilder, THREAD_ENTERPRISE_NUMBER};

    #[test]
    fn test_find_prefix_by_key() {
        let route = [HasRouteEntry { rloc16: 0x0400, flags: 0 }];
        let buf = TlvBuilder::new()
            .prefix(true, 0, &[0xFD, 0x00], 16, |b| b.has_route(true, &route))
            .prefix(false, 0, &[0xFD, 0x01], 16, |b| b.has_route(false, &route))
            .build()
            .unwrap();

        let found = find_prefix(&buf, &[0xFD, 0x01], 16).unwrap().unwrap();
        assert!(!found.stable);
        assert!(find_prefix(&buf, &[0xFD, 0x01], 15).unwrap().is_none());
        assert!(find_prefix(&[], &[0xFD], 8).unwrap().is_none());
    }

    #[test]
    fn test_find_service_by_key() {
        let buf = TlvBuilder::new()
            .service(true, 0, THREAD_ENTERPRISE_NUMBER, b"a", |b| b.server(true, 0x0400, &[]))
            .service(true, 1, 99, b"a", |b| b.server(true, 0x0400, &[]))
            .build()
            .unwrap();

        let found = find_service(&buf, 99, b"a").unwrap().unwrap();
        assert_eq!(found.service_id, 1);
        assert!(find_service(&buf, 99, b"b").unwrap().is_none());
    }

    #[test]
    fn test_lookup_propagates_parse_errors() {
        let buf = [0x03, 0x01, 0x00];
        assert_eq!(find_prefix(&buf, &[0xFD], 8), Err(ParseError::Malformed));
    }
}
