//! Thread Network Data TLVs.
//!
//! The type byte of a Network Data TLV packs the type in the upper seven bits
//! and the stable flag in bit 0. Each view below is decoded from an already
//! bounds-checked [`Tlv`] and copies fixed-size fields out by value.

use crate::error::{ParseError, UnknownType};
use crate::tlv::{Tlv, TlvCursor};
use bitflags::bitflags;
use bytes::BufMut;
use serde::{Deserialize, Serialize};

/// Enterprise number that marks a Thread-defined service
pub const THREAD_ENTERPRISE_NUMBER: u32 = 44970;

/// Longest prefix, in bits
pub const MAX_PREFIX_BITS: u8 = 128;

/// Highest service id the leader hands out
pub const MAX_SERVICE_ID: u8 = 0x0F;

/// Size of one Has Route entry
pub const HAS_ROUTE_ENTRY_SIZE: usize = 3;

/// Size of one Border Router entry
pub const BORDER_ROUTER_ENTRY_SIZE: usize = 4;

const STABLE_FLAG: u8 = 0x01;
const SERVICE_THREAD_ENTERPRISE_FLAG: u8 = 0x80;
const SERVICE_ID_MASK: u8 = 0x0F;
const CONTEXT_COMPRESS_FLAG: u8 = 0x10;
const CONTEXT_ID_MASK: u8 = 0x0F;

/// Network Data TLV types
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NetworkDataType {
    /// Has Route sub-TLV
    HasRoute = 0,
    /// Prefix TLV
    Prefix = 1,
    /// Border Router sub-TLV
    BorderRouter = 2,
    /// 6LoWPAN Context sub-TLV
    Context = 3,
    /// Commissioning Data TLV
    CommissioningData = 4,
    /// Service TLV
    Service = 5,
    /// Server sub-TLV
    Server = 6,
}

impl NetworkDataType {
    /// Encode the type byte for this type and stable flag
    pub fn type_byte(self, stable: bool) -> u8 {
        ((self as u8) << 1) | if stable { STABLE_FLAG } else { 0 }
    }
}

impl TryFrom<u8> for NetworkDataType {
    type Error = UnknownType;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(NetworkDataType::HasRoute),
            1 => Ok(NetworkDataType::Prefix),
            2 => Ok(NetworkDataType::BorderRouter),
            3 => Ok(NetworkDataType::Context),
            4 => Ok(NetworkDataType::CommissioningData),
            5 => Ok(NetworkDataType::Service),
            6 => Ok(NetworkDataType::Server),
            _ => Err(UnknownType(value)),
        }
    }
}

/// A Network Data TLV with its type byte split into type and stable flag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkDataTlv<'a> {
    tlv: Tlv<'a>,
}

impl<'a> NetworkDataTlv<'a> {
    /// Known type, if any
    pub fn kind(&self) -> Option<NetworkDataType> {
        NetworkDataType::try_from(self.raw_kind()).ok()
    }

    /// Type without the stable bit
    pub fn raw_kind(&self) -> u8 {
        self.tlv.typ() >> 1
    }

    /// Whether the stable bit is set
    pub fn is_stable(&self) -> bool {
        self.tlv.typ() & STABLE_FLAG != 0
    }

    /// Value bytes
    pub fn value(&self) -> &'a [u8] {
        self.tlv.value()
    }

    /// Offset of the record within its buffer
    pub fn offset(&self) -> usize {
        self.tlv.offset()
    }

    /// Underlying record
    pub fn tlv(&self) -> Tlv<'a> {
        self.tlv
    }
}

impl<'a> From<Tlv<'a>> for NetworkDataTlv<'a> {
    fn from(tlv: Tlv<'a>) -> Self {
        Self { tlv }
    }
}

/// Iterate a buffer as Network Data TLVs
pub fn network_data_tlvs(
    buf: &[u8],
) -> impl Iterator<Item = Result<NetworkDataTlv<'_>, ParseError>> {
    TlvCursor::new(buf).map(|tlv| tlv.map(NetworkDataTlv::from))
}

/// Number of bytes needed to hold `bits` prefix bits
pub fn prefix_bytes(bits: u8) -> usize {
    (bits as usize + 7) / 8
}

/// Whether `a` and `b` agree on their first `bits` bits
pub fn prefix_matches(a: &[u8], b: &[u8], bits: u8) -> bool {
    let len = prefix_bytes(bits);
    if a.len() < len || b.len() < len {
        return false;
    }
    let whole = bits as usize / 8;
    if a[..whole] != b[..whole] {
        return false;
    }
    match bits % 8 {
        0 => true,
        rem => (a[whole] ^ b[whole]) & (0xFF << (8 - rem)) == 0,
    }
}

/// Prefix TLV view
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrefixTlv<'a> {
    /// Domain id
    pub domain_id: u8,
    /// Prefix length in bits
    pub prefix_bits: u8,
    /// Prefix bytes (`ceil(prefix_bits / 8)` of them)
    pub prefix: &'a [u8],
    /// Raw sub-TLV bytes
    pub sub_tlvs: &'a [u8],
    /// Stable flag of the enclosing TLV
    pub stable: bool,
}

impl<'a> PrefixTlv<'a> {
    /// Decode from a Network Data TLV of type Prefix
    pub fn decode(tlv: &NetworkDataTlv<'a>) -> Result<Self, ParseError> {
        let value = tlv.value();
        if value.len() < 2 {
            return Err(ParseError::Malformed);
        }

        let domain_id = value[0];
        let prefix_bits = value[1];
        if prefix_bits > MAX_PREFIX_BITS {
            return Err(ParseError::Malformed);
        }

        let prefix_end = 2 + prefix_bytes(prefix_bits);
        if value.len() < prefix_end {
            return Err(ParseError::Malformed);
        }

        Ok(Self {
            domain_id,
            prefix_bits,
            prefix: &value[2..prefix_end],
            sub_tlvs: &value[prefix_end..],
            stable: tlv.is_stable(),
        })
    }

    /// Whether this prefix has the given key
    pub fn matches(&self, prefix: &[u8], prefix_bits: u8) -> bool {
        self.prefix_bits == prefix_bits && prefix_matches(self.prefix, prefix, prefix_bits)
    }

    /// Iterate the sub-TLVs
    pub fn sub_tlvs(&self) -> impl Iterator<Item = Result<NetworkDataTlv<'a>, ParseError>> {
        network_data_tlvs(self.sub_tlvs)
    }

    /// First sub-TLV of `kind` with the given stable flag
    pub fn find_sub_tlv(
        &self,
        kind: NetworkDataType,
        stable: bool,
    ) -> Result<Option<NetworkDataTlv<'a>>, ParseError> {
        find_sub_tlv(self.sub_tlvs, kind, Some(stable))
    }

    /// First Context sub-TLV, stable or not
    pub fn find_context(&self) -> Result<Option<ContextTlv>, ParseError> {
        find_sub_tlv(self.sub_tlvs, NetworkDataType::Context, None)?
            .map(|tlv| ContextTlv::decode(&tlv))
            .transpose()
    }
}

/// Find the first sub-TLV of `kind`, optionally restricted to a stable flag
pub fn find_sub_tlv(
    sub_tlvs: &[u8],
    kind: NetworkDataType,
    stable: Option<bool>,
) -> Result<Option<NetworkDataTlv<'_>>, ParseError> {
    for sub in network_data_tlvs(sub_tlvs) {
        let sub = sub?;
        if sub.kind() == Some(kind) && stable.map_or(true, |s| s == sub.is_stable()) {
            return Ok(Some(sub));
        }
    }
    Ok(None)
}

/// One Has Route entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HasRouteEntry {
    /// Advertising router
    pub rloc16: u16,
    /// Route preference and flags
    pub flags: u8,
}

impl HasRouteEntry {
    /// Append the entry to `buf`
    pub fn encode(&self, buf: &mut impl BufMut) {
        buf.put_u16(self.rloc16);
        buf.put_u8(self.flags);
    }
}

/// Decode the entries of a Has Route sub-TLV value
pub fn decode_has_route(value: &[u8]) -> Result<Vec<HasRouteEntry>, ParseError> {
    if value.len() % HAS_ROUTE_ENTRY_SIZE != 0 {
        return Err(ParseError::Malformed);
    }
    Ok(value
        .chunks_exact(HAS_ROUTE_ENTRY_SIZE)
        .map(|c| HasRouteEntry {
            rloc16: u16::from_be_bytes([c[0], c[1]]),
            flags: c[2],
        })
        .collect())
}

bitflags! {
    /// Border Router entry flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct BorderRouterFlags: u16 {
        /// Preference (two bits)
        const PREFERENCE = 0b11 << 14;
        /// Preferred address
        const PREFERRED = 1 << 13;
        /// Stateless address autoconfiguration
        const SLAAC = 1 << 12;
        /// DHCPv6 address assignment
        const DHCP = 1 << 11;
        /// DHCPv6 other configuration
        const CONFIGURE = 1 << 10;
        /// Default route
        const DEFAULT_ROUTE = 1 << 9;
        /// Prefix is on-mesh
        const ON_MESH = 1 << 8;
        /// ND DNS option supported
        const ND_DNS = 1 << 7;
        /// Domain prefix
        const DP = 1 << 6;
    }
}

/// One Border Router entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BorderRouterEntry {
    /// Advertising router
    pub rloc16: u16,
    /// Entry flags
    pub flags: BorderRouterFlags,
}

impl BorderRouterEntry {
    /// Append the entry to `buf`
    pub fn encode(&self, buf: &mut impl BufMut) {
        buf.put_u16(self.rloc16);
        buf.put_u16(self.flags.bits());
    }
}

/// Decode the entries of a Border Router sub-TLV value
pub fn decode_border_router(value: &[u8]) -> Result<Vec<BorderRouterEntry>, ParseError> {
    if value.len() % BORDER_ROUTER_ENTRY_SIZE != 0 {
        return Err(ParseError::Malformed);
    }
    Ok(value
        .chunks_exact(BORDER_ROUTER_ENTRY_SIZE)
        .map(|c| BorderRouterEntry {
            rloc16: u16::from_be_bytes([c[0], c[1]]),
            flags: BorderRouterFlags::from_bits_retain(u16::from_be_bytes([c[2], c[3]])),
        })
        .collect())
}

/// 6LoWPAN Context sub-TLV
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextTlv {
    /// Context id (0..=15)
    pub context_id: u8,
    /// Whether the context may be used for compression
    pub compress: bool,
    /// Context length in bits
    pub context_length: u8,
}

impl ContextTlv {
    /// Decode from a Network Data TLV of type Context
    pub fn decode(tlv: &NetworkDataTlv<'_>) -> Result<Self, ParseError> {
        let value = tlv.value();
        if value.len() < 2 {
            return Err(ParseError::Malformed);
        }
        Ok(Self {
            context_id: value[0] & CONTEXT_ID_MASK,
            compress: value[0] & CONTEXT_COMPRESS_FLAG != 0,
            context_length: value[1],
        })
    }
}

/// Service TLV view
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceTlv<'a> {
    /// Service id assigned by the leader
    pub service_id: u8,
    /// Enterprise number (Thread's when the T bit is set)
    pub enterprise_number: u32,
    /// Service data
    pub service_data: &'a [u8],
    /// Raw sub-TLV bytes
    pub sub_tlvs: &'a [u8],
    /// Stable flag of the enclosing TLV
    pub stable: bool,
}

impl<'a> ServiceTlv<'a> {
    /// Decode from a Network Data TLV of type Service
    pub fn decode(tlv: &NetworkDataTlv<'a>) -> Result<Self, ParseError> {
        let value = tlv.value();
        let flags = *value.first().ok_or(ParseError::Malformed)?;
        let thread_enterprise = flags & SERVICE_THREAD_ENTERPRISE_FLAG != 0;

        let mut pos = 1;
        let enterprise_number = if thread_enterprise {
            THREAD_ENTERPRISE_NUMBER
        } else {
            let bytes = value.get(pos..pos + 4).ok_or(ParseError::Malformed)?;
            pos += 4;
            u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
        };

        let data_len = *value.get(pos).ok_or(ParseError::Malformed)? as usize;
        pos += 1;
        let service_data = value
            .get(pos..pos + data_len)
            .ok_or(ParseError::Malformed)?;
        pos += data_len;

        Ok(Self {
            service_id: flags & SERVICE_ID_MASK,
            enterprise_number,
            service_data,
            sub_tlvs: &value[pos..],
            stable: tlv.is_stable(),
        })
    }

    /// Whether this service has the given key
    pub fn matches(&self, enterprise_number: u32, service_data: &[u8]) -> bool {
        self.enterprise_number == enterprise_number && self.service_data == service_data
    }

    /// Iterate the sub-TLVs
    pub fn sub_tlvs(&self) -> impl Iterator<Item = Result<NetworkDataTlv<'a>, ParseError>> {
        network_data_tlvs(self.sub_tlvs)
    }
}

/// Encode the fixed fields of a Service TLV value (everything before sub-TLVs)
pub fn encode_service_header(
    buf: &mut impl BufMut,
    service_id: u8,
    enterprise_number: u32,
    service_data: &[u8],
) {
    if enterprise_number == THREAD_ENTERPRISE_NUMBER {
        buf.put_u8(SERVICE_THREAD_ENTERPRISE_FLAG | (service_id & SERVICE_ID_MASK));
    } else {
        buf.put_u8(service_id & SERVICE_ID_MASK);
        buf.put_u32(enterprise_number);
    }
    buf.put_u8(service_data.len() as u8);
    buf.put_slice(service_data);
}

/// Server sub-TLV view
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerTlv<'a> {
    /// Server locator
    pub rloc16: u16,
    /// Server data
    pub server_data: &'a [u8],
    /// Stable flag
    pub stable: bool,
}

impl<'a> ServerTlv<'a> {
    /// Decode from a Network Data TLV of type Server
    pub fn decode(tlv: &NetworkDataTlv<'a>) -> Result<Self, ParseError> {
        let value = tlv.value();
        if value.len() < 2 {
            return Err(ParseError::Malformed);
        }
        Ok(Self {
            rloc16: u16::from_be_bytes([value[0], value[1]]),
            server_data: &value[2..],
            stable: tlv.is_stable(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::TlvBuilder;

    fn first(buf: &[u8]) -> NetworkDataTlv<'_> {
        network_data_tlvs(buf).next().unwrap().unwrap()
    }

    #[test]
    fn test_type_byte() {
        assert_eq!(NetworkDataType::Prefix.type_byte(true), 0x03);
        assert_eq!(NetworkDataType::Prefix.type_byte(false), 0x02);
        assert_eq!(NetworkDataType::CommissioningData.type_byte(false), 0x08);
        assert_eq!(NetworkDataType::Server.type_byte(true), 0x0D);
        assert!(NetworkDataType::try_from(7).is_err());
    }

    #[test]
    fn test_prefix_decode() {
        let buf = TlvBuilder::new()
            .network_data(NetworkDataType::Prefix, true, |b| {
                b.u8(0)
                    .u8(64)
                    .raw(&[0xFD, 0, 0, 0, 0, 0, 0, 1])
                    .network_data(NetworkDataType::BorderRouter, true, |b| {
                        b.u16(0x0400).u16(BorderRouterFlags::ON_MESH.bits())
                    })
            })
            .build()
            .unwrap();

        let tlv = first(&buf);
        assert_eq!(tlv.kind(), Some(NetworkDataType::Prefix));
        assert!(tlv.is_stable());

        let prefix = PrefixTlv::decode(&tlv).unwrap();
        assert_eq!(prefix.prefix_bits, 64);
        assert_eq!(prefix.prefix.len(), 8);
        assert!(prefix.matches(&[0xFD, 0, 0, 0, 0, 0, 0, 1], 64));
        assert!(!prefix.matches(&[0xFD, 0, 0, 0, 0, 0, 0, 1], 63));

        let br = prefix
            .find_sub_tlv(NetworkDataType::BorderRouter, true)
            .unwrap()
            .unwrap();
        let entries = decode_border_router(br.value()).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].rloc16, 0x0400);
        assert!(entries[0].flags.contains(BorderRouterFlags::ON_MESH));
        assert!(prefix
            .find_sub_tlv(NetworkDataType::BorderRouter, false)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_prefix_too_short_for_bits() {
        // 64 bits declared, only 4 prefix bytes present
        let buf = [0x03, 0x06, 0x00, 0x40, 0xFD, 0x00, 0x00, 0x00];
        assert_eq!(PrefixTlv::decode(&first(&buf)), Err(ParseError::Malformed));

        let buf = [0x03, 0x01, 0x00];
        assert_eq!(PrefixTlv::decode(&first(&buf)), Err(ParseError::Malformed));

        let buf = [0x03, 0x02, 0x00, 129];
        assert_eq!(PrefixTlv::decode(&first(&buf)), Err(ParseError::Malformed));
    }

    #[test]
    fn test_prefix_match_ignores_bits_past_length() {
        assert!(prefix_matches(&[0xFD, 0x01], &[0xFD, 0x00], 15));
        assert!(!prefix_matches(&[0xFD, 0x01], &[0xFD, 0x00], 16));
        assert!(!prefix_matches(&[0xFD, 0x80], &[0xFD, 0x00], 9));
        assert!(prefix_matches(&[], &[], 0));
        assert!(!prefix_matches(&[0xFD], &[0xFD, 0x00], 16));
    }

    #[test]
    fn test_has_route_entries() {
        let entries = decode_has_route(&[0x04, 0x00, 0x40, 0x08, 0x00, 0x00]).unwrap();
        assert_eq!(
            entries,
            vec![
                HasRouteEntry { rloc16: 0x0400, flags: 0x40 },
                HasRouteEntry { rloc16: 0x0800, flags: 0x00 },
            ]
        );
        assert_eq!(decode_has_route(&[0x04, 0x00]), Err(ParseError::Malformed));
        assert_eq!(decode_border_router(&[0x04, 0x00, 0x00]), Err(ParseError::Malformed));
    }

    #[test]
    fn test_service_decode() {
        let mut value = Vec::new();
        encode_service_header(&mut value, 3, THREAD_ENTERPRISE_NUMBER, b"dns");
        let buf = TlvBuilder::new()
            .network_data(NetworkDataType::Service, true, |b| {
                b.raw(&value)
                    .network_data(NetworkDataType::Server, true, |b| b.u16(0x0400).raw(b"x"))
            })
            .build()
            .unwrap();

        let service = ServiceTlv::decode(&first(&buf)).unwrap();
        assert_eq!(service.service_id, 3);
        assert_eq!(service.enterprise_number, THREAD_ENTERPRISE_NUMBER);
        assert!(service.matches(THREAD_ENTERPRISE_NUMBER, b"dns"));

        let server = service.sub_tlvs().next().unwrap().unwrap();
        let server = ServerTlv::decode(&server).unwrap();
        assert_eq!(server.rloc16, 0x0400);
        assert_eq!(server.server_data, b"x");
    }

    #[test]
    fn test_service_with_enterprise_number() {
        let mut value = Vec::new();
        encode_service_header(&mut value, 1, 12345, &[0xAB]);
        assert_eq!(value, vec![0x01, 0, 0, 0x30, 0x39, 0x01, 0xAB]);

        let buf = TlvBuilder::new()
            .network_data(NetworkDataType::Service, false, |b| b.raw(&value))
            .build()
            .unwrap();
        let service = ServiceTlv::decode(&first(&buf)).unwrap();
        assert_eq!(service.enterprise_number, 12345);
        assert!(service.sub_tlvs.is_empty());
    }

    #[test]
    fn test_service_truncated_fields() {
        // Enterprise number cut short
        let buf = [0x0B, 0x03, 0x00, 0x00, 0x00];
        assert_eq!(ServiceTlv::decode(&first(&buf)), Err(ParseError::Malformed));

        // Service data length runs past the value
        let buf = [0x0B, 0x03, 0x80, 0x05, 0xAA];
        assert_eq!(ServiceTlv::decode(&first(&buf)), Err(ParseError::Malformed));

        let buf = [0x0B, 0x00];
        assert_eq!(ServiceTlv::decode(&first(&buf)), Err(ParseError::Malformed));
    }

    #[test]
    fn test_context_decode() {
        let buf = [0x07, 0x02, 0x11, 0x40];
        let context = ContextTlv::decode(&first(&buf)).unwrap();
        assert_eq!(context.context_id, 1);
        assert!(context.compress);
        assert_eq!(context.context_length, 64);
    }
}
