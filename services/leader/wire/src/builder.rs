//! TLV encoding.
//!
//! [`TlvBuilder`] appends records to a `BytesMut`. Nested records are built
//! with a closure that receives a fresh child builder; the child's bytes become
//! the parent record's value. The first encoding error is kept and reported by
//! [`TlvBuilder::build`], so call chains never need intermediate `?`.

use crate::error::EncodeError;
use crate::netdata::{encode_service_header, BorderRouterEntry, HasRouteEntry, NetworkDataType};
use crate::tlv::MAX_TLV_VALUE_LENGTH;
use bytes::{BufMut, Bytes, BytesMut};

/// Builder for TLV sequences
#[derive(Debug, Default)]
pub struct TlvBuilder {
    buf: BytesMut,
    error: Option<EncodeError>,
}

impl TlvBuilder {
    /// Create an empty builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record with a raw type byte
    pub fn tlv(mut self, typ: u8, value: &[u8]) -> Self {
        if value.len() > MAX_TLV_VALUE_LENGTH {
            self.error.get_or_insert(EncodeError::ValueTooLong(value.len()));
            return self;
        }
        self.buf.put_u8(typ);
        self.buf.put_u8(value.len() as u8);
        self.buf.put_slice(value);
        self
    }

    /// Append a record whose value is produced by a child builder
    pub fn nested(self, typ: u8, f: impl FnOnce(TlvBuilder) -> TlvBuilder) -> Self {
        let child = f(TlvBuilder::new());
        self.absorb(typ, child)
    }

    /// Append a Network Data record (type byte carries the stable flag)
    pub fn network_data(
        self,
        kind: NetworkDataType,
        stable: bool,
        f: impl FnOnce(TlvBuilder) -> TlvBuilder,
    ) -> Self {
        self.nested(kind.type_byte(stable), f)
    }

    /// Append raw bytes without a header
    pub fn raw(mut self, bytes: &[u8]) -> Self {
        self.buf.put_slice(bytes);
        self
    }

    /// Append a single byte
    pub fn u8(mut self, value: u8) -> Self {
        self.buf.put_u8(value);
        self
    }

    /// Append a big-endian u16
    pub fn u16(mut self, value: u16) -> Self {
        self.buf.put_u16(value);
        self
    }

    /// Append a big-endian u32
    pub fn u32(mut self, value: u32) -> Self {
        self.buf.put_u32(value);
        self
    }

    /// Bytes written so far
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Whether nothing has been written
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Finish and return the encoded bytes
    pub fn build(self) -> Result<Bytes, EncodeError> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.buf.freeze()),
        }
    }

    /// Append a Prefix TLV; `prefix` must hold `ceil(prefix_bits / 8)` bytes
    pub fn prefix(
        self,
        stable: bool,
        domain_id: u8,
        prefix: &[u8],
        prefix_bits: u8,
        sub_tlvs: impl FnOnce(TlvBuilder) -> TlvBuilder,
    ) -> Self {
        self.network_data(NetworkDataType::Prefix, stable, |b| {
            sub_tlvs(b.u8(domain_id).u8(prefix_bits).raw(prefix))
        })
    }

    /// Append a Has Route sub-TLV
    pub fn has_route(self, stable: bool, entries: &[HasRouteEntry]) -> Self {
        let mut value = Vec::with_capacity(entries.len() * 3);
        for entry in entries {
            entry.encode(&mut value);
        }
        self.network_data(NetworkDataType::HasRoute, stable, |b| b.raw(&value))
    }

    /// Append a Border Router sub-TLV
    pub fn border_router(self, stable: bool, entries: &[BorderRouterEntry]) -> Self {
        let mut value = Vec::with_capacity(entries.len() * 4);
        for entry in entries {
            entry.encode(&mut value);
        }
        self.network_data(NetworkDataType::BorderRouter, stable, |b| b.raw(&value))
    }

    /// Append a Service TLV
    pub fn service(
        self,
        stable: bool,
        service_id: u8,
        enterprise_number: u32,
        service_data: &[u8],
        sub_tlvs: impl FnOnce(TlvBuilder) -> TlvBuilder,
    ) -> Self {
        let mut header = Vec::with_capacity(6 + service_data.len());
        encode_service_header(&mut header, service_id, enterprise_number, service_data);
        self.network_data(NetworkDataType::Service, stable, |b| sub_tlvs(b.raw(&header)))
    }

    /// Append a Server sub-TLV
    pub fn server(self, stable: bool, rloc16: u16, server_data: &[u8]) -> Self {
        self.network_data(NetworkDataType::Server, stable, |b| {
            b.u16(rloc16).raw(server_data)
        })
    }

    fn absorb(mut self, typ: u8, child: TlvBuilder) -> Self {
        match child.error {
            Some(err) => {
                self.error.get_or_insert(err);
                self
            }
            None => self.tlv(typ, &child.buf),
        }
    }
}
