//! The leader's authoritative Network Data.
//!
//! Entries are kept as an owned tree and encoded on demand. Every mutation is
//! built on a copy and swapped in only after it validates and fits, so a failed
//! update never leaves partial state behind.

use crate::commissioning::CommissioningData;
use crate::diff::requires_version_bump;
use crate::error::StoreError;
use crate::validator::validate;
use bytes::Bytes;
use netdata_wire::{
    decode_border_router, decode_has_route, network_data_tlvs, prefix_matches, BorderRouterEntry,
    HasRouteEntry, NetworkDataType, PrefixTlv, ServerTlv, ServiceTlv, TlvBuilder,
    MAX_NETWORK_DATA_SIZE, MAX_SERVICE_ID,
};
use rand::Rng;
use serde::Serialize;
use tracing::{debug, info};

/// Border Router or Has Route sub-TLV of a stored prefix
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum PrefixSubTlv {
    /// Has Route entries
    HasRoute {
        /// Stable flag
        stable: bool,
        /// One entry per advertising router
        entries: Vec<HasRouteEntry>,
    },
    /// Border Router entries
    BorderRouter {
        /// Stable flag
        stable: bool,
        /// One entry per advertising router
        entries: Vec<BorderRouterEntry>,
    },
}

impl PrefixSubTlv {
    /// Stable flag
    pub fn is_stable(&self) -> bool {
        match self {
            PrefixSubTlv::HasRoute { stable, .. } | PrefixSubTlv::BorderRouter { stable, .. } => {
                *stable
            }
        }
    }

    fn is_empty(&self) -> bool {
        match self {
            PrefixSubTlv::HasRoute { entries, .. } => entries.is_empty(),
            PrefixSubTlv::BorderRouter { entries, .. } => entries.is_empty(),
        }
    }

    fn retain(&mut self, keep: &impl Fn(u16) -> bool) {
        match self {
            PrefixSubTlv::HasRoute { entries, .. } => entries.retain(|e| keep(e.rloc16)),
            PrefixSubTlv::BorderRouter { entries, .. } => entries.retain(|e| keep(e.rloc16)),
        }
    }

    fn encode(&self, builder: TlvBuilder) -> TlvBuilder {
        match self {
            PrefixSubTlv::HasRoute { stable, entries } => builder.has_route(*stable, entries),
            PrefixSubTlv::BorderRouter { stable, entries } => {
                builder.border_router(*stable, entries)
            }
        }
    }
}

/// Stored prefix
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PrefixEntry {
    /// Domain id
    pub domain_id: u8,
    /// Prefix length in bits
    pub prefix_bits: u8,
    /// Prefix bytes
    pub prefix: Vec<u8>,
    /// Advertisements for this prefix
    pub sub_tlvs: Vec<PrefixSubTlv>,
}

impl PrefixEntry {
    /// A prefix is stable when any of its sub-TLVs is
    pub fn is_stable(&self) -> bool {
        self.sub_tlvs.iter().any(PrefixSubTlv::is_stable)
    }

    fn add_has_route(&mut self, stable: bool, mut added: Vec<HasRouteEntry>) {
        for sub in &mut self.sub_tlvs {
            if let PrefixSubTlv::HasRoute { stable: s, entries } = sub {
                if *s == stable {
                    entries.append(&mut added);
                    return;
                }
            }
        }
        self.sub_tlvs.push(PrefixSubTlv::HasRoute {
            stable,
            entries: added,
        });
    }

    fn add_border_router(&mut self, stable: bool, mut added: Vec<BorderRouterEntry>) {
        for sub in &mut self.sub_tlvs {
            if let PrefixSubTlv::BorderRouter { stable: s, entries } = sub {
                if *s == stable {
                    entries.append(&mut added);
                    return;
                }
            }
        }
        self.sub_tlvs.push(PrefixSubTlv::BorderRouter {
            stable,
            entries: added,
        });
    }

    fn encode(&self, builder: TlvBuilder, stable_only: bool) -> TlvBuilder {
        let stable = self.is_stable();
        if stable_only && !stable {
            return builder;
        }
        builder.prefix(stable, self.domain_id, &self.prefix, self.prefix_bits, |b| {
            self.sub_tlvs
                .iter()
                .filter(|sub| !stable_only || sub.is_stable())
                .fold(b, |b, sub| sub.encode(b))
        })
    }
}

/// One server of a stored service
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServerEntry {
    /// Stable flag
    pub stable: bool,
    /// Server locator
    pub rloc16: u16,
    /// Server data
    pub server_data: Vec<u8>,
}

/// Stored service
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceEntry {
    /// Id assigned by the leader
    pub service_id: u8,
    /// Enterprise number
    pub enterprise_number: u32,
    /// Service data
    pub service_data: Vec<u8>,
    /// Servers offering the service
    pub servers: Vec<ServerEntry>,
}

impl ServiceEntry {
    /// A service is stable when any of its servers is
    pub fn is_stable(&self) -> bool {
        self.servers.iter().any(|s| s.stable)
    }

    fn encode(&self, builder: TlvBuilder, stable_only: bool) -> TlvBuilder {
        let stable = self.is_stable();
        if stable_only && !stable {
            return builder;
        }
        builder.service(
            stable,
            self.service_id,
            self.enterprise_number,
            &self.service_data,
            |b| {
                self.servers
                    .iter()
                    .filter(|s| !stable_only || s.stable)
                    .fold(b, |b, s| b.server(s.stable, s.rloc16, &s.server_data))
            },
        )
    }
}

/// Outcome of an admitted registration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Registration {
    /// Whether stable data changed
    pub stable_changed: bool,
    /// Version after the update
    pub version: u8,
    /// Stable version after the update
    pub stable_version: u8,
}

/// Versioned copy of the encoded Network Data
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    /// Data version
    pub version: u8,
    /// Stable data version
    pub stable_version: u8,
    /// Encoded Network Data
    pub tlvs: Bytes,
}

/// Leader-owned Network Data
#[derive(Debug, Clone)]
pub struct NetworkData {
    prefixes: Vec<PrefixEntry>,
    services: Vec<ServiceEntry>,
    commissioning: Option<Bytes>,
    version: u8,
    stable_version: u8,
}

impl Default for NetworkData {
    fn default() -> Self {
        Self::new()
    }
}

impl NetworkData {
    /// Empty Network Data with random initial versions
    pub fn new() -> Self {
        let mut rng = rand::thread_rng();
        Self::with_versions(rng.gen(), rng.gen())
    }

    /// Empty Network Data with the given versions
    pub fn with_versions(version: u8, stable_version: u8) -> Self {
        Self {
            prefixes: Vec::new(),
            services: Vec::new(),
            commissioning: None,
            version,
            stable_version,
        }
    }

    /// Data version
    pub fn version(&self) -> u8 {
        self.version
    }

    /// Stable data version
    pub fn stable_version(&self) -> u8 {
        self.stable_version
    }

    /// Stored prefixes
    pub fn prefixes(&self) -> &[PrefixEntry] {
        &self.prefixes
    }

    /// Stored services
    pub fn services(&self) -> &[ServiceEntry] {
        &self.services
    }

    /// Full encoded Network Data
    pub fn to_bytes(&self) -> Result<Bytes, StoreError> {
        self.encode(false)
    }

    /// Stable subset, as sent to sleepy children
    pub fn stable_bytes(&self) -> Result<Bytes, StoreError> {
        self.encode(true)
    }

    /// Encoded prefixes and services advertised by `rloc16`
    pub fn owned_by(&self, rloc16: u16) -> Result<Bytes, StoreError> {
        let mut owned = self.clone();
        owned.commissioning = None;
        owned.retain(|rloc| rloc == rloc16);
        owned.to_bytes()
    }

    /// Versioned copy of the full data
    pub fn snapshot(&self) -> Result<Snapshot, StoreError> {
        Ok(Snapshot {
            version: self.version,
            stable_version: self.stable_version,
            tlvs: self.to_bytes()?,
        })
    }

    /// Replace everything `rloc16` advertises with `candidate`.
    ///
    /// The store is unchanged unless the whole batch is admitted.
    pub fn register(&mut self, rloc16: u16, candidate: &[u8]) -> Result<Registration, StoreError> {
        validate(candidate, rloc16)?;

        let base = self.owned_by(rloc16)?;
        let stable_changed =
            requires_version_bump(candidate, &base) || requires_version_bump(&base, candidate);

        let mut next = self.clone();
        next.retain(|rloc| rloc != rloc16);
        next.merge(candidate)?;
        let size = next.check_capacity()?;
        next.bump_version(stable_changed);
        *self = next;

        info!(
            "Registered network data rloc16={:#06x} size={} version={} stable_version={} stable_changed={}",
            rloc16, size, self.version, self.stable_version, stable_changed
        );

        Ok(Registration {
            stable_changed,
            version: self.version,
            stable_version: self.stable_version,
        })
    }

    /// Drop every entry advertised by `rloc16`; returns whether anything was removed
    pub fn remove_rloc(&mut self, rloc16: u16) -> Result<bool, StoreError> {
        let base = self.owned_by(rloc16)?;
        if base.is_empty() {
            return Ok(false);
        }

        let stable_changed = requires_version_bump(&base, &[]);
        self.retain(|rloc| rloc != rloc16);
        self.bump_version(stable_changed);

        info!(
            "Removed network data rloc16={:#06x} version={} stable_version={}",
            rloc16, self.version, self.stable_version
        );
        Ok(true)
    }

    /// Current Commissioning Data, if any
    pub fn commissioning_data(&self) -> Option<CommissioningData<'_>> {
        self.commissioning
            .as_deref()
            .map(CommissioningData::new)
    }

    /// Replace the Commissioning Data sub-tree with `tlvs`
    pub fn set_commissioning_data(&mut self, tlvs: Bytes) -> Result<(), StoreError> {
        let mut next = self.clone();
        next.commissioning = Some(tlvs);
        let size = next.check_capacity()?;
        next.bump_version(false);
        *self = next;

        debug!(
            "Commissioning data replaced size={} version={}",
            size, self.version
        );
        Ok(())
    }

    fn encode(&self, stable_only: bool) -> Result<Bytes, StoreError> {
        let mut builder = TlvBuilder::new();
        for prefix in &self.prefixes {
            builder = prefix.encode(builder, stable_only);
        }
        for service in &self.services {
            builder = service.encode(builder, stable_only);
        }
        if let (Some(tlvs), false) = (&self.commissioning, stable_only) {
            builder = builder.network_data(NetworkDataType::CommissioningData, false, |b| {
                b.raw(tlvs)
            });
        }
        Ok(builder.build()?)
    }

    fn check_capacity(&self) -> Result<usize, StoreError> {
        let needed = self.to_bytes()?.len();
        if needed > MAX_NETWORK_DATA_SIZE {
            return Err(StoreError::NoBufs {
                needed,
                capacity: MAX_NETWORK_DATA_SIZE,
            });
        }
        Ok(needed)
    }

    fn bump_version(&mut self, stable_changed: bool) {
        self.version = self.version.wrapping_add(1);
        if stable_changed {
            self.stable_version = self.stable_version.wrapping_add(1);
        }
    }

    /// Keep only entries whose locator satisfies `keep`, dropping emptied containers
    fn retain(&mut self, keep: impl Fn(u16) -> bool) {
        for prefix in &mut self.prefixes {
            for sub in &mut prefix.sub_tlvs {
                sub.retain(&keep);
            }
            prefix.sub_tlvs.retain(|sub| !sub.is_empty());
        }
        self.prefixes.retain(|p| !p.sub_tlvs.is_empty());

        for service in &mut self.services {
            service.servers.retain(|s| keep(s.rloc16));
        }
        self.services.retain(|s| !s.servers.is_empty());
    }

    fn merge(&mut self, candidate: &[u8]) -> Result<(), StoreError> {
        for tlv in network_data_tlvs(candidate) {
            let tlv = tlv?;
            match tlv.kind() {
                Some(NetworkDataType::Prefix) => self.merge_prefix(&PrefixTlv::decode(&tlv)?)?,
                Some(NetworkDataType::Service) => {
                    self.merge_service(&ServiceTlv::decode(&tlv)?)?
                }
                _ => debug!("Not storing network data type={}", tlv.raw_kind()),
            }
        }
        Ok(())
    }

    fn merge_prefix(&mut self, prefix: &PrefixTlv<'_>) -> Result<(), StoreError> {
        let index = match self
            .prefixes
            .iter()
            .position(|p| {
                p.prefix_bits == prefix.prefix_bits
                    && prefix_matches(&p.prefix, prefix.prefix, prefix.prefix_bits)
            })
        {
            Some(index) => index,
            None => {
                self.prefixes.push(PrefixEntry {
                    domain_id: prefix.domain_id,
                    prefix_bits: prefix.prefix_bits,
                    prefix: prefix.prefix.to_vec(),
                    sub_tlvs: Vec::new(),
                });
                self.prefixes.len() - 1
            }
        };
        let entry = &mut self.prefixes[index];

        for sub in prefix.sub_tlvs() {
            let sub = sub?;
            match sub.kind() {
                Some(NetworkDataType::BorderRouter) => {
                    entry.add_border_router(sub.is_stable(), decode_border_router(sub.value())?)
                }
                Some(NetworkDataType::HasRoute) => {
                    entry.add_has_route(sub.is_stable(), decode_has_route(sub.value())?)
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn merge_service(&mut self, service: &ServiceTlv<'_>) -> Result<(), StoreError> {
        let existing = self.services.iter().position(|s| {
            s.enterprise_number == service.enterprise_number
                && s.service_data == service.service_data
        });
        let index = match existing {
            Some(index) => index,
            None => {
                let service_id = self.free_service_id().ok_or(StoreError::ServiceIdsExhausted)?;
                debug!("Allocated service_id={}", service_id);
                self.services.push(ServiceEntry {
                    service_id,
                    enterprise_number: service.enterprise_number,
                    service_data: service.service_data.to_vec(),
                    servers: Vec::new(),
                });
                self.services.len() - 1
            }
        };
        let entry = &mut self.services[index];

        for sub in service.sub_tlvs() {
            let sub = sub?;
            if sub.kind() != Some(NetworkDataType::Server) {
                continue;
            }
            let server = ServerTlv::decode(&sub)?;
            entry.servers.push(ServerEntry {
                stable: server.stable,
                rloc16: server.rloc16,
                server_data: server.server_data.to_vec(),
            });
        }
        Ok(())
    }

    fn free_service_id(&self) -> Option<u8> {
        (0..=MAX_SERVICE_ID).find(|id| self.services.iter().all(|s| s.service_id != *id))
    }
}
