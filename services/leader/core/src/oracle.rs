//! Node facts the leader logic asks for but does not own

use std::net::Ipv6Addr;

/// Answers whether this node currently holds the leader role
pub trait RoleOracle {
    /// Whether this node is the leader
    fn is_leader(&self) -> bool;
}

/// Maps a peer address to its routing locator
pub trait LocatorSource {
    /// RLOC16 of `peer`, or `None` when the address is not a routing locator
    fn locator(&self, peer: &Ipv6Addr) -> Option<u16>;
}

/// Role set by the embedding node
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FixedRole {
    leader: bool,
}

impl FixedRole {
    /// Create with the given role
    pub fn new(leader: bool) -> Self {
        Self { leader }
    }

    /// Change the role
    pub fn set_leader(&mut self, leader: bool) {
        self.leader = leader;
    }
}

impl RoleOracle for FixedRole {
    fn is_leader(&self) -> bool {
        self.leader
    }
}

const RLOC_IID_PREFIX: [u8; 6] = [0x00, 0x00, 0x00, 0xFF, 0xFE, 0x00];

/// Recognizes routing locator addresses by their `0000:00ff:fe00:xxxx` IID,
/// optionally only within one mesh-local /64
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RlocLocatorSource {
    mesh_local_prefix: Option<[u8; 8]>,
}

impl RlocLocatorSource {
    /// Accept RLOC IIDs under any prefix
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept RLOC IIDs under `prefix` only
    pub fn with_mesh_local_prefix(prefix: [u8; 8]) -> Self {
        Self {
            mesh_local_prefix: Some(prefix),
        }
    }
}

impl LocatorSource for RlocLocatorSource {
    fn locator(&self, peer: &Ipv6Addr) -> Option<u16> {
        let octets = peer.octets();
        if let Some(prefix) = self.mesh_local_prefix {
            if octets[..8] != prefix {
                return None;
            }
        }
        if octets[8..14] != RLOC_IID_PREFIX {
            return None;
        }
        Some(u16::from_be_bytes([octets[14], octets[15]]))
    }
}
