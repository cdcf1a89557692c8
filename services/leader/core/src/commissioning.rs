//! Commissioning Data updates.
//!
//! A commissioning-set batch replaces the Commissioning Data sub-tree, but only
//! for the commissioner holding the current session. The leader keeps the
//! Border Agent Locator it assigned; a batch may not carry one.

use crate::oracle::RoleOracle;
use bytes::Bytes;
use netdata_store::{NetworkData, StoreError};
use netdata_wire::{
    commissioner_session_id, EncodeError, MeshCopType, ParseError, StateTlv, TlvBuilder,
    TlvCursor, MAX_NETWORK_DATA_SIZE,
};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Why a commissioning-set batch was refused
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// Batch or resulting data exceeds the Network Data capacity
    #[error("Commissioning data too large")]
    TooLarge,
    /// This node is not the leader; no response is sent
    #[error("Not leader")]
    NotLeader,
    /// Batch tries to set the Border Agent Locator
    #[error("Border agent locator may not be set")]
    LocatorNotAllowed,
    /// Session id missing, malformed or not the active session
    #[error("Session id mismatch")]
    SessionMismatch,
    /// Neither steering data nor a joiner UDP port in the batch
    #[error("No steering data or joiner UDP port")]
    NoValidTlv,
    /// Batch does not parse
    #[error("Malformed batch: {0}")]
    Malformed(#[from] ParseError),
}

impl RejectReason {
    /// Whether the request goes unanswered
    pub fn is_elided(&self) -> bool {
        matches!(self, RejectReason::NotLeader)
    }
}

/// Apply a commissioning-set batch to the store.
///
/// `session_id_known` is the active commissioner session, if any. On any
/// rejection the store is left untouched.
pub fn apply_commissioning_set(
    store: &mut NetworkData,
    role: &impl RoleOracle,
    batch: &[u8],
    session_id_known: Option<u16>,
) -> Result<StateTlv, RejectReason> {
    if batch.len() > MAX_NETWORK_DATA_SIZE {
        return Err(RejectReason::TooLarge);
    }
    if !role.is_leader() {
        return Err(RejectReason::NotLeader);
    }

    let mut session_id = None;
    let mut has_valid_tlv = false;

    for tlv in TlvCursor::new(batch) {
        let tlv = tlv?;
        match MeshCopType::of(&tlv) {
            Some(MeshCopType::BorderAgentLocator) => return Err(RejectReason::LocatorNotAllowed),
            Some(MeshCopType::CommissionerSessionId) => {
                session_id = Some(commissioner_session_id(&tlv));
            }
            Some(MeshCopType::SteeringData) | Some(MeshCopType::JoinerUdpPort) => {
                has_valid_tlv = true;
            }
            _ => debug!("Commissioning set carries type={}", tlv.typ()),
        }
    }

    match (session_id, session_id_known) {
        (Some(Ok(got)), Some(known)) if got == known => {}
        (got, known) => {
            warn!(
                "Commissioning set session mismatch got={:?} active={:?}",
                got, known
            );
            return Err(RejectReason::SessionMismatch);
        }
    }
    if !has_valid_tlv {
        return Err(RejectReason::NoValidTlv);
    }

    let locator = store
        .commissioning_data()
        .and_then(|data| data.border_agent_locator().ok().flatten());
    let mut builder = TlvBuilder::new().raw(batch);
    if let Some(locator) = locator {
        builder = builder.border_agent_locator(locator);
    }
    let merged = builder.build().map_err(|_| RejectReason::TooLarge)?;

    store.set_commissioning_data(merged).map_err(|err| {
        warn!("Commissioning set does not fit: {}", err);
        RejectReason::TooLarge
    })?;

    info!(
        "Commissioning data updated version={} locator={:?}",
        store.version(),
        locator
    );
    Ok(StateTlv::accept())
}

/// Commissioning Data written when a petition is accepted
pub fn petition_commissioning_data(
    border_agent_locator: u16,
    session_id: u16,
) -> Result<Bytes, EncodeError> {
    TlvBuilder::new()
        .border_agent_locator(border_agent_locator)
        .session_id(session_id)
        .steering_data(&[0x00])
        .build()
}

/// Commissioning Data left behind after a commissioner resigns
pub fn resigned_commissioning_data(session_id: u16) -> Result<Bytes, EncodeError> {
    TlvBuilder::new().session_id(session_id).build()
}

/// Copy of `tlvs` with the Border Agent Locator set to `locator`
pub fn with_border_agent_locator(tlvs: &[u8], locator: u16) -> Result<Bytes, StoreError> {
    let mut builder = TlvBuilder::new().border_agent_locator(locator);
    for tlv in TlvCursor::new(tlvs) {
        let tlv = tlv?;
        if MeshCopType::of(&tlv) != Some(MeshCopType::BorderAgentLocator) {
            builder = builder.tlv(tlv.typ(), tlv.value());
        }
    }
    Ok(builder.build()?)
}
