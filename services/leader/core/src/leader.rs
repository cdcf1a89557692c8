//! Request dispatch for the leader.
//!
//! [`Leader`] owns the Network Data and the commissioner session and turns
//! each inbound request into a [`Response`]. Handlers run to completion; the
//! only timed state is the session expiry, surfaced through
//! [`Leader::next_deadline`] and driven by [`Leader::handle_timer`].

use crate::commissioning::{
    apply_commissioning_set, petition_commissioning_data, resigned_commissioning_data,
    with_border_agent_locator,
};
use crate::oracle::{LocatorSource, RoleOracle};
use crate::request::{Request, RequestKind, Response};
use crate::session::CommissionerSession;
use netdata_store::{NetworkData, Snapshot, StoreError};
use netdata_wire::{
    commissioner_id, commissioner_session_id, MeshCopType, State, StateTlv, Tlv, TlvBuilder,
    TlvCursor,
};
use std::net::Ipv6Addr;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Leader state and collaborators
#[derive(Debug)]
pub struct Leader<R, L> {
    store: NetworkData,
    session: CommissionerSession,
    role: R,
    locator: L,
}

impl<R: RoleOracle, L: LocatorSource> Leader<R, L> {
    /// Create a leader over existing state
    pub fn new(store: NetworkData, session: CommissionerSession, role: R, locator: L) -> Self {
        Self {
            store,
            session,
            role,
            locator,
        }
    }

    /// Network Data
    pub fn store(&self) -> &NetworkData {
        &self.store
    }

    /// Commissioner session
    pub fn session(&self) -> &CommissionerSession {
        &self.session
    }

    /// Role oracle
    pub fn role_mut(&mut self) -> &mut R {
        &mut self.role
    }

    /// Handle one request from `peer`
    pub fn handle(&mut self, request: &Request, peer: &Ipv6Addr, now: Instant) -> Response {
        debug!(
            "Leader request kind={:?} peer={} len={}",
            request.kind,
            peer,
            request.payload.len()
        );

        // A lapsed session must not authorize anything, even before the timer fires
        self.handle_timer(now);

        if request.kind == RequestKind::CommissioningSet {
            return self.handle_commissioning_set(&request.payload);
        }
        if !self.role.is_leader() {
            debug!("Not leader, ignoring {:?}", request.kind);
            return Response::elided();
        }

        match request.kind {
            RequestKind::Petition => self.handle_petition(&request.payload, peer, now),
            RequestKind::KeepAlive => self.handle_keep_alive(&request.payload, peer, now),
            RequestKind::Resign => self.handle_resign(&request.payload),
            RequestKind::CommissioningGet => self.handle_commissioning_get(&request.payload),
            RequestKind::ServerData => self.handle_server_data(&request.payload, peer),
            RequestKind::CommissioningSet => Response::elided(),
        }
    }

    /// Expire the session if due; returns whether it expired
    pub fn handle_timer(&mut self, now: Instant) -> bool {
        // Commissioning Data stays in place until replaced
        self.session.expire(now).is_some()
    }

    /// When [`Leader::handle_timer`] next needs to run
    pub fn next_deadline(&self) -> Option<Instant> {
        self.session.deadline()
    }

    /// Drop the Network Data of a router that left the partition
    pub fn handle_router_removed(&mut self, rloc16: u16) -> Option<Snapshot> {
        match self.store.remove_rloc(rloc16) {
            Ok(true) => self.snapshot(),
            Ok(false) => None,
            Err(err) => {
                warn!("Failed to remove rloc16={:#06x}: {}", rloc16, err);
                None
            }
        }
    }

    fn handle_petition(&mut self, payload: &[u8], peer: &Ipv6Addr, now: Instant) -> Response {
        let Some(rloc16) = self.locator.locator(peer) else {
            warn!("Petition from non-RLOC peer {}", peer);
            return Response::state(State::Reject);
        };
        let id = match find(payload, MeshCopType::CommissionerId)
            .and_then(|tlv| commissioner_id(&tlv).ok())
        {
            Some(id) => id,
            None => {
                warn!("Petition without a valid commissioner id");
                return Response::state(State::Reject);
            }
        };

        if let Err(err) = self.session.can_petition(id) {
            warn!("Petition rejected: {}", err);
            return Response::state(State::Reject);
        }

        let session_id = self.session.next_session_id();
        let committed = petition_commissioning_data(rloc16, session_id)
            .map_err(StoreError::from)
            .and_then(|data| self.store.set_commissioning_data(data));
        if let Err(err) = committed {
            warn!("Petition rejected, commissioning data not written: {}", err);
            return Response::state(State::Reject);
        }

        match self.session.petition(id, now) {
            Ok(granted) => {
                info!(
                    "Petition accepted session_id={} border_agent={:#06x}",
                    granted, rloc16
                );
                Response::with_state(
                    State::Accept,
                    TlvBuilder::new().session_id(granted).commissioner_id(id),
                )
                .with_snapshot(self.snapshot())
            }
            Err(err) => {
                warn!("Petition rejected: {}", err);
                Response::state(State::Reject)
            }
        }
    }

    fn handle_keep_alive(&mut self, payload: &[u8], peer: &Ipv6Addr, now: Instant) -> Response {
        let state = find(payload, MeshCopType::State).and_then(|tlv| StateTlv::decode(&tlv).ok());
        let session_id = find(payload, MeshCopType::CommissionerSessionId)
            .and_then(|tlv| commissioner_session_id(&tlv).ok());
        let (Some(state), Some(session_id)) = (state, session_id) else {
            debug!("Keep-alive without state or session id");
            return Response::elided();
        };

        if self.session.session_id() != Some(session_id) {
            warn!(
                "Keep-alive for session_id={} active={:?}",
                session_id,
                self.session.session_id()
            );
            return Response::state(State::Reject);
        }

        if state.state != State::Accept {
            return self.resign(session_id, State::Reject);
        }

        let Some(rloc16) = self.locator.locator(peer) else {
            warn!("Keep-alive from non-RLOC peer {}", peer);
            return Response::state(State::Reject);
        };
        if let Err(err) = self.refresh_locator(rloc16) {
            warn!("Keep-alive could not update border agent: {}", err);
            return Response::state(State::Reject);
        }
        if let Err(err) = self.session.keep_alive(session_id, now) {
            warn!("Keep-alive rejected: {}", err);
            return Response::state(State::Reject);
        }

        debug!("Keep-alive session_id={}", session_id);
        Response::state(State::Accept).with_snapshot(self.snapshot())
    }

    fn handle_resign(&mut self, payload: &[u8]) -> Response {
        match find(payload, MeshCopType::CommissionerSessionId)
            .and_then(|tlv| commissioner_session_id(&tlv).ok())
        {
            Some(session_id) if self.session.session_id() == Some(session_id) => {
                self.resign(session_id, State::Accept)
            }
            other => {
                warn!("Resign for unknown session {:?}", other);
                Response::state(State::Reject)
            }
        }
    }

    fn handle_commissioning_set(&mut self, payload: &[u8]) -> Response {
        let result = apply_commissioning_set(
            &mut self.store,
            &self.role,
            payload,
            self.session.session_id(),
        );

        // Role may have changed while handling
        if !self.role.is_leader() {
            return Response::elided();
        }

        match result {
            Ok(state) => Response::state(state.state).with_snapshot(self.snapshot()),
            Err(reason) if reason.is_elided() => Response::elided(),
            Err(reason) => {
                warn!("Commissioning set rejected: {}", reason);
                Response::state(State::Reject)
            }
        }
    }

    fn handle_commissioning_get(&self, payload: &[u8]) -> Response {
        let data = match self.store.commissioning_data() {
            Some(data) => data.tlvs(),
            None => &[][..],
        };

        let wanted = match TlvCursor::find(payload, MeshCopType::Get as u8) {
            Ok(wanted) => wanted.map(|tlv| tlv.value()),
            Err(err) => {
                debug!("Malformed commissioning get: {}", err);
                return Response::elided();
            }
        };

        let mut body = TlvBuilder::new();
        for tlv in TlvCursor::new(data) {
            let Ok(tlv) = tlv else { break };
            if wanted.map_or(true, |types| types.contains(&tlv.typ())) {
                body = body.tlv(tlv.typ(), tlv.value());
            }
        }
        Response::body(None, body)
    }

    fn handle_server_data(&mut self, payload: &[u8], peer: &Ipv6Addr) -> Response {
        let Some(rloc16) = self.locator.locator(peer) else {
            warn!("Server data from non-RLOC peer {}", peer);
            return Response::state(State::Reject);
        };

        match self.store.register(rloc16, payload) {
            Ok(_) => Response::state(State::Accept).with_snapshot(self.snapshot()),
            Err(err) => {
                warn!("Server data from rloc16={:#06x} rejected: {}", rloc16, err);
                Response::state(State::Reject)
            }
        }
    }

    fn resign(&mut self, session_id: u16, reply: State) -> Response {
        if let Err(err) = self.session.resign(session_id) {
            warn!("Resign failed: {}", err);
            return Response::state(State::Reject);
        }
        let written = resigned_commissioning_data(session_id)
            .map_err(StoreError::from)
            .and_then(|data| self.store.set_commissioning_data(data));
        if let Err(err) = written {
            warn!("Commissioning data not cleared: {}", err);
        }
        Response::state(reply).with_snapshot(self.snapshot())
    }

    fn refresh_locator(&mut self, rloc16: u16) -> Result<(), StoreError> {
        let Some(data) = self.store.commissioning_data() else {
            return Ok(());
        };
        if data.border_agent_locator()? == Some(rloc16) {
            return Ok(());
        }
        let updated = with_border_agent_locator(data.tlvs(), rloc16)?;
        info!("Border agent moved to rloc16={:#06x}", rloc16);
        self.store.set_commissioning_data(updated)
    }

    fn snapshot(&self) -> Option<Snapshot> {
        match self.store.snapshot() {
            Ok(snapshot) => Some(snapshot),
            Err(err) => {
                warn!("Failed to snapshot network data: {}", err);
                None
            }
        }
    }
}

fn find(payload: &[u8], typ: MeshCopType) -> Option<Tlv<'_>> {
    TlvCursor::find(payload, typ as u8).ok().flatten()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::{FixedRole, RlocLocatorSource};
    use crate::session::PETITION_TIMEOUT;
    use bytes::Bytes;
    use netdata_wire::{HasRouteEntry, ParseError};
    use std::time::Duration;

    const SEED: u16 = 0x00FF;

    fn leader() -> Leader<FixedRole, RlocLocatorSource> {
        Leader::new(
            NetworkData::with_versions(0, 0),
            CommissionerSession::with_session_seed(PETITION_TIMEOUT, SEED),
            FixedRole::new(true),
            RlocLocatorSource::new(),
        )
    }

    fn rloc_peer(rloc16: u16) -> Ipv6Addr {
        Ipv6Addr::new(0xFD00, 0x0DB8, 0, 0, 0, 0x00FF, 0xFE00, rloc16)
    }

    fn request(kind: RequestKind, body: TlvBuilder) -> Request {
        Request::new(kind, body.build().unwrap())
    }

    fn petition(id: &[u8]) -> Request {
        request(RequestKind::Petition, TlvBuilder::new().commissioner_id(id))
    }

    fn keep_alive(state: State, session_id: u16) -> Request {
        request(
            RequestKind::KeepAlive,
            TlvBuilder::new().state(state).session_id(session_id),
        )
    }

    fn state_of(response: &Response) -> Option<State> {
        response.state
    }

    #[test]
    fn test_petition_writes_commissioning_data() {
        let mut leader = leader();
        let now = Instant::now();

        let response = leader.handle(&petition(b"comm"), &rloc_peer(0x0400), now);
        assert_eq!(state_of(&response), Some(State::Accept));
        assert_eq!(
            response.body.as_deref(),
            Some(&[16, 1, 0x01, 11, 2, 0x01, 0x00, 10, 4, b'c', b'o', b'm', b'm'][..])
        );
        assert_eq!(response.snapshot.unwrap().version, 1);

        let data = leader.store().commissioning_data().unwrap();
        assert_eq!(data.border_agent_locator(), Ok(Some(0x0400)));
        assert_eq!(data.session_id(), Ok(Some(SEED + 1)));
        assert_eq!(data.steering_data(), Ok(Some(&[0x00][..])));
        assert_eq!(leader.next_deadline(), Some(now + PETITION_TIMEOUT));
    }

    #[test]
    fn test_petition_rejections() {
        let mut leader = leader();
        let now = Instant::now();
        let eid: Ipv6Addr = "fd00:db8::1".parse().unwrap();

        let response = leader.handle(&petition(b"comm"), &eid, now);
        assert_eq!(state_of(&response), Some(State::Reject));

        let response = leader.handle(
            &request(RequestKind::Petition, TlvBuilder::new()),
            &rloc_peer(0x0400),
            now,
        );
        assert_eq!(state_of(&response), Some(State::Reject));

        leader.handle(&petition(b"first"), &rloc_peer(0x0400), now);
        let response = leader.handle(&petition(b"second"), &rloc_peer(0x0800), now);
        assert_eq!(state_of(&response), Some(State::Reject));
        assert_eq!(
            leader.session().active().unwrap().commissioner_id.as_ref(),
            b"first"
        );
        assert_eq!(
            leader.store().commissioning_data().unwrap().border_agent_locator(),
            Ok(Some(0x0400))
        );
    }

    #[test]
    fn test_not_leader_is_silent() {
        let mut leader = leader();
        leader.role_mut().set_leader(false);
        let response = leader.handle(&petition(b"comm"), &rloc_peer(0x0400), Instant::now());
        assert!(response.is_elided());
        assert!(leader.session().active().is_none());
    }

    #[test]
    fn test_commissioning_set_bound_to_session() {
        let mut leader = leader();
        let now = Instant::now();
        leader.handle(&petition(b"comm"), &rloc_peer(0x0400), now);
        let session_id = leader.session().session_id().unwrap();

        let set = |session: u16| {
            request(
                RequestKind::CommissioningSet,
                TlvBuilder::new().session_id(session).steering_data(&[0xFF]),
            )
        };

        let response = leader.handle(&set(session_id + 1), &rloc_peer(0x0400), now);
        assert_eq!(state_of(&response), Some(State::Reject));

        let response = leader.handle(&set(session_id), &rloc_peer(0x0400), now);
        assert_eq!(state_of(&response), Some(State::Accept));
        assert!(response.snapshot.is_some());
        let data = leader.store().commissioning_data().unwrap();
        assert_eq!(data.steering_data(), Ok(Some(&[0xFF][..])));
        assert_eq!(data.border_agent_locator(), Ok(Some(0x0400)));
    }

    #[test]
    fn test_commissioning_set_with_locator_only() {
        let mut leader = leader();
        let now = Instant::now();
        leader.handle(&petition(b"comm"), &rloc_peer(0x0400), now);

        let response = leader.handle(
            &request(
                RequestKind::CommissioningSet,
                TlvBuilder::new().border_agent_locator(1),
            ),
            &rloc_peer(0x0400),
            now,
        );
        assert_eq!(response.body.as_deref(), Some(&[16, 1, 0xFF][..]));
        assert!(response.snapshot.is_none());
    }

    #[test]
    fn test_commissioning_set_without_leader_role() {
        let mut leader = leader();
        leader.role_mut().set_leader(false);
        let response = leader.handle(
            &request(RequestKind::CommissioningSet, TlvBuilder::new().session_id(1)),
            &rloc_peer(0x0400),
            Instant::now(),
        );
        assert!(response.is_elided());
    }

    #[tokio::test(start_paused = true)]
    async fn test_lapsed_session_refused_before_timer_runs() {
        let mut leader = leader();
        leader.handle(&petition(b"comm"), &rloc_peer(0x0400), Instant::now());
        let session_id = leader.session().session_id().unwrap();

        tokio::time::advance(Duration::from_secs(110)).await;

        let set = request(
            RequestKind::CommissioningSet,
            TlvBuilder::new().session_id(session_id).steering_data(&[1]),
        );
        let response = leader.handle(&set, &rloc_peer(0x0400), Instant::now());
        assert_eq!(state_of(&response), Some(State::Reject));
        assert_eq!(leader.next_deadline(), None);

        let response = leader.handle(&petition(b"other"), &rloc_peer(0x0800), Instant::now());
        assert_eq!(state_of(&response), Some(State::Accept));
        assert_eq!(
            leader.session().active().unwrap().commissioner_id.as_ref(),
            b"other"
        );
    }

    #[test]
    fn test_keep_alive_moves_border_agent() {
        let mut leader = leader();
        let now = Instant::now();
        leader.handle(&petition(b"comm"), &rloc_peer(0x0400), now);
        let session_id = leader.session().session_id().unwrap();
        let version = leader.store().version();

        let later = now + Duration::from_secs(30);
        let response = leader.handle(&keep_alive(State::Accept, session_id), &rloc_peer(0x0800), later);
        assert_eq!(state_of(&response), Some(State::Accept));
        assert_eq!(leader.next_deadline(), Some(later + PETITION_TIMEOUT));
        assert_eq!(leader.store().version(), version.wrapping_add(1));
        assert_eq!(
            leader.store().commissioning_data().unwrap().border_agent_locator(),
            Ok(Some(0x0800))
        );

        // Same locator, no version change
        leader.handle(&keep_alive(State::Accept, session_id), &rloc_peer(0x0800), later);
        assert_eq!(leader.store().version(), version.wrapping_add(1));
    }

    #[test]
    fn test_keep_alive_rejections() {
        let mut leader = leader();
        let now = Instant::now();
        leader.handle(&petition(b"comm"), &rloc_peer(0x0400), now);
        let session_id = leader.session().session_id().unwrap();

        let response = leader.handle(&keep_alive(State::Accept, session_id ^ 1), &rloc_peer(0x0400), now);
        assert_eq!(state_of(&response), Some(State::Reject));

        let missing = request(RequestKind::KeepAlive, TlvBuilder::new().session_id(session_id));
        assert!(leader.handle(&missing, &rloc_peer(0x0400), now).is_elided());

        // Non-accept state resigns
        let response = leader.handle(&keep_alive(State::Reject, session_id), &rloc_peer(0x0400), now);
        assert_eq!(state_of(&response), Some(State::Reject));
        assert!(leader.session().active().is_none());
        assert_eq!(
            leader.store().commissioning_data().unwrap().tlvs(),
            &[11, 2, 0x01, 0x00][..]
        );
    }

    #[test]
    fn test_explicit_resign_clears_commissioning_data() {
        let mut leader = leader();
        let now = Instant::now();
        leader.handle(&petition(b"comm"), &rloc_peer(0x0400), now);
        let session_id = leader.session().session_id().unwrap();

        let resign = |id: u16| request(RequestKind::Resign, TlvBuilder::new().session_id(id));
        let response = leader.handle(&resign(session_id ^ 1), &rloc_peer(0x0400), now);
        assert_eq!(state_of(&response), Some(State::Reject));

        let response = leader.handle(&resign(session_id), &rloc_peer(0x0400), now);
        assert_eq!(state_of(&response), Some(State::Accept));
        let data = leader.store().commissioning_data().unwrap();
        assert_eq!(data.session_id(), Ok(Some(session_id)));
        assert_eq!(data.border_agent_locator(), Ok(None));
        assert_eq!(data.steering_data(), Ok(None));

        // A different commissioner may now petition
        let response = leader.handle(&petition(b"other"), &rloc_peer(0x0C00), now);
        assert_eq!(state_of(&response), Some(State::Accept));
        assert_eq!(leader.session().session_id(), Some(session_id + 1));
    }

    #[test]
    fn test_commissioning_get_filters_types() {
        let mut leader = leader();
        let now = Instant::now();
        leader.handle(&petition(b"comm"), &rloc_peer(0x0400), now);

        let all = leader.handle(
            &request(RequestKind::CommissioningGet, TlvBuilder::new()),
            &rloc_peer(0x0400),
            now,
        );
        assert_eq!(
            all.body.as_deref(),
            Some(&[9, 2, 0x04, 0x00, 11, 2, 0x01, 0x00, 8, 1, 0x00][..])
        );

        let wanted = TlvBuilder::new().meshcop(MeshCopType::Get, &[MeshCopType::SteeringData as u8]);
        let some = leader.handle(
            &request(RequestKind::CommissioningGet, wanted),
            &rloc_peer(0x0400),
            now,
        );
        assert_eq!(some.body.as_deref(), Some(&[8, 1, 0x00][..]));
        assert_eq!(some.state, None);
    }

    #[test]
    fn test_server_data_registration() {
        let mut leader = leader();
        let now = Instant::now();
        let batch = TlvBuilder::new().prefix(true, 0, &[0xFD, 0x00], 16, |b| {
            b.has_route(true, &[HasRouteEntry { rloc16: 0x0800, flags: 0 }])
        });
        let registration = Request::new(RequestKind::ServerData, batch.build().unwrap());

        let response = leader.handle(&registration, &rloc_peer(0x0800), now);
        assert_eq!(state_of(&response), Some(State::Accept));
        let snapshot = response.snapshot.unwrap();
        assert_eq!((snapshot.version, snapshot.stable_version), (1, 1));

        // Same batch from another router fails ownership
        let response = leader.handle(&registration, &rloc_peer(0x0C00), now);
        assert_eq!(state_of(&response), Some(State::Reject));
        assert!(response.snapshot.is_none());

        let snapshot = leader.handle_router_removed(0x0800).unwrap();
        assert_eq!((snapshot.version, snapshot.stable_version), (2, 2));
        assert!(snapshot.tlvs.is_empty());
        assert!(leader.handle_router_removed(0x0800).is_none());
    }

    #[test]
    fn test_malformed_server_data() {
        let mut leader = leader();
        let registration = Request::new(RequestKind::ServerData, Bytes::from_static(&[0x03, 0x09]));
        let response = leader.handle(&registration, &rloc_peer(0x0800), Instant::now());
        assert_eq!(state_of(&response), Some(State::Reject));
        assert_eq!(
            netdata_store::validate(&registration.payload, 0x0800),
            Err(netdata_store::ValidationError::Parse(ParseError::Malformed))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_expires_but_data_remains() {
        let mut leader = leader();
        leader.handle(&petition(b"comm"), &rloc_peer(0x0400), Instant::now());
        let session_id = leader.session().session_id().unwrap();

        tokio::time::advance(Duration::from_secs(49)).await;
        assert!(!leader.handle_timer(Instant::now()));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(leader.handle_timer(Instant::now()));
        assert_eq!(leader.next_deadline(), None);

        // Data merged during the session survives
        let data = leader.store().commissioning_data().unwrap();
        assert_eq!(data.session_id(), Ok(Some(session_id)));
        assert_eq!(data.border_agent_locator(), Ok(Some(0x0400)));

        // But the session no longer authorizes updates
        let set = request(
            RequestKind::CommissioningSet,
            TlvBuilder::new().session_id(session_id).steering_data(&[1]),
        );
        let response = leader.handle(&set, &rloc_peer(0x0400), Instant::now());
        assert_eq!(state_of(&response), Some(State::Reject));

        let response = leader.handle(&petition(b"other"), &rloc_peer(0x0800), Instant::now());
        assert_eq!(state_of(&response), Some(State::Accept));
    }

    #[test]
    fn test_petition_rejected_when_data_does_not_fit() {
        let mut leader = leader();
        let now = Instant::now();
        let big = TlvBuilder::new().service(true, 0, 1, &[0xAA; 230], |b| b.server(true, 0x0800, &[]));
        leader.handle(
            &Request::new(RequestKind::ServerData, big.build().unwrap()),
            &rloc_peer(0x0800),
            now,
        );
        let version = leader.store().version();

        let response = leader.handle(&petition(b"comm"), &rloc_peer(0x0400), now);
        assert_eq!(state_of(&response), Some(State::Reject));
        assert!(leader.session().active().is_none());
        assert_eq!(leader.session().next_session_id(), SEED + 1);
        assert_eq!(leader.store().version(), version);
    }
}
