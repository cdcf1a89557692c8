//! Commissioner session arbitration.
//!
//! At most one commissioner is active at a time. A petition from the active
//! commissioner's own id replaces its session with a fresh session id; a
//! petition under any other id is refused and the active session is left
//! alone. Sessions end on explicit resign or when the petition timeout runs
//! out without a keep-alive.

use bytes::Bytes;
use netdata_wire::MAX_COMMISSIONER_ID_LENGTH;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::info;

/// Lifetime of a session without keep-alives
pub const PETITION_TIMEOUT: Duration = Duration::from_secs(50);

/// Session errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Another commissioner holds the session
    #[error("Commissioner mismatch")]
    CommissionerMismatch,
    /// No session is active
    #[error("No active session")]
    NoActiveSession,
    /// Session id does not match the active session
    #[error("Session id mismatch: active {active}, got {got}")]
    SessionIdMismatch {
        /// Active session id
        active: u16,
        /// Id carried by the request
        got: u16,
    },
    /// Commissioner id is empty or too long
    #[error("Invalid commissioner id length {0}")]
    InvalidCommissionerId(usize),
}

/// The active commissioner
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveSession {
    /// Commissioner identity
    pub commissioner_id: Bytes,
    /// Session id handed out on petition
    pub session_id: u16,
    /// When the session lapses without a keep-alive
    pub expiry: Instant,
}

/// Session state
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SessionState {
    /// No commissioner
    #[default]
    Idle,
    /// One commissioner holds the session
    Active(ActiveSession),
}

/// Commissioner session state machine
#[derive(Debug, Clone)]
pub struct CommissionerSession {
    state: SessionState,
    last_session_id: u16,
    timeout: Duration,
}

impl CommissionerSession {
    /// Idle session with a random session id seed
    pub fn new(timeout: Duration) -> Self {
        Self::with_session_seed(timeout, rand::random())
    }

    /// Idle session whose first petition is granted `seed + 1`
    pub fn with_session_seed(timeout: Duration, seed: u16) -> Self {
        Self {
            state: SessionState::Idle,
            last_session_id: seed,
            timeout,
        }
    }

    /// Current state
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Active session, if any
    pub fn active(&self) -> Option<&ActiveSession> {
        match &self.state {
            SessionState::Active(session) => Some(session),
            SessionState::Idle => None,
        }
    }

    /// Id of the active session, if any
    pub fn session_id(&self) -> Option<u16> {
        self.active().map(|s| s.session_id)
    }

    /// Expiry of the active session, if any
    pub fn deadline(&self) -> Option<Instant> {
        self.active().map(|s| s.expiry)
    }

    /// Session id the next accepted petition will get
    pub fn next_session_id(&self) -> u16 {
        self.last_session_id.wrapping_add(1)
    }

    /// Check whether `commissioner_id` may petition now, without changing state
    pub fn can_petition(&self, commissioner_id: &[u8]) -> Result<(), SessionError> {
        if commissioner_id.is_empty() || commissioner_id.len() > MAX_COMMISSIONER_ID_LENGTH {
            return Err(SessionError::InvalidCommissionerId(commissioner_id.len()));
        }
        match self.active() {
            Some(active) if active.commissioner_id != commissioner_id => {
                Err(SessionError::CommissionerMismatch)
            }
            _ => Ok(()),
        }
    }

    /// Grant a session to `commissioner_id`; returns the new session id
    pub fn petition(&mut self, commissioner_id: &[u8], now: Instant) -> Result<u16, SessionError> {
        self.can_petition(commissioner_id)?;

        if let Some(previous) = self.active() {
            info!(
                "Commissioner re-petitioned, resigning session_id={}",
                previous.session_id
            );
        }

        self.last_session_id = self.next_session_id();
        self.state = SessionState::Active(ActiveSession {
            commissioner_id: Bytes::copy_from_slice(commissioner_id),
            session_id: self.last_session_id,
            expiry: now + self.timeout,
        });

        info!(
            "Commissioner session started session_id={} timeout={:?}",
            self.last_session_id, self.timeout
        );
        Ok(self.last_session_id)
    }

    /// Re-arm the expiry of session `session_id`
    pub fn keep_alive(&mut self, session_id: u16, now: Instant) -> Result<(), SessionError> {
        let timeout = self.timeout;
        let active = self.matching_mut(session_id)?;
        active.expiry = now + timeout;
        Ok(())
    }

    /// End session `session_id` at the commissioner's request
    pub fn resign(&mut self, session_id: u16) -> Result<ActiveSession, SessionError> {
        self.matching_mut(session_id)?;
        let previous = std::mem::take(&mut self.state);
        info!("Commissioner resigned session_id={}", session_id);
        match previous {
            SessionState::Active(session) => Ok(session),
            SessionState::Idle => Err(SessionError::NoActiveSession),
        }
    }

    /// End the session if its expiry has passed; returns the expired session
    pub fn expire(&mut self, now: Instant) -> Option<ActiveSession> {
        match &self.state {
            SessionState::Active(active) if active.expiry <= now => {}
            _ => return None,
        }
        match std::mem::take(&mut self.state) {
            SessionState::Active(session) => {
                info!("Commissioner session expired session_id={}", session.session_id);
                Some(session)
            }
            SessionState::Idle => None,
        }
    }

    fn matching_mut(&mut self, session_id: u16) -> Result<&mut ActiveSession, SessionError> {
        match &self.state {
            SessionState::Active(active) if active.session_id == session_id => {}
            SessionState::Active(active) => {
                return Err(SessionError::SessionIdMismatch {
                    active: active.session_id,
                    got: session_id,
                })
            }
            SessionState::Idle => return Err(SessionError::NoActiveSession),
        }
        match &mut self.state {
            SessionState::Active(active) => Ok(active),
            SessionState::Idle => Err(SessionError::NoActiveSession),
        }
    }
}

impl Default for CommissionerSession {
    fn default() -> Self {
        Self::new(PETITION_TIMEOUT)
    }
}
