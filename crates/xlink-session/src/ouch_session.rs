//! NASDAQ OUCH session state machine (spec.md §4.F): a `LoginRequest` /
//! `LoginAccepted`/`LoginRejected` handshake and strictly monotonic
//! sequencing — unlike FIX, any inconsistency here is fatal, there is no
//! gap recovery.

use crate::error::SessionError;
use crate::state::SessionState;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use xlink_core::{Clock, SessionId};
use xlink_metrics::SessionMetrics;
use xlink_protocol::ouch::{LoginAccepted, LoginRejected};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OuchAction {
    SendLoginRequest,
    Dispatch,
    CloseSocket,
}

pub struct OuchSessionConfig {
    pub session_id: SessionId,
    pub username: String,
    pub password: String,
    pub session: String,
}

/// One OUCH session's mutable state: sequence is monotonic and
/// self-assigned by the initiator, so there is just one counter, not a
/// paired outbound/inbound like FIX.
pub struct OuchSession {
    config: OuchSessionConfig,
    clock: Arc<dyn Clock>,
    state: SessionState,
    next_seq: u64,
    last_inbound_at: Option<DateTime<Utc>>,
    pub metrics: SessionMetrics,
}

impl OuchSession {
    pub fn new(config: OuchSessionConfig, clock: Arc<dyn Clock>) -> Self {
        OuchSession {
            config,
            clock,
            state: SessionState::Disconnected,
            next_seq: 1,
            last_inbound_at: None,
            metrics: SessionMetrics::default(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    fn illegal(&self, attempted: &'static str) -> SessionError {
        SessionError::IllegalTransition {
            name: self.config.session_id.as_str().to_string(),
            from: self.state.as_str(),
            attempted,
        }
    }

    pub fn connect(&mut self) -> Result<(), SessionError> {
        if self.state != SessionState::Disconnected {
            return Err(self.illegal("connect"));
        }
        self.state = SessionState::Connecting;
        Ok(())
    }

    pub fn on_connected(&mut self) -> Result<OuchAction, SessionError> {
        if self.state != SessionState::Connecting {
            return Err(self.illegal("on_connected"));
        }
        self.state = SessionState::Connected;
        Ok(OuchAction::SendLoginRequest)
    }

    /// Consumes the `LoginAccepted`/`LoginRejected` reply to the
    /// `LoginRequest` sent on connect.
    pub fn on_login_reply(&mut self, msg_type: u8, data: &mut [u8]) -> Result<OuchAction, SessionError> {
        if self.state != SessionState::Connected {
            return Err(self.illegal("on_login_reply"));
        }
        match msg_type {
            b'A' => {
                LoginAccepted::wrap_for_reading(data)?;
                self.state = SessionState::LoggedOn;
                Ok(OuchAction::Dispatch)
            }
            b'J' => {
                let rejected = LoginRejected::wrap_for_reading(data)?;
                Err(SessionError::LogonRejected {
                    reason: format!("OUCH login rejected, code {}", rejected.reason()?),
                })
            }
            other => Err(self.illegal_for_code(other)),
        }
    }

    fn illegal_for_code(&self, _code: u8) -> SessionError {
        self.illegal("on_login_reply: unexpected message type")
    }

    /// Any in-sequence message after logon. OUCH has no gap recovery:
    /// any seq other than `next_seq` is immediately fatal.
    pub fn on_inbound(&mut self, seq: u64) -> Result<OuchAction, SessionError> {
        if self.state != SessionState::LoggedOn {
            return Err(self.illegal("on_inbound"));
        }
        self.last_inbound_at = Some(self.clock.now_utc());
        self.metrics.messages_received.incr();
        if seq != self.next_seq {
            return Err(SessionError::SequenceTooLow {
                expected: self.next_seq,
                received: seq,
            });
        }
        self.next_seq += 1;
        Ok(OuchAction::Dispatch)
    }

    pub fn next_outbound_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.metrics.messages_sent.incr();
        seq
    }

    pub fn on_disconnect(&mut self) {
        self.state = SessionState::Disconnected;
        self.metrics.disconnects.incr();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use xlink_core::clock::TestClock;
    use xlink_protocol::ouch::LoginAccepted as LoginAcceptedW;

    fn clock() -> Arc<dyn Clock> {
        Arc::new(TestClock::at(Utc::now()))
    }

    fn config() -> OuchSessionConfig {
        OuchSessionConfig {
            session_id: SessionId::new("OUCH-1"),
            username: "user".into(),
            password: "pass".into(),
            session: "SESSION1".into(),
        }
    }

    #[test]
    fn login_accepted_reaches_logged_on() {
        let mut session = OuchSession::new(config(), clock());
        session.connect().unwrap();
        assert_eq!(session.on_connected().unwrap(), OuchAction::SendLoginRequest);

        let mut buf = vec![0u8; 16];
        LoginAcceptedW::wrap_for_writing(&mut buf).unwrap();
        let action = session.on_login_reply(b'A', &mut buf).unwrap();
        assert_eq!(action, OuchAction::Dispatch);
        assert_eq!(session.state(), SessionState::LoggedOn);
    }

    #[test]
    fn out_of_sequence_message_is_fatal_with_no_recovery() {
        let mut session = OuchSession::new(config(), clock());
        session.connect().unwrap();
        session.on_connected().unwrap();
        let mut buf = vec![0u8; 16];
        LoginAcceptedW::wrap_for_writing(&mut buf).unwrap();
        session.on_login_reply(b'A', &mut buf).unwrap();

        assert!(session.on_inbound(1).is_ok());
        let err = session.on_inbound(3);
        assert!(matches!(err, Err(SessionError::SequenceTooLow { .. })));
    }
}
