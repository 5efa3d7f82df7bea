//! SBE-framed venue session state machine (CME iLink3 / NYSE Pillar
//! style, spec.md §4.F): Negotiate, then per-stream Establish/Open before
//! application traffic is allowed. Sequence numbers are tracked per
//! stream, separately for inbound (GT) and outbound (TG).

use crate::error::SessionError;
use crate::state::SessionState;
use std::collections::HashMap;
use std::sync::Arc;
use xlink_core::{Clock, SessionId};
use xlink_metrics::SessionMetrics;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SbeAction {
    SendNegotiate,
    SendEstablish { stream: String },
    Dispatch,
    CloseSocket,
}

#[derive(Debug, Default)]
struct StreamState {
    open_inbound: bool,
    open_outbound: bool,
    inbound_seq: u64,
    outbound_seq: u64,
}

pub struct SbeSessionConfig {
    pub session_id: SessionId,
    pub sbe_session_id: u64,
    /// The streams that must be open, both directions, before the
    /// session is considered ESTABLISHED.
    pub required_streams: Vec<String>,
}

/// One SBE venue session's mutable state: Negotiate gates the whole
/// connection, then each required stream must individually reach
/// Establish/Open in both directions before the session is usable.
pub struct SbeSession {
    config: SbeSessionConfig,
    clock: Arc<dyn Clock>,
    state: SessionState,
    negotiated: bool,
    streams: HashMap<String, StreamState>,
    last_inbound_at: Option<chrono::DateTime<chrono::Utc>>,
    pub metrics: SessionMetrics,
}

impl SbeSession {
    pub fn new(config: SbeSessionConfig, clock: Arc<dyn Clock>) -> Self {
        let streams = config
            .required_streams
            .iter()
            .map(|name| (name.clone(), StreamState::default()))
            .collect();
        SbeSession {
            config,
            clock,
            state: SessionState::Disconnected,
            negotiated: false,
            streams,
            last_inbound_at: None,
            metrics: SessionMetrics::default(),
        }
    }

    pub fn last_inbound_at(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        self.last_inbound_at
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// True only once every required stream has been opened in both
    /// directions (spec.md §4.F: "Session reaches ESTABLISHED only when
    /// required streams are open in both directions").
    pub fn is_established(&self) -> bool {
        self.negotiated
            && self
                .streams
                .values()
                .all(|s| s.open_inbound && s.open_outbound)
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

    pub fn on_connected(&mut self) -> Result<SbeAction, SessionError> {
        if self.state != SessionState::Connecting {
            return Err(self.illegal("on_connected"));
        }
        self.state = SessionState::Connected;
        Ok(SbeAction::SendNegotiate)
    }

    pub fn on_negotiate_ack(&mut self, accepted: bool) -> Result<Vec<SbeAction>, SessionError> {
        if self.state != SessionState::Connected {
            return Err(self.illegal("on_negotiate_ack"));
        }
        if !accepted {
            return Err(SessionError::LogonRejected {
                reason: "Negotiate rejected".into(),
            });
        }
        self.negotiated = true;
        Ok(self
            .config
            .required_streams
            .iter()
            .map(|name| SbeAction::SendEstablish { stream: name.clone() })
            .collect())
    }

    /// An Establish/Open ack for `stream`, `inbound`/`outbound` marking
    /// which direction just opened. Transitions to LOGGED_ON (this
    /// family's stand-in for ESTABLISHED) once every required stream is
    /// open both ways.
    pub fn on_stream_open(&mut self, stream: &str, inbound: bool, outbound: bool) -> Result<SbeAction, SessionError> {
        let unknown_stream = self.illegal("on_stream_open: unknown stream");
        let entry = self.streams.get_mut(stream).ok_or(unknown_stream)?;
        entry.open_inbound |= inbound;
        entry.open_outbound |= outbound;
        if self.is_established() {
            self.state = SessionState::LoggedOn;
        }
        Ok(SbeAction::Dispatch)
    }

    pub fn on_inbound(&mut self, stream: &str, seq: u64) -> Result<SbeAction, SessionError> {
        if self.state != SessionState::LoggedOn {
            return Err(self.illegal("on_inbound"));
        }
        let unknown_stream = self.illegal("on_inbound: unknown stream");
        let entry = self.streams.get_mut(stream).ok_or(unknown_stream)?;
        self.last_inbound_at = Some(self.clock.now_utc());
        self.metrics.messages_received.incr();
        if seq != entry.inbound_seq + 1 {
            return Err(SessionError::SequenceTooLow {
                expected: entry.inbound_seq + 1,
                received: seq,
            });
        }
        entry.inbound_seq = seq;
        Ok(SbeAction::Dispatch)
    }

    pub fn next_outbound_seq(&mut self, stream: &str) -> Option<u64> {
        let entry = self.streams.get_mut(stream)?;
        entry.outbound_seq += 1;
        self.metrics.messages_sent.incr();
        Some(entry.outbound_seq)
    }

    pub fn on_terminate(&mut self) -> SbeAction {
        self.state = SessionState::Disconnected;
        self.metrics.disconnects.incr();
        SbeAction::CloseSocket
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use xlink_core::clock::TestClock;

    fn clock() -> Arc<dyn Clock> {
        Arc::new(TestClock::at(chrono::Utc::now()))
    }

    fn config() -> SbeSessionConfig {
        SbeSessionConfig {
            session_id: SessionId::new("ILINK3-1"),
            sbe_session_id: 42,
            required_streams: vec!["order".to_string(), "drop_copy".to_string()],
        }
    }

    #[test]
    fn establishes_only_once_every_stream_is_open_both_ways() {
        let mut session = SbeSession::new(config(), clock());
        session.connect().unwrap();
        assert_eq!(session.on_connected().unwrap(), SbeAction::SendNegotiate);
        let actions = session.on_negotiate_ack(true).unwrap();
        assert_eq!(actions.len(), 2);

        session.on_stream_open("order", true, true).unwrap();
        assert!(!session.is_established(), "drop_copy not open yet");
        assert_eq!(session.state(), SessionState::Connected);

        session.on_stream_open("drop_copy", true, false).unwrap();
        assert!(!session.is_established(), "drop_copy outbound not open yet");

        session.on_stream_open("drop_copy", false, true).unwrap();
        assert!(session.is_established());
        assert_eq!(session.state(), SessionState::LoggedOn);
    }

    #[test]
    fn per_stream_sequence_gap_is_fatal() {
        let mut session = SbeSession::new(config(), clock());
        session.connect().unwrap();
        session.on_connected().unwrap();
        session.on_negotiate_ack(true).unwrap();
        session.on_stream_open("order", true, true).unwrap();
        session.on_stream_open("drop_copy", true, true).unwrap();
        assert!(session.is_established());

        assert_eq!(session.on_inbound("order", 1).unwrap(), SbeAction::Dispatch);
        let err = session.on_inbound("order", 3);
        assert!(matches!(err, Err(SessionError::SequenceTooLow { .. })));
    }
}
