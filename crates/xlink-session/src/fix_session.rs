//! FIX 4.x/5.x session state machine (spec.md §4.F): sequence numbers,
//! heartbeats, gap recovery via ResendRequest, and the Logout handshake.
//! Business logic only — callers own the socket and the persistent log;
//! this type turns inbound bytes and timer ticks into outbound intents.

use crate::error::SessionError;
use crate::state::SessionState;
use chrono::{DateTime, Utc};
use std::time::Duration;
use xlink_core::{Clock, SessionId};
use xlink_metrics::SessionMetrics;
use xlink_protocol::fix::{
    FixMessageBuilder, FixMessageView, FixMsgType, TAG_BEGIN_SEQ_NO, TAG_DEFAULT_APPL_VER_ID,
    TAG_END_SEQ_NO, TAG_HEARTBEAT_INT, TAG_SENDER_COMP_ID, TAG_TARGET_COMP_ID, TAG_TEST_REQ_ID,
    TAG_TEXT,
};
use std::sync::Arc;

/// What the session wants to happen next; the caller (the engine's
/// per-channel driver) is responsible for actually writing bytes and
/// persisting them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FixAction {
    SendLogon,
    SendHeartbeat,
    SendTestRequest { test_req_id: String },
    SendResendRequest { begin: u64, end: u64 },
    SendLogout,
    /// A ResendRequest or gap was observed for a message that must still
    /// be dispatched to the application layer once resent.
    HoldForResend,
    Dispatch,
    CloseSocket,
}

pub struct FixSessionConfig {
    pub session_id: SessionId,
    pub begin_string: String,
    pub sender_comp_id: String,
    pub target_comp_id: String,
    pub heartbeat_interval: Duration,
    pub is_initiator: bool,
    /// Required when `begin_string == "FIXT.1.1"` (spec.md §4.F).
    pub default_appl_ver_id: Option<String>,
}

/// A single FIX session's mutable state. Holds no socket and no buffer —
/// callers serialize outbound intents with [`FixSession::build_message`]
/// into whatever buffer they're writing to.
pub struct FixSession {
    config: FixSessionConfig,
    clock: Arc<dyn Clock>,
    state: SessionState,
    outbound_seq: u64,
    inbound_expected_seq: u64,
    last_inbound_at: Option<DateTime<Utc>>,
    last_outbound_at: Option<DateTime<Utc>>,
    gap_pending: Option<u64>,
    pub metrics: SessionMetrics,
}

impl FixSession {
    pub fn new(config: FixSessionConfig, clock: Arc<dyn Clock>) -> Self {
        FixSession {
            config,
            clock,
            state: SessionState::Disconnected,
            outbound_seq: 1,
            inbound_expected_seq: 1,
            last_inbound_at: None,
            last_outbound_at: None,
            gap_pending: None,
            metrics: SessionMetrics::default(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn outbound_seq(&self) -> u64 {
        self.outbound_seq
    }

    pub fn inbound_expected_seq(&self) -> u64 {
        self.inbound_expected_seq
    }

    /// Reconnect-replay (spec.md §4.D/§4.F composed per SPEC_FULL.md §3):
    /// seeds the outbound/inbound sequence counters from the last entries
    /// recorded for this session's stream, so a reconnect resumes numbering
    /// where the prior connection left off instead of restarting at 1.
    /// Must be called while `DISCONNECTED`, before `connect()`.
    pub fn resume_from_log(&mut self, store: &mut xlink_log::LogStore) -> Result<(), SessionError> {
        if self.state != SessionState::Disconnected {
            return Err(self.illegal("resume_from_log"));
        }
        let stream = self.config.session_id.as_str().to_string();
        if let Some(last_out) = store
            .get_latest(&stream, Some(xlink_log::Direction::Out))
            .map_err(|_| self.illegal("resume_from_log: log read failed"))?
        {
            self.outbound_seq = u64::from(last_out.seq) + 1;
        }
        if let Some(last_in) = store
            .get_latest(&stream, Some(xlink_log::Direction::In))
            .map_err(|_| self.illegal("resume_from_log: log read failed"))?
        {
            self.inbound_expected_seq = u64::from(last_in.seq) + 1;
        }
        Ok(())
    }

    fn illegal(&self, attempted: &'static str) -> SessionError {
        SessionError::IllegalTransition {
            name: self.config.session_id.as_str().to_string(),
            from: self.state.as_str(),
            attempted,
        }
    }

    /// `connect()`: DISCONNECTED -> CONNECTING.
    pub fn connect(&mut self) -> Result<(), SessionError> {
        if self.state != SessionState::Disconnected {
            return Err(self.illegal("connect"));
        }
        self.state = SessionState::Connecting;
        Ok(())
    }

    /// `on_connected`: CONNECTING -> CONNECTED, emitting `SendLogon`.
    pub fn on_connected(&mut self) -> Result<FixAction, SessionError> {
        if self.state != SessionState::Connecting {
            return Err(self.illegal("on_connected"));
        }
        self.state = SessionState::Connected;
        if self.config.is_initiator {
            Ok(FixAction::SendLogon)
        } else {
            Ok(FixAction::Dispatch)
        }
    }

    /// Handles one fully-framed, checksum-validated inbound message.
    /// Returns the action the caller should take; the caller dispatches
    /// the message to the application layer itself only when the
    /// returned action is [`FixAction::Dispatch`].
    pub fn on_inbound(&mut self, view: &FixMessageView<'_>) -> Result<FixAction, SessionError> {
        let received_seq = view
            .msg_seq_num()
            .ok_or_else(|| self.illegal("message missing MsgSeqNum"))?;
        self.last_inbound_at = Some(self.clock.now_utc());
        self.metrics.messages_received.incr();

        if received_seq < self.inbound_expected_seq && !view.poss_dup() {
            return Err(SessionError::SequenceTooLow {
                expected: self.inbound_expected_seq,
                received: received_seq,
            });
        }
        if received_seq > self.inbound_expected_seq && !view.poss_dup() {
            let is_new_gap = self.gap_pending.is_none();
            let target = self.gap_pending.get_or_insert(received_seq);
            if received_seq > *target {
                *target = received_seq;
            }
            if is_new_gap {
                return Ok(FixAction::SendResendRequest {
                    begin: self.inbound_expected_seq,
                    end: 0,
                });
            }
            // A gap is already being filled by a prior resend request;
            // this message is still beyond what's been recovered so far,
            // so it's held rather than dispatched out of order (spec.md
            // §4.F, Invariant 2: monotonic dispatch).
            return Ok(FixAction::HoldForResend);
        }

        let msg_type = view.msg_type()?;
        if matches!(msg_type, FixMsgType::Logout) {
            // Logout closes the session regardless of outcome; seq
            // bookkeeping no longer matters once it's torn down.
            return self.on_logout();
        }
        if matches!(msg_type, FixMsgType::Logon) {
            self.on_logon(view)?;
        }

        if !view.poss_dup() || received_seq >= self.inbound_expected_seq {
            self.inbound_expected_seq = received_seq + 1;
        }
        if let Some(target) = self.gap_pending {
            if self.inbound_expected_seq > target {
                self.gap_pending = None;
            }
        }

        match msg_type {
            FixMsgType::Heartbeat | FixMsgType::SequenceReset | FixMsgType::Logon => {
                Ok(FixAction::Dispatch)
            }
            FixMsgType::TestRequest => {
                let test_req_id = view.get_str(TAG_TEST_REQ_ID).unwrap_or("").to_string();
                Ok(FixAction::SendTestRequest { test_req_id })
            }
            FixMsgType::ResendRequest => {
                let begin = view.get_u64(TAG_BEGIN_SEQ_NO).unwrap_or(1);
                let end = view.get_u64(TAG_END_SEQ_NO).unwrap_or(0);
                Ok(FixAction::SendResendRequest { begin, end })
            }
            FixMsgType::Logout => unreachable!("handled above"),
            FixMsgType::Reject => Ok(FixAction::Dispatch),
        }
    }

    fn on_logon(&mut self, view: &FixMessageView<'_>) -> Result<(), SessionError> {
        if self.config.begin_string == "FIXT.1.1"
            && view.get_str(TAG_DEFAULT_APPL_VER_ID).is_none()
        {
            return Err(SessionError::LogonRejected {
                reason: "FIXT.1.1 session missing DefaultApplVerID".into(),
            });
        }
        if self.state != SessionState::Connected {
            return Err(self.illegal("on_logon"));
        }
        self.state = SessionState::LoggedOn;
        self.last_outbound_at = Some(self.clock.now_utc());
        Ok(())
    }

    fn on_logout(&mut self) -> Result<FixAction, SessionError> {
        match self.state {
            SessionState::LogoutSent => {
                self.state = SessionState::Disconnected;
                Ok(FixAction::CloseSocket)
            }
            SessionState::LoggedOn => {
                self.state = SessionState::Disconnected;
                Ok(FixAction::SendLogout)
            }
            _ => Err(self.illegal("on_logout")),
        }
    }

    /// Scheduler `RESET_DUE` (spec.md §4.F): reset both sequence counters
    /// to 1. Callers are responsible for resetting the persistent store's
    /// latest marker for this stream.
    pub fn on_reset_due(&mut self) {
        self.outbound_seq = 1;
        self.inbound_expected_seq = 1;
        self.gap_pending = None;
    }

    /// Scheduler `SESSION_END`: LOGGED_ON -> LOGOUT_SENT.
    pub fn on_session_end(&mut self) -> Result<FixAction, SessionError> {
        if self.state != SessionState::LoggedOn {
            return Err(self.illegal("on_session_end"));
        }
        self.state = SessionState::LogoutSent;
        Ok(FixAction::SendLogout)
    }

    /// Any socket error or peer FIN: -> DISCONNECTED.
    pub fn on_disconnect(&mut self) {
        self.state = SessionState::Disconnected;
        self.metrics.disconnects.incr();
    }

    /// Periodic timer tick while LOGGED_ON: heartbeat on local idleness,
    /// TestRequest on peer idleness.
    pub fn on_timer(&mut self) -> Option<FixAction> {
        if self.state != SessionState::LoggedOn {
            return None;
        }
        let now = self.clock.now_utc();
        if let Some(last) = self.last_outbound_at {
            if now - last >= chrono::Duration::from_std(self.config.heartbeat_interval).ok()? {
                return Some(FixAction::SendHeartbeat);
            }
        }
        if let Some(last) = self.last_inbound_at {
            let double = self.config.heartbeat_interval * 2;
            if now - last >= chrono::Duration::from_std(double).ok()? {
                return Some(FixAction::SendTestRequest {
                    test_req_id: format!("TEST{}", self.outbound_seq),
                });
            }
        }
        None
    }

    /// Serializes `action` into `buf` at offset 0, stamping the next
    /// outbound sequence number and bumping session counters. Returns the
    /// frame length, or `None` for actions that carry no FIX message
    /// (`CloseSocket`, `Dispatch`, `HoldForResend`).
    pub fn build_message(&mut self, action: &FixAction, buf: &mut [u8]) -> Option<usize> {
        let msg_type = match action {
            FixAction::SendLogon => FixMsgType::Logon,
            FixAction::SendHeartbeat => FixMsgType::Heartbeat,
            FixAction::SendTestRequest { .. } => FixMsgType::TestRequest,
            FixAction::SendResendRequest { .. } => FixMsgType::ResendRequest,
            FixAction::SendLogout => FixMsgType::Logout,
            FixAction::Dispatch | FixAction::HoldForResend | FixAction::CloseSocket => return None,
        };

        let mut builder = FixMessageBuilder::new(buf, 0, &self.config.begin_string, msg_type);
        builder
            .set_str(TAG_SENDER_COMP_ID, &self.config.sender_comp_id)
            .set_str(TAG_TARGET_COMP_ID, &self.config.target_comp_id)
            .set_u64(xlink_protocol::fix::TAG_MSG_SEQ_NUM, self.outbound_seq);

        match action {
            FixAction::SendLogon => {
                builder.set_u64(TAG_HEARTBEAT_INT, self.config.heartbeat_interval.as_secs());
                if let Some(appl_ver_id) = &self.config.default_appl_ver_id {
                    builder.set_str(TAG_DEFAULT_APPL_VER_ID, appl_ver_id);
                }
            }
            FixAction::SendTestRequest { test_req_id } => {
                builder.set_str(TAG_TEST_REQ_ID, test_req_id);
            }
            FixAction::SendResendRequest { begin, end } => {
                builder.set_u64(TAG_BEGIN_SEQ_NO, *begin);
                builder.set_u64(TAG_END_SEQ_NO, *end);
            }
            FixAction::SendLogout => {
                builder.set_str(TAG_TEXT, "");
            }
            _ => {}
        }

        let len = builder.finish();
        self.outbound_seq += 1;
        self.last_outbound_at = Some(self.clock.now_utc());
        self.metrics.messages_sent.incr();
        if matches!(action, FixAction::SendHeartbeat) {
            self.metrics.heartbeats_sent.incr();
        }
        Some(len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, NaiveDate};
    use xlink_core::clock::TestClock;
    use xlink_protocol::fix::TAG_MSG_SEQ_NUM;

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> DateTime<Utc> {
        DateTime::from_naive_utc_and_offset(
            NaiveDate::from_ymd_opt(y, m, d).unwrap().and_hms_opt(h, min, s).unwrap(),
            Utc,
        )
    }

    fn config(initiator: bool) -> FixSessionConfig {
        FixSessionConfig {
            session_id: SessionId::new("CLIENT->SERVER"),
            begin_string: "FIX.4.2".to_string(),
            sender_comp_id: "CLIENT".to_string(),
            target_comp_id: "SERVER".to_string(),
            heartbeat_interval: Duration::from_secs(30),
            is_initiator: initiator,
            default_appl_ver_id: None,
        }
    }

    fn logon_bytes(seq: u64, sender: &str, target: &str) -> Vec<u8> {
        let mut buf = vec![0u8; 256];
        let mut builder = FixMessageBuilder::new(&mut buf, 0, "FIX.4.2", FixMsgType::Logon);
        builder
            .set_str(TAG_SENDER_COMP_ID, sender)
            .set_str(TAG_TARGET_COMP_ID, target)
            .set_u64(TAG_MSG_SEQ_NUM, seq)
            .set_u64(TAG_HEARTBEAT_INT, 30);
        let len = builder.finish();
        buf.truncate(len);
        buf
    }

    #[test]
    fn connect_then_logon_reaches_logged_on() {
        let clock = Arc::new(TestClock::at(utc(2026, 3, 2, 9, 0, 0)));
        let mut session = FixSession::new(config(true), clock);
        session.connect().unwrap();
        assert_eq!(session.on_connected().unwrap(), FixAction::SendLogon);
        assert_eq!(session.state(), SessionState::Connected);

        let bytes = logon_bytes(1, "SERVER", "CLIENT");
        let view = FixMessageView::wrap_for_reading(&bytes).unwrap();
        let action = session.on_inbound(&view).unwrap();
        assert_eq!(action, FixAction::Dispatch);
        assert_eq!(session.state(), SessionState::LoggedOn);
        assert_eq!(session.inbound_expected_seq(), 2);
    }

    #[test]
    fn gap_triggers_resend_request_and_holds_expected_seq() {
        let clock = Arc::new(TestClock::at(utc(2026, 3, 2, 9, 0, 0)));
        let mut session = FixSession::new(config(true), clock);
        session.connect().unwrap();
        session.on_connected().unwrap();
        let logon = logon_bytes(1, "SERVER", "CLIENT");
        session.on_inbound(&FixMessageView::wrap_for_reading(&logon).unwrap()).unwrap();

        let mut buf = vec![0u8; 256];
        let mut builder = FixMessageBuilder::new(&mut buf, 0, "FIX.4.2", FixMsgType::Heartbeat);
        builder
            .set_str(TAG_SENDER_COMP_ID, "SERVER")
            .set_str(TAG_TARGET_COMP_ID, "CLIENT")
            .set_u64(TAG_MSG_SEQ_NUM, 5);
        let len = builder.finish();
        buf.truncate(len);

        let action = session.on_inbound(&FixMessageView::wrap_for_reading(&buf).unwrap()).unwrap();
        assert_eq!(action, FixAction::SendResendRequest { begin: 2, end: 0 });
        assert_eq!(session.inbound_expected_seq(), 2, "expected seq held until gap fills");
    }

    #[test]
    fn second_out_of_order_message_during_open_gap_is_held_not_dispatched() {
        let clock = Arc::new(TestClock::at(utc(2026, 3, 2, 9, 0, 0)));
        let mut session = FixSession::new(config(true), clock);
        session.connect().unwrap();
        session.on_connected().unwrap();
        let logon = logon_bytes(1, "SERVER", "CLIENT");
        session.on_inbound(&FixMessageView::wrap_for_reading(&logon).unwrap()).unwrap();

        let heartbeat = |seq: u64| -> Vec<u8> {
            let mut buf = vec![0u8; 256];
            let mut builder = FixMessageBuilder::new(&mut buf, 0, "FIX.4.2", FixMsgType::Heartbeat);
            builder
                .set_str(TAG_SENDER_COMP_ID, "SERVER")
                .set_str(TAG_TARGET_COMP_ID, "CLIENT")
                .set_u64(TAG_MSG_SEQ_NUM, seq);
            let len = builder.finish();
            buf.truncate(len);
            buf
        };

        // seq 5 opens the gap (expected was 2).
        let first = session.on_inbound(&FixMessageView::wrap_for_reading(&heartbeat(5)).unwrap()).unwrap();
        assert_eq!(first, FixAction::SendResendRequest { begin: 2, end: 0 });
        assert_eq!(session.inbound_expected_seq(), 2);

        // seq 7 arrives while the gap is still open; it must be held, not
        // treated as in-order, and must not clear the gap or advance
        // inbound_expected_seq past its pre-gap value.
        let second = session.on_inbound(&FixMessageView::wrap_for_reading(&heartbeat(7)).unwrap()).unwrap();
        assert_eq!(second, FixAction::HoldForResend);
        assert_eq!(session.inbound_expected_seq(), 2, "expected seq must stay held while gap is open");

        // the originally missing messages now arrive in order, up through
        // the extended target (seq 7); only once inbound_expected_seq
        // passes 7 is the gap actually resolved.
        for seq in 2..=7 {
            session.on_inbound(&FixMessageView::wrap_for_reading(&heartbeat(seq)).unwrap()).unwrap();
        }
        assert_eq!(session.inbound_expected_seq(), 8, "gap should be fully filled once target is passed");
    }

    #[test]
    fn seq_below_expected_without_poss_dup_is_fatal() {
        let clock = Arc::new(TestClock::at(utc(2026, 3, 2, 9, 0, 0)));
        let mut session = FixSession::new(config(true), clock);
        session.connect().unwrap();
        session.on_connected().unwrap();
        let logon = logon_bytes(2, "SERVER", "CLIENT");
        // first inbound at seq 2 creates a gap (expected was 1), holding state;
        // now feed seq 1 without poss_dup while still waiting on the gap fill.
        session.on_inbound(&FixMessageView::wrap_for_reading(&logon).unwrap()).unwrap();

        let mut buf = vec![0u8; 256];
        let mut builder = FixMessageBuilder::new(&mut buf, 0, "FIX.4.2", FixMsgType::Heartbeat);
        builder
            .set_str(TAG_SENDER_COMP_ID, "SERVER")
            .set_str(TAG_TARGET_COMP_ID, "CLIENT")
            .set_u64(TAG_MSG_SEQ_NUM, 0);
        let len = builder.finish();
        buf.truncate(len);
        let err = session.on_inbound(&FixMessageView::wrap_for_reading(&buf).unwrap());
        assert!(matches!(err, Err(SessionError::SequenceTooLow { .. })));
    }

    #[test]
    fn logout_handshake_completes_on_peer_reply() {
        let clock = Arc::new(TestClock::at(utc(2026, 3, 2, 9, 0, 0)));
        let mut session = FixSession::new(config(true), clock);
        session.connect().unwrap();
        session.on_connected().unwrap();
        let logon = logon_bytes(1, "SERVER", "CLIENT");
        session.on_inbound(&FixMessageView::wrap_for_reading(&logon).unwrap()).unwrap();

        assert_eq!(session.on_session_end().unwrap(), FixAction::SendLogout);
        assert_eq!(session.state(), SessionState::LogoutSent);

        let mut buf = vec![0u8; 256];
        let mut builder = FixMessageBuilder::new(&mut buf, 0, "FIX.4.2", FixMsgType::Logout);
        builder
            .set_str(TAG_SENDER_COMP_ID, "SERVER")
            .set_str(TAG_TARGET_COMP_ID, "CLIENT")
            .set_u64(TAG_MSG_SEQ_NUM, 2);
        let len = builder.finish();
        buf.truncate(len);
        let action = session.on_inbound(&FixMessageView::wrap_for_reading(&buf).unwrap()).unwrap();
        assert_eq!(action, FixAction::CloseSocket);
        assert_eq!(session.state(), SessionState::Disconnected);
    }

    #[test]
    fn reset_due_sets_both_counters_back_to_one() {
        let clock = Arc::new(TestClock::at(utc(2026, 3, 2, 9, 0, 0)));
        let mut session = FixSession::new(config(true), clock);
        session.connect().unwrap();
        session.on_connected().unwrap();
        let logon = logon_bytes(1, "SERVER", "CLIENT");
        session.on_inbound(&FixMessageView::wrap_for_reading(&logon).unwrap()).unwrap();
        let mut buf = vec![0u8; 256];
        session.build_message(&FixAction::SendHeartbeat, &mut buf);
        assert_eq!(session.outbound_seq(), 2);

        session.on_reset_due();
        assert_eq!(session.outbound_seq(), 1);
        assert_eq!(session.inbound_expected_seq(), 1);
    }

    #[test]
    fn resume_from_log_seeds_counters_from_last_logged_entries() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = xlink_log::LogStore::new(dir.path(), 1024 * 1024, false);
        let stream = "CLIENT->SERVER";
        store
            .write(stream, &xlink_log::LogEntry {
                timestamp_nanos: 0,
                seq: 5,
                direction: xlink_log::Direction::Out,
                txn_id: 0,
                msg_type: "0",
                metadata: b"",
                raw: b"raw-out",
            })
            .unwrap();
        store
            .write(stream, &xlink_log::LogEntry {
                timestamp_nanos: 0,
                seq: 7,
                direction: xlink_log::Direction::In,
                txn_id: 0,
                msg_type: "0",
                metadata: b"",
                raw: b"raw-in",
            })
            .unwrap();

        let clock = Arc::new(TestClock::at(utc(2026, 3, 2, 9, 0, 0)));
        let mut session = FixSession::new(config(true), clock);
        session.resume_from_log(&mut store).unwrap();
        assert_eq!(session.outbound_seq(), 6);
        assert_eq!(session.inbound_expected_seq(), 8);
    }
}
