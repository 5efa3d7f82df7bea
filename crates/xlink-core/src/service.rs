//! `SessionService` — the contract the (out-of-scope) admin server consumes.
//!
//! Per spec.md §6, the admin HTTP/WebSocket server is an external
//! collaborator; only its interface to the core is specified here. This
//! trait and its supporting types are the whole of that interface — no
//! transport is implemented in this workspace.

use crate::ids::SessionId;
use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    pub session_id: SessionId,
    pub state: String,
    pub outbound_seq: u64,
    pub inbound_expected_seq: u64,
}

/// A session state-change event, pushed to any registered [`SessionEventSink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStateEvent {
    pub session_id: SessionId,
    pub previous_state: String,
    pub new_state: String,
    pub at: DateTime<Utc>,
}

/// Receives the push channel of session state-change events.
///
/// The admin server registers one of these with the engine at startup;
/// calls happen on the event loop thread and must not block.
pub trait SessionEventSink: Send + Sync {
    fn on_session_event(&self, event: SessionStateEvent);
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("no session named '{0}'")]
    UnknownSession(String),
    #[error("operation not valid in current session state: {0}")]
    InvalidState(String),
    #[error("engine unavailable")]
    EngineUnavailable,
}

impl crate::error::ErrorCode for ServiceError {
    fn code(&self) -> &'static str {
        match self {
            ServiceError::UnknownSession(_) => "UNKNOWN_SESSION",
            ServiceError::InvalidState(_) => crate::error::codes::UNEXPECTED_MESSAGE,
            ServiceError::EngineUnavailable => "ENGINE_UNAVAILABLE",
        }
    }
}

/// Operations the admin server drives against the engine.
pub trait SessionService: Send + Sync {
    fn list_sessions(&self) -> Vec<SessionSummary>;
    fn get_session(&self, id: &SessionId) -> Option<SessionSummary>;
    fn connect(&self, id: &SessionId) -> Result<(), ServiceError>;
    fn disconnect(&self, id: &SessionId) -> Result<(), ServiceError>;
    fn logout(&self, id: &SessionId) -> Result<(), ServiceError>;
    fn reset_sequence(&self, id: &SessionId) -> Result<(), ServiceError>;
    fn set_outgoing_seq_num(&self, id: &SessionId, seq: u64) -> Result<(), ServiceError>;
    fn set_incoming_seq_num(&self, id: &SessionId, seq: u64) -> Result<(), ServiceError>;
    fn send_test_request(&self, id: &SessionId) -> Result<(), ServiceError>;
    fn trigger_eod(&self, id: &SessionId) -> Result<(), ServiceError>;
    fn is_engine_available(&self) -> bool;
}
