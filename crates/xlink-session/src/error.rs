use thiserror::Error;
use xlink_core::error::{codes, ErrorCode};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("illegal transition for session '{name}': {from} cannot handle {attempted}")]
    IllegalTransition {
        name: String,
        from: &'static str,
        attempted: &'static str,
    },
    #[error("inbound seq {received} below expected {expected} without PossDup")]
    SequenceTooLow { expected: u64, received: u64 },
    #[error("logon rejected: {reason}")]
    LogonRejected { reason: String },
    #[error("no inbound traffic within {0:?}")]
    HeartbeatTimeout(std::time::Duration),
    #[error(transparent)]
    Framing(#[from] xlink_protocol::FramingError),
}

impl ErrorCode for SessionError {
    fn code(&self) -> &'static str {
        match self {
            SessionError::IllegalTransition { .. } => codes::ILLEGAL_TRANSITION,
            SessionError::SequenceTooLow { .. } => codes::SEQUENCE_TOO_LOW,
            SessionError::LogonRejected { .. } => codes::LOGON_REJECTED,
            SessionError::HeartbeatTimeout(_) => codes::HEARTBEAT_TIMEOUT,
            SessionError::Framing(e) => e.code(),
        }
    }
}
