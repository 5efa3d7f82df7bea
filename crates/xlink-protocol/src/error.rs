use thiserror::Error;
use xlink_codec::CodecError;
use xlink_core::error::{codes, ErrorCode};

#[derive(Debug, Error)]
pub enum FramingError {
    #[error("malformed length field: {0}")]
    MalformedLength(String),
    #[error("checksum mismatch: expected {expected}, computed {computed}")]
    ChecksumMismatch { expected: u32, computed: u32 },
    #[error("unknown message type: {0}")]
    UnknownMessageType(String),
    #[error("truncated appendage: expected {expected} bytes, had {available}")]
    TruncatedAppendage { expected: usize, available: usize },
    #[error(transparent)]
    Codec(#[from] CodecError),
}

impl ErrorCode for FramingError {
    fn code(&self) -> &'static str {
        match self {
            FramingError::MalformedLength(_) => codes::MALFORMED_LENGTH,
            FramingError::ChecksumMismatch { .. } => codes::CHECKSUM_MISMATCH,
            FramingError::UnknownMessageType(_) => codes::UNKNOWN_MESSAGE_TYPE,
            FramingError::TruncatedAppendage { .. } => codes::TRUNCATED_APPENDAGE,
            FramingError::Codec(e) => e.code(),
        }
    }
}
