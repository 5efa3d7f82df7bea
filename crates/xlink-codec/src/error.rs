use thiserror::Error;
use xlink_core::error::{codes, ErrorCode};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("operation at offset {pos} width {width} exceeds buffer bound {bound}")]
    BoundsExceeded {
        pos: usize,
        width: usize,
        bound: usize,
    },
    #[error("value {value} does not fit in a {width}-digit fixed-width ASCII integer")]
    ValueOutOfRange { value: i64, width: usize },
    #[error("invalid enum code {0}")]
    InvalidEnumCode(u32),
    #[error("field is not valid UTF-8")]
    InvalidUtf8,
}

impl ErrorCode for CodecError {
    fn code(&self) -> &'static str {
        match self {
            CodecError::BoundsExceeded { .. } => codes::BOUNDS_EXCEEDED,
            CodecError::ValueOutOfRange { .. } => codes::BOUNDS_EXCEEDED,
            CodecError::InvalidEnumCode(_) => codes::INVALID_ENUM_CODE,
            CodecError::InvalidUtf8 => codes::INVALID_ENUM_CODE,
        }
    }
}
