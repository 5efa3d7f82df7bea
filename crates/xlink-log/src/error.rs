use thiserror::Error;
use xlink_core::error::{codes, ErrorCode};

#[derive(Debug, Error)]
pub enum LogError {
    #[error("stream '{stream}' log is full: write_position {write_position} + entry {entry_len} exceeds max {max_size}")]
    LogFull {
        stream: String,
        write_position: u64,
        entry_len: u64,
        max_size: u64,
    },
    #[error("I/O error on stream '{stream}': {source}")]
    Io {
        stream: String,
        #[source]
        source: std::io::Error,
    },
    #[error("corrupt log for stream '{stream}': {reason}")]
    Corrupt { stream: String, reason: String },
}

impl ErrorCode for LogError {
    fn code(&self) -> &'static str {
        match self {
            LogError::LogFull { .. } => codes::LOG_FULL,
            LogError::Io { .. } => codes::LOG_IO_ERROR,
            LogError::Corrupt { .. } => codes::LOG_CORRUPT,
        }
    }
}
