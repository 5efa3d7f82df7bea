use std::net::SocketAddr;
use thiserror::Error;
use xlink_core::error::{codes, ErrorCode};

#[derive(Debug, Error)]
pub enum NetError {
    #[error("connect to {remote} failed: {source}")]
    ConnectFailed { remote: SocketAddr, source: std::io::Error },
    #[error("unexpected EOF from peer")]
    UnexpectedEof,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ErrorCode for NetError {
    fn code(&self) -> &'static str {
        match self {
            NetError::ConnectFailed { .. } => codes::CONNECT_FAILED,
            NetError::UnexpectedEof => codes::UNEXPECTED_EOF,
            NetError::Io(_) => codes::IO_ERROR,
        }
    }
}
