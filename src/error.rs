use std::io;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
    #[error("invalid key: {0}")]
    InvalidKey(String),
    /// Error line reported by the remote end (ERROR, CLIENT_ERROR, SERVER_ERROR).
    #[error("server error: {0}")]
    Server(String),
    #[error("invalid state: {0}")]
    InvalidState(String),
}

/// Wire-level failures. Every variant is fatal for the connection it was
/// observed on.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("malformed request: {0}")]
    MalformedRequest(String),
    #[error("line exceeds {limit} bytes")]
    LineTooLong { limit: usize },
    #[error("value of {size} bytes exceeds limit of {limit}")]
    ValueTooLarge { size: usize, limit: usize },
    #[error("malformed header line: {0}")]
    MalformedHeader(String),
    #[error("data block not followed by CRLF")]
    MissingTerminator,
    #[error("unexpected reply: {0}")]
    UnexpectedReply(String),
}

impl Error {
    /// Whether the error came from bytes a peer sent us, as opposed to the
    /// transport failing underneath.
    pub fn is_protocol(&self) -> bool {
        matches!(self, Error::Protocol(_))
    }
}
