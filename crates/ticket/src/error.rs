use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TicketError {
    #[error("the subject may not request the scopes {denied:?}")]
    InvalidScopes { denied: Vec<String> },

    #[error("malformed ticket: {reason}")]
    Malformed { reason: &'static str },

    #[error("ticket signature does not match")]
    SignatureMismatch,

    #[error("ticket was issued for another subject")]
    SubjectMismatch,

    #[error("ticket expired")]
    Expired,

    #[error("ticket was used already")]
    Replayed,
}

impl TicketError {
    pub(crate) fn malformed(reason: &'static str) -> Self {
        Self::Malformed { reason }
    }
}

#[derive(Debug, Error)]
pub enum KeyError {
    #[error("failed to read ticket key {path}: {source}")]
    Read { path: PathBuf, source: io::Error },

    #[error("failed to write ticket key {path}: {source}")]
    Write { path: PathBuf, source: io::Error },

    #[error("ticket key must have at least {min} bytes, got {len}")]
    TooShort { len: usize, min: usize },
}
