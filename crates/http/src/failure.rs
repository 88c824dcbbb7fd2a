//! Classification of transport failures into log levels.
//!
//! Peers vanishing mid-request is routine for a management API behind load balancers, so
//! resets and broken pipes are dropped and only unexpected failures reach `warn`.

use crate::protocol::{ParseError, SendError};
use once_cell::sync::Lazy;
use regex::Regex;
use std::io;
use std::time::Duration;
use thiserror::Error;
use tracing::{Level, trace, warn};

static DISCONNECT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)connection.*(?:reset|closed|abort|broken)|broken.*pipe").expect("valid disconnect pattern"));

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connection idle for more than {0:?}")]
    Timeout(Duration),

    #[error("channel closed")]
    ChannelClosed,

    #[error("tls error: {0}")]
    Tls(String),

    #[error("protocol error: {reason}")]
    Protocol { reason: String },

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

/// Where a [`TransportError`] ends up in the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Trace,
    Suppress,
    Warn,
}

impl TransportError {
    pub fn tls<S: ToString>(message: S) -> Self {
        Self::Tls(message.to_string())
    }

    pub fn disposition(&self) -> Disposition {
        match self {
            TransportError::Timeout(_) | TransportError::ChannelClosed => Disposition::Trace,
            TransportError::Tls(message) if message.contains("closed already") => Disposition::Suppress,
            TransportError::Io { source } if is_disconnect(source) => Disposition::Suppress,
            _ => Disposition::Warn,
        }
    }

    /// Logs the error according to its [`Disposition`]; with `trace` enabled every error is
    /// logged at that level instead.
    pub fn log(&self) {
        if tracing::enabled!(Level::TRACE) {
            trace!(cause = %self, disposition = ?self.disposition(), "transport error");
            return;
        }

        match self.disposition() {
            Disposition::Trace | Disposition::Suppress => {}
            Disposition::Warn => warn!(cause = %self, "transport error"),
        }
    }
}

fn is_disconnect(e: &io::Error) -> bool {
    matches!(e.kind(), io::ErrorKind::ConnectionReset | io::ErrorKind::ConnectionAborted | io::ErrorKind::BrokenPipe)
        || DISCONNECT.is_match(&e.to_string())
}

impl From<ParseError> for TransportError {
    fn from(e: ParseError) -> Self {
        match e {
            ParseError::Io { source } => Self::Io { source },
            other => Self::Protocol { reason: other.to_string() },
        }
    }
}

impl From<SendError> for TransportError {
    fn from(e: SendError) -> Self {
        match e {
            SendError::Io { source } => Self::Io { source },
            other => Self::Protocol { reason: other.to_string() },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn io(kind: io::ErrorKind, message: &str) -> TransportError {
        io::Error::new(kind, message.to_string()).into()
    }

    #[test]
    fn quiet_failures() {
        assert_eq!(TransportError::Timeout(Duration::from_secs(30)).disposition(), Disposition::Trace);
        assert_eq!(TransportError::ChannelClosed.disposition(), Disposition::Trace);
        assert_eq!(TransportError::tls("SSLEngine closed already").disposition(), Disposition::Suppress);
    }

    #[test]
    fn disconnects_are_suppressed() {
        assert_eq!(io(io::ErrorKind::ConnectionReset, "os error 104").disposition(), Disposition::Suppress);
        assert_eq!(io(io::ErrorKind::BrokenPipe, "os error 32").disposition(), Disposition::Suppress);
        assert_eq!(io(io::ErrorKind::Other, "Connection reset by peer").disposition(), Disposition::Suppress);
        assert_eq!(io(io::ErrorKind::Other, "Broken pipe").disposition(), Disposition::Suppress);
        assert_eq!(io(io::ErrorKind::Other, "connection was aborted by the software").disposition(), Disposition::Suppress);
    }

    #[test]
    fn everything_else_warns() {
        assert_eq!(io(io::ErrorKind::PermissionDenied, "permission denied").disposition(), Disposition::Warn);
        assert_eq!(TransportError::tls("certificate expired").disposition(), Disposition::Warn);
        assert_eq!(TransportError::from(ParseError::invalid_body("bad chunk")).disposition(), Disposition::Warn);
    }

    #[test]
    fn io_parse_errors_keep_their_kind() {
        let error = TransportError::from(ParseError::io(io::Error::from(io::ErrorKind::ConnectionAborted)));
        assert_eq!(error.disposition(), Disposition::Suppress);
    }
}
