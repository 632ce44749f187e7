use core::fmt;
use std::{
    error::Error,
    fmt::{Debug, Display, Formatter},
};

use crate::config::ConfigError;

/// Wraps a startup failure (bad config, bind/listen/poll-create failure) for
/// display at the top level, before the async logger is necessarily running.
pub struct EngineError(pub Box<dyn Error>);

impl Debug for EngineError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "\r\x1b[K{}", self)
    }
}

impl Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\x1b[31mFATAL\x1b[0m: {}", self.0)
    }
}

impl Error for EngineError {}

impl From<ConfigError> for EngineError {
    fn from(e: ConfigError) -> Self {
        EngineError(Box::new(e))
    }
}

impl From<std::io::Error> for EngineError {
    fn from(e: std::io::Error) -> Self {
        EngineError(Box::new(e))
    }
}

impl From<String> for EngineError {
    fn from(s: String) -> Self {
        EngineError(Box::new(std::io::Error::new(std::io::ErrorKind::Other, s)))
    }
}

impl From<&str> for EngineError {
    fn from(s: &str) -> Self {
        EngineError::from(s.to_string())
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;

/// Per-request/connection error taxonomy. Unlike `EngineError`, these never
/// abort the process — the reactor and workers recover at the connection
/// boundary (see the module docs on `Connection::close`).
#[derive(Debug)]
pub enum RequestError {
    /// `EAGAIN`/`EINTR` — retry once the fd is readiness-notified again.
    TransientIo,
    /// Peer closed: a zero-length read, `ECONNRESET`, `EPIPE`, or rdhup.
    PeerClosed,
    /// Malformed request bytes; respond 400 and close.
    ParseError(String),
    /// Requested path does not exist under `srcDir`.
    FileNotFound,
    /// Requested path exists but is not readable.
    Forbidden,
    /// Worker queue full after the configured wait, or `userCount` at the
    /// fd ceiling.
    ResourceExhaustion,
}

impl Display for RequestError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            RequestError::TransientIo => write!(f, "transient I/O, retry on next readiness"),
            RequestError::PeerClosed => write!(f, "peer closed the connection"),
            RequestError::ParseError(msg) => write!(f, "malformed request: {msg}"),
            RequestError::FileNotFound => write!(f, "requested resource not found"),
            RequestError::Forbidden => write!(f, "requested resource not readable"),
            RequestError::ResourceExhaustion => write!(f, "resource exhaustion"),
        }
    }
}

impl std::error::Error for RequestError {}

/// Classifies a connection-socket I/O failure into the taxonomy above.
/// `WouldBlock` never reaches here — callers retry on it before falling
/// through to the generic error arm; `Interrupted` is likewise retried
/// inside the buffer's read/write loop, so in practice only the fallback
/// arm fires, but both are matched so the mapping stays total.
pub fn classify_io_error(e: &std::io::Error) -> RequestError {
    match e.kind() {
        std::io::ErrorKind::Interrupted => RequestError::TransientIo,
        _ => RequestError::PeerClosed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interrupted_is_transient() {
        let e = std::io::Error::new(std::io::ErrorKind::Interrupted, "eintr");
        assert!(matches!(classify_io_error(&e), RequestError::TransientIo));
    }

    #[test]
    fn connection_reset_is_peer_closed() {
        let e = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "econnreset");
        assert!(matches!(classify_io_error(&e), RequestError::PeerClosed));
    }

    #[test]
    fn request_error_variants_display_a_message() {
        assert!(!RequestError::ResourceExhaustion.to_string().is_empty());
        assert!(!RequestError::ParseError("bad".to_string()).to_string().is_empty());
        assert!(!RequestError::FileNotFound.to_string().is_empty());
        assert!(!RequestError::Forbidden.to_string().is_empty());
    }
}
