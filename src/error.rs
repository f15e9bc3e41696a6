//! Crate-wide error type and status-code mapping.
//!
//! All backend failures collapse into [`Error`]; the session layer further
//! maps these onto the coarse wire status codes from §6/§7 of the protocol
//! (see [`Error::status_code`]).

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("database error: {0}")]
    Store(String),

    #[error("lock error: {0}")]
    Lock(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("invalid value: {0}")]
    InvalidValue(String),

    #[error("invalid signature")]
    InvalidSignature,

    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("busy: {0}")]
    Busy(String),

    #[error("rejected: {0}")]
    Rejected(String),

    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    #[error("regex timeout")]
    RegexTimeout,

    #[error("tls error: {0}")]
    Tls(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Coarse response status, wire-compatible with the externally-defined
/// message codec (§6). Session handlers convert every [`Error`] into one
/// of these before writing a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    Ok,
    ErrorProtocolViolation,
    ErrorUnsupported,
    ErrorInvalidSignature,
    ErrorInvalidValue,
    ErrorBusy,
    ErrorRejected,
    ErrorNotFound,
    ErrorInternal,
}

impl Error {
    /// Maps a backend error to the wire status returned to the peer.
    /// Only [`Error::Internal`]-class failures should ever reach the top
    /// level task supervisor (see `lifecycle`); everything else is
    /// expected, per-request failure handled here.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::NotFound(_) => StatusCode::ErrorNotFound,
            Error::AlreadyExists(_) => StatusCode::ErrorInvalidValue,
            Error::InvalidValue(_) => StatusCode::ErrorInvalidValue,
            Error::InvalidSignature => StatusCode::ErrorInvalidSignature,
            Error::ProtocolViolation(_) => StatusCode::ErrorProtocolViolation,
            Error::Unsupported(_) => StatusCode::ErrorUnsupported,
            Error::Busy(_) => StatusCode::ErrorBusy,
            Error::Rejected(_) => StatusCode::ErrorRejected,
            Error::RegexTimeout => StatusCode::ErrorInvalidValue,
            Error::ResourceExhausted(_) => StatusCode::ErrorInternal,
            Error::Io(_)
            | Error::Store(_)
            | Error::Lock(_)
            | Error::Tls(_)
            | Error::Network(_)
            | Error::Serialization(_)
            | Error::Config(_)
            | Error::Internal(_) => StatusCode::ErrorInternal,
        }
    }

    /// True for invariant-level failures that should propagate to the
    /// process supervisor and trigger a coordinated shutdown, rather than
    /// being swallowed into a per-request status.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Store(s) if s.starts_with("invariant violated"))
    }
}

impl From<rusqlite::Error> for Error {
    fn from(e: rusqlite::Error) -> Self {
        Error::Store(e.to_string())
    }
}
