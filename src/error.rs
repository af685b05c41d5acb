use thiserror::Error;

use crate::SessionId;

pub type Result<T> = std::result::Result<T, UcpError>;

/// Error taxonomy for the negotiation core.
///
/// No variant is fatal to the process: protocol errors and unknown sessions
/// are logged and dropped by the runtime, oracle errors route to the
/// deterministic fallback at each decision point, and persistence failures
/// never roll back in-memory state.
#[derive(Error, Debug)]
pub enum UcpError {
    #[error("invalid message: missing required field '{0}'")]
    MissingField(&'static str),

    #[error("invalid message: unknown message type '{0}'")]
    UnknownType(String),

    #[error("no active session: {0}")]
    SessionNotFound(SessionId),

    #[error("decision oracle unavailable: {0}")]
    OracleUnavailable(String),

    #[error("persistence failure: {0}")]
    Persistence(String),

    #[error("terms out of range: {0}")]
    OutOfRangeTerms(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("settlement failed: {0}")]
    Settlement(String),

    #[error("IO error: {0}")]
    Io(String),
}

impl From<serde_json::Error> for UcpError {
    fn from(err: serde_json::Error) -> Self {
        UcpError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for UcpError {
    fn from(err: std::io::Error) -> Self {
        UcpError::Io(err.to_string())
    }
}
