use crate::types::SessionCode;
use std::time::Duration;

/// Result type for raw store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Failures raised by the store adapter, independent of the backend.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store request timed out after {0:?}")]
    Timeout(Duration),

    #[error("store transport failure: {0}")]
    Transport(String),

    /// Missing column, malformed row, unparseable payload. Operator-facing
    /// misconfiguration, not retryable.
    #[error("store schema mismatch: {0}")]
    Schema(String),

    /// Row-level-security or credential rejection. Not retryable.
    #[error("store rejected the request: {0}")]
    Permission(String),

    #[error("this store backend does not support change subscriptions")]
    Unsupported,
}

impl StoreError {
    /// Transient failures are worth a bounded retry; schema and permission
    /// problems are not.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Timeout(_) | StoreError::Transport(_))
    }
}

/// Result type for session-level operations.
pub type SessionResult<T> = Result<T, SessionError>;

/// User-facing failures of the session engine.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Malformed input, rejected before any store call.
    #[error("{0}")]
    Validation(String),

    #[error("session code {0} does not exist")]
    UnknownCode(SessionCode),

    #[error("no session matches the short code {0:?}")]
    UnknownShortCode(String),

    #[error("a participant named {0:?} already exists in this session")]
    NameTaken(String),

    #[error("could not allocate a unique session code, try again later")]
    CodeSpaceExhausted,

    #[error("no active round")]
    NoRound,

    #[error("category {0:?} has no words to draw from")]
    EmptyCategory(String),

    #[error("only the session admin can start a round")]
    NotAdmin,

    #[error("at least {need} participants are required, the session has {have}")]
    NotEnoughParticipants { have: usize, need: usize },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl SessionError {
    pub fn validation(message: impl Into<String>) -> SessionError {
        SessionError::Validation(message.into())
    }

    /// Whether retrying the same action can reasonably succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SessionError::Store(e) if e.is_transient())
    }
}
