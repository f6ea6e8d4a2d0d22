/**
 * Failure taxonomy for the fetch layer, plus helpers for common error values
 */
use thiserror::Error;

/// Every failure that can flow through a coordinator, a join, or a subscription.
///
/// `Clone` is required: all callers joined to one in-flight fetch receive the same value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("transport failure: {0}")]
    Transport(String),

    #[error("could not decode response: {0}")]
    Decode(String),

    #[error("server returned status {code}: {message}")]
    Status { code: u16, message: String },

    #[error("session unavailable: {0}")]
    Session(String),

    #[error("stream failed: {0}")]
    Stream(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("internal error: {0}")]
    Internal(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Safe to retry with the same key once the in-flight handle has cleared
    Transient,
    /// Retrying the same input fails the same way
    Permanent,
    /// Identity prerequisite failed, nothing was started
    Session,
    Cancelled,
}

impl FetchError {
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Transport(_) | Self::Stream(_) => ErrorKind::Transient,
            Self::Status { code, .. } => {
                if matches!(*code, 408 | 429) || *code >= 500 {
                    ErrorKind::Transient
                } else {
                    ErrorKind::Permanent
                }
            }
            Self::Decode(_) | Self::Internal(_) => ErrorKind::Permanent,
            Self::Session(_) => ErrorKind::Session,
            Self::Cancelled => ErrorKind::Cancelled,
        }
    }

    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self.kind(), ErrorKind::Transient)
    }
}

/// Create an error for a poisoned mutex (indicates a prior panic while the lock was held)
#[must_use]
pub fn lock_poisoned_error(component: &str) -> FetchError {
    FetchError::Internal(format!(
        "{component} lock poisoned - a prior panic left the owner in an inconsistent state"
    ))
}

/// Create a `Decode` error for a payload of the wrong shape
#[must_use]
pub fn unexpected_payload_error(expected: &str, got: &str) -> FetchError {
    FetchError::Decode(format!("expected {expected} payload, got {got}"))
}
