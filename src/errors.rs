//! Core error taxonomy shared by every promptpm subsystem.
//!
//! Each variant carries a stable string code so the command surface
//! can map errors to exit codes without re-deriving the mapping from
//! the message text.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, PromptPmError>;

#[derive(Debug, Error)]
pub enum PromptPmError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    TestFailure(String),

    #[error("{0}")]
    Dependency(String),

    #[error("{0}")]
    PublishConflict(String),

    #[error("{0}")]
    Internal(String),
}

impl PromptPmError {
    /// The stable machine-readable code surfaced in CLI error payloads.
    pub fn code(&self) -> &'static str {
        match self {
            PromptPmError::Validation(_) => "VALIDATION_ERROR",
            PromptPmError::TestFailure(_) => "TEST_FAILURE",
            PromptPmError::Dependency(_) => "DEPENDENCY_ERROR",
            PromptPmError::PublishConflict(_) => "PUBLISH_CONFLICT",
            PromptPmError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn validation<S: Into<String>>(message: S) -> Self {
        PromptPmError::Validation(message.into())
    }

    pub fn dependency<S: Into<String>>(message: S) -> Self {
        PromptPmError::Dependency(message.into())
    }

    pub fn publish_conflict<S: Into<String>>(message: S) -> Self {
        PromptPmError::PublishConflict(message.into())
    }

    pub fn internal<S: Into<String>>(message: S) -> Self {
        PromptPmError::Internal(message.into())
    }
}

/// Anything that bubbles up from the filesystem is classified internal.
impl From<std::io::Error> for PromptPmError {
    fn from(err: std::io::Error) -> Self {
        PromptPmError::Internal(err.to_string())
    }
}
