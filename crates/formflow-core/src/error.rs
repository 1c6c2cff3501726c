//! Error kinds surfaced by the diff and version-control engine.

use thiserror::Error;

/// Every failure the engine can report.
///
/// Collaborator failures (`GenerationFailed`, `PersistenceFailed`) carry the
/// collaborator's message unchanged so callers can surface it verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormError {
    /// The schema is structurally invalid (duplicate ids, missing fields, limits).
    #[error("invalid schema: {0}")]
    InvalidSchema(String),

    /// Undo was requested while the history holds only the initial version.
    #[error("Already at initial version")]
    NoHistoryToUndo,

    /// Another mutating request is pending review or still in flight for this form.
    #[error("an edit is already pending review or in progress for this form")]
    ReviewInProgress,

    /// The schema generator failed or timed out.
    #[error("schema generation failed: {0}")]
    GenerationFailed(String),

    /// The persistence layer failed to load or store a form.
    #[error("persistence failed: {0}")]
    PersistenceFailed(String),

    /// No form exists with the given id.
    #[error("form not found: {0}")]
    NotFound(String),

    /// Request input (prompt, documents, answers) failed validation.
    #[error("{0}")]
    InvalidRequest(String),
}

impl FormError {
    /// Machine-readable code used in HTTP error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidSchema(_) => "invalid_schema",
            Self::NoHistoryToUndo => "no_history_to_undo",
            Self::ReviewInProgress => "review_in_progress",
            Self::GenerationFailed(_) => "generation_failed",
            Self::PersistenceFailed(_) => "persistence_failed",
            Self::NotFound(_) => "not_found",
            Self::InvalidRequest(_) => "bad_request",
        }
    }

    pub fn invalid_schema(msg: impl Into<String>) -> Self {
        Self::InvalidSchema(msg.into())
    }

    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    /// Wrap a generator failure, keeping the full context chain.
    pub fn generation(err: impl std::fmt::Display) -> Self {
        Self::GenerationFailed(format!("{:#}", err))
    }

    /// Wrap a store failure, keeping the full context chain.
    pub fn persistence(err: impl std::fmt::Display) -> Self {
        Self::PersistenceFailed(format!("{:#}", err))
    }
}

pub type FormResult<T> = std::result::Result<T, FormError>;
