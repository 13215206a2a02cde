use crate::types::DbId;

/// Domain-level error type shared across the workspace.
///
/// HTTP mapping happens in the api crate; this enum stays transport-agnostic.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// An entity lookup came back empty.
    #[error("{entity} with id {id} not found")]
    NotFound { entity: &'static str, id: DbId },

    /// A configuration or input rule was violated.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The request conflicts with current state (e.g. terminal batch).
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The requested mode or feature has no implementation.
    #[error("Not implemented: {0}")]
    NotImplemented(String),

    /// An unexpected internal failure.
    #[error("Internal error: {0}")]
    Internal(String),
}
