//! Storage error types.

use facetguard_domain::DomainError;
use thiserror::Error;

/// Storage-specific errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    /// No node lives at the path.
    #[error("node not found: {path}")]
    NodeNotFound { path: String },

    /// A node already lives at the path.
    #[error("node already exists: {path}")]
    NodeAlreadyExists { path: String },

    /// The identifier is already taken by another node.
    #[error("node id already in use: {node_id}")]
    DuplicateNodeId { node_id: String },

    /// The path is not absolute or has empty segments.
    #[error("invalid path '{path}': {message}")]
    InvalidPath { path: String, message: String },

    /// The root node cannot be removed or moved.
    #[error("the root node cannot be {operation}")]
    RootImmutable { operation: &'static str },

    /// No role with that name is stored.
    #[error("role not found: {role}")]
    RoleNotFound { role: String },

    /// No domain is stored at the path.
    #[error("domain not found: {path}")]
    DomainNotFound { path: String },
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

impl From<StorageError> for DomainError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NodeNotFound { path } => DomainError::PathNotFound { path },
            other => DomainError::ProviderError {
                message: other.to_string(),
            },
        }
    }
}
