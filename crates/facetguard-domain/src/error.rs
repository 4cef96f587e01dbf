//! Domain error types for authorization operations.

use thiserror::Error;

/// Domain-specific errors for authorization operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    /// A query was issued before the evaluator was initialized.
    #[error("access evaluator is not initialized")]
    NotInitialized,

    /// A query was issued after the evaluator was closed.
    #[error("access evaluator is already closed")]
    AlreadyClosed,

    /// The queried path does not resolve to a node.
    #[error("path not found: {path}")]
    PathNotFound { path: String },

    /// A domain lives outside the configured domain locations.
    #[error("invalid domain configuration at '{path}': {message}")]
    InvalidDomainConfiguration { path: String, message: String },

    /// Two resolved domains share the same name within one resolved set.
    #[error("ambiguous resolved domain: {name}")]
    AmbiguousResolvedDomain { name: String },

    /// The node facet provider has no state for a node expected to exist.
    #[error("missing node state: {node_id}")]
    MissingNodeState { node_id: String },

    /// A facet rule definition cannot be turned into a rule.
    #[error("invalid facet rule '{facet}': {message}")]
    InvalidFacetRule { facet: String, message: String },

    /// An external collaborator failed.
    #[error("provider error: {message}")]
    ProviderError { message: String },
}

/// Result type for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;
