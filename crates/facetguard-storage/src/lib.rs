//! facetguard-storage: In-memory collaborators
//!
//! This crate provides in-memory implementations of everything the
//! authorization engine consumes:
//! - Content tree with a change feed and reference-update counter
//! - Role definitions with role inclusion
//! - Domain configuration
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │             facetguard-storage               │
//! ├─────────────────────────────────────────────┤
//! │  nodes.rs   - NodeFacetProvider + changes   │
//! │  roles.rs   - RoleProvider                  │
//! │  domains.rs - DomainSource                  │
//! └─────────────────────────────────────────────┘
//! ```

pub mod domains;
pub mod error;
pub mod nodes;
pub mod roles;

// Re-export commonly used types
pub use domains::MemoryDomainStore;
pub use error::{StorageError, StorageResult};
pub use nodes::{ListenerId, MemoryNodeStore, ROOT_ID};
pub use roles::{MemoryRoleStore, RoleDefinition};
