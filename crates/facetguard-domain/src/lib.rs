//! facetguard-domain: Facet-based authorization engine
//!
//! This crate contains the core authorization logic including:
//! - Facet rule model and rule definitions
//! - Domain resolution per principal, with a shared cache
//! - Facet matching of node state against domain rules
//! - Per-session read and privilege evaluation
//! - Reference rule revalidation
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │             facetguard-domain                │
//! ├─────────────────────────────────────────────┤
//! │  model/       - Rules, nodes, principals    │
//! │  resolver/    - Principal → domains cache   │
//! │  matching/    - Facet rule evaluation       │
//! │  evaluator/   - Read & privilege checks     │
//! │  revalidator/ - Reference rule tracking     │
//! │  cache/       - Per-session LRU caches      │
//! │  provider.rs  - Content tree collaborator   │
//! └─────────────────────────────────────────────┘
//! ```

pub mod cache;
pub mod error;
pub mod evaluator;
pub mod matching;
pub mod model;
pub mod provider;
pub mod resolver;
pub mod revalidator;

// Re-export commonly used types at the crate root
pub use cache::{register_cache_metrics, CacheMetricsSnapshot};
pub use error::{DomainError, DomainResult};
pub use evaluator::{AccessEvaluator, EvaluatorConfig, LifecycleState, NodeOrPath};
pub use provider::{ChangeEvent, ChangeKind, ChangeListener, NodeFacetProvider};
pub use resolver::{DomainResolver, DomainSource, ResolverConfig, RoleProvider};
