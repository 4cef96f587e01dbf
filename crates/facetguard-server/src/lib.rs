//! facetguard-server: Configuration, bootstrap and sessions
//!
//! This crate wires the authorization engine together:
//! - Configuration loading (YAML + environment overrides)
//! - Logging initialisation
//! - Bootstrap of stores and resolver from configuration
//! - Session factory opening one evaluator per principal
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │             facetguard-server                │
//! ├─────────────────────────────────────────────┤
//! │  config.rs       - Configuration loading    │
//! │  observability/  - Logging setup            │
//! │  bootstrap.rs    - Engine wiring            │
//! │  session.rs      - Sessions + change feed   │
//! └─────────────────────────────────────────────┘
//! ```

pub mod bootstrap;
pub mod config;
pub mod observability;
pub mod session;

// Re-exports for convenience
pub use bootstrap::{build_session_factory, privilege_registry, start};
pub use config::{ConfigLoadError, FacetGuardConfig};
pub use session::{Evaluator, Resolver, Session, SessionFactory};
