//! Observability infrastructure for facetguard.
//!
//! - Structured logging configuration
//! - Cache metric registration (see [`crate::bootstrap`])

mod logging;

pub use logging::{create_json_layer, init_logging, LoggingConfig};
