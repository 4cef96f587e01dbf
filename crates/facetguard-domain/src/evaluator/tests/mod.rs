//! Tests for the access evaluator.
//!
//! Organized by functionality:
//! - Lifecycle and the system principal
//! - Read checks (caching, ancestor rule, implicit reads, new nodes)
//! - Privilege checks and document inheritance
//! - Reference revalidation and change notifications
