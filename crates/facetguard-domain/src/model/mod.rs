//! Facet rule model.
//!
//! This module contains:
//! - Rule types (FacetRule, DomainRule, Domain, FacetAuthDomain)
//! - The node facet view the matching engine reads
//! - Principals and the privilege registry
//! - Raw, deserializable rule definitions

mod definition;
mod node;
mod principal;
pub mod privileges;
mod types;
#[cfg(test)]
mod types_proptest;

pub use definition::{DomainDefinition, DomainRuleDefinition, FacetRuleDefinition};
pub use node::{decode_name, NodeFacetView, PropertyValue};
pub use principal::{Principal, UserPrincipal};
pub use privileges::PrivilegeRegistry;
pub use types::*;
