//! Raw, deserializable rule definitions and their conversion into the model.
//!
//! Definitions are what a configuration source hands over. Converting a
//! domain definition never fails as a whole: a broken facet rule drops the
//! enclosing domain rule with a warning and the rest of the domain survives.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{DomainError, DomainResult};

use super::types::{AuthRole, Domain, DomainRule, FacetKind, FacetRule, FacetValueType};

/// Raw facet rule as found in configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FacetRuleDefinition {
    pub facet: String,
    pub value: String,
    #[serde(rename = "type", default)]
    pub value_type: FacetValueType,
    #[serde(default = "default_true")]
    pub equals: bool,
    #[serde(default)]
    pub optional: bool,
}

fn default_true() -> bool {
    true
}

/// Raw domain rule: a name and its facet rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainRuleDefinition {
    pub name: String,
    #[serde(default)]
    pub facet_rules: Vec<FacetRuleDefinition>,
}

/// Raw domain: path, rules and role assignments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainDefinition {
    pub path: String,
    #[serde(default)]
    pub domain_rules: Vec<DomainRuleDefinition>,
    #[serde(default)]
    pub auth_roles: Vec<AuthRole>,
}

impl FacetRuleDefinition {
    pub fn new(facet: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            facet: facet.into(),
            value: value.into(),
            value_type: FacetValueType::String,
            equals: true,
            optional: false,
        }
    }

    /// Converts the definition into a facet rule.
    ///
    /// `jcr:path` rules are always reference rules: their value is the
    /// target path.
    pub fn to_rule(&self) -> DomainResult<FacetRule> {
        let facet = self.facet.trim();
        if facet.is_empty() {
            return Err(DomainError::InvalidFacetRule {
                facet: self.facet.clone(),
                message: "facet name cannot be empty".to_string(),
            });
        }

        let kind = match facet {
            "jcr:primaryType" => FacetKind::PrimaryType,
            "nodetype" => FacetKind::NodeType,
            "nodename" => FacetKind::NodeName,
            "jcr:uuid" => FacetKind::Uuid,
            "jcr:path" => FacetKind::Path,
            other => FacetKind::PropertyValue {
                property: other.to_string(),
            },
        };

        let value_type = if kind == FacetKind::Path {
            FacetValueType::Reference
        } else {
            self.value_type
        };

        if value_type == FacetValueType::Reference
            && matches!(
                kind,
                FacetKind::NodeType | FacetKind::NodeName | FacetKind::PrimaryType
            )
        {
            return Err(DomainError::InvalidFacetRule {
                facet: self.facet.clone(),
                message: "reference values are only allowed on uuid, path and property facets"
                    .to_string(),
            });
        }

        Ok(FacetRule::new(kind, self.value.clone())
            .with_value_type(value_type)
            .with_equality(self.equals)
            .with_optional(self.optional))
    }
}

impl DomainRuleDefinition {
    pub fn to_rule(&self) -> DomainResult<DomainRule> {
        let facet_rules = self
            .facet_rules
            .iter()
            .map(FacetRuleDefinition::to_rule)
            .collect::<DomainResult<Vec<_>>>()?;
        Ok(DomainRule::new(self.name.clone(), facet_rules))
    }
}

impl DomainDefinition {
    /// Converts the definition, skipping domain rules that fail to convert.
    pub fn to_domain(&self) -> Domain {
        let mut domain = Domain::new(self.path.clone());
        for rule_def in &self.domain_rules {
            match rule_def.to_rule() {
                Ok(rule) => domain.domain_rules.push(rule),
                Err(err) => warn!(
                    domain = %self.path,
                    rule = %rule_def.name,
                    error = %err,
                    "skipping invalid domain rule"
                ),
            }
        }
        domain.auth_roles = self.auth_roles.clone();
        domain
    }
}
