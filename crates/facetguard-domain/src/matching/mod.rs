//! Facet matching engine.
//!
//! Pure evaluation of node facets against domain rules. A domain rule
//! matches when all of its facet rules match (AND); a resolved domain matches
//! when any of its domain rules matches (OR, first match wins).
//!
//! Every facet rule with `equality == false` inverts its result, with three
//! exceptions that are decided before inversion:
//! - an unresolved reference matches iff `equality == false`
//! - an absent property matches iff the rule is optional, or is an inequality wildcard
//! - binary properties and non-Name-typed node name rules never match

use tracing::trace;

use crate::cache::TypeCache;
use crate::model::{
    DomainRule, FacetAuthDomain, FacetKind, FacetRule, FacetValueType, NodeFacetView, NodeId,
    Principal, PropertyValue, EXPANDER_GROUP, EXPANDER_ROLE, EXPANDER_USER,
};
use crate::provider::NodeFacetProvider;
use crate::revalidator::ReferenceTable;

#[cfg(test)]
mod matching_proptest;

/// Upper bound on ancestor walks, guarding against cyclic parent links.
const MAX_ANCESTOR_DEPTH: usize = 4096;

/// Everything a facet match needs besides the node and the rule.
#[derive(Clone, Copy)]
pub struct MatchContext<'a> {
    pub principal: &'a Principal,
    pub provider: &'a dyn NodeFacetProvider,
    pub references: &'a ReferenceTable,
    pub types: Option<&'a TypeCache>,
}

impl<'a> MatchContext<'a> {
    pub fn new(
        principal: &'a Principal,
        provider: &'a dyn NodeFacetProvider,
        references: &'a ReferenceTable,
    ) -> Self {
        Self {
            principal,
            provider,
            references,
            types: None,
        }
    }

    /// Memoises type hierarchy answers in `types`.
    pub fn with_type_cache(mut self, types: &'a TypeCache) -> Self {
        self.types = Some(types);
        self
    }

    /// Returns true when any domain rule of `auth_domain` matches the node.
    pub fn matches_any_domain_rule(&self, node: &NodeFacetView, auth_domain: &FacetAuthDomain) -> bool {
        self.first_matching_rule(node, auth_domain).is_some()
    }

    /// Returns the first domain rule of `auth_domain` matching the node.
    pub fn first_matching_rule<'d>(
        &self,
        node: &NodeFacetView,
        auth_domain: &'d FacetAuthDomain,
    ) -> Option<&'d DomainRule> {
        auth_domain
            .domain_rules
            .iter()
            .find(|rule| self.matches_domain_rule(node, rule, auth_domain))
    }

    /// Returns true when every facet rule of `rule` matches the node.
    pub fn matches_domain_rule(
        &self,
        node: &NodeFacetView,
        rule: &DomainRule,
        auth_domain: &FacetAuthDomain,
    ) -> bool {
        if rule.is_empty() {
            return false;
        }
        let matched = rule
            .facet_rules
            .iter()
            .all(|facet_rule| self.matches_facet_rule(node, facet_rule, auth_domain));
        if matched {
            trace!(node = %node.id, domain = %auth_domain.name, rule = %rule.name, "domain rule matched");
        }
        matched
    }

    /// Evaluates a single facet rule.
    pub fn matches_facet_rule(
        &self,
        node: &NodeFacetView,
        rule: &FacetRule,
        auth_domain: &FacetAuthDomain,
    ) -> bool {
        if rule.kind() == &FacetKind::Path && rule.is_wildcard() {
            return rule.equality();
        }

        // a wildcard has no target to resolve
        let operand = if rule.is_reference() && !rule.is_wildcard() {
            match self.references.target(rule.operand()) {
                Some(target) => target.as_str(),
                None => return !rule.equality(),
            }
        } else {
            rule.operand()
        };

        match rule.kind() {
            FacetKind::NodeType => {
                let matched = self.is_type(&node.primary_type, operand)
                    || node.mixin_types.iter().any(|m| self.is_type(m, operand));
                matched == rule.equality()
            }
            FacetKind::PrimaryType => (node.primary_type == operand) == rule.equality(),
            FacetKind::Uuid => (node.id.as_str() == operand) == rule.equality(),
            FacetKind::Path => self.is_self_or_descendant(node, operand) == rule.equality(),
            FacetKind::NodeName => {
                if rule.value_type() != FacetValueType::Name {
                    return false;
                }
                let name = node.decoded_name();
                self.matches_value(&name, operand, rule.is_wildcard(), auth_domain)
                    == rule.equality()
            }
            FacetKind::PropertyValue { property } => {
                self.matches_property(node, property, operand, rule, auth_domain)
            }
        }
    }

    fn matches_property(
        &self,
        node: &NodeFacetView,
        property: &str,
        operand: &str,
        rule: &FacetRule,
        auth_domain: &FacetAuthDomain,
    ) -> bool {
        let Some(values) = node.property(property) else {
            return rule.optional() || (rule.is_wildcard() && !rule.equality());
        };
        if values.iter().any(PropertyValue::is_binary) {
            return false;
        }
        let matched = rule.is_wildcard()
            || values.iter().filter_map(PropertyValue::as_text).any(|value| {
                if rule.is_reference() {
                    value == operand
                } else {
                    self.matches_value(&value, operand, false, auth_domain)
                }
            });
        matched == rule.equality()
    }

    /// Literal comparison honouring the wildcard and the three expanders.
    fn matches_value(
        &self,
        value: &str,
        operand: &str,
        wildcard: bool,
        auth_domain: &FacetAuthDomain,
    ) -> bool {
        if wildcard {
            return true;
        }
        match operand {
            EXPANDER_USER => self.principal.has_user_id(value),
            EXPANDER_GROUP => self.principal.has_group_id(value),
            EXPANDER_ROLE => auth_domain.roles.contains(value),
            literal => value == literal,
        }
    }

    fn is_type(&self, type_name: &str, ancestor: &str) -> bool {
        match self.types {
            Some(cache) => cache.get_or_compute(type_name, ancestor, || {
                self.provider.is_type_or_subtype(type_name, ancestor)
            }),
            None => self.provider.is_type_or_subtype(type_name, ancestor),
        }
    }

    /// Returns true when the node or one of its ancestors has id `target`.
    fn is_self_or_descendant(&self, node: &NodeFacetView, target: &str) -> bool {
        if node.id.as_str() == target {
            return true;
        }
        let mut current: Option<NodeId> = node.parent_id.clone();
        let mut depth = 0;
        while let Some(id) = current {
            if id.as_str() == target {
                return true;
            }
            depth += 1;
            if depth > MAX_ANCESTOR_DEPTH {
                return false;
            }
            current = self.provider.get_parent_id(&id);
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::sync::Arc;

    use super::*;
    use crate::evaluator::tests::mocks::MockNodeProvider;
    use crate::model::{FacetRuleDefinition, PropertyValue, UserPrincipal};

    fn auth_domain(rules: Vec<DomainRule>) -> FacetAuthDomain {
        FacetAuthDomain {
            name: "content".to_string(),
            path: "/hippo:configuration/hippo:domains/content".to_string(),
            domain_rules: Arc::from(rules),
            roles: ["editor".to_string()].into_iter().collect(),
            privileges: BTreeSet::new(),
            permissions: BTreeSet::new(),
        }
    }

    fn alice() -> Principal {
        Principal::User(
            UserPrincipal::new("alice")
                .with_group("authors")
                .with_user_role("xm.content.author"),
        )
    }

    fn provider() -> MockNodeProvider {
        let provider = MockNodeProvider::new();
        provider.add_supertype("doc:article", "hippo:document");
        provider.add("/content", "c0", "hippostd:folder");
        provider.add("/content/news", "c1", "hippostd:folder");
        provider.add_view(
            "/content/news/my_x0020_article",
            NodeFacetView::new("c2", None, "", "doc:article")
                .with_mixin("mix:referenceable")
                .with_property(
                    "hippostd:state",
                    vec![PropertyValue::String("published".to_string())],
                )
                .with_property("owner", vec![PropertyValue::String("alice".to_string())])
                .with_property("team", vec![PropertyValue::Name("authors".to_string())])
                .with_property("access", vec![PropertyValue::String("editor".to_string())])
                .with_property("blob", vec![PropertyValue::Binary(vec![0, 1])])
                .with_property("related", vec![PropertyValue::Reference(NodeId::new("c1"))]),
        );
        provider
    }

    fn check(provider: &MockNodeProvider, refs: &ReferenceTable, rule: FacetRule) -> bool {
        let principal = alice();
        let ctx = MatchContext::new(&principal, provider, refs);
        let node = provider.get_facets(&NodeId::new("c2")).unwrap();
        ctx.matches_facet_rule(&node, &rule, &auth_domain(Vec::new()))
    }

    #[test]
    fn test_nodetype_matches_supertypes_and_mixins() {
        let p = provider();
        let refs = ReferenceTable::default();
        assert!(check(&p, &refs, FacetRule::new(FacetKind::NodeType, "doc:article")));
        assert!(check(&p, &refs, FacetRule::new(FacetKind::NodeType, "hippo:document")));
        assert!(check(&p, &refs, FacetRule::new(FacetKind::NodeType, "mix:referenceable")));
        assert!(!check(&p, &refs, FacetRule::new(FacetKind::NodeType, "hippostd:folder")));
        assert!(check(
            &p,
            &refs,
            FacetRule::new(FacetKind::NodeType, "hippostd:folder").with_equality(false)
        ));
    }

    #[test]
    fn test_primary_type_is_exact() {
        let p = provider();
        let refs = ReferenceTable::default();
        assert!(check(&p, &refs, FacetRule::new(FacetKind::PrimaryType, "doc:article")));
        assert!(!check(&p, &refs, FacetRule::new(FacetKind::PrimaryType, "hippo:document")));
    }

    #[test]
    fn test_nodename_uses_decoded_name_and_expanders() {
        let p = provider();
        let refs = ReferenceTable::default();
        assert!(check(&p, &refs, FacetRule::new(FacetKind::NodeName, "my article")));
        assert!(!check(&p, &refs, FacetRule::new(FacetKind::NodeName, "my_x0020_article")));

        p.add("/content/alice", "home", "hippostd:folder");
        let principal = alice();
        let ctx = MatchContext::new(&principal, &p, &refs);
        let node = p.get_facets(&NodeId::new("home")).unwrap();
        let rule = FacetRule::new(FacetKind::NodeName, EXPANDER_USER);
        assert!(ctx.matches_facet_rule(&node, &rule, &auth_domain(Vec::new())));
    }

    #[test]
    fn test_string_typed_nodename_never_matches() {
        let p = provider();
        let refs = ReferenceTable::default();
        let rule = FacetRule::new(FacetKind::NodeName, "my article")
            .with_value_type(FacetValueType::String);
        assert!(!check(&p, &refs, rule.clone()));
        assert!(!check(&p, &refs, rule.with_equality(false)));
    }

    #[test]
    fn test_property_literal_and_expanders() {
        let p = provider();
        let refs = ReferenceTable::default();
        let prop = |name: &str| FacetKind::PropertyValue {
            property: name.to_string(),
        };
        assert!(check(&p, &refs, FacetRule::new(prop("hippostd:state"), "published")));
        assert!(!check(&p, &refs, FacetRule::new(prop("hippostd:state"), "draft")));
        assert!(check(&p, &refs, FacetRule::new(prop("owner"), EXPANDER_USER)));
        assert!(check(&p, &refs, FacetRule::new(prop("team"), EXPANDER_GROUP)));
        assert!(check(&p, &refs, FacetRule::new(prop("access"), EXPANDER_ROLE)));
    }

    #[test]
    fn test_property_wildcard_and_absence() {
        let p = provider();
        let refs = ReferenceTable::default();
        let prop = |name: &str| FacetKind::PropertyValue {
            property: name.to_string(),
        };
        assert!(check(&p, &refs, FacetRule::new(prop("hippostd:state"), "*")));
        assert!(!check(&p, &refs, FacetRule::new(prop("missing"), "*")));
        assert!(check(
            &p,
            &refs,
            FacetRule::new(prop("missing"), "*").with_optional(true)
        ));
        assert!(check(
            &p,
            &refs,
            FacetRule::new(prop("missing"), "*").with_equality(false)
        ));
        assert!(!check(
            &p,
            &refs,
            FacetRule::new(prop("missing"), "value").with_equality(false)
        ));
    }

    #[test]
    fn test_binary_property_never_matches() {
        let p = provider();
        let refs = ReferenceTable::default();
        let kind = FacetKind::PropertyValue {
            property: "blob".to_string(),
        };
        assert!(!check(&p, &refs, FacetRule::new(kind.clone(), "*")));
        assert!(!check(&p, &refs, FacetRule::new(kind, "*").with_equality(false)));
    }

    #[test]
    fn test_path_matches_self_and_ancestors() {
        let p = provider();
        let refs = ReferenceTable::resolve_all(["/content/news", "/content/other"], &p);
        assert!(check(&p, &refs, FacetRule::reference(FacetKind::Path, "/content/news")));
        assert!(check(&p, &refs, FacetRule::reference(FacetKind::Path, "*")));
        assert!(!check(
            &p,
            &refs,
            FacetRule::reference(FacetKind::Path, "/content/news").with_equality(false)
        ));
    }

    #[test]
    fn test_unresolved_reference_follows_equality() {
        let p = provider();
        let refs = ReferenceTable::resolve_all(["/content/other"], &p);
        assert!(!check(&p, &refs, FacetRule::reference(FacetKind::Path, "/content/other")));
        assert!(check(
            &p,
            &refs,
            FacetRule::reference(FacetKind::Path, "/content/other").with_equality(false)
        ));
    }

    #[test]
    fn test_reference_property_compares_resolved_id() {
        let p = provider();
        let refs = ReferenceTable::resolve_all(["/content/news"], &p);
        let rule = FacetRule::reference(
            FacetKind::PropertyValue {
                property: "related".to_string(),
            },
            "/content/news",
        );
        assert!(check(&p, &refs, rule));
    }

    #[test]
    fn test_domain_rule_is_and_and_domain_is_or() {
        let p = provider();
        let refs = ReferenceTable::default();
        let principal = alice();
        let ctx = MatchContext::new(&principal, &p, &refs);
        let node = p.get_facets(&NodeId::new("c2")).unwrap();

        let a = FacetRule::new(FacetKind::NodeType, "doc:article");
        let not_b = FacetRule::new(FacetKind::PrimaryType, "hippostd:folder");

        let both = DomainRule::new("both", vec![a.clone(), not_b.clone()]);
        let only_a = DomainRule::new("only-a", vec![a]);
        let empty = DomainRule::new("empty", Vec::new());

        let fad = auth_domain(vec![both.clone(), empty.clone()]);
        assert!(!ctx.matches_domain_rule(&node, &both, &fad));
        assert!(!ctx.matches_domain_rule(&node, &empty, &fad));
        assert!(!ctx.matches_any_domain_rule(&node, &fad));

        let fad = auth_domain(vec![both, only_a]);
        assert_eq!(
            ctx.first_matching_rule(&node, &fad).map(|r| r.name.as_str()),
            Some("only-a")
        );
    }

    #[test]
    fn test_type_cache_is_consulted() {
        let p = provider();
        let refs = ReferenceTable::default();
        let principal = alice();
        let types = TypeCache::new(16);
        let ctx = MatchContext::new(&principal, &p, &refs).with_type_cache(&types);
        let node = p.get_facets(&NodeId::new("c2")).unwrap();
        let rule = FacetRule::new(FacetKind::NodeType, "hippo:document");
        assert!(ctx.matches_facet_rule(&node, &rule, &auth_domain(Vec::new())));
        assert!(!types.is_empty());
    }

    #[test]
    fn test_wildcard_reference_property_matches_any_value() {
        // Arrange
        let p = provider();
        let refs = ReferenceTable::default();
        let definition = FacetRuleDefinition {
            value_type: FacetValueType::Reference,
            ..FacetRuleDefinition::new("related", "*")
        };
        let rule = definition.to_rule().unwrap();

        // Act
        let matched = check(&p, &refs, rule.clone());

        // Assert
        assert!(rule.is_reference());
        assert!(matched);
        assert!(!check(&p, &refs, rule.with_equality(false)));
        let missing = definition_rule("unrelated");
        assert!(!check(&p, &refs, missing.clone()));
        assert!(check(&p, &refs, missing.with_equality(false)));
    }

    fn definition_rule(property: &str) -> FacetRule {
        FacetRuleDefinition {
            value_type: FacetValueType::Reference,
            ..FacetRuleDefinition::new(property, "*")
        }
        .to_rule()
        .unwrap()
    }
}
