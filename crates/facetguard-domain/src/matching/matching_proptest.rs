//! Property-based tests for facet matching.

use std::collections::BTreeSet;
use std::sync::Arc;

use proptest::prelude::*;

use super::MatchContext;
use crate::evaluator::tests::mocks::MockNodeProvider;
use crate::model::{
    DomainRule, FacetAuthDomain, FacetKind, FacetRule, NodeFacetView, NodeId, Principal,
    PropertyValue, UserPrincipal,
};
use crate::revalidator::ReferenceTable;

fn fixture() -> (MockNodeProvider, NodeFacetView) {
    let provider = MockNodeProvider::new();
    provider.add_supertype("doc:article", "hippo:document");
    provider.add("/content", "root-content", "hippostd:folder");
    provider.add_view(
        "/content/article",
        NodeFacetView::new("n1", None, "", "doc:article")
            .with_property("state", vec![PropertyValue::String("draft".to_string())])
            .with_property(
                "tags",
                vec![
                    PropertyValue::String("a".to_string()),
                    PropertyValue::String("b".to_string()),
                ],
            ),
    );
    let node = provider
        .get_view(&NodeId::new("n1"))
        .unwrap_or_else(|| panic!("fixture node missing"));
    (provider, node)
}

fn domain(rules: Vec<DomainRule>) -> FacetAuthDomain {
    FacetAuthDomain {
        name: "d".to_string(),
        path: "/domains/d".to_string(),
        domain_rules: Arc::from(rules),
        roles: BTreeSet::new(),
        privileges: BTreeSet::new(),
        permissions: BTreeSet::new(),
    }
}

/// Rules whose facet is present on the fixture node.
fn present_rule_strategy() -> impl Strategy<Value = FacetRule> {
    let operand = prop::sample::select(vec![
        "doc:article",
        "hippo:document",
        "hippostd:folder",
        "n1",
        "article",
        "draft",
        "a",
        "b",
        "*",
        "__user__",
    ]);
    let kind = prop::sample::select(vec![
        FacetKind::NodeType,
        FacetKind::PrimaryType,
        FacetKind::Uuid,
        FacetKind::NodeName,
        FacetKind::PropertyValue {
            property: "state".to_string(),
        },
        FacetKind::PropertyValue {
            property: "tags".to_string(),
        },
    ]);
    (kind, operand).prop_map(|(kind, operand)| FacetRule::new(kind, operand))
}

proptest! {
    #[test]
    fn test_equality_false_inverts_result(rule in present_rule_strategy()) {
        let (provider, node) = fixture();
        let principal = Principal::User(UserPrincipal::new("alice"));
        let refs = ReferenceTable::default();
        let ctx = MatchContext::new(&principal, &provider, &refs);
        let fad = domain(Vec::new());

        let positive = ctx.matches_facet_rule(&node, &rule.clone().with_equality(true), &fad);
        let negative = ctx.matches_facet_rule(&node, &rule.with_equality(false), &fad);
        prop_assert_eq!(negative, !positive);
    }

    #[test]
    fn test_domain_rule_is_conjunction(a in present_rule_strategy(), b in present_rule_strategy()) {
        let (provider, node) = fixture();
        let principal = Principal::User(UserPrincipal::new("alice"));
        let refs = ReferenceTable::default();
        let ctx = MatchContext::new(&principal, &provider, &refs);
        let fad = domain(Vec::new());

        let expected = ctx.matches_facet_rule(&node, &a, &fad) && ctx.matches_facet_rule(&node, &b, &fad);
        let rule = DomainRule::new("ab", vec![a, b]);
        prop_assert_eq!(ctx.matches_domain_rule(&node, &rule, &fad), expected);
    }

    #[test]
    fn test_domain_is_disjunction(a in present_rule_strategy(), b in present_rule_strategy()) {
        let (provider, node) = fixture();
        let principal = Principal::User(UserPrincipal::new("alice"));
        let refs = ReferenceTable::default();
        let ctx = MatchContext::new(&principal, &provider, &refs);

        let r1 = DomainRule::new("r1", vec![a]);
        let r2 = DomainRule::new("r2", vec![b]);
        let fad = domain(vec![r1.clone(), r2.clone()]);
        let expected = ctx.matches_domain_rule(&node, &r1, &fad) || ctx.matches_domain_rule(&node, &r2, &fad);
        prop_assert_eq!(ctx.matches_any_domain_rule(&node, &fad), expected);
    }

    #[test]
    fn test_wildcard_property_matches_any_present_value(value in "[a-z0-9]{1,12}") {
        let (provider, _) = fixture();
        provider.add_view(
            "/content/other",
            NodeFacetView::new("n2", None, "", "doc:article")
                .with_property("state", vec![PropertyValue::String(value)]),
        );
        let node = provider.get_view(&NodeId::new("n2")).unwrap_or_else(|| panic!("missing n2"));
        let principal = Principal::User(UserPrincipal::new("alice"));
        let refs = ReferenceTable::default();
        let ctx = MatchContext::new(&principal, &provider, &refs);
        let rule = FacetRule::new(FacetKind::PropertyValue { property: "state".to_string() }, "*");
        prop_assert!(ctx.matches_facet_rule(&node, &rule, &domain(Vec::new())));
    }
}
