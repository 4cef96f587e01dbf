//! Property-based tests for model types.

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use crate::model::{decode_name, Domain, FacetKind, FacetRuleDefinition, FacetValueType};

    /// Strategy generating property facet names like "hippo:state".
    fn property_facet_strategy() -> impl Strategy<Value = String> {
        ("[a-z]{1,8}", "[a-zA-Z]{1,12}").prop_map(|(ns, local)| format!("{ns}:{local}"))
    }

    proptest! {
        #[test]
        fn test_definition_preserves_flags(
            facet in property_facet_strategy(),
            value in "[a-z0-9*]{0,12}",
            equals in any::<bool>(),
            optional in any::<bool>(),
        ) {
            prop_assume!(facet != "jcr:primaryType" && facet != "jcr:uuid" && facet != "jcr:path");
            let def = FacetRuleDefinition {
                facet: facet.clone(),
                value: value.clone(),
                value_type: FacetValueType::String,
                equals,
                optional,
            };
            let rule = def.to_rule().unwrap();
            prop_assert_eq!(rule.equality(), equals);
            prop_assert_eq!(rule.optional(), optional);
            prop_assert_eq!(rule.operand(), value.as_str());
            prop_assert_eq!(rule.kind(), &FacetKind::PropertyValue { property: facet });
        }

        #[test]
        fn test_path_definitions_always_reference(path in "(/[a-z]{1,8}){1,5}", equals in any::<bool>()) {
            let mut def = FacetRuleDefinition::new("jcr:path", path.clone());
            def.equals = equals;
            let rule = def.to_rule().unwrap();
            prop_assert!(rule.is_reference());
            prop_assert_eq!(rule.reference_id(), Some(path.as_str()));
        }

        #[test]
        fn test_decode_is_identity_without_escapes(name in "[a-zA-Z0-9:. -]{0,30}") {
            prop_assert_eq!(decode_name(&name), name);
        }

        #[test]
        fn test_domains_below_location_are_within(segment in "[a-z]{1,10}") {
            let locations = vec!["/hippo:configuration/hippo:domains".to_string()];
            let domain = Domain::new(format!("/hippo:configuration/hippo:domains/{segment}"));
            prop_assert!(domain.is_within(&locations));
            prop_assert_eq!(domain.name(), segment.as_str());
        }
    }
}
