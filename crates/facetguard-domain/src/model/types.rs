//! Core type definitions for the facet rule model.

use std::collections::BTreeSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Operand value that matches any facet value.
pub const WILDCARD: &str = "*";

/// Expander resolving to the ids of the current user.
pub const EXPANDER_USER: &str = "__user__";

/// Expander resolving to the groups of the current user.
pub const EXPANDER_GROUP: &str = "__group__";

/// Expander resolving to the roles granted by the evaluated domain.
pub const EXPANDER_ROLE: &str = "__role__";

/// Stable identifier of a node in the content tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(String);

impl NodeId {
    /// Creates a new node id.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for NodeId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for NodeId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// The node attribute a facet rule is evaluated against.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FacetKind {
    /// Primary type or any mixin is-a the operand type.
    NodeType,
    /// Decoded node name.
    NodeName,
    /// Stable node identifier.
    Uuid,
    /// Node or any of its ancestors is the operand node.
    Path,
    /// Exact primary type name, without subtyping.
    PrimaryType,
    /// Value of the named property.
    PropertyValue { property: String },
}

impl fmt::Display for FacetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FacetKind::NodeType => f.write_str("nodetype"),
            FacetKind::NodeName => f.write_str("nodename"),
            FacetKind::Uuid => f.write_str("jcr:uuid"),
            FacetKind::Path => f.write_str("jcr:path"),
            FacetKind::PrimaryType => f.write_str("jcr:primaryType"),
            FacetKind::PropertyValue { property } => f.write_str(property),
        }
    }
}

/// Declared type of a facet rule operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum FacetValueType {
    #[default]
    String,
    Name,
    Reference,
}

/// A single predicate over one node attribute.
///
/// The kind is fixed at construction; the operand is interpreted according
/// to it. Reference rules carry a logical reference (a path) as operand which
/// is resolved to a node id before matching.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FacetRule {
    kind: FacetKind,
    operand: String,
    value_type: FacetValueType,
    equality: bool,
    optional: bool,
}

impl FacetRule {
    /// Creates an equality rule with a String-typed operand.
    pub fn new(kind: FacetKind, operand: impl Into<String>) -> Self {
        let value_type = match kind {
            FacetKind::NodeName | FacetKind::NodeType | FacetKind::PrimaryType => {
                FacetValueType::Name
            }
            _ => FacetValueType::String,
        };
        Self {
            kind,
            operand: operand.into(),
            value_type,
            equality: true,
            optional: false,
        }
    }

    /// Creates a reference rule whose operand is the logical reference.
    pub fn reference(kind: FacetKind, reference_id: impl Into<String>) -> Self {
        Self {
            value_type: FacetValueType::Reference,
            ..Self::new(kind, reference_id)
        }
    }

    /// Sets the equality flag; `false` inverts the match result.
    pub fn with_equality(mut self, equality: bool) -> Self {
        self.equality = equality;
        self
    }

    /// Sets the optional flag; optional rules match nodes lacking the facet.
    pub fn with_optional(mut self, optional: bool) -> Self {
        self.optional = optional;
        self
    }

    /// Overrides the declared operand type.
    pub fn with_value_type(mut self, value_type: FacetValueType) -> Self {
        self.value_type = value_type;
        self
    }

    pub fn kind(&self) -> &FacetKind {
        &self.kind
    }

    pub fn operand(&self) -> &str {
        &self.operand
    }

    pub fn value_type(&self) -> FacetValueType {
        self.value_type
    }

    pub fn equality(&self) -> bool {
        self.equality
    }

    pub fn optional(&self) -> bool {
        self.optional
    }

    /// Returns true when the operand is a reference to another node.
    pub fn is_reference(&self) -> bool {
        self.value_type == FacetValueType::Reference
    }

    /// Returns the logical reference id for reference rules.
    pub fn reference_id(&self) -> Option<&str> {
        self.is_reference().then_some(self.operand.as_str())
    }

    /// Returns true when the operand is the wildcard.
    pub fn is_wildcard(&self) -> bool {
        self.operand == WILDCARD
    }
}

impl fmt::Display for FacetRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = if self.equality { "==" } else { "!=" };
        write!(f, "{} {} {}", self.kind, op, self.operand)?;
        if self.optional {
            f.write_str(" (optional)")?;
        }
        Ok(())
    }
}

/// A named conjunction of facet rules.
///
/// An empty domain rule never matches.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DomainRule {
    pub name: String,
    pub facet_rules: Vec<FacetRule>,
}

impl DomainRule {
    pub fn new(name: impl Into<String>, facet_rules: Vec<FacetRule>) -> Self {
        Self {
            name: name.into(),
            facet_rules,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.facet_rules.is_empty()
    }

    /// Iterates over the reference rules of this domain rule.
    pub fn reference_rules(&self) -> impl Iterator<Item = &FacetRule> {
        self.facet_rules.iter().filter(|r| r.is_reference())
    }
}

/// Assignment of one role to users, groups and a user role within a domain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthRole {
    /// Role granted by this assignment.
    pub role: String,
    #[serde(default)]
    pub users: BTreeSet<String>,
    #[serde(default)]
    pub groups: BTreeSet<String>,
    #[serde(default)]
    pub user_role: Option<String>,
}

impl AuthRole {
    pub fn new(role: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            ..Default::default()
        }
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.users.insert(user.into());
        self
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.groups.insert(group.into());
        self
    }

    pub fn with_user_role(mut self, user_role: impl Into<String>) -> Self {
        self.user_role = Some(user_role.into());
        self
    }
}

/// A path-addressed set of domain rules plus role assignments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Domain {
    /// Absolute configuration path, e.g. `/hippo:configuration/hippo:domains/content`.
    pub path: String,
    pub domain_rules: Vec<DomainRule>,
    pub auth_roles: Vec<AuthRole>,
}

impl Domain {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            domain_rules: Vec::new(),
            auth_roles: Vec::new(),
        }
    }

    pub fn with_rule(mut self, rule: DomainRule) -> Self {
        self.domain_rules.push(rule);
        self
    }

    pub fn with_auth_role(mut self, auth_role: AuthRole) -> Self {
        self.auth_roles.push(auth_role);
        self
    }

    /// Last path segment.
    pub fn name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }

    /// Returns true when the domain lives below one of `locations`.
    pub fn is_within(&self, locations: &[String]) -> bool {
        locations.iter().any(|location| {
            let location = location.trim_end_matches('/');
            self.path
                .strip_prefix(location)
                .is_some_and(|rest| rest.len() > 1 && rest.starts_with('/'))
        })
    }

    /// Union of role names granted to the principal through users, groups and user roles.
    pub fn roles_for(
        &self,
        user_id: &str,
        group_ids: &BTreeSet<String>,
        user_role_ids: &BTreeSet<String>,
    ) -> BTreeSet<String> {
        self.auth_roles
            .iter()
            .filter(|ar| {
                ar.users.contains(user_id)
                    || !ar.groups.is_disjoint(group_ids)
                    || ar
                        .user_role
                        .as_ref()
                        .is_some_and(|ur| user_role_ids.contains(ur))
            })
            .map(|ar| ar.role.clone())
            .collect()
    }
}

/// Resolution of a [`Domain`] for one principal.
///
/// Equality and hashing use the domain name only.
#[derive(Debug, Clone)]
pub struct FacetAuthDomain {
    pub name: String,
    pub path: String,
    pub domain_rules: Arc<[DomainRule]>,
    /// Role names granted to the principal.
    pub roles: BTreeSet<String>,
    /// Privilege names the roles carry, as configured.
    pub privileges: BTreeSet<String>,
    /// Leaf privilege names after aggregate expansion.
    pub permissions: BTreeSet<String>,
}

impl FacetAuthDomain {
    /// Returns true when the domain grants the given leaf privilege.
    pub fn grants(&self, permission: &str) -> bool {
        self.permissions.contains(permission)
    }

    /// Folds another resolution of the same domain into this one.
    pub fn absorb(&mut self, other: &FacetAuthDomain) {
        self.roles.extend(other.roles.iter().cloned());
        self.privileges.extend(other.privileges.iter().cloned());
        self.permissions.extend(other.permissions.iter().cloned());
    }
}

impl PartialEq for FacetAuthDomain {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for FacetAuthDomain {}

impl Hash for FacetAuthDomain {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}
