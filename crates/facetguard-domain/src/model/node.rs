//! Read-only projection of a node used by the matching engine.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::types::NodeId;

/// A single property value as seen by the matching engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PropertyValue {
    String(String),
    Name(String),
    Reference(NodeId),
    Boolean(bool),
    Long(i64),
    Binary(Vec<u8>),
}

impl PropertyValue {
    /// String form used for literal comparison; `None` for binary values.
    pub fn as_text(&self) -> Option<String> {
        match self {
            PropertyValue::String(s) | PropertyValue::Name(s) => Some(s.clone()),
            PropertyValue::Reference(id) => Some(id.as_str().to_string()),
            PropertyValue::Boolean(b) => Some(b.to_string()),
            PropertyValue::Long(l) => Some(l.to_string()),
            PropertyValue::Binary(_) => None,
        }
    }

    pub fn is_binary(&self) -> bool {
        matches!(self, PropertyValue::Binary(_))
    }
}

/// The facets of one node.
///
/// `removed_properties` holds the last values of properties removed in the
/// current, uncommitted transaction; they still count as present for matching.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeFacetView {
    pub id: NodeId,
    pub parent_id: Option<NodeId>,
    /// Node name in its encoded (ISO 9075) form.
    pub name: String,
    pub primary_type: String,
    #[serde(default)]
    pub mixin_types: Vec<String>,
    #[serde(default)]
    pub properties: BTreeMap<String, Vec<PropertyValue>>,
    #[serde(default)]
    pub removed_properties: BTreeMap<String, Vec<PropertyValue>>,
    #[serde(default)]
    pub is_new: bool,
    #[serde(default)]
    pub is_virtual: bool,
}

impl NodeFacetView {
    pub fn new(
        id: impl Into<NodeId>,
        parent_id: Option<NodeId>,
        name: impl Into<String>,
        primary_type: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            parent_id,
            name: name.into(),
            primary_type: primary_type.into(),
            mixin_types: Vec::new(),
            properties: BTreeMap::new(),
            removed_properties: BTreeMap::new(),
            is_new: false,
            is_virtual: false,
        }
    }

    pub fn with_mixin(mut self, mixin: impl Into<String>) -> Self {
        self.mixin_types.push(mixin.into());
        self
    }

    pub fn with_property(mut self, name: impl Into<String>, values: Vec<PropertyValue>) -> Self {
        self.properties.insert(name.into(), values);
        self
    }

    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    /// Values of a property, falling back to a pending-removal value.
    pub fn property(&self, name: &str) -> Option<&[PropertyValue]> {
        self.properties
            .get(name)
            .or_else(|| self.removed_properties.get(name))
            .map(Vec::as_slice)
    }

    /// The node name with `_xHHHH_` escapes decoded.
    pub fn decoded_name(&self) -> String {
        decode_name(&self.name)
    }
}

/// Decodes ISO 9075 escapes (`_x0020_` → space) in a node name.
///
/// Malformed escapes are left untouched.
pub fn decode_name(name: &str) -> String {
    if !name.contains("_x") {
        return name.to_string();
    }
    let mut out = String::with_capacity(name.len());
    let mut rest = name;
    while let Some(pos) = rest.find("_x") {
        out.push_str(&rest[..pos]);
        let candidate = &rest[pos..];
        match decode_escape(candidate) {
            Some(ch) => {
                out.push(ch);
                rest = &candidate[7..];
            }
            None => {
                out.push_str("_x");
                rest = &candidate[2..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_escape(candidate: &str) -> Option<char> {
    let bytes = candidate.as_bytes();
    if bytes.len() < 7 || bytes[6] != b'_' {
        return None;
    }
    let hex = candidate.get(2..6)?;
    u32::from_str_radix(hex, 16).ok().and_then(char::from_u32)
}
