//! Configuration for the access evaluator.

/// Default node type that marks a document root.
pub const DEFAULT_DOCUMENT_TYPE: &str = "hippo:document";

/// Per-session cache sizes and the document boundary type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvaluatorConfig {
    /// Bound of the persisted-node read decision cache.
    pub permission_cache_size: usize,
    /// Bound of the virtual-node read decision cache.
    pub virtual_cache_size: usize,
    /// Bound of the type hierarchy memo.
    pub type_cache_size: usize,
    /// Nodes of this type (or a subtype) are document roots.
    pub document_type: String,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            permission_cache_size: 20_000,
            virtual_cache_size: 5_000,
            type_cache_size: 1_000,
            document_type: DEFAULT_DOCUMENT_TYPE.to_string(),
        }
    }
}

impl EvaluatorConfig {
    pub fn with_permission_cache_size(mut self, size: usize) -> Self {
        self.permission_cache_size = size;
        self
    }

    pub fn with_virtual_cache_size(mut self, size: usize) -> Self {
        self.virtual_cache_size = size;
        self
    }

    pub fn with_type_cache_size(mut self, size: usize) -> Self {
        self.type_cache_size = size;
        self
    }

    pub fn with_document_type(mut self, document_type: impl Into<String>) -> Self {
        self.document_type = document_type.into();
        self
    }
}
