use crate::ledger;
use reconcile_document::Document;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Canonical identity of a document: schema (apiVersion), kind and name.
///
/// Registry-level references leave `name` empty; tree entries never do.
#[derive(
    Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct ReferenceKey {
    pub schema: String,
    pub kind: String,
    pub name: String,
}

impl ReferenceKey {
    pub fn new(schema: impl Into<String>, kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            kind: kind.into(),
            name: name.into(),
        }
    }

    /// Registry-level reference (no name)
    pub fn type_ref(schema: impl Into<String>, kind: impl Into<String>) -> Self {
        Self::new(schema, kind, "")
    }

    pub fn of(document: &Document) -> Self {
        Self::new(document.api_version(), document.kind(), document.name())
    }

    /// The zero reference is what malformed ledger strings decode to
    pub fn is_zero(&self) -> bool {
        self.schema.is_empty() && self.kind.is_empty() && self.name.is_empty()
    }

    pub fn is_named(&self) -> bool {
        !self.name.is_empty()
    }

    pub fn type_key(&self) -> ReferenceKey {
        Self::type_ref(self.schema.clone(), self.kind.clone())
    }

    pub fn same_type(&self, other: &ReferenceKey) -> bool {
        self.schema == other.schema && self.kind == other.kind
    }

    pub fn with_name(&self, name: impl Into<String>) -> Self {
        Self::new(self.schema.clone(), self.kind.clone(), name)
    }

    pub fn matches(&self, document: &Document) -> bool {
        self.schema == document.api_version()
            && self.kind == document.kind()
            && self.name == document.name()
    }
}

impl fmt::Display for ReferenceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&ledger::encode(self))
    }
}
