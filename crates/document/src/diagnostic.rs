use crate::document::Document;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

/// Identity of the document a diagnostic is attached to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRef {
    pub api_version: String,
    pub kind: String,
    pub name: String,
}

impl ResourceRef {
    pub fn of(document: &Document) -> Self {
        Self {
            api_version: document.api_version().to_string(),
            kind: document.kind().to_string(),
            name: document.name().to_string(),
        }
    }
}

/// Entry of the package `results` list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostic {
    pub message: String,
    pub severity: Severity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_ref: Option<ResourceRef>,
}

impl Diagnostic {
    pub fn error(message: impl Into<String>) -> Self {
        Self::with_severity(Severity::Error, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::with_severity(Severity::Warning, message)
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::with_severity(Severity::Info, message)
    }

    fn with_severity(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            severity,
            resource_ref: None,
        }
    }

    pub fn for_document(mut self, document: &Document) -> Self {
        self.resource_ref = Some(ResourceRef::of(document));
        self
    }

    pub fn for_resource(mut self, resource_ref: ResourceRef) -> Self {
        self.resource_ref = Some(resource_ref);
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}
