use crate::diagnostic::Diagnostic;
use crate::document::Document;
use crate::error::{DocumentError, Result};
use serde::{Deserialize, Serialize};

pub const PACKAGE_API_VERSION: &str = "config.kubernetes.io/v1";
pub const PACKAGE_KIND: &str = "ResourceList";

fn default_api_version() -> String {
    PACKAGE_API_VERSION.to_string()
}

fn default_kind() -> String {
    PACKAGE_KIND.to_string()
}

/// The bounded document collection processed in one run.
///
/// Serialized in the `ResourceList` shape: `items`, optional `functionConfig`
/// and the `results` diagnostics list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Package {
    #[serde(default = "default_api_version")]
    pub api_version: String,
    #[serde(default = "default_kind")]
    pub kind: String,
    #[serde(default)]
    pub items: Vec<Document>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_config: Option<Document>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub results: Vec<Diagnostic>,
}

impl Default for Package {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl Package {
    pub fn new(items: Vec<Document>) -> Self {
        Self {
            api_version: default_api_version(),
            kind: default_kind(),
            items,
            function_config: None,
            results: Vec::new(),
        }
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let package: Package = serde_json::from_str(raw)?;
        if package.kind != PACKAGE_KIND {
            return Err(DocumentError::InvalidPackage(format!(
                "expected kind {PACKAGE_KIND}, got {}",
                package.kind
            )));
        }
        Ok(package)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(Into::into)
    }

    pub fn documents(&self) -> &[Document] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn position(&self, api_version: &str, kind: &str, name: &str) -> Option<usize> {
        self.items.iter().position(|doc| {
            doc.api_version() == api_version && doc.kind() == kind && doc.name() == name
        })
    }

    /// First document of the given apiVersion/kind, whatever its name
    pub fn position_of_kind(&self, api_version: &str, kind: &str) -> Option<usize> {
        self.items
            .iter()
            .position(|doc| doc.api_version() == api_version && doc.kind() == kind)
    }

    pub fn find(&self, api_version: &str, kind: &str, name: &str) -> Option<&Document> {
        self.position(api_version, kind, name)
            .map(|idx| &self.items[idx])
    }

    /// Replace the document with the same identity, or append it
    pub fn set_document(&mut self, document: Document) {
        match self
            .items
            .iter()
            .position(|existing| existing.same_identity(&document))
        {
            Some(idx) => self.items[idx] = document,
            None => self.items.push(document),
        }
    }

    pub fn insert_document(&mut self, index: usize, document: Document) {
        let index = index.min(self.items.len());
        self.items.insert(index, document);
    }

    pub fn remove_document(&mut self, api_version: &str, kind: &str, name: &str) -> Option<Document> {
        self.position(api_version, kind, name)
            .map(|idx| self.items.remove(idx))
    }

    pub fn push_result(&mut self, diagnostic: Diagnostic) {
        self.results.push(diagnostic);
    }

    pub fn has_errors(&self) -> bool {
        self.results.iter().any(Diagnostic::is_error)
    }
}
