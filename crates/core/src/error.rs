use crate::registry::RoleKind;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Duplicate role for {reference}: already registered as {existing}, requested {requested}")]
    DuplicateRole {
        reference: String,
        existing: RoleKind,
        requested: RoleKind,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Invalid tree path depth: {0}")]
    InvalidPathDepth(usize),

    #[error("Role {role} cannot be stored at tree depth {depth}")]
    InvalidRoleForDepth { role: RoleKind, depth: usize },

    #[error("Invalid reference: {0}")]
    InvalidReference(String),

    #[error("Callback failed for {reference}: {message}")]
    Callback { reference: String, message: String },

    #[error("Missing for object: {0}")]
    MissingForObject(String),

    #[error("Document error: {0}")]
    Document(#[from] reconcile_document::DocumentError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl EngineError {
    pub fn callback(reference: impl ToString, err: &anyhow::Error) -> Self {
        Self::Callback {
            reference: reference.to_string(),
            message: format!("{err:#}"),
        }
    }

    /// Configuration errors stop a run before any document is touched
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::DuplicateRole { .. } | Self::InvalidConfig(_) | Self::ConfigParse(_)
        )
    }
}
