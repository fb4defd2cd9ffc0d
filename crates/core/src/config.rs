use crate::error::{EngineError, Result};
use serde::{Deserialize, Serialize};

pub const DEFAULT_OWNER_ANNOTATION: &str = "fnruntime.nephio.org/owner";
pub const DEFAULT_DELETE_ANNOTATION: &str = "fnruntime.nephio.org/delete";
pub const DEFAULT_LEDGER_API_VERSION: &str = "kpt.dev/v1";
pub const DEFAULT_LEDGER_KIND: &str = "Kptfile";
pub const DEFAULT_LEDGER_NAME: &str = "package";
pub const DEFAULT_PAYLOAD_FIELD: &str = "spec";

/// Wire-level knobs of the engine.
///
/// Role configuration (which kinds are `For`/`Own`/`Watch`) is code, see
/// [`crate::RoleConfig`]; this struct only covers what a host may want to
/// override from a config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Annotation carrying the encoded owning reference
    pub owner_annotation: String,

    /// Annotation marking a document as deleted
    pub delete_annotation: String,

    /// Where the condition ledger lives in the package
    pub ledger: LedgerConfig,

    /// Field compared to decide whether an owned document changed
    pub payload_field: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LedgerConfig {
    pub api_version: String,
    pub kind: String,

    /// Name used when a ledger has to be created from scratch
    pub name: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            owner_annotation: DEFAULT_OWNER_ANNOTATION.to_string(),
            delete_annotation: DEFAULT_DELETE_ANNOTATION.to_string(),
            ledger: LedgerConfig::default(),
            payload_field: DEFAULT_PAYLOAD_FIELD.to_string(),
        }
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            api_version: DEFAULT_LEDGER_API_VERSION.to_string(),
            kind: DEFAULT_LEDGER_KIND.to_string(),
            name: DEFAULT_LEDGER_NAME.to_string(),
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: EngineConfig = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let required = [
            ("owner_annotation", &self.owner_annotation),
            ("delete_annotation", &self.delete_annotation),
            ("ledger.api_version", &self.ledger.api_version),
            ("ledger.kind", &self.ledger.kind),
            ("ledger.name", &self.ledger.name),
            ("payload_field", &self.payload_field),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(EngineError::InvalidConfig(format!("{field} cannot be empty")));
            }
        }

        if self.owner_annotation == self.delete_annotation {
            return Err(EngineError::InvalidConfig(
                "owner_annotation and delete_annotation must differ".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_valid() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = EngineConfig::from_toml_str(
            r#"
owner_annotation = "example.org/owner"

[ledger]
kind = "Ledger"
"#,
        )
        .expect("parse");
        assert_eq!(config.owner_annotation, "example.org/owner");
        assert_eq!(config.delete_annotation, DEFAULT_DELETE_ANNOTATION);
        assert_eq!(config.ledger.kind, "Ledger");
        assert_eq!(config.ledger.api_version, DEFAULT_LEDGER_API_VERSION);
    }

    #[test]
    fn test_config_validation() {
        let mut config = EngineConfig::default();

        config.payload_field = " ".to_string();
        assert!(config.validate().is_err());

        config.payload_field = "spec".to_string();
        config.delete_annotation = config.owner_annotation.clone();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unknown_fields_rejected() {
        let err = EngineConfig::from_toml_str("owner = \"x\"").unwrap_err();
        assert!(matches!(err, EngineError::ConfigParse(_)));
    }
}
