use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Status of a ledger condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum ConditionStatus {
    True,
    False,
}

/// A tracking record in the ledger.
///
/// `condition_type` carries the encoded reference of the tracked document and
/// `reason` the encoded reference of its owner (empty when unscoped).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Condition {
    #[serde(rename = "type")]
    pub condition_type: String,
    pub status: ConditionStatus,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reason: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
}

impl Condition {
    pub fn new(condition_type: impl Into<String>, status: ConditionStatus) -> Self {
        Self {
            condition_type: condition_type.into(),
            status,
            reason: String::new(),
            message: String::new(),
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn is_false(&self) -> bool {
        self.status == ConditionStatus::False
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn serializes_with_kpt_field_names() {
        let condition = Condition::new("v1.IPAllocation.n3", ConditionStatus::False)
            .with_reason("v1.Interface.n3")
            .with_message("create resource");
        let value = serde_json::to_value(&condition).expect("serialize");
        assert_eq!(
            value,
            json!({
                "type": "v1.IPAllocation.n3",
                "status": "False",
                "reason": "v1.Interface.n3",
                "message": "create resource"
            })
        );
    }

    #[test]
    fn empty_reason_is_omitted_and_defaulted() {
        let condition: Condition =
            serde_json::from_value(json!({"type": "x", "status": "True"})).expect("parse");
        assert!(condition.reason.is_empty());
        assert!(!condition.is_false());
        let value = serde_json::to_value(&condition).expect("serialize");
        assert!(value.get("reason").is_none());
    }
}
