use crate::condition::Condition;
use crate::diagnostic::Diagnostic;
use crate::error::Result;
use schemars::schema_for;
use serde_json::{json, Value};

/// JSON schemas of the records a run writes into a package: ledger
/// conditions and `results` diagnostics.
pub fn wire_schemas() -> Result<Value> {
    Ok(json!({
        "condition": serde_json::to_value(schema_for!(Condition))?,
        "diagnostic": serde_json::to_value(schema_for!(Diagnostic))?,
    }))
}
