//! Condition ledger: the reference codec and the ledger document accessor.
//!
//! Relationship state survives between runs only as conditions in the ledger
//! document. A condition's `type` is the encoded tracked reference and its
//! `reason` the encoded owner, so the two functions below are the whole
//! persistence format.

use crate::config::LedgerConfig;
use crate::error::Result;
use crate::reference::ReferenceKey;
use reconcile_document::{Condition, ConditionStatus, Document, Package};
use serde_json::Value;

const CONDITIONS_PATH: [&str; 2] = ["status", "conditions"];

/// Encode a reference as `schema.kind.name`, skipping empty parts.
///
/// A `group/version` schema is kept verbatim, e.g.
/// `ipam.alloc.nephio.org/v1alpha1.IPAllocation.n3`.
pub fn encode(reference: &ReferenceKey) -> String {
    [
        reference.schema.as_str(),
        reference.kind.as_str(),
        reference.name.as_str(),
    ]
    .iter()
    .filter(|part| !part.is_empty())
    .copied()
    .collect::<Vec<_>>()
    .join(".")
}

/// Decode an encoded reference. Never fails: anything that is not
/// `[group/]version.kind.name` becomes the zero reference.
pub fn decode(encoded: &str) -> ReferenceKey {
    let (group, remainder) = match encoded.rsplit_once('/') {
        Some((group, remainder)) => (Some(group), remainder),
        None => (None, encoded),
    };
    if group.is_some_and(str::is_empty) {
        return ReferenceKey::default();
    }

    let parts: Vec<&str> = remainder.split('.').collect();
    let [version, kind, name] = parts.as_slice() else {
        return ReferenceKey::default();
    };
    if version.is_empty() || kind.is_empty() || name.is_empty() {
        return ReferenceKey::default();
    }

    let schema = match group {
        Some(group) => format!("{group}/{version}"),
        None => version.to_string(),
    };
    ReferenceKey::new(schema, *kind, *name)
}

/// Ledger record for a child tracked on behalf of its owner
pub fn child_condition(
    child: &ReferenceKey,
    owner: &ReferenceKey,
    status: ConditionStatus,
    message: impl Into<String>,
) -> Condition {
    Condition::new(encode(child), status)
        .with_reason(encode(owner))
        .with_message(message)
}

/// The ledger document of a package and its condition list.
#[derive(Debug, Clone)]
pub struct Ledger {
    config: LedgerConfig,
    existed: bool,
    document: Document,
    conditions: Vec<Condition>,
    /// Records that did not parse; written back untouched
    unparsed: Vec<Value>,
    had_conditions: bool,
    anomalies: Vec<String>,
}

impl Ledger {
    pub fn load(package: &Package, config: &LedgerConfig) -> Self {
        let found = package
            .position_of_kind(&config.api_version, &config.kind)
            .map(|idx| package.items[idx].clone());
        let existed = found.is_some();
        let document = found
            .unwrap_or_else(|| Document::new(&config.api_version, &config.kind, &config.name));

        let mut ledger = Self {
            config: config.clone(),
            existed,
            document,
            conditions: Vec::new(),
            unparsed: Vec::new(),
            had_conditions: false,
            anomalies: Vec::new(),
        };
        ledger.read_conditions();
        ledger
    }

    fn read_conditions(&mut self) {
        let raw = self.document.get(&CONDITIONS_PATH).cloned();
        match raw {
            None | Some(Value::Null) => {}
            Some(Value::Array(items)) => {
                self.had_conditions = true;
                for (idx, item) in items.into_iter().enumerate() {
                    match serde_json::from_value::<Condition>(item.clone()) {
                        Ok(condition) => self.conditions.push(condition),
                        Err(err) => {
                            log::warn!("Skipping malformed ledger condition #{idx}: {err}");
                            self.anomalies
                                .push(format!("malformed ledger condition #{idx}: {err}"));
                            self.unparsed.push(item);
                        }
                    }
                }
            }
            Some(other) => {
                log::warn!("Ledger status.conditions is not a list, ignoring it");
                self.anomalies
                    .push(format!("ledger status.conditions is not a list: {other}"));
            }
        }
    }

    pub fn exists(&self) -> bool {
        self.existed
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    pub fn condition(&self, condition_type: &str) -> Option<&Condition> {
        self.conditions
            .iter()
            .find(|c| c.condition_type == condition_type)
    }

    /// Problems found while reading the ledger
    pub fn anomalies(&self) -> &[String] {
        &self.anomalies
    }

    /// Replace the condition with the same type, or append it
    pub fn set_condition(&mut self, condition: Condition) {
        match self
            .conditions
            .iter_mut()
            .find(|c| c.condition_type == condition.condition_type)
        {
            Some(existing) => *existing = condition,
            None => self.conditions.push(condition),
        }
    }

    pub fn delete_condition(&mut self, condition_type: &str) -> Option<Condition> {
        let idx = self
            .conditions
            .iter()
            .position(|c| c.condition_type == condition_type)?;
        Some(self.conditions.remove(idx))
    }

    /// Write the ledger document back into the package.
    ///
    /// A ledger that never had a condition list and still has none is left
    /// as it came in; a package without a ledger only gets one when there
    /// is something to record.
    pub fn write_back(&self, package: &mut Package) -> Result<()> {
        let mut document = self.document.clone();
        let has_records = !self.conditions.is_empty() || !self.unparsed.is_empty();
        if has_records || self.had_conditions {
            let mut records = Vec::with_capacity(self.conditions.len() + self.unparsed.len());
            for condition in &self.conditions {
                records.push(serde_json::to_value(condition)?);
            }
            records.extend(self.unparsed.iter().cloned());
            document.set(&CONDITIONS_PATH, Value::Array(records))?;
        }

        match package.position_of_kind(&self.config.api_version, &self.config.kind) {
            Some(idx) => package.items[idx] = document,
            None if has_records => {
                log::info!(
                    "Package has no {} ledger, inserting {}",
                    self.config.kind,
                    document.name()
                );
                package.insert_document(0, document);
            }
            None => {}
        }
        Ok(())
    }
}
