use crate::diff::{Change, ChangeKind, ChangeSet};
use crate::error::Result;
use crate::readiness::{InstanceReadiness, Readiness};
use crate::registry::{NodeRole, RoleKind};
use crate::tree::{NodeKey, OwnershipTree, ResourceNode};
use reconcile_document::{Condition, Diagnostic};
use serde::Serialize;
use std::collections::BTreeMap;

/// Dry-run result of [`super::Engine::plan`]
#[derive(Debug, Clone)]
pub struct Plan {
    pub tree: OwnershipTree,
    pub readiness: Readiness,
    pub changes: ChangeSet,
    pub diagnostics: Vec<Diagnostic>,
}

impl Plan {
    pub fn view(&self) -> PlanView<'_> {
        PlanView {
            tree: self
                .tree
                .roots()
                .map(|(key, node)| NodeView::new(key, node))
                .collect(),
            readiness: ReadinessView {
                inert: self.readiness.inert,
                global_ready: self.readiness.global_ready,
                global_blocked_by: &self.readiness.global_blocked_by,
                instances: self
                    .readiness
                    .instances
                    .iter()
                    .map(|(reference, instance)| (reference.to_string(), instance))
                    .collect(),
            },
            changes: self
                .changes
                .instances
                .iter()
                .map(|(reference, instance)| {
                    let view = InstanceChangesView {
                        cascade: instance.cascade,
                        changes: instance.changes.iter().map(ChangeView::new).collect(),
                    };
                    (reference.to_string(), view)
                })
                .collect(),
            diagnostics: &self.diagnostics,
        }
    }

    pub fn to_json(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self.view())?)
    }
}

/// Serializable snapshot of a plan; references are encoded as strings
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanView<'a> {
    pub tree: Vec<NodeView<'a>>,
    pub readiness: ReadinessView<'a>,
    pub changes: BTreeMap<String, InstanceChangesView>,
    pub diagnostics: &'a [Diagnostic],
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeView<'a> {
    pub reference: String,
    pub role: NodeRole,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition: Option<&'a Condition>,
    pub has_document: bool,
    pub has_new_document: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<NodeView<'a>>,
}

impl<'a> NodeView<'a> {
    fn new(key: &'a NodeKey, node: &'a ResourceNode) -> Self {
        Self {
            reference: key.reference.to_string(),
            role: node.role,
            condition: node.existing_condition.as_ref(),
            has_document: node.existing_document.is_some(),
            has_new_document: node.new_document.is_some(),
            children: node
                .children
                .iter()
                .map(|(key, child)| NodeView::new(key, child))
                .collect(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadinessView<'a> {
    pub inert: bool,
    pub global_ready: bool,
    pub global_blocked_by: &'a [String],
    pub instances: BTreeMap<String, &'a InstanceReadiness>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceChangesView {
    pub cascade: bool,
    pub changes: Vec<ChangeView>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeView {
    pub kind: ChangeKind,
    pub child: String,
    pub role: RoleKind,
}

impl ChangeView {
    fn new(change: &Change) -> Self {
        Self {
            kind: change.kind(),
            child: change.child().to_string(),
            role: change.role().kind(),
        }
    }
}
