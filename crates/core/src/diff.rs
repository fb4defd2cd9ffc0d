//! Diff engine: existing tree state vs. newly populated documents.

use crate::readiness::ReadinessEvaluator;
use crate::reference::ReferenceKey;
use crate::registry::{Materialization, NodeRole, RoleKind};
use crate::tree::{NodeKey, OwnershipTree, ResourceNode};
use reconcile_document::Document;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// Kind of a change, declared in commit order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    CreateCondition,
    DeleteCondition,
    CreateDocument,
    UpdateDocument,
    DeleteDocument,
    ClearDeleteMarker,
}

/// One change to apply for a child of a `For` instance.
///
/// Document-carrying variants hold the document to write.
#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    CreateCondition {
        child: ReferenceKey,
        role: NodeRole,
    },
    DeleteCondition {
        child: ReferenceKey,
        role: NodeRole,
    },
    CreateDocument {
        child: ReferenceKey,
        role: NodeRole,
        document: Document,
    },
    UpdateDocument {
        child: ReferenceKey,
        role: NodeRole,
        document: Document,
    },
    DeleteDocument {
        child: ReferenceKey,
        role: NodeRole,
        document: Document,
    },
    ClearDeleteMarker {
        child: ReferenceKey,
        role: NodeRole,
        document: Document,
    },
}

impl Change {
    pub fn kind(&self) -> ChangeKind {
        match self {
            Change::CreateCondition { .. } => ChangeKind::CreateCondition,
            Change::DeleteCondition { .. } => ChangeKind::DeleteCondition,
            Change::CreateDocument { .. } => ChangeKind::CreateDocument,
            Change::UpdateDocument { .. } => ChangeKind::UpdateDocument,
            Change::DeleteDocument { .. } => ChangeKind::DeleteDocument,
            Change::ClearDeleteMarker { .. } => ChangeKind::ClearDeleteMarker,
        }
    }

    pub fn child(&self) -> &ReferenceKey {
        match self {
            Change::CreateCondition { child, .. }
            | Change::DeleteCondition { child, .. }
            | Change::CreateDocument { child, .. }
            | Change::UpdateDocument { child, .. }
            | Change::DeleteDocument { child, .. }
            | Change::ClearDeleteMarker { child, .. } => child,
        }
    }

    pub fn role(&self) -> NodeRole {
        match self {
            Change::CreateCondition { role, .. }
            | Change::DeleteCondition { role, .. }
            | Change::CreateDocument { role, .. }
            | Change::UpdateDocument { role, .. }
            | Change::DeleteDocument { role, .. }
            | Change::ClearDeleteMarker { role, .. } => *role,
        }
    }

    /// Whether the change tears something down
    pub fn is_delete(&self) -> bool {
        matches!(
            self.kind(),
            ChangeKind::DeleteCondition | ChangeKind::DeleteDocument
        )
    }
}

/// Changes of one `For` instance
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InstanceChanges {
    /// The `For` document is gone and every child is being torn down
    pub cascade: bool,
    pub changes: Vec<Change>,
}

impl InstanceChanges {
    /// Changes sorted into commit order, stable within a kind
    pub fn in_commit_order(&self) -> Vec<&Change> {
        let mut ordered: Vec<&Change> = self.changes.iter().collect();
        ordered.sort_by_key(|change| change.kind());
        ordered
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSet {
    pub instances: BTreeMap<ReferenceKey, InstanceChanges>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.instances.values().all(|i| i.changes.is_empty())
    }

    pub fn len(&self) -> usize {
        self.instances.values().map(|i| i.changes.len()).sum()
    }

    pub fn count(&self, kind: ChangeKind) -> usize {
        self.changes().filter(|change| change.kind() == kind).count()
    }

    pub fn changes(&self) -> impl Iterator<Item = &Change> {
        self.instances.values().flat_map(|i| i.changes.iter())
    }

    pub fn instance(&self, for_ref: &ReferenceKey) -> Option<&InstanceChanges> {
        self.instances.get(for_ref)
    }
}

#[derive(Debug, Clone)]
pub struct DiffOptions {
    /// Field holding the declared configuration, compared for updates
    pub payload_field: String,
    pub delete_annotation: String,
}

pub struct DiffEngine {
    options: DiffOptions,
    readiness: ReadinessEvaluator,
}

impl DiffEngine {
    pub fn new(options: DiffOptions) -> Self {
        let readiness = ReadinessEvaluator::new(options.delete_annotation.clone());
        Self { options, readiness }
    }

    /// Compute the change set of every `For` instance not in `excluded`
    pub fn diff(&self, tree: &OwnershipTree, excluded: &BTreeSet<ReferenceKey>) -> ChangeSet {
        let mut change_set = ChangeSet::default();
        for (key, node) in tree.roots() {
            if key.role != RoleKind::For || excluded.contains(&key.reference) {
                continue;
            }
            let instance = self.diff_instance(node);
            if !instance.changes.is_empty() {
                log::debug!(
                    "Instance {} has {} changes (cascade={})",
                    key.reference,
                    instance.changes.len(),
                    instance.cascade
                );
                change_set.instances.insert(key.reference.clone(), instance);
            }
        }
        change_set
    }

    fn diff_instance(&self, for_node: &ResourceNode) -> InstanceChanges {
        let cascade = for_node.existing_document.is_none();
        let mut changes = Vec::new();
        for (key, child) in &for_node.children {
            if cascade {
                self.cascade_child(key, child, &mut changes);
            } else if let NodeRole::Own(materialization) = child.role {
                self.diff_owned(key, child, materialization, &mut changes);
            }
        }
        InstanceChanges { cascade, changes }
    }

    fn cascade_child(&self, key: &NodeKey, child: &ResourceNode, changes: &mut Vec<Change>) {
        if child.existing_condition.is_some() {
            changes.push(Change::DeleteCondition {
                child: key.reference.clone(),
                role: child.role,
            });
        }
        if let Some(existing) = &child.existing_document {
            if !self.readiness.is_marked_deleted(existing) {
                changes.push(Change::DeleteDocument {
                    child: key.reference.clone(),
                    role: child.role,
                    document: existing.clone(),
                });
            }
        }
    }

    fn diff_owned(
        &self,
        key: &NodeKey,
        child: &ResourceNode,
        materialization: Materialization,
        changes: &mut Vec<Change>,
    ) {
        let reference = &key.reference;
        let role = child.role;

        match (&child.existing_condition, &child.new_document) {
            (None, Some(_)) => changes.push(Change::CreateCondition {
                child: reference.clone(),
                role,
            }),
            (Some(_), None) => changes.push(Change::DeleteCondition {
                child: reference.clone(),
                role,
            }),
            _ => {}
        }

        match (&child.existing_document, &child.new_document) {
            (None, Some(new)) => {
                // A tracked condition-only child is materialized by its
                // remote pipeline, not here
                let untracked = child.existing_condition.is_none();
                if materialization == Materialization::Full || untracked {
                    changes.push(Change::CreateDocument {
                        child: reference.clone(),
                        role,
                        document: new.clone(),
                    });
                }
            }
            (Some(existing), None) => {
                if !self.readiness.is_marked_deleted(existing) {
                    changes.push(Change::DeleteDocument {
                        child: reference.clone(),
                        role,
                        document: existing.clone(),
                    });
                }
            }
            (Some(existing), Some(new)) => {
                if self.readiness.is_marked_deleted(existing) {
                    let document = match materialization {
                        Materialization::Full => new.clone(),
                        Materialization::ConditionOnly => existing.clone(),
                    };
                    changes.push(Change::ClearDeleteMarker {
                        child: reference.clone(),
                        role,
                        document,
                    });
                } else if materialization == Materialization::Full
                    && self.payload_differs(existing, new)
                {
                    changes.push(Change::UpdateDocument {
                        child: reference.clone(),
                        role,
                        document: new.clone(),
                    });
                }
            }
            (None, None) => {}
        }
    }

    fn payload_differs(&self, existing: &Document, new: &Document) -> bool {
        let field = [self.options.payload_field.as_str()];
        existing.get(&field) != new.get(&field)
    }
}
