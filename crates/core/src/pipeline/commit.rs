use super::{Engine, RunState};
use crate::diff::{Change, ChangeSet};
use crate::error::Result;
use crate::ledger::{child_condition, encode};
use crate::readiness::DELETE_MARKER_VALUE;
use crate::reference::ReferenceKey;
use crate::registry::{Materialization, NodeRole};
use crate::tree::{TreeEntry, TreePath};
use reconcile_document::{ConditionStatus, Diagnostic, Document, Package};

const MSG_CREATE_CONDITION: &str = "create condition";
const MSG_CREATE_RESOURCE: &str = "create resource";
const MSG_UPDATE_RESOURCE: &str = "update resource";
const MSG_RESTORE_RESOURCE: &str = "restore resource";

fn is_full(role: NodeRole) -> bool {
    role == NodeRole::Own(Materialization::Full)
}

impl Engine {
    /// Apply a change set to the ledger, the package and the tree.
    pub(super) fn commit(&self, changes: &ChangeSet, package: &mut Package, state: &mut RunState) {
        let mut applied = 0usize;
        for (for_ref, instance) in &changes.instances {
            for change in instance.in_commit_order() {
                match self.apply(for_ref, change, package, state) {
                    Ok(()) => applied += 1,
                    Err(err) => {
                        let diagnostic = Diagnostic::error(format!(
                            "cannot apply {:?} for {}: {err}",
                            change.kind(),
                            change.child()
                        ));
                        state.diagnose(diagnostic);
                    }
                }
            }
        }
        log::debug!("Committed {applied} of {} changes", changes.len());
    }

    fn apply(
        &self,
        for_ref: &ReferenceKey,
        change: &Change,
        package: &mut Package,
        state: &mut RunState,
    ) -> Result<()> {
        let path = TreePath::child(for_ref.clone(), change.child().clone());
        let role = change.role();
        log::debug!("Applying {:?} to {}", change.kind(), change.child());

        match change {
            Change::CreateCondition { child, .. } => {
                set_child_condition(state, role, &path, child, for_ref, MSG_CREATE_CONDITION)?;
            }
            Change::DeleteCondition { child, .. } => {
                state.ledger.delete_condition(&encode(child));
                state.tree.remove(role.kind(), &path);
            }
            Change::CreateDocument {
                child, document, ..
            } => {
                if is_full(role) {
                    write_document(package, state, role, &path, document.clone())?;
                    set_child_condition(state, role, &path, child, for_ref, MSG_CREATE_RESOURCE)?;
                } else {
                    log::debug!("{child} is materialized by its own pipeline");
                }
            }
            Change::UpdateDocument {
                child, document, ..
            } => {
                write_document(package, state, role, &path, document.clone())?;
                set_child_condition(state, role, &path, child, for_ref, MSG_UPDATE_RESOURCE)?;
            }
            Change::DeleteDocument { document, .. } => {
                let mut marked = document.clone();
                marked.set_annotation(&self.config.delete_annotation, DELETE_MARKER_VALUE)?;
                write_document(package, state, role, &path, marked)?;
            }
            Change::ClearDeleteMarker {
                child, document, ..
            } => {
                let mut restored = document.clone();
                restored.remove_annotation(&self.config.delete_annotation);
                write_document(package, state, role, &path, restored)?;
                if is_full(role) {
                    set_child_condition(state, role, &path, child, for_ref, MSG_RESTORE_RESOURCE)?;
                }
            }
        }
        Ok(())
    }
}

fn set_child_condition(
    state: &mut RunState,
    role: NodeRole,
    path: &TreePath,
    child: &ReferenceKey,
    owner: &ReferenceKey,
    message: &str,
) -> Result<()> {
    let condition = child_condition(child, owner, ConditionStatus::False, message);
    state.ledger.set_condition(condition.clone());
    state
        .tree
        .upsert(role, path, TreeEntry::ExistingCondition(condition))
}

fn write_document(
    package: &mut Package,
    state: &mut RunState,
    role: NodeRole,
    path: &TreePath,
    document: Document,
) -> Result<()> {
    package.set_document(document.clone());
    state
        .tree
        .upsert(role, path, TreeEntry::ExistingDocument(document))
}
