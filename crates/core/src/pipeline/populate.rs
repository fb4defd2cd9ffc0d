use super::{Engine, RunState};
use crate::error::EngineError;
use crate::ledger::encode;
use crate::reference::ReferenceKey;
use crate::registry::{NodeRole, Role, RoleKind};
use crate::tree::{TreeEntry, TreePath};
use reconcile_document::{Diagnostic, Package};

impl Engine {
    /// Run the global watch callbacks, then `populate` for every instance
    /// that passes the populate gate.
    pub(super) fn populate_stage(&mut self, package: &Package, state: &mut RunState) {
        let global_ready = self.readiness.global_ready(&state.tree);
        if global_ready {
            self.run_watch_callbacks(package, state);
        } else {
            log::info!("Global watches not satisfied, skipping watch callbacks and populate");
        }

        if state.frozen {
            log::warn!("A watch callback failed, reconcile is frozen for this run");
            return;
        }
        if !self.registry.has_own_roles() || !global_ready {
            return;
        }

        let Engine {
            registry,
            config,
            populate,
            readiness,
            ..
        } = self;
        let Some(populate) = populate.as_mut() else {
            return;
        };

        for for_ref in state.tree.for_refs() {
            let path = TreePath::root(for_ref.clone());
            let Some(for_document) = state
                .tree
                .node(RoleKind::For, &path)
                .and_then(|node| node.existing_document.clone())
            else {
                continue;
            };
            if readiness.is_marked_deleted(&for_document) {
                log::debug!("Instance {for_ref} is marked for deletion, not populating");
                continue;
            }
            if !readiness.populate_ready(&state.tree, &for_ref) {
                log::debug!("Instance {for_ref} is waiting for its watches");
                continue;
            }

            let children = match populate(&for_document) {
                Ok(children) => children,
                Err(err) => {
                    let diagnostic = Diagnostic::error(EngineError::callback(&for_ref, &err).to_string())
                        .for_document(&for_document);
                    state.diagnose(diagnostic);
                    state.excluded.insert(for_ref);
                    continue;
                }
            };
            state.report.populated += 1;

            let owner = encode(&for_ref);
            for (child_ref, mut child) in children {
                let Some(Role::Own(materialization)) = registry.classify(&child_ref) else {
                    let diagnostic = Diagnostic::warning(format!(
                        "populate for {for_ref} returned {child_ref}, which is not an owned kind"
                    ))
                    .for_document(&for_document);
                    state.diagnose(diagnostic);
                    continue;
                };
                let materialization = *materialization;

                if let Err(err) = child.set_annotation(&config.owner_annotation, &owner) {
                    let diagnostic = Diagnostic::warning(format!("cannot annotate {child_ref}: {err}"))
                        .for_document(&for_document);
                    state.diagnose(diagnostic);
                    continue;
                }
                let child_path = TreePath::child(for_ref.clone(), child_ref.clone());
                if let Err(err) = state.tree.upsert(
                    NodeRole::Own(materialization),
                    &child_path,
                    TreeEntry::NewDocument(child),
                ) {
                    let diagnostic = Diagnostic::warning(format!("cannot track {child_ref}: {err}"))
                        .for_document(&for_document);
                    state.diagnose(diagnostic);
                }
            }
        }
    }

    fn run_watch_callbacks(&mut self, package: &Package, state: &mut RunState) {
        for document in &package.items {
            let reference = ReferenceKey::of(document);
            if state
                .tree
                .node(RoleKind::Watch, &TreePath::root(reference.clone()))
                .is_none()
            {
                continue;
            }
            let Some(callback) = self.registry.watch_callback_mut(&reference) else {
                continue;
            };

            state.report.watch_callbacks += 1;
            if let Err(err) = callback(document) {
                let diagnostic = Diagnostic::error(EngineError::callback(&reference, &err).to_string())
                    .for_document(document);
                state.diagnose(diagnostic);
                state.frozen = true;
            }
        }
    }
}
