use super::{Engine, RunState};
use crate::error::{EngineError, Result};
use crate::ledger::encode;
use crate::readiness::{Readiness, DELETE_MARKER_VALUE};
use crate::reference::ReferenceKey;
use crate::registry::{NodeRole, RoleKind};
use crate::tree::{TreeEntry, TreePath};
use reconcile_document::{ConditionStatus, Diagnostic, Document, Package};

const MSG_GENERATED: &str = "generated";

impl Engine {
    /// Hand every ready instance to `generate`; without owned kinds, mark
    /// the `For` documents of instances that are not ready.
    pub(super) fn generate_stage(&mut self, package: &mut Package, state: &mut RunState) {
        if state.frozen {
            log::warn!("Skipping generate, reconcile is frozen for this run");
            return;
        }

        let has_own = self.registry.has_own_roles();
        let readiness: Readiness = if has_own {
            self.readiness.evaluate(&state.tree, &self.registry)
        } else {
            self.readiness.evaluate_bypassing_inert(&state.tree)
        };
        if has_own && !readiness.global_ready {
            log::info!(
                "Not generating, waiting for {}",
                readiness.global_blocked_by.join(", ")
            );
            return;
        }

        for (for_ref, instance) in &readiness.instances {
            if state.excluded.contains(for_ref) {
                continue;
            }
            let outcome = if instance.ready {
                self.generate_instance(for_ref, package, state)
            } else {
                log::debug!(
                    "Instance {for_ref} not ready, blocked by {}",
                    instance.blocked_by.join(", ")
                );
                if has_own {
                    Ok(())
                } else {
                    self.retire_instance(for_ref, package, state)
                }
            };
            if let Err(err) = outcome {
                let mut diagnostic = Diagnostic::error(err.to_string());
                if let Some(document) = for_document(state, for_ref) {
                    diagnostic = diagnostic.for_document(&document);
                }
                state.diagnose(diagnostic);
            }
        }
    }

    fn generate_instance(
        &mut self,
        for_ref: &ReferenceKey,
        package: &mut Package,
        state: &mut RunState,
    ) -> Result<()> {
        let dependencies = self.readiness.instance_dependencies(&state.tree, for_ref);
        if self.registry.has_own_roles() && dependencies.for_document.is_none() {
            return Err(EngineError::MissingForObject(for_ref.to_string()));
        }
        let Some(generate) = self.generate.as_mut() else {
            return Ok(());
        };

        let mut generated = generate(dependencies.for_document.as_ref(), &dependencies.documents())
            .map_err(|err| EngineError::callback(for_ref, &err))?;

        let for_type = encode(for_ref);
        let owner = state
            .ledger
            .condition(&for_type)
            .map(|condition| condition.reason.clone())
            .filter(|reason| !reason.is_empty())
            .unwrap_or_else(|| for_type.clone());
        generated.set_annotation(&self.config.owner_annotation, &owner)?;
        generated.remove_annotation(&self.config.delete_annotation);

        package.set_document(generated.clone());
        if for_ref.matches(&generated) {
            state.tree.upsert(
                NodeRole::For,
                &TreePath::root(for_ref.clone()),
                TreeEntry::ExistingDocument(generated),
            )?;
        }

        if let Some(existing) = state.ledger.condition(&for_type).cloned() {
            let mut condition = existing;
            condition.status = ConditionStatus::True;
            condition.message = MSG_GENERATED.to_string();
            state.ledger.set_condition(condition);
        }
        state.report.generated += 1;
        log::debug!("Generated {for_ref} (owner {owner})");
        Ok(())
    }

    /// A generate-only pipeline withdraws documents whose inputs are gone
    fn retire_instance(
        &self,
        for_ref: &ReferenceKey,
        package: &mut Package,
        state: &mut RunState,
    ) -> Result<()> {
        let Some(mut document) = for_document(state, for_ref) else {
            return Ok(());
        };
        if self.readiness.is_marked_deleted(&document) {
            return Ok(());
        }
        document.set_annotation(&self.config.delete_annotation, DELETE_MARKER_VALUE)?;
        package.set_document(document.clone());
        state.tree.upsert(
            NodeRole::For,
            &TreePath::root(for_ref.clone()),
            TreeEntry::ExistingDocument(document),
        )?;
        log::info!("Marked {for_ref} for deletion");
        Ok(())
    }
}

fn for_document(state: &RunState, for_ref: &ReferenceKey) -> Option<Document> {
    state
        .tree
        .node(RoleKind::For, &TreePath::root(for_ref.clone()))
        .and_then(|node| node.existing_document.clone())
}
