use super::{Engine, RunState};
use crate::ledger::decode;
use crate::reference::ReferenceKey;
use crate::registry::{NodeRole, Registry, Role};
use crate::tree::{TreeEntry, TreePath};
use reconcile_document::{Diagnostic, Document, Package};

impl Engine {
    /// Load the ledger conditions and the package documents into the tree.
    pub(super) fn discover(&self, package: &Package, state: &mut RunState) {
        let anomalies: Vec<String> = state.ledger.anomalies().to_vec();
        for anomaly in anomalies {
            let diagnostic = Diagnostic::warning(anomaly).for_document(state.ledger.document());
            state.diagnose(diagnostic);
        }

        self.discover_for_conditions(state);
        self.discover_child_conditions(state);
        self.discover_documents(package, state);

        log::debug!(
            "Discovered {} nodes, upstream owner kind {}",
            state.tree.len(),
            state
                .upstream
                .as_ref()
                .map_or_else(|| "none".to_string(), ToString::to_string)
        );
    }

    fn discover_for_conditions(&self, state: &mut RunState) {
        let for_type = self.registry.for_type().clone();
        let conditions = state.ledger.conditions().to_vec();
        for condition in conditions {
            let reference = decode(&condition.condition_type);
            if !self.registry.is_for(&reference) {
                continue;
            }
            if state.upstream.is_none() && !condition.reason.is_empty() {
                let owner = decode(&condition.reason);
                if !owner.is_zero() && !owner.same_type(&for_type) {
                    state.upstream = Some(owner.type_key());
                }
            }
            record(
                state,
                NodeRole::For,
                TreePath::root(reference),
                TreeEntry::ExistingCondition(condition),
            );
        }
    }

    fn discover_child_conditions(&self, state: &mut RunState) {
        let conditions = state.ledger.conditions().to_vec();
        for condition in conditions {
            let reference = decode(&condition.condition_type);
            let owner = decode(&condition.reason);
            let path = match self.registry.classify(&reference) {
                Some(Role::Own(materialization)) => {
                    if !self.registry.is_for(&owner) {
                        log::debug!(
                            "Condition {} is owned by {}, not tracked here",
                            condition.condition_type,
                            condition.reason
                        );
                        continue;
                    }
                    Some((
                        NodeRole::Own(*materialization),
                        TreePath::child(owner, reference),
                    ))
                }
                Some(Role::Watch(_)) => Some((
                    NodeRole::Watch,
                    watch_path(&self.registry, state.upstream.as_ref(), &owner, reference),
                )),
                Some(Role::For) | None => None,
            };
            if let Some((role, path)) = path {
                record(state, role, path, TreeEntry::ExistingCondition(condition));
            }
        }
    }

    fn discover_documents(&self, package: &Package, state: &mut RunState) {
        let ledger_config = &self.config.ledger;
        let ledger_position = package.position_of_kind(&ledger_config.api_version, &ledger_config.kind);

        for (idx, document) in package.items.iter().enumerate() {
            if Some(idx) == ledger_position {
                continue;
            }
            let reference = ReferenceKey::of(document);
            let owner = document
                .annotation(&self.config.owner_annotation)
                .map(decode)
                .unwrap_or_default();

            let placement = match self.registry.classify(&reference) {
                Some(Role::For) => Some((NodeRole::For, TreePath::root(reference))),
                Some(Role::Own(materialization)) => {
                    if self.registry.is_for(&owner) {
                        Some((
                            NodeRole::Own(*materialization),
                            TreePath::child(owner, reference),
                        ))
                    } else {
                        log::debug!("Document {reference} has no tracked owner, ignoring it");
                        None
                    }
                }
                Some(Role::Watch(_)) => Some((
                    NodeRole::Watch,
                    watch_path(&self.registry, state.upstream.as_ref(), &owner, reference),
                )),
                None => None,
            };

            if let Some((role, path)) = placement {
                record_document(state, role, path, document);
            }
        }
    }
}

/// Place a watch: scoped to a `For` instance, or global.
///
/// First match wins:
/// 1. the owner is a `For` reference: scoped to that owner
/// 2. the owner has the upstream owner kind: scoped to the `For` instance
///    named like the owner
/// 3. the watch itself has the upstream owner kind: scoped to the `For`
///    instance named like the watch
/// 4. otherwise global
pub(crate) fn watch_path(
    registry: &Registry,
    upstream: Option<&ReferenceKey>,
    owner: &ReferenceKey,
    watch: ReferenceKey,
) -> TreePath {
    if registry.is_for(owner) {
        return TreePath::child(owner.clone(), watch);
    }
    if let Some(upstream) = upstream {
        if owner.is_named() && owner.same_type(upstream) {
            return TreePath::child(registry.for_type().with_name(owner.name.clone()), watch);
        }
        if watch.same_type(upstream) {
            let for_ref = registry.for_type().with_name(watch.name.clone());
            return TreePath::child(for_ref, watch);
        }
    }
    TreePath::root(watch)
}

fn record(state: &mut RunState, role: NodeRole, path: TreePath, entry: TreeEntry) {
    if let Err(err) = state.tree.upsert(role, &path, entry) {
        let diagnostic = Diagnostic::warning(format!(
            "cannot track {}: {err}",
            path.target()
        ));
        state.diagnose(diagnostic);
    }
}

fn record_document(state: &mut RunState, role: NodeRole, path: TreePath, document: &Document) {
    if let Err(err) = state
        .tree
        .upsert(role, &path, TreeEntry::ExistingDocument(document.clone()))
    {
        let diagnostic =
            Diagnostic::warning(format!("cannot track document: {err}")).for_document(document);
        state.diagnose(diagnostic);
    }
}
