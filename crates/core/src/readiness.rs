//! Readiness evaluation over the ownership tree.
//!
//! A node is satisfied when its document exists, is not marked for deletion,
//! and its ledger condition is absent or not `False`. An absent condition is
//! optimistic (first-time creation); an absent document never is.

use crate::reference::ReferenceKey;
use crate::registry::{Registry, RoleKind};
use crate::tree::{OwnershipTree, ResourceNode};
use reconcile_document::Document;
use serde::Serialize;
use std::collections::BTreeMap;

/// Value of the deletion marker annotation
pub const DELETE_MARKER_VALUE: &str = "true";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceReadiness {
    pub ready: bool,
    /// Dependencies that are not satisfied, encoded
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub blocked_by: Vec<String>,
}

/// Result of one readiness evaluation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Readiness {
    /// No `Own` role is configured, so nothing can become ready
    pub inert: bool,
    pub global_ready: bool,
    /// Global watches that are not satisfied
    pub global_blocked_by: Vec<String>,
    pub instances: BTreeMap<ReferenceKey, InstanceReadiness>,
}

impl Readiness {
    pub fn is_ready(&self, for_ref: &ReferenceKey) -> bool {
        self.instances
            .get(for_ref)
            .is_some_and(|instance| instance.ready)
    }

    pub fn ready_count(&self) -> usize {
        self.instances.values().filter(|i| i.ready).count()
    }
}

/// The documents a `For` instance depends on
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InstanceDependencies {
    pub for_document: Option<Document>,
    pub owns: Vec<Document>,
    pub watches: Vec<Document>,
}

impl InstanceDependencies {
    /// Owned documents followed by watched ones
    pub fn documents(&self) -> Vec<Document> {
        self.owns.iter().chain(&self.watches).cloned().collect()
    }
}

#[derive(Debug, Clone)]
pub struct ReadinessEvaluator {
    delete_annotation: String,
}

impl ReadinessEvaluator {
    pub fn new(delete_annotation: impl Into<String>) -> Self {
        Self {
            delete_annotation: delete_annotation.into(),
        }
    }

    pub fn is_marked_deleted(&self, document: &Document) -> bool {
        document.annotation(&self.delete_annotation) == Some(DELETE_MARKER_VALUE)
    }

    pub fn is_satisfied(&self, node: &ResourceNode) -> bool {
        let document_present = node
            .existing_document
            .as_ref()
            .is_some_and(|document| !self.is_marked_deleted(document));
        let condition_ok = node
            .existing_condition
            .as_ref()
            .map_or(true, |condition| !condition.is_false());
        document_present && condition_ok
    }

    fn global_blockers(&self, tree: &OwnershipTree) -> Vec<String> {
        tree.lookup(RoleKind::Watch, None)
            .into_iter()
            .filter(|(_, node)| !self.is_satisfied(node))
            .map(|(reference, _)| reference.to_string())
            .collect()
    }

    /// Every global watch is satisfied
    pub fn global_ready(&self, tree: &OwnershipTree) -> bool {
        self.global_blockers(tree).is_empty()
    }

    fn scoped_blockers(
        &self,
        tree: &OwnershipTree,
        for_ref: &ReferenceKey,
        roles: &[RoleKind],
    ) -> Vec<String> {
        roles
            .iter()
            .flat_map(|role| tree.lookup(*role, Some(for_ref)))
            .filter(|(_, node)| !self.is_satisfied(node))
            .map(|(reference, _)| reference.to_string())
            .collect()
    }

    /// Stage 1 gate: global watches and the instance's scoped watches.
    /// Owned children are what populate produces, so they are not checked.
    pub fn populate_ready(&self, tree: &OwnershipTree, for_ref: &ReferenceKey) -> bool {
        self.global_ready(tree) && self.scoped_blockers(tree, for_ref, &[RoleKind::Watch]).is_empty()
    }

    /// Readiness of every `For` instance. Inert without `Own` roles.
    pub fn evaluate(&self, tree: &OwnershipTree, registry: &Registry) -> Readiness {
        if !registry.has_own_roles() {
            let instances = tree
                .for_refs()
                .into_iter()
                .map(|for_ref| {
                    let instance = InstanceReadiness {
                        ready: false,
                        blocked_by: Vec::new(),
                    };
                    (for_ref, instance)
                })
                .collect();
            return Readiness {
                inert: true,
                global_ready: false,
                global_blocked_by: Vec::new(),
                instances,
            };
        }
        self.evaluate_bypassing_inert(tree)
    }

    /// Same rule as [`Self::evaluate`] without the `Own` precondition, for
    /// pipelines that only generate
    pub fn evaluate_bypassing_inert(&self, tree: &OwnershipTree) -> Readiness {
        let global_blocked_by = self.global_blockers(tree);
        let global_ready = global_blocked_by.is_empty();

        let mut instances = BTreeMap::new();
        for for_ref in tree.for_refs() {
            let mut blocked_by = global_blocked_by.clone();
            blocked_by.extend(self.scoped_blockers(tree, &for_ref, &[RoleKind::Own, RoleKind::Watch]));

            let has_children = tree
                .lookup(RoleKind::Own, Some(&for_ref))
                .len()
                + tree.lookup(RoleKind::Watch, Some(&for_ref)).len()
                > 0;
            let for_roots = tree.lookup(RoleKind::For, None);
            let for_document = for_roots
                .get(&for_ref)
                .and_then(|node| node.existing_document.as_ref());
            // A marked For document is being torn down; generating would
            // resurrect it
            let withdrawn = for_document.is_some_and(|document| self.is_marked_deleted(document));
            if withdrawn || (for_document.is_none() && !has_children) {
                blocked_by.push(for_ref.to_string());
            }

            let ready = blocked_by.is_empty();
            log::debug!("Instance {} ready={}", for_ref, ready);
            instances.insert(for_ref, InstanceReadiness { ready, blocked_by });
        }

        Readiness {
            inert: false,
            global_ready,
            global_blocked_by,
            instances,
        }
    }

    /// The `For` document and the documents of its scoped children
    pub fn instance_dependencies(
        &self,
        tree: &OwnershipTree,
        for_ref: &ReferenceKey,
    ) -> InstanceDependencies {
        let for_document = tree
            .lookup(RoleKind::For, None)
            .get(for_ref)
            .and_then(|node| node.existing_document.clone());
        let collect = |role: RoleKind| -> Vec<Document> {
            tree.lookup(role, Some(for_ref))
                .into_values()
                .filter_map(|node| node.existing_document.clone())
                .collect()
        };
        InstanceDependencies {
            for_document,
            owns: collect(RoleKind::Own),
            watches: collect(RoleKind::Watch),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{Materialization, NodeRole, Role};
    use crate::tree::{TreeEntry, TreePath};
    use reconcile_document::{Condition, ConditionStatus};

    const DELETE: &str = "fnruntime.nephio.org/delete";

    fn interface(name: &str) -> ReferenceKey {
        ReferenceKey::new("req.nephio.org/v1alpha1", "Interface", name)
    }

    fn alloc(name: &str) -> ReferenceKey {
        ReferenceKey::new("ipam.alloc.nephio.org/v1alpha1", "IPAllocation", name)
    }

    fn cluster() -> ReferenceKey {
        ReferenceKey::new("infra.nephio.org/v1alpha1", "ClusterContext", "edge")
    }

    fn doc(reference: &ReferenceKey) -> Document {
        Document::new(&reference.schema, &reference.kind, &reference.name)
    }

    fn registry(with_own: bool) -> Registry {
        let mut registry = Registry::new(&interface("").type_key()).expect("registry");
        if with_own {
            registry
                .register(&alloc("").type_key(), Role::Own(Materialization::Full))
                .expect("own");
        }
        registry
            .register(&cluster().type_key(), Role::Watch(None))
            .expect("watch");
        registry
    }

    fn tree_with_instances(names: &[&str]) -> OwnershipTree {
        let mut tree = OwnershipTree::new();
        tree.upsert(
            NodeRole::Watch,
            &TreePath::root(cluster()),
            TreeEntry::ExistingDocument(doc(&cluster())),
        )
        .expect("watch");
        for name in names {
            tree.upsert(
                NodeRole::For,
                &TreePath::root(interface(name)),
                TreeEntry::ExistingDocument(doc(&interface(name))),
            )
            .expect("for");
            tree.upsert(
                NodeRole::Own(Materialization::Full),
                &TreePath::child(interface(name), alloc(name)),
                TreeEntry::ExistingDocument(doc(&alloc(name))),
            )
            .expect("own");
        }
        tree
    }

    #[test]
    fn satisfaction_rules() {
        let evaluator = ReadinessEvaluator::new(DELETE);
        let mut tree = OwnershipTree::new();
        let path = TreePath::root(cluster());

        tree.upsert(
            NodeRole::Watch,
            &path,
            TreeEntry::ExistingCondition(Condition::new(cluster().to_string(), ConditionStatus::True)),
        )
        .expect("condition");
        let node = tree.node(RoleKind::Watch, &path).expect("node");
        assert!(!evaluator.is_satisfied(node), "condition without document");

        let mut marked = doc(&cluster());
        marked.set_annotation(DELETE, "true").expect("annotate");
        tree.upsert(NodeRole::Watch, &path, TreeEntry::ExistingDocument(marked))
            .expect("document");
        let node = tree.node(RoleKind::Watch, &path).expect("node");
        assert!(!evaluator.is_satisfied(node), "marked document");

        tree.upsert(NodeRole::Watch, &path, TreeEntry::ExistingDocument(doc(&cluster())))
            .expect("document");
        let node = tree.node(RoleKind::Watch, &path).expect("node");
        assert!(evaluator.is_satisfied(node));

        tree.upsert(
            NodeRole::Watch,
            &path,
            TreeEntry::ExistingCondition(Condition::new(cluster().to_string(), ConditionStatus::False)),
        )
        .expect("condition");
        let node = tree.node(RoleKind::Watch, &path).expect("node");
        assert!(!evaluator.is_satisfied(node), "false condition");
    }

    #[test]
    fn no_own_roles_is_inert() {
        let evaluator = ReadinessEvaluator::new(DELETE);
        let tree = tree_with_instances(&["n3"]);
        let readiness = evaluator.evaluate(&tree, &registry(false));
        assert!(readiness.inert);
        assert!(!readiness.is_ready(&interface("n3")));

        let bypassed = evaluator.evaluate_bypassing_inert(&tree);
        assert!(bypassed.is_ready(&interface("n3")));
    }

    #[test]
    fn failing_scoped_child_only_blocks_its_instance() {
        let evaluator = ReadinessEvaluator::new(DELETE);
        let mut tree = tree_with_instances(&["n3", "n6"]);
        let readiness = evaluator.evaluate(&tree, &registry(true));
        assert_eq!(readiness.ready_count(), 2);

        tree.upsert(
            NodeRole::Own(Materialization::Full),
            &TreePath::child(interface("n3"), alloc("n3")),
            TreeEntry::ExistingCondition(Condition::new(alloc("n3").to_string(), ConditionStatus::False)),
        )
        .expect("condition");
        let readiness = evaluator.evaluate(&tree, &registry(true));
        assert!(!readiness.is_ready(&interface("n3")));
        assert!(readiness.is_ready(&interface("n6")));
        assert_eq!(
            readiness.instances[&interface("n3")].blocked_by,
            vec![alloc("n3").to_string()]
        );
    }

    #[test]
    fn failing_global_watch_blocks_every_instance() {
        let evaluator = ReadinessEvaluator::new(DELETE);
        let mut tree = tree_with_instances(&["n3", "n6"]);
        tree.upsert(
            NodeRole::Watch,
            &TreePath::root(cluster()),
            TreeEntry::ExistingCondition(Condition::new(cluster().to_string(), ConditionStatus::False)),
        )
        .expect("condition");

        let readiness = evaluator.evaluate(&tree, &registry(true));
        assert!(!readiness.global_ready);
        assert_eq!(readiness.ready_count(), 0);
        assert!(!evaluator.populate_ready(&tree, &interface("n3")));
    }

    #[test]
    fn populate_gate_ignores_owned_children() {
        let evaluator = ReadinessEvaluator::new(DELETE);
        let mut tree = tree_with_instances(&["n3"]);
        tree.upsert(
            NodeRole::Own(Materialization::Full),
            &TreePath::child(interface("n3"), alloc("n3")),
            TreeEntry::ExistingCondition(Condition::new(alloc("n3").to_string(), ConditionStatus::False)),
        )
        .expect("condition");
        assert!(evaluator.populate_ready(&tree, &interface("n3")));
    }

    #[test]
    fn condition_only_instance_is_not_ready() {
        let evaluator = ReadinessEvaluator::new(DELETE);
        let mut tree = OwnershipTree::new();
        tree.upsert(
            NodeRole::For,
            &TreePath::root(interface("n3")),
            TreeEntry::ExistingCondition(Condition::new(interface("n3").to_string(), ConditionStatus::False)),
        )
        .expect("condition");
        let readiness = evaluator.evaluate_bypassing_inert(&tree);
        assert!(readiness.global_ready);
        assert!(!readiness.is_ready(&interface("n3")));
    }

    #[test]
    fn marked_for_document_is_not_ready() {
        let evaluator = ReadinessEvaluator::new(DELETE);
        let mut tree = tree_with_instances(&["n3", "n6"]);
        let mut marked = doc(&interface("n3"));
        marked.set_annotation(DELETE, "true").expect("annotate");
        tree.upsert(
            NodeRole::For,
            &TreePath::root(interface("n3")),
            TreeEntry::ExistingDocument(marked),
        )
        .expect("for");

        let readiness = evaluator.evaluate(&tree, &registry(true));
        assert!(!readiness.is_ready(&interface("n3")));
        assert!(readiness.is_ready(&interface("n6")));
        assert_eq!(
            readiness.instances[&interface("n3")].blocked_by,
            vec![interface("n3").to_string()]
        );
    }

    #[test]
    fn dependencies_list_owns_then_watches() {
        let evaluator = ReadinessEvaluator::new(DELETE);
        let tree = tree_with_instances(&["n3"]);
        let deps = evaluator.instance_dependencies(&tree, &interface("n3"));
        assert!(deps.for_document.is_some());
        assert_eq!(deps.owns.len(), 1);
        assert!(deps.watches.is_empty());
        assert_eq!(deps.documents(), vec![doc(&alloc("n3"))]);
    }
}
