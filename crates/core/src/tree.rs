//! Ownership tree: the per-run inventory of tracked references.
//!
//! Roots are `For` instances and global watches; each `For` root holds its
//! owned and scoped-watch children. The tree is at most two levels deep and
//! never touches the package.

use crate::error::{EngineError, Result};
use crate::reference::ReferenceKey;
use crate::registry::{NodeRole, RoleKind};
use reconcile_document::{Condition, Document};
use std::collections::BTreeMap;

/// Key of a node within its level: the role and the reference
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeKey {
    pub role: RoleKind,
    pub reference: ReferenceKey,
}

impl NodeKey {
    pub fn new(role: RoleKind, reference: ReferenceKey) -> Self {
        Self { role, reference }
    }
}

/// Location of a node: a root, or a child of a `For` root.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TreePath {
    Root(ReferenceKey),
    Child {
        owner: ReferenceKey,
        child: ReferenceKey,
    },
}

impl TreePath {
    pub fn root(reference: ReferenceKey) -> Self {
        TreePath::Root(reference)
    }

    pub fn child(owner: ReferenceKey, child: ReferenceKey) -> Self {
        TreePath::Child { owner, child }
    }

    /// Build a path from `[root]` or `[owner, child]`
    pub fn from_refs(refs: &[ReferenceKey]) -> Result<Self> {
        match refs {
            [root] => Ok(TreePath::Root(root.clone())),
            [owner, child] => Ok(TreePath::Child {
                owner: owner.clone(),
                child: child.clone(),
            }),
            other => Err(EngineError::InvalidPathDepth(other.len())),
        }
    }

    pub fn depth(&self) -> usize {
        match self {
            TreePath::Root(_) => 1,
            TreePath::Child { .. } => 2,
        }
    }

    /// The reference the path points at
    pub fn target(&self) -> &ReferenceKey {
        match self {
            TreePath::Root(reference) => reference,
            TreePath::Child { child, .. } => child,
        }
    }

    pub fn owner(&self) -> Option<&ReferenceKey> {
        match self {
            TreePath::Root(_) => None,
            TreePath::Child { owner, .. } => Some(owner),
        }
    }
}

/// Value stored into one slot of a node
#[derive(Debug, Clone, PartialEq)]
pub enum TreeEntry {
    ExistingCondition(Condition),
    ExistingDocument(Document),
    NewDocument(Document),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResourceNode {
    pub role: NodeRole,
    pub existing_condition: Option<Condition>,
    pub existing_document: Option<Document>,
    pub new_document: Option<Document>,
    /// Only populated on `For` roots
    pub children: BTreeMap<NodeKey, ResourceNode>,
}

impl ResourceNode {
    fn new(role: NodeRole) -> Self {
        Self {
            role,
            existing_condition: None,
            existing_document: None,
            new_document: None,
            children: BTreeMap::new(),
        }
    }

    fn apply(&mut self, entry: TreeEntry) {
        match entry {
            TreeEntry::ExistingCondition(condition) => self.existing_condition = Some(condition),
            TreeEntry::ExistingDocument(document) => self.existing_document = Some(document),
            TreeEntry::NewDocument(document) => self.new_document = Some(document),
        }
    }

    /// Children of the given role, keyed by reference
    pub fn children_of(&self, role: RoleKind) -> impl Iterator<Item = (&ReferenceKey, &ResourceNode)> {
        self.children
            .iter()
            .filter(move |(key, _)| key.role == role)
            .map(|(key, node)| (&key.reference, node))
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct OwnershipTree {
    roots: BTreeMap<NodeKey, ResourceNode>,
}

impl OwnershipTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `entry` at `path`, creating the node (and its `For` owner) on
    /// demand.
    pub fn upsert(&mut self, role: NodeRole, path: &TreePath, entry: TreeEntry) -> Result<()> {
        check_role_depth(role.kind(), path)?;
        for reference in path.owner().into_iter().chain([path.target()]) {
            if !reference.is_named() {
                return Err(EngineError::InvalidReference(format!(
                    "tree entries need a named reference, got {reference:?}"
                )));
            }
        }

        let node = match path {
            TreePath::Root(reference) => self
                .roots
                .entry(NodeKey::new(role.kind(), reference.clone()))
                .or_insert_with(|| ResourceNode::new(role)),
            TreePath::Child { owner, child } => self
                .roots
                .entry(NodeKey::new(RoleKind::For, owner.clone()))
                .or_insert_with(|| ResourceNode::new(NodeRole::For))
                .children
                .entry(NodeKey::new(role.kind(), child.clone()))
                .or_insert_with(|| ResourceNode::new(role)),
        };
        node.role = role;
        node.apply(entry);
        log::trace!("Tree upsert {:?} at {:?}", role, path);
        Ok(())
    }

    /// Clear the condition slot at `path`; no-op when nothing is there
    pub fn remove(&mut self, role: RoleKind, path: &TreePath) {
        if let Some(node) = self.node_mut(role, path) {
            node.existing_condition = None;
        }
    }

    /// Root entries of `role`, or the children of `role` under the `For`
    /// instance `scope`
    pub fn lookup(
        &self,
        role: RoleKind,
        scope: Option<&ReferenceKey>,
    ) -> BTreeMap<&ReferenceKey, &ResourceNode> {
        match scope {
            None => self
                .roots
                .iter()
                .filter(|(key, _)| key.role == role)
                .map(|(key, node)| (&key.reference, node))
                .collect(),
            Some(owner) => self
                .roots
                .get(&NodeKey::new(RoleKind::For, owner.clone()))
                .map(|node| node.children_of(role).collect())
                .unwrap_or_default(),
        }
    }

    pub fn node(&self, role: RoleKind, path: &TreePath) -> Option<&ResourceNode> {
        match path {
            TreePath::Root(reference) => self.roots.get(&NodeKey::new(role, reference.clone())),
            TreePath::Child { owner, child } => self
                .roots
                .get(&NodeKey::new(RoleKind::For, owner.clone()))?
                .children
                .get(&NodeKey::new(role, child.clone())),
        }
    }

    pub fn node_mut(&mut self, role: RoleKind, path: &TreePath) -> Option<&mut ResourceNode> {
        match path {
            TreePath::Root(reference) => {
                self.roots.get_mut(&NodeKey::new(role, reference.clone()))
            }
            TreePath::Child { owner, child } => self
                .roots
                .get_mut(&NodeKey::new(RoleKind::For, owner.clone()))?
                .children
                .get_mut(&NodeKey::new(role, child.clone())),
        }
    }

    /// All `For` instances, in key order
    pub fn for_refs(&self) -> Vec<ReferenceKey> {
        self.roots
            .keys()
            .filter(|key| key.role == RoleKind::For)
            .map(|key| key.reference.clone())
            .collect()
    }

    pub fn roots(&self) -> impl Iterator<Item = (&NodeKey, &ResourceNode)> {
        self.roots.iter()
    }

    /// Number of nodes, children included
    pub fn len(&self) -> usize {
        self.roots
            .values()
            .map(|node| 1 + node.children.len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }
}

fn check_role_depth(role: RoleKind, path: &TreePath) -> Result<()> {
    let valid = match path {
        TreePath::Root(_) => matches!(role, RoleKind::For | RoleKind::Watch),
        TreePath::Child { .. } => matches!(role, RoleKind::Own | RoleKind::Watch),
    };
    if valid {
        Ok(())
    } else {
        Err(EngineError::InvalidRoleForDepth {
            role,
            depth: path.depth(),
        })
    }
}
