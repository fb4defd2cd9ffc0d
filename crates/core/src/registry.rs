use crate::error::{EngineError, Result};
use crate::reference::ReferenceKey;
use reconcile_document::Document;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Extracts external context from a watched document into caller-held state
pub type WatchCallbackFn = Box<dyn FnMut(&Document) -> anyhow::Result<()>>;

/// Computes the desired owned children of one `For` document
pub type PopulateFn =
    Box<dyn FnMut(&Document) -> anyhow::Result<BTreeMap<ReferenceKey, Document>>>;

/// Produces the (typically updated) `For` document from its dependencies
pub type GenerateFn = Box<dyn FnMut(Option<&Document>, &[Document]) -> anyhow::Result<Document>>;

/// Whether an owned child is emitted into the package or only tracked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Materialization {
    /// Only the ledger condition is maintained; the document belongs to
    /// another pipeline
    ConditionOnly,
    /// Condition and document are maintained
    Full,
}

/// Role of a schema/kind in one configuration.
pub enum Role {
    For,
    Own(Materialization),
    Watch(Option<WatchCallbackFn>),
}

/// Copyable projection of [`Role`] used in tree keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleKind {
    For,
    Own,
    Watch,
}

/// Role metadata stored on tree nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeRole {
    For,
    Own(Materialization),
    Watch,
}

impl Role {
    pub fn kind(&self) -> RoleKind {
        match self {
            Role::For => RoleKind::For,
            Role::Own(_) => RoleKind::Own,
            Role::Watch(_) => RoleKind::Watch,
        }
    }

    pub fn node_role(&self) -> NodeRole {
        match self {
            Role::For => NodeRole::For,
            Role::Own(materialization) => NodeRole::Own(*materialization),
            Role::Watch(_) => NodeRole::Watch,
        }
    }
}

impl fmt::Debug for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::For => f.write_str("For"),
            Role::Own(materialization) => f.debug_tuple("Own").field(materialization).finish(),
            Role::Watch(callback) => f
                .debug_struct("Watch")
                .field("callback", &callback.is_some())
                .finish(),
        }
    }
}

impl NodeRole {
    pub fn kind(&self) -> RoleKind {
        match self {
            NodeRole::For => RoleKind::For,
            NodeRole::Own(_) => RoleKind::Own,
            NodeRole::Watch => RoleKind::Watch,
        }
    }
}

impl fmt::Display for RoleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RoleKind::For => "for",
            RoleKind::Own => "own",
            RoleKind::Watch => "watch",
        };
        f.write_str(label)
    }
}

/// Declarative role configuration of one pipeline.
///
/// ```
/// use reconcile_core::{Materialization, RoleConfig};
///
/// let roles = RoleConfig::for_kind("req.nephio.org/v1alpha1", "Interface")
///     .owns("ipam.alloc.nephio.org/v1alpha1", "IPAllocation", Materialization::Full)
///     .watches("infra.nephio.org/v1alpha1", "ClusterContext")
///     .populate(|_interface| Ok(Default::default()));
/// ```
pub struct RoleConfig {
    pub(crate) for_ref: ReferenceKey,
    pub(crate) owns: Vec<(ReferenceKey, Materialization)>,
    pub(crate) watches: Vec<(ReferenceKey, Option<WatchCallbackFn>)>,
    pub(crate) populate: Option<PopulateFn>,
    pub(crate) generate: Option<GenerateFn>,
}

impl RoleConfig {
    pub fn for_kind(schema: &str, kind: &str) -> Self {
        Self {
            for_ref: ReferenceKey::type_ref(schema, kind),
            owns: Vec::new(),
            watches: Vec::new(),
            populate: None,
            generate: None,
        }
    }

    pub fn owns(mut self, schema: &str, kind: &str, materialization: Materialization) -> Self {
        self.owns
            .push((ReferenceKey::type_ref(schema, kind), materialization));
        self
    }

    pub fn watches(mut self, schema: &str, kind: &str) -> Self {
        self.watches.push((ReferenceKey::type_ref(schema, kind), None));
        self
    }

    pub fn watches_with<F>(mut self, schema: &str, kind: &str, callback: F) -> Self
    where
        F: FnMut(&Document) -> anyhow::Result<()> + 'static,
    {
        self.watches
            .push((ReferenceKey::type_ref(schema, kind), Some(Box::new(callback))));
        self
    }

    pub fn populate<F>(mut self, populate: F) -> Self
    where
        F: FnMut(&Document) -> anyhow::Result<BTreeMap<ReferenceKey, Document>> + 'static,
    {
        self.populate = Some(Box::new(populate));
        self
    }

    pub fn generate<F>(mut self, generate: F) -> Self
    where
        F: FnMut(Option<&Document>, &[Document]) -> anyhow::Result<Document> + 'static,
    {
        self.generate = Some(Box::new(generate));
        self
    }
}

/// Maps each configured schema/kind to its role.
#[derive(Debug)]
pub struct Registry {
    for_ref: ReferenceKey,
    roles: BTreeMap<ReferenceKey, Role>,
}

impl Registry {
    pub fn new(for_ref: &ReferenceKey) -> Result<Self> {
        let mut registry = Self {
            for_ref: for_ref.type_key(),
            roles: BTreeMap::new(),
        };
        registry.register(for_ref, Role::For)?;
        Ok(registry)
    }

    /// Register a schema/kind. The same schema/kind can hold one role only.
    /// Registering it again fails with `DuplicateRole`, even for the same role.
    pub fn register(&mut self, reference: &ReferenceKey, role: Role) -> Result<()> {
        if reference.schema.is_empty() || reference.kind.is_empty() {
            return Err(EngineError::InvalidConfig(format!(
                "{} reference needs a schema and a kind, got {:?}",
                role.kind(),
                reference
            )));
        }

        let key = reference.type_key();
        if let Some(existing) = self.roles.get(&key) {
            return Err(EngineError::DuplicateRole {
                reference: key.to_string(),
                existing: existing.kind(),
                requested: role.kind(),
            });
        }
        log::debug!("Registered {} role for {}", role.kind(), key);
        self.roles.insert(key, role);
        Ok(())
    }

    /// Exact, case-sensitive schema/kind match; the name is ignored
    pub fn classify(&self, reference: &ReferenceKey) -> Option<&Role> {
        if reference.schema.is_empty() || reference.kind.is_empty() {
            return None;
        }
        self.roles.get(&reference.type_key())
    }

    pub fn classify_kind(&self, reference: &ReferenceKey) -> Option<RoleKind> {
        self.classify(reference).map(Role::kind)
    }

    pub fn is_for(&self, reference: &ReferenceKey) -> bool {
        self.classify_kind(reference) == Some(RoleKind::For)
    }

    /// The registry-level `For` reference (no name)
    pub fn for_type(&self) -> &ReferenceKey {
        &self.for_ref
    }

    pub fn has_own_roles(&self) -> bool {
        self.roles.values().any(|role| matches!(role, Role::Own(_)))
    }

    pub fn watch_callback_mut(&mut self, reference: &ReferenceKey) -> Option<&mut WatchCallbackFn> {
        match self.roles.get_mut(&reference.type_key()) {
            Some(Role::Watch(Some(callback))) => Some(callback),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> Registry {
        let mut registry =
            Registry::new(&ReferenceKey::type_ref("req.nephio.org/v1alpha1", "Interface"))
                .expect("registry");
        registry
            .register(
                &ReferenceKey::type_ref("ipam.alloc.nephio.org/v1alpha1", "IPAllocation"),
                Role::Own(Materialization::Full),
            )
            .expect("own");
        registry
            .register(
                &ReferenceKey::type_ref("infra.nephio.org/v1alpha1", "ClusterContext"),
                Role::Watch(None),
            )
            .expect("watch");
        registry
    }

    #[test]
    fn classify_ignores_name_and_is_case_sensitive() {
        let registry = registry();
        let named = ReferenceKey::new("req.nephio.org/v1alpha1", "Interface", "n3");
        assert!(registry.is_for(&named));
        assert_eq!(
            registry.classify_kind(&ReferenceKey::new(
                "ipam.alloc.nephio.org/v1alpha1",
                "IPAllocation",
                "x"
            )),
            Some(RoleKind::Own)
        );
        assert!(registry
            .classify(&ReferenceKey::new("req.nephio.org/v1alpha1", "interface", "n3"))
            .is_none());
        assert!(registry.classify(&ReferenceKey::default()).is_none());
        assert!(registry.has_own_roles());
    }

    #[test]
    fn duplicate_registration_fails() {
        let mut registry = registry();
        let err = registry
            .register(
                &ReferenceKey::type_ref("infra.nephio.org/v1alpha1", "ClusterContext"),
                Role::Own(Materialization::ConditionOnly),
            )
            .unwrap_err();
        assert!(err.is_fatal());
        match err {
            EngineError::DuplicateRole {
                existing,
                requested,
                ..
            } => {
                assert_eq!(existing, RoleKind::Watch);
                assert_eq!(requested, RoleKind::Own);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn same_role_registration_fails() {
        let mut registry = registry();
        let err = registry
            .register(
                &ReferenceKey::type_ref("infra.nephio.org/v1alpha1", "ClusterContext"),
                Role::Watch(None),
            )
            .unwrap_err();
        assert!(matches!(err, EngineError::DuplicateRole { .. }));
    }

    #[test]
    fn registering_the_for_kind_again_fails() {
        let mut registry = registry();
        assert!(registry
            .register(
                &ReferenceKey::type_ref("req.nephio.org/v1alpha1", "Interface"),
                Role::Watch(None),
            )
            .is_err());
    }

    #[test]
    fn watch_callbacks_are_reachable_by_type() {
        let mut registry = registry();
        let cluster = ReferenceKey::type_ref("k8s.io/v1", "Cluster");
        registry
            .register(&cluster, Role::Watch(Some(Box::new(|_doc: &Document| Ok(())))))
            .expect("watch");

        assert!(registry.watch_callback_mut(&cluster.with_name("c1")).is_some());
        assert!(registry
            .watch_callback_mut(&ReferenceKey::type_ref("infra.nephio.org/v1alpha1", "ClusterContext"))
            .is_none());
    }
}
