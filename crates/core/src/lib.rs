//! # Reconcile Core
//!
//! Ownership inventory and two-stage reconcile pipeline over a configuration
//! package. All durable state lives in the package itself: documents carry
//! an owner annotation, and the ledger document carries one condition per
//! tracked reference.
//!
//! ## Pipeline
//!
//! ```text
//! Package (documents + ledger)
//!     │
//!     ├──> Discover
//!     │      ├─ Ledger conditions → tree slots (decode)
//!     │      └─ Documents → tree slots (role registry, owner annotation)
//!     │
//!     ├──> Stage 1
//!     │      ├─ Watch callbacks (global watches)
//!     │      ├─ Populate (desired owned children per For instance)
//!     │      ├─ Diff (existing vs. new, cascade when For is gone)
//!     │      └─ Commit (ledger conditions, documents, delete markers)
//!     │
//!     ├──> Stage 2
//!     │      └─ Generate (ready instances → updated For document)
//!     │
//!     └──> Done (ledger write-back, diagnostics)
//! ```
//!
//! ## Example
//!
//! ```
//! use reconcile_core::{Engine, EngineConfig, Materialization, RoleConfig};
//! use reconcile_document::Package;
//!
//! let roles = RoleConfig::for_kind("req.nephio.org/v1alpha1", "Interface")
//!     .owns("ipam.alloc.nephio.org/v1alpha1", "IPAllocation", Materialization::Full)
//!     .populate(|_interface| Ok(Default::default()));
//! let mut engine = Engine::new(roles, EngineConfig::default())?;
//!
//! let mut package = Package::default();
//! let report = engine.run(&mut package)?;
//! assert!(report.changes.is_empty());
//! # Ok::<(), reconcile_core::EngineError>(())
//! ```

mod config;
mod diff;
mod error;
mod ledger;
mod pipeline;
mod readiness;
mod reference;
mod registry;
mod tree;

pub use config::{
    EngineConfig, LedgerConfig, DEFAULT_DELETE_ANNOTATION, DEFAULT_LEDGER_API_VERSION,
    DEFAULT_LEDGER_KIND, DEFAULT_LEDGER_NAME, DEFAULT_OWNER_ANNOTATION, DEFAULT_PAYLOAD_FIELD,
};
pub use diff::{Change, ChangeKind, ChangeSet, DiffEngine, DiffOptions, InstanceChanges};
pub use error::{EngineError, Result};
pub use ledger::{child_condition, decode, encode, Ledger};
pub use pipeline::{
    ChangeView, Engine, InstanceChangesView, NodeView, Plan, PlanView, ReadinessView, RunReport,
    Stage,
};
pub use readiness::{
    InstanceDependencies, InstanceReadiness, Readiness, ReadinessEvaluator, DELETE_MARKER_VALUE,
};
pub use reference::ReferenceKey;
pub use registry::{
    GenerateFn, Materialization, NodeRole, PopulateFn, Registry, Role, RoleConfig, RoleKind,
    WatchCallbackFn,
};
pub use tree::{NodeKey, OwnershipTree, ResourceNode, TreeEntry, TreePath};
