//! Two-stage reconcile pipeline.
//!
//! Stage 1 (`Populate` → `Diff` → `Commit`) brings the owned children in
//! line with what `populate` computes. Stage 2 (`Generate`) hands the ready
//! instances to `generate`. `Done` always writes the ledger back.

mod commit;
mod discover;
mod generate;
mod plan;
mod populate;

pub use plan::{ChangeView, InstanceChangesView, NodeView, Plan, PlanView, ReadinessView};

use crate::config::EngineConfig;
use crate::diff::{ChangeSet, DiffEngine, DiffOptions};
use crate::error::{EngineError, Result};
use crate::ledger::Ledger;
use crate::readiness::ReadinessEvaluator;
use crate::reference::ReferenceKey;
use crate::registry::{GenerateFn, PopulateFn, Registry, Role, RoleConfig};
use crate::tree::OwnershipTree;
use reconcile_document::{Diagnostic, Package};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Init,
    Discover,
    Populate,
    Diff,
    Commit,
    Generate,
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Stage::Init => "init",
            Stage::Discover => "discover",
            Stage::Populate => "populate",
            Stage::Diff => "diff",
            Stage::Commit => "commit",
            Stage::Generate => "generate",
            Stage::Done => "done",
        };
        f.write_str(label)
    }
}

/// Outcome of one [`Engine::run`]
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub stages: Vec<Stage>,
    /// Changes computed and applied during commit
    pub changes: ChangeSet,
    pub populated: usize,
    pub generated: usize,
    pub watch_callbacks: usize,
    pub diagnostics: Vec<Diagnostic>,
}

impl RunReport {
    fn enter(&mut self, stage: Stage) {
        log::debug!("Entering stage {stage}");
        self.stages.push(stage);
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_error)
    }
}

/// Per-run scratch state, discarded when the run ends
struct RunState {
    ledger: Ledger,
    tree: OwnershipTree,
    /// Kind of the pipeline that created the `For` instances, if any
    upstream: Option<ReferenceKey>,
    /// Instances whose populate failed; no diff, no generate
    excluded: BTreeSet<ReferenceKey>,
    /// A watch callback failed; Stage 1 and generate are skipped
    frozen: bool,
    report: RunReport,
}

impl RunState {
    fn diagnose(&mut self, diagnostic: Diagnostic) {
        if diagnostic.is_error() {
            log::error!("{}", diagnostic.message);
        } else {
            log::warn!("{}", diagnostic.message);
        }
        self.report.diagnostics.push(diagnostic);
    }
}

/// The reconcile engine for one role configuration.
pub struct Engine {
    registry: Registry,
    config: EngineConfig,
    populate: Option<PopulateFn>,
    generate: Option<GenerateFn>,
    readiness: ReadinessEvaluator,
    diff: DiffEngine,
}

impl Engine {
    /// Validate the configuration and build the role registry.
    ///
    /// Configuration errors are fatal and surface here, before any document
    /// is read.
    pub fn new(roles: RoleConfig, config: EngineConfig) -> Result<Self> {
        config.validate()?;
        if roles.for_ref.schema.is_empty() || roles.for_ref.kind.is_empty() {
            return Err(EngineError::InvalidConfig(
                "the for reference needs a schema and a kind".to_string(),
            ));
        }

        let mut registry = Registry::new(&roles.for_ref)?;
        for (reference, materialization) in &roles.owns {
            registry.register(reference, Role::Own(*materialization))?;
        }
        for (reference, callback) in roles.watches {
            registry.register(&reference, Role::Watch(callback))?;
        }

        if registry.has_own_roles() && roles.populate.is_none() {
            return Err(EngineError::InvalidConfig(
                "a populate callback is required when owned kinds are configured".to_string(),
            ));
        }

        let readiness = ReadinessEvaluator::new(config.delete_annotation.clone());
        let diff = DiffEngine::new(DiffOptions {
            payload_field: config.payload_field.clone(),
            delete_annotation: config.delete_annotation.clone(),
        });

        Ok(Self {
            registry,
            config,
            populate: roles.populate,
            generate: roles.generate,
            readiness,
            diff,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Reconcile `package` in place.
    ///
    /// Callback failures and ledger anomalies become diagnostics in the
    /// package results; an `Err` means the package could not be written back.
    pub fn run(&mut self, package: &mut Package) -> Result<RunReport> {
        let mut state = self.stage_one(package);

        if state.frozen || !self.registry.has_own_roles() {
            log::debug!("Skipping commit");
        } else {
            state.report.enter(Stage::Commit);
            let changes = state.report.changes.clone();
            self.commit(&changes, package, &mut state);
        }

        state.report.enter(Stage::Generate);
        self.generate_stage(package, &mut state);

        state.report.enter(Stage::Done);
        state.ledger.write_back(package)?;
        package
            .results
            .extend(state.report.diagnostics.iter().cloned());

        log::info!(
            "Reconciled {} for instances: {} changes, {} populated, {} generated, {} diagnostics",
            state.tree.for_refs().len(),
            state.report.changes.len(),
            state.report.populated,
            state.report.generated,
            state.report.diagnostics.len()
        );
        Ok(state.report)
    }

    /// Discover, populate and diff without writing anything.
    pub fn plan(&mut self, package: &Package) -> Plan {
        let state = self.stage_one(package);
        let readiness = if self.registry.has_own_roles() {
            self.readiness.evaluate(&state.tree, &self.registry)
        } else {
            self.readiness.evaluate_bypassing_inert(&state.tree)
        };
        Plan {
            tree: state.tree,
            readiness,
            changes: state.report.changes,
            diagnostics: state.report.diagnostics,
        }
    }

    fn stage_one(&mut self, package: &Package) -> RunState {
        let mut report = RunReport::default();
        report.enter(Stage::Init);

        report.enter(Stage::Discover);
        let ledger = Ledger::load(package, &self.config.ledger);
        let mut state = RunState {
            ledger,
            tree: OwnershipTree::new(),
            upstream: None,
            excluded: BTreeSet::new(),
            frozen: false,
            report,
        };
        self.discover(package, &mut state);

        state.report.enter(Stage::Populate);
        self.populate_stage(package, &mut state);

        if state.frozen || !self.registry.has_own_roles() {
            log::debug!("Skipping diff");
        } else {
            state.report.enter(Stage::Diff);
            state.report.changes = self.diff.diff(&state.tree, &state.excluded);
        }
        state
    }
}
