use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use qmb_core::errors::{BatchError, ErrorInfo};
use qmb_core::hash::stable_hash_string;
use qmb_core::provenance::{BatchProvenance, SchemaVersion};
use serde::{Deserialize, Serialize};

use crate::dispatch::{Dispatcher, SubmissionId};
use crate::expand::expand;
use crate::job::{Job, Redefinition};
use crate::layout::FolderLayout;
use crate::params::{classify, Classification, KeyRoles, ParameterSet};
use crate::report::{BatchReport, UnitReport, UnitState};
use crate::script::{Dependency, ExecMode, ResourceRequest, ScriptGenerator, SubmissionScript};
use crate::stage::{validate_stages, MissingDependencyPolicy, StageSpec};

/// Global settings shared by every job of a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSettings {
    pub storage: PathBuf,
    /// Extra command-line tokens appended to every invocation.
    #[serde(default)]
    pub cmd_opt: Vec<String>,
    /// Extra scheduler lines appended verbatim after the generated directives.
    #[serde(default)]
    pub slurm_opt: Vec<String>,
    #[serde(default)]
    pub redef: BTreeMap<String, Redefinition>,
    #[serde(default)]
    pub resources: ResourceRequest,
    pub stages: Vec<StageSpec>,
    #[serde(default)]
    pub missing_dependency: MissingDependencyPolicy,
}

impl BatchSettings {
    /// Settings with a single compute stage and defaults elsewhere.
    pub fn new(storage: impl Into<PathBuf>, executable: impl Into<String>) -> Self {
        Self {
            storage: storage.into(),
            cmd_opt: Vec::new(),
            slurm_opt: Vec::new(),
            redef: BTreeMap::new(),
            resources: ResourceRequest::default(),
            stages: vec![StageSpec::compute("compute", executable)],
            missing_dependency: MissingDependencyPolicy::default(),
        }
    }
}

/// Validated parameter sweep with its expanded jobs.
///
/// Construction classifies and expands without touching the filesystem;
/// directories are created by [`Batch::prepare_folders`] or by the runner.
#[derive(Debug, Clone)]
pub struct Batch {
    params: ParameterSet,
    keys: KeyRoles,
    classification: Arc<Classification>,
    settings: BatchSettings,
    layout: FolderLayout,
    jobs: Vec<Job>,
    warnings: Vec<String>,
}

impl Batch {
    pub fn new(
        params: ParameterSet,
        keys: KeyRoles,
        settings: BatchSettings,
    ) -> Result<Self, BatchError> {
        let classification = Arc::new(classify(&params, &keys)?);
        validate_stages(&settings.stages)?;
        let expansion = expand(&params, Arc::clone(&classification))?;
        let mut jobs = expansion.jobs;
        for job in &mut jobs {
            job.apply_redefinitions(&settings.redef)?;
        }
        let layout = FolderLayout::new(&settings.storage);
        tracing::info!(
            jobs = jobs.len(),
            stages = settings.stages.len(),
            seeds = classification.seed_range().map(|range| range.count()).unwrap_or(0),
            "batch prepared"
        );
        Ok(Self {
            params,
            keys,
            classification,
            settings,
            layout,
            jobs,
            warnings: expansion.warnings,
        })
    }

    pub fn jobs(&self) -> &[Job] {
        &self.jobs
    }

    pub fn params(&self) -> &ParameterSet {
        &self.params
    }

    pub fn classification(&self) -> &Classification {
        &self.classification
    }

    pub fn settings(&self) -> &BatchSettings {
        &self.settings
    }

    pub fn layout(&self) -> &FolderLayout {
        &self.layout
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn stage(&self, name: &str) -> Option<&StageSpec> {
        self.settings.stages.iter().find(|stage| stage.name == name)
    }

    /// Creates the storage root and its four subdirectories.
    pub fn prepare_folders(&self) -> Result<&FolderLayout, BatchError> {
        self.layout.prepare()
    }

    /// Canonical hash over parameters, declared order, key roles and settings.
    pub fn plan_hash(&self) -> Result<String, BatchError> {
        stable_hash_string(&(
            &self.params,
            self.params.names(),
            &self.keys,
            &self.settings,
        ))
    }

    pub fn generator(&self) -> ScriptGenerator<'_> {
        ScriptGenerator {
            layout: &self.layout,
            resources: &self.settings.resources,
            cmd_opt: &self.settings.cmd_opt,
            slurm_opt: &self.settings.slurm_opt,
        }
    }

    /// Renders the script of one unit without writing or dispatching it.
    pub fn render(
        &self,
        stage: &StageSpec,
        job: &Job,
        mode: ExecMode,
        dependency: Option<Dependency<'_>>,
    ) -> Result<SubmissionScript, BatchError> {
        self.generator().render(job, stage, mode, dependency)
    }
}

/// Append-only map from `(stage, descriptor)` to accepted submission ids.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyTable {
    entries: BTreeMap<(String, String), Vec<SubmissionId>>,
}

impl DependencyTable {
    pub fn record(&mut self, stage: &str, descriptor: &str, id: SubmissionId) {
        self.entries
            .entry((stage.to_string(), descriptor.to_string()))
            .or_default()
            .push(id);
    }

    pub fn lookup(&self, stage: &str, descriptor: &str) -> Option<&[SubmissionId]> {
        self.entries
            .get(&(stage.to_string(), descriptor.to_string()))
            .map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Writes and dispatches every unit of a [`Batch`].
///
/// Units run stage by stage in job order so upstream ids exist before any
/// dependent unit is rendered. A failing unit is recorded and the loop
/// continues.
pub struct BatchRunner<'a, D: Dispatcher> {
    batch: &'a Batch,
    dispatcher: D,
    table: DependencyTable,
}

impl<'a, D: Dispatcher> BatchRunner<'a, D> {
    pub fn new(batch: &'a Batch, dispatcher: D) -> Self {
        Self {
            batch,
            dispatcher,
            table: DependencyTable::default(),
        }
    }

    pub fn table(&self) -> &DependencyTable {
        &self.table
    }

    pub fn into_dispatcher(self) -> D {
        self.dispatcher
    }

    /// Runs every unit once. Each call starts from an empty dependency
    /// table, so dependents only wait on submissions made by this call.
    pub fn run(&mut self, mode: ExecMode) -> Result<BatchReport, BatchError> {
        let batch = self.batch;
        self.table = DependencyTable::default();
        batch.prepare_folders()?;
        let plan_hash = batch.plan_hash()?;
        tracing::info!(%mode, plan = %&plan_hash[..8], "dispatching batch");

        let mut warnings = batch.warnings().to_vec();
        let mut units = Vec::with_capacity(batch.jobs().len() * batch.settings().stages.len());
        for stage in &batch.settings().stages {
            for job in batch.jobs() {
                let unit = self.run_unit(stage, job, mode, &mut warnings);
                units.push(unit);
            }
        }

        let report = BatchReport {
            provenance: BatchProvenance {
                plan_hash,
                schema: SchemaVersion::default(),
                created_at: Utc::now().to_rfc3339(),
                tool_versions: [(
                    env!("CARGO_PKG_NAME").to_string(),
                    env!("CARGO_PKG_VERSION").to_string(),
                )]
                .into_iter()
                .collect(),
            },
            mode,
            jobs: batch.jobs().len(),
            units,
            warnings,
        };
        tracing::info!(
            accepted = report.accepted(),
            rejected = report.rejected(),
            skipped = report.skipped(),
            "batch dispatched"
        );
        Ok(report)
    }

    fn run_unit(
        &mut self,
        stage: &StageSpec,
        job: &Job,
        mode: ExecMode,
        warnings: &mut Vec<String>,
    ) -> UnitReport {
        let descriptor = job.descriptor();
        let mut unit = UnitReport {
            stage: stage.name.clone(),
            descriptor: descriptor.clone(),
            job_index: job.index(),
            script: None,
            dependencies: Vec::new(),
            dependency_error: None,
            state: UnitState::Created,
        };

        let mut dependency = None;
        if let Some(edge) = &stage.after {
            match self.table.lookup(&edge.stage, &descriptor) {
                Some(ids) => {
                    unit.dependencies = ids.to_vec();
                    dependency = Some(edge.kind);
                }
                None => {
                    let policy = self.batch.settings().missing_dependency;
                    let error = BatchError::Dependency(
                        ErrorInfo::new(
                            "missing_upstream",
                            "upstream unit has no accepted submission",
                        )
                        .with_context("stage", stage.name.clone())
                        .with_context("upstream", edge.stage.clone())
                        .with_context("descriptor", descriptor.clone())
                        .with_context("policy", format!("{policy:?}")),
                    );
                    tracing::warn!(
                        stage = %stage.name,
                        %descriptor,
                        upstream = %edge.stage,
                        ?policy,
                        "unresolved dependency"
                    );
                    unit.dependency_error = Some(error.clone());
                    match policy {
                        MissingDependencyPolicy::Skip => {
                            warnings.push(format!("{error}; skipped"));
                            settle(&mut unit, UnitState::Skipped { error });
                            return unit;
                        }
                        MissingDependencyPolicy::DropDependency => {
                            warnings.push(format!("{error}; dispatched without dependency"));
                        }
                    }
                }
            }
        }

        let dependency = dependency.map(|kind| Dependency {
            kind,
            ids: &unit.dependencies,
        });
        let script = match self.batch.render(stage, job, mode, dependency) {
            Ok(script) => script,
            Err(error) => {
                settle(&mut unit, UnitState::Rejected { error });
                return unit;
            }
        };
        let path = self.batch.layout().scratch.join(&script.file_name);
        if let Err(err) = fs::write(&path, &script.body) {
            let error = BatchError::layout("script_write", path.display(), err);
            settle(&mut unit, UnitState::Rejected { error });
            return unit;
        }
        unit.script = Some(script.file_name.clone());
        settle(&mut unit, UnitState::Scripted);
        tracing::debug!(stage = %stage.name, %descriptor, script = %script.file_name, "script written");

        settle(&mut unit, UnitState::Dispatched);
        match self.dispatcher.dispatch(&script, &path) {
            Ok(id) => {
                tracing::info!(stage = %stage.name, %descriptor, submission = %id, "unit accepted");
                self.table.record(&stage.name, &descriptor, id.clone());
                settle(&mut unit, UnitState::Accepted { submission_id: id });
            }
            Err(error) => {
                tracing::error!(stage = %stage.name, %descriptor, %error, "unit rejected");
                settle(&mut unit, UnitState::Rejected { error });
            }
        }
        unit
    }
}

/// Applies a transition the runner's control flow guarantees to be valid.
fn settle(unit: &mut UnitReport, next: UnitState) {
    let moved = unit.state.advance(next);
    debug_assert!(moved.is_ok(), "{moved:?}");
}

/// Prepares folders and runs the batch with `dispatcher` in one call.
pub fn run_batch<D: Dispatcher>(
    batch: &Batch,
    dispatcher: D,
    mode: ExecMode,
) -> Result<BatchReport, BatchError> {
    BatchRunner::new(batch, dispatcher).run(mode)
}
