use std::collections::BTreeSet;

use qmb_core::errors::{BatchError, ErrorInfo};
use serde::{Deserialize, Serialize};

/// Scheduler condition under which a dependent stage may start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DependencyKind {
    /// Start once the upstream job ends in any state.
    #[default]
    AfterAny,
    /// Start only after the upstream job completed successfully.
    AfterOk,
}

impl DependencyKind {
    pub fn directive(self) -> &'static str {
        match self {
            DependencyKind::AfterAny => "afterany",
            DependencyKind::AfterOk => "afterok",
        }
    }
}

/// Typed edge from a dependent stage to the stage producing its input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyEdge {
    /// Name of the upstream stage.
    pub stage: String,
    #[serde(default)]
    pub kind: DependencyKind,
}

/// What to do with a dependent unit whose upstream unit was never accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MissingDependencyPolicy {
    /// Do not dispatch the dependent unit.
    #[default]
    Skip,
    /// Dispatch without a dependency directive.
    DropDependency,
}

/// One executable stage run for every job of the batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageSpec {
    pub name: String,
    /// Program invocation preceding the generated arguments, e.g. `python main_diag.py`.
    pub executable: String,
    /// Extra tokens appended after the batch-wide `cmd_opt`.
    #[serde(default)]
    pub cmd_opt: Vec<String>,
    /// Whether the stage iterates over the seed range.
    #[serde(default = "StageSpec::default_seeded")]
    pub seeded: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after: Option<DependencyEdge>,
}

impl StageSpec {
    const fn default_seeded() -> bool {
        true
    }

    /// Seeded stage with no upstream dependency.
    pub fn compute(name: impl Into<String>, executable: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            executable: executable.into(),
            cmd_opt: Vec::new(),
            seeded: true,
            after: None,
        }
    }

    /// Unseeded stage consuming the output of `upstream`.
    pub fn post_processing(
        name: impl Into<String>,
        executable: impl Into<String>,
        upstream: impl Into<String>,
        kind: DependencyKind,
    ) -> Self {
        Self {
            name: name.into(),
            executable: executable.into(),
            cmd_opt: Vec::new(),
            seeded: false,
            after: Some(DependencyEdge {
                stage: upstream.into(),
                kind,
            }),
        }
    }

    pub fn is_dependent(&self) -> bool {
        self.after.is_some()
    }
}

/// Checks names are unique and every edge points at an earlier stage.
pub fn validate_stages(stages: &[StageSpec]) -> Result<(), BatchError> {
    if stages.is_empty() {
        return Err(BatchError::config("no_stages", "a batch needs at least one stage"));
    }
    let mut seen = BTreeSet::new();
    for stage in stages {
        if stage.name.is_empty() || stage.executable.trim().is_empty() {
            return Err(BatchError::Config(
                ErrorInfo::new("stage_incomplete", "stages need a name and an executable")
                    .with_context("stage", stage.name.clone()),
            ));
        }
        if let Some(edge) = &stage.after {
            if !seen.contains(edge.stage.as_str()) {
                return Err(BatchError::Config(
                    ErrorInfo::new("stage_edge", "dependency must name an earlier stage")
                        .with_context("stage", stage.name.clone())
                        .with_context("upstream", edge.stage.clone()),
                ));
            }
        }
        if !seen.insert(stage.name.as_str()) {
            return Err(BatchError::Config(
                ErrorInfo::new("stage_duplicate", "stage names must be unique")
                    .with_context("stage", stage.name.clone()),
            ));
        }
    }
    Ok(())
}
