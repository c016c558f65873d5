use std::fs;
use std::path::PathBuf;

use qmb_core::errors::{BatchError, ErrorInfo};
use qmb_core::provenance::BatchProvenance;
use qmb_core::serde::to_canonical_json_bytes;
use serde::{Deserialize, Serialize};

use crate::dispatch::SubmissionId;
use crate::layout::FolderLayout;
use crate::script::ExecMode;

/// Lifecycle of a (stage, job) unit inside this process.
///
/// `Created -> Scripted -> Dispatched -> {Accepted | Rejected}`. `Skipped`
/// marks units dropped by the missing-dependency policy and carries the
/// dependency error. What happens after acceptance belongs to the scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "kebab-case")]
pub enum UnitState {
    Created,
    Scripted,
    Dispatched,
    Accepted { submission_id: SubmissionId },
    Rejected { error: BatchError },
    Skipped { error: BatchError },
}

impl UnitState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            UnitState::Accepted { .. } | UnitState::Rejected { .. } | UnitState::Skipped { .. }
        )
    }

    /// Moves to `next`, refusing transitions the lifecycle does not allow.
    pub fn advance(&mut self, next: UnitState) -> Result<(), BatchError> {
        let allowed = matches!(
            (&*self, &next),
            (UnitState::Created, UnitState::Scripted)
                | (UnitState::Created, UnitState::Skipped { .. })
                | (UnitState::Created, UnitState::Rejected { .. })
                | (UnitState::Scripted, UnitState::Dispatched)
                | (UnitState::Scripted, UnitState::Rejected { .. })
                | (UnitState::Dispatched, UnitState::Accepted { .. })
                | (UnitState::Dispatched, UnitState::Rejected { .. })
        );
        if !allowed {
            return Err(BatchError::Dispatch(
                ErrorInfo::new("unit_transition", "invalid unit state transition")
                    .with_context("from", format!("{self:?}"))
                    .with_context("to", format!("{next:?}")),
            ));
        }
        *self = next;
        Ok(())
    }
}

/// Outcome of one (stage, job) unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitReport {
    pub stage: String,
    pub descriptor: String,
    pub job_index: usize,
    /// Script file name inside the scratch directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<SubmissionId>,
    /// Unresolved upstream dependency, set whether the unit was skipped or
    /// dispatched without it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dependency_error: Option<BatchError>,
    #[serde(flatten)]
    pub state: UnitState,
}

impl UnitReport {
    pub fn submission_id(&self) -> Option<&SubmissionId> {
        match &self.state {
            UnitState::Accepted { submission_id } => Some(submission_id),
            _ => None,
        }
    }
}

/// Per-unit outcomes of a batch run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReport {
    pub provenance: BatchProvenance,
    pub mode: ExecMode,
    /// Number of expanded jobs (units = jobs x stages).
    pub jobs: usize,
    pub units: Vec<UnitReport>,
    #[serde(default)]
    pub warnings: Vec<String>,
}

impl BatchReport {
    fn count(&self, pred: impl Fn(&UnitState) -> bool) -> usize {
        self.units.iter().filter(|unit| pred(&unit.state)).count()
    }

    pub fn accepted(&self) -> usize {
        self.count(|state| matches!(state, UnitState::Accepted { .. }))
    }

    pub fn rejected(&self) -> usize {
        self.count(|state| matches!(state, UnitState::Rejected { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|state| matches!(state, UnitState::Skipped { .. }))
    }

    pub fn unit(&self, stage: &str, descriptor: &str) -> Option<&UnitReport> {
        self.units
            .iter()
            .find(|unit| unit.stage == stage && unit.descriptor == descriptor)
    }

    /// Writes the canonical JSON report to `log/batch_report_<mode>.json`.
    pub fn write(&self, layout: &FolderLayout) -> Result<PathBuf, BatchError> {
        let path = layout.logs.join(format!("batch_report_{}.json", self.mode));
        let bytes = to_canonical_json_bytes(self)?;
        fs::write(&path, bytes).map_err(|err| BatchError::layout("report_write", path.display(), err))?;
        Ok(path)
    }
}
