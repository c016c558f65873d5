use std::fs;
use std::path::{Path, PathBuf};

use qmb_core::errors::BatchError;
use qmb_core::serde::{from_yaml_slice, to_yaml_string};
use serde::{Deserialize, Serialize};

use crate::params::{KeyRoles, ParameterSet};
use crate::runner::{Batch, BatchSettings};

/// On-disk description of a batch.
///
/// ```yaml
/// parameters:
///   L: [8, 10]
///   dW: [1.0, 2.0]
///   min_seed: 1
///   max_seed: 5
/// keys:
///   system: [L]
///   module: [dW]
/// storage: runs/heisenberg
/// stages:
///   - name: compute
///     executable: python main_diag.py
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchPlan {
    pub parameters: ParameterSet,
    pub keys: KeyRoles,
    #[serde(flatten)]
    pub settings: BatchSettings,
    /// Directory containing the plan on disk (ignored when serializing).
    #[serde(skip)]
    pub base_dir: PathBuf,
}

impl BatchPlan {
    /// Storage root, resolved against the plan directory when relative.
    pub fn storage_root(&self) -> PathBuf {
        if self.settings.storage.is_absolute() {
            self.settings.storage.clone()
        } else {
            self.base_dir.join(&self.settings.storage)
        }
    }

    pub fn to_yaml_string(&self) -> Result<String, BatchError> {
        to_yaml_string(self)
    }

    /// Validates and expands the plan into a [`Batch`].
    pub fn into_batch(self) -> Result<Batch, BatchError> {
        let storage = self.storage_root();
        let mut settings = self.settings;
        settings.storage = storage;
        Batch::new(self.parameters, self.keys, settings)
    }
}

/// Loads a plan from a YAML file.
pub fn load_plan<P: AsRef<Path>>(path: P) -> Result<BatchPlan, BatchError> {
    let plan_path = path.as_ref();
    let bytes =
        fs::read(plan_path).map_err(|err| BatchError::layout("plan_read", plan_path.display(), err))?;
    let mut plan: BatchPlan = from_yaml_slice(&bytes)?;
    plan.base_dir = plan_path
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .to_path_buf();
    Ok(plan)
}
