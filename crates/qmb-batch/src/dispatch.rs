use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use qmb_core::errors::{BatchError, ErrorInfo};
use serde::{Deserialize, Serialize};

use crate::script::SubmissionScript;

/// Identifier returned by a dispatcher for an accepted unit.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubmissionId(String);

impl SubmissionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubmissionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Execution backend receiving written scripts.
pub trait Dispatcher {
    /// Runs or submits the script stored at `path`.
    fn dispatch(&mut self, script: &SubmissionScript, path: &Path)
        -> Result<SubmissionId, BatchError>;
}

impl<D: Dispatcher + ?Sized> Dispatcher for &mut D {
    fn dispatch(
        &mut self,
        script: &SubmissionScript,
        path: &Path,
    ) -> Result<SubmissionId, BatchError> {
        (**self).dispatch(script, path)
    }
}

fn dispatch_error(code: &str, script: &SubmissionScript, message: impl Into<String>) -> BatchError {
    BatchError::Dispatch(
        ErrorInfo::new(code, message)
            .with_context("stage", script.stage.clone())
            .with_context("descriptor", script.descriptor.clone()),
    )
}

/// Runs scripts synchronously with a local shell.
///
/// Standard output and error go to `<log_dir>/<script stem>.out|.err`.
#[derive(Debug, Clone)]
pub struct LocalShell {
    pub shell: String,
}

impl Default for LocalShell {
    fn default() -> Self {
        Self {
            shell: "bash".to_string(),
        }
    }
}

impl Dispatcher for LocalShell {
    fn dispatch(
        &mut self,
        script: &SubmissionScript,
        path: &Path,
    ) -> Result<SubmissionId, BatchError> {
        let stem = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().to_string())
            .unwrap_or_else(|| script.job_name.clone());
        let open = |ext: &str| {
            let log = script.log_dir.join(format!("{stem}.{ext}"));
            File::create(&log).map_err(|err| BatchError::layout("local_log", log.display(), err))
        };
        let stdout = open("out")?;
        let stderr = open("err")?;
        let status = Command::new(&self.shell)
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr))
            .status()
            .map_err(|err| dispatch_error("local_spawn", script, err.to_string()))?;
        if !status.success() {
            return Err(BatchError::Dispatch(
                ErrorInfo::new("local_exit", "local process exited unsuccessfully")
                    .with_context("stage", script.stage.clone())
                    .with_context("descriptor", script.descriptor.clone())
                    .with_context("status", status.to_string()),
            ));
        }
        Ok(SubmissionId::new(format!("local:{stem}")))
    }
}

/// Submits scripts with `sbatch --parsable`.
#[derive(Debug, Clone)]
pub struct Sbatch {
    pub program: String,
    pub extra_args: Vec<String>,
}

impl Default for Sbatch {
    fn default() -> Self {
        Self {
            program: "sbatch".to_string(),
            extra_args: Vec::new(),
        }
    }
}

/// Extracts the job id from `sbatch --parsable` output (`<id>[;<cluster>]`).
pub fn parse_sbatch_output(stdout: &str) -> Option<SubmissionId> {
    let line = stdout.lines().map(str::trim).find(|line| !line.is_empty())?;
    let id = line.split(';').next()?.trim();
    if !id.is_empty() && id.chars().all(|ch| ch.is_ascii_digit()) {
        Some(SubmissionId::new(id))
    } else {
        None
    }
}

impl Dispatcher for Sbatch {
    fn dispatch(
        &mut self,
        script: &SubmissionScript,
        path: &Path,
    ) -> Result<SubmissionId, BatchError> {
        let output = Command::new(&self.program)
            .arg("--parsable")
            .args(&self.extra_args)
            .arg(path)
            .stdin(Stdio::null())
            .output()
            .map_err(|err| dispatch_error("sbatch_spawn", script, err.to_string()))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(BatchError::Dispatch(
                ErrorInfo::new("sbatch_rejected", stderr)
                    .with_context("stage", script.stage.clone())
                    .with_context("descriptor", script.descriptor.clone())
                    .with_context("status", output.status.to_string()),
            ));
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_sbatch_output(&stdout).ok_or_else(|| {
            dispatch_error(
                "sbatch_output",
                script,
                format!("unexpected sbatch output `{}`", stdout.trim()),
            )
        })
    }
}

/// Records scripts instead of running them and hands out sequential ids.
///
/// Units whose descriptor is registered through [`DryRunDispatcher::reject`]
/// fail with a dispatch error, which lets callers rehearse partial failures.
#[derive(Debug, Clone)]
pub struct DryRunDispatcher {
    next_id: u64,
    rejected: BTreeMap<(String, String), String>,
    submitted: Vec<(PathBuf, SubmissionScript)>,
}

impl Default for DryRunDispatcher {
    fn default() -> Self {
        Self {
            next_id: 1000,
            rejected: BTreeMap::new(),
            submitted: Vec::new(),
        }
    }
}

impl DryRunDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the unit `(stage, descriptor)` fail with `reason`.
    pub fn reject(
        mut self,
        stage: impl Into<String>,
        descriptor: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        self.rejected
            .insert((stage.into(), descriptor.into()), reason.into());
        self
    }

    pub fn submitted(&self) -> &[(PathBuf, SubmissionScript)] {
        &self.submitted
    }
}

impl Dispatcher for DryRunDispatcher {
    fn dispatch(
        &mut self,
        script: &SubmissionScript,
        path: &Path,
    ) -> Result<SubmissionId, BatchError> {
        let key = (script.stage.clone(), script.descriptor.clone());
        if let Some(reason) = self.rejected.get(&key) {
            return Err(dispatch_error("dry_run_rejected", script, reason.clone()));
        }
        let id = SubmissionId::new(self.next_id.to_string());
        self.next_id += 1;
        self.submitted.push((path.to_path_buf(), script.clone()));
        Ok(id)
    }
}
