pub mod layout;
pub mod plan;
pub mod run;

use std::path::{Path, PathBuf};

use clap::{Args, ValueEnum};
use qmb_batch::{load_plan, Batch, ExecMode};
use qmb_core::BatchError;

/// Plan location shared by every subcommand.
#[derive(Args, Debug)]
pub struct PlanSource {
    /// YAML plan describing parameters, key roles, stages and resources.
    #[arg(long)]
    pub plan: PathBuf,
    /// Storage root overriding the one declared in the plan.
    #[arg(long)]
    pub storage: Option<PathBuf>,
}

impl PlanSource {
    /// Loads the plan, applies overrides and expands it.
    pub fn load(&self) -> Result<Batch, BatchError> {
        let mut plan = load_plan(&self.plan)?;
        if let Some(storage) = &self.storage {
            plan.settings.storage = absolute(storage);
        }
        plan.into_batch()
    }
}

fn absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    std::env::current_dir()
        .map(|cwd| cwd.join(path))
        .unwrap_or_else(|_| path.to_path_buf())
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModeArg {
    Local,
    Queued,
}

impl From<ModeArg> for ExecMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Local => ExecMode::Local,
            ModeArg::Queued => ExecMode::Queued,
        }
    }
}
