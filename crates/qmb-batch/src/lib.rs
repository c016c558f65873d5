#![doc = "Parameter sweep expansion and batch dispatch for qmb experiments."]

pub mod dispatch;
pub mod expand;
pub mod job;
pub mod layout;
pub mod params;
pub mod plan;
pub mod report;
pub mod results;
pub mod runner;
pub mod script;
pub mod stage;

pub use dispatch::{
    parse_sbatch_output, Dispatcher, DryRunDispatcher, LocalShell, Sbatch, SubmissionId,
};
pub use expand::{expand, job_count, Expansion};
pub use job::{extract_disorder, parse_descriptor, Job, Redefinition, SeedArg};
pub use layout::{prepare_folders, FolderLayout};
pub use params::{classify, Classification, KeyRoles, ParamRole, ParameterSet, SeedRange};
pub use plan::{load_plan, BatchPlan};
pub use report::{BatchReport, UnitReport, UnitState};
pub use results::find_result_file;
pub use runner::{run_batch, Batch, BatchRunner, BatchSettings, DependencyTable};
pub use script::{
    sanitize_job_name, shell_quote, ExecMode, ResourceRequest, ScriptGenerator, SubmissionScript,
};
pub use stage::{DependencyEdge, DependencyKind, MissingDependencyPolicy, StageSpec};
