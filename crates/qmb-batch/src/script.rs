use std::fmt::Write as _;
use std::path::PathBuf;

use qmb_core::errors::BatchError;
use serde::{Deserialize, Serialize};

use crate::dispatch::SubmissionId;
use crate::job::{Job, SeedArg};
use crate::layout::FolderLayout;
use crate::stage::{DependencyKind, StageSpec};

/// Longest job name handed to the scheduler.
pub const MAX_JOB_NAME_LEN: usize = 64;

/// Where a batch runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecMode {
    /// Sequential execution on the current machine.
    #[default]
    Local,
    /// Submission to the SLURM queue.
    Queued,
}

impl std::fmt::Display for ExecMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecMode::Local => f.write_str("local"),
            ExecMode::Queued => f.write_str("queued"),
        }
    }
}

/// Resources requested from the scheduler for every unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRequest {
    /// Wall time, `DD-HH:MM:SS` or `HH:MM:SS`.
    #[serde(default = "ResourceRequest::default_time")]
    pub time: String,
    #[serde(default = "ResourceRequest::default_one")]
    pub nodes: u32,
    #[serde(default = "ResourceRequest::default_one")]
    pub ntasks: u32,
    #[serde(default = "ResourceRequest::default_one")]
    pub cpus_per_task: u32,
    /// Memory per CPU in GB.
    #[serde(default = "ResourceRequest::default_mem")]
    pub mem_per_cpu: u32,
    /// Environment module loaded before activation; empty skips the line.
    #[serde(default = "ResourceRequest::default_module")]
    pub module: String,
    /// Environment sourced with `source activate`; empty skips the line.
    #[serde(default = "ResourceRequest::default_env")]
    pub env: String,
    /// Display name prefixed to every job name.
    #[serde(default)]
    pub name: String,
    /// Maximum number of simultaneously running array tasks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub array_limit: Option<u32>,
}

impl ResourceRequest {
    fn default_time() -> String {
        "00:00:01".to_string()
    }

    const fn default_one() -> u32 {
        1
    }

    const fn default_mem() -> u32 {
        4
    }

    fn default_module() -> String {
        "Anaconda3/5.3.0".to_string()
    }

    fn default_env() -> String {
        "python3imbrie".to_string()
    }
}

impl Default for ResourceRequest {
    fn default() -> Self {
        Self {
            time: Self::default_time(),
            nodes: 1,
            ntasks: 1,
            cpus_per_task: 1,
            mem_per_cpu: Self::default_mem(),
            module: Self::default_module(),
            env: Self::default_env(),
            name: String::new(),
            array_limit: None,
        }
    }
}

/// Rendered artifact for one (stage, job) unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionScript {
    pub mode: ExecMode,
    pub stage: String,
    pub descriptor: String,
    /// Sanitised scheduler job name.
    pub job_name: String,
    /// File name inside the scratch directory.
    pub file_name: String,
    /// Directory receiving stdout/stderr of the unit.
    pub log_dir: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub array: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<SubmissionId>,
    /// Command lines executed by the script, one per seed locally.
    pub commands: Vec<String>,
    pub body: String,
}

/// Upstream submissions a unit must wait for.
#[derive(Debug, Clone, Copy)]
pub struct Dependency<'a> {
    pub kind: DependencyKind,
    pub ids: &'a [SubmissionId],
}

/// Renders local and cluster scripts from batch-wide settings.
#[derive(Debug, Clone, Copy)]
pub struct ScriptGenerator<'a> {
    pub layout: &'a FolderLayout,
    pub resources: &'a ResourceRequest,
    pub cmd_opt: &'a [String],
    pub slurm_opt: &'a [String],
}

impl<'a> ScriptGenerator<'a> {
    pub fn render(
        &self,
        job: &Job,
        stage: &StageSpec,
        mode: ExecMode,
        dependency: Option<Dependency<'_>>,
    ) -> Result<SubmissionScript, BatchError> {
        let descriptor = job.descriptor();
        let job_name = sanitize_job_name(&[&self.resources.name, &stage.name, &descriptor]);
        let fingerprint = job.fingerprint(&stage.name)?;
        let file_name = format!(
            "{}_{}.sh",
            sanitize(&[&stage.name, &descriptor], usize::MAX),
            fingerprint
        );
        let log_dir = if stage.is_dependent() {
            self.layout.dependency_logs.clone()
        } else {
            self.layout.logs.clone()
        };
        let seeds = if stage.seeded { job.seed_range() } else { None };

        let extra: Vec<&str> = self
            .cmd_opt
            .iter()
            .chain(stage.cmd_opt.iter())
            .map(String::as_str)
            .collect();
        let command = |seed: SeedArg| {
            let mut line = stage.executable.trim().to_string();
            for arg in job.command_args(&self.layout.results, SeedArg::None, &[]) {
                line.push(' ');
                line.push_str(&shell_quote(&arg));
            }
            // The array token stays bare so the shell expands the task id.
            if let Some(token) = seed.token() {
                line.push(' ');
                line.push_str(&token);
            }
            for opt in &extra {
                line.push(' ');
                line.push_str(opt);
            }
            line
        };

        let (commands, array, dependencies, body) = match mode {
            ExecMode::Local => {
                let commands: Vec<String> = match seeds {
                    Some(range) => range.seeds().map(|seed| command(SeedArg::Fixed(seed))).collect(),
                    None => vec![command(SeedArg::None)],
                };
                let body = render_local(&commands);
                (commands, None, Vec::new(), body)
            }
            ExecMode::Queued => {
                let array = seeds.map(|range| match self.resources.array_limit {
                    Some(limit) => format!("{}%{}", range.array_spec(), limit),
                    None => range.array_spec(),
                });
                let commands = vec![command(if array.is_some() {
                    SeedArg::ArrayTask
                } else {
                    SeedArg::None
                })];
                let dependencies = dependency
                    .map(|dep| dep.ids.to_vec())
                    .unwrap_or_default();
                let header = ClusterHeader {
                    job_name: &job_name,
                    log_dir: &log_dir,
                    array: array.as_deref(),
                    dependency: dependency.filter(|dep| !dep.ids.is_empty()),
                };
                let body = self.render_cluster(&header, &commands[0]);
                (commands, array, dependencies, body)
            }
        };

        Ok(SubmissionScript {
            mode,
            stage: stage.name.clone(),
            descriptor,
            job_name,
            file_name,
            log_dir,
            array,
            dependencies,
            commands,
            body,
        })
    }

    fn render_cluster(&self, header: &ClusterHeader<'_>, command: &str) -> String {
        let res = self.resources;
        let suffix = if header.array.is_some() { "%A_%a" } else { "%j" };
        let log_base = header.log_dir.join(format!("{}_{}", header.job_name, suffix));

        let mut out = String::from("#!/bin/bash\n");
        let _ = writeln!(out, "#SBATCH --job-name={}", header.job_name);
        let _ = writeln!(out, "#SBATCH --time={}", res.time);
        let _ = writeln!(out, "#SBATCH --nodes={}", res.nodes);
        let _ = writeln!(out, "#SBATCH --ntasks={}", res.ntasks);
        let _ = writeln!(out, "#SBATCH --cpus-per-task={}", res.cpus_per_task);
        let _ = writeln!(out, "#SBATCH --mem-per-cpu={}GB", res.mem_per_cpu);
        let log_base = log_base.display().to_string();
        let _ = writeln!(out, "#SBATCH --output={}", directive_path(&format!("{log_base}.out")));
        let _ = writeln!(out, "#SBATCH --error={}", directive_path(&format!("{log_base}.err")));
        if let Some(array) = header.array {
            let _ = writeln!(out, "#SBATCH --array={array}");
        }
        if let Some(dep) = header.dependency {
            let ids = dep
                .ids
                .iter()
                .map(|id| id.as_str())
                .collect::<Vec<_>>()
                .join(":");
            let _ = writeln!(out, "#SBATCH --dependency={}:{}", dep.kind.directive(), ids);
        }
        for line in self.slurm_opt {
            let _ = writeln!(out, "{line}");
        }
        out.push('\n');
        if !res.module.is_empty() {
            let _ = writeln!(out, "module load {}", res.module);
        }
        if !res.env.is_empty() {
            let _ = writeln!(out, "source activate {}", res.env);
        }
        let _ = writeln!(out, "\n{command}");
        out
    }
}

struct ClusterHeader<'a> {
    job_name: &'a str,
    log_dir: &'a std::path::Path,
    array: Option<&'a str>,
    dependency: Option<Dependency<'a>>,
}

fn render_local(commands: &[String]) -> String {
    let mut out = String::from("#!/bin/bash\nset -e\n\n");
    for command in commands {
        out.push_str(command);
        out.push('\n');
    }
    out
}

fn is_shell_safe(ch: char) -> bool {
    ch.is_ascii_alphanumeric()
        || matches!(ch, '-' | '_' | '.' | '/' | '=' | ':' | ',' | '+' | '@' | '%')
}

/// Quotes a generated token for `bash`, leaving plain tokens untouched.
///
/// Unsafe tokens are wrapped in single quotes with embedded quotes escaped
/// as `'\''`.
pub fn shell_quote(token: &str) -> String {
    if !token.is_empty() && token.chars().all(is_shell_safe) {
        return token.to_string();
    }
    format!("'{}'", token.replace('\'', r"'\''"))
}

/// Double-quotes an `#SBATCH` path argument when it contains unsafe characters.
fn directive_path(path: &str) -> String {
    if path.chars().all(is_shell_safe) {
        path.to_string()
    } else {
        format!("\"{}\"", path.replace('\\', r"\\").replace('"', "\\\""))
    }
}

fn sanitize(parts: &[&str], max_len: usize) -> String {
    let joined = parts
        .iter()
        .filter(|part| !part.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join("_");
    joined
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || matches!(ch, '.' | '_' | '-') {
                ch
            } else {
                '_'
            }
        })
        .take(max_len)
        .collect()
}

/// Joins the non-empty parts with `_`, replaces characters the scheduler
/// rejects and truncates to [`MAX_JOB_NAME_LEN`].
pub fn sanitize_job_name(parts: &[&str]) -> String {
    sanitize(parts, MAX_JOB_NAME_LEN)
}
