use std::path::PathBuf;

use glob::glob;

use crate::job::Job;
use crate::layout::FolderLayout;

/// Extension of the data files written by the external executable.
pub const RESULT_EXTENSION: &str = "hdf5";

/// Locates the first result file a job produced, if any.
///
/// Mirrors the lookup done by the post-processing scripts: the job's results
/// directory is `results/<system part>/<module part>` and the data file is
/// the first `*.hdf5` inside it in lexical order.
pub fn find_result_file(job: &Job, layout: &FolderLayout) -> Option<PathBuf> {
    let dir = job.results_dir(&layout.results);
    if !dir.is_dir() {
        tracing::debug!(dir = %dir.display(), "results directory missing");
        return None;
    }
    let pattern = dir.join(format!("*.{RESULT_EXTENSION}"));
    let mut matches: Vec<PathBuf> = glob(&pattern.to_string_lossy())
        .ok()?
        .filter_map(Result::ok)
        .collect();
    matches.sort();
    matches.into_iter().next()
}
