use std::sync::Arc;

use qmb_core::errors::{BatchError, ErrorInfo};
use serde_json::Value;

use crate::job::Job;
use crate::params::{is_seed_key, render_value, Classification, Parameter, ParameterSet};

/// Ordered jobs produced from a parameter set plus non-fatal warnings.
#[derive(Debug, Clone, PartialEq)]
pub struct Expansion {
    pub jobs: Vec<Job>,
    pub warnings: Vec<String>,
}

/// Cartesian product over every non-seed parameter in declared order.
///
/// The first declared key varies slowest. The seed range contributes no
/// factor; it is rendered per execution mode instead.
pub fn expand(
    params: &ParameterSet,
    classification: Arc<Classification>,
) -> Result<Expansion, BatchError> {
    let grid: Vec<&Parameter> = params
        .iter()
        .filter(|param| !is_seed_key(&param.name))
        .collect();

    let mut warnings = Vec::new();
    for param in grid.iter().filter(|param| param.values.is_empty()) {
        let warning = format!("parameter `{}` has no values; the batch is empty", param.name);
        tracing::warn!(key = %param.name, "empty value list collapses the batch to zero jobs");
        warnings.push(warning);
    }
    if !warnings.is_empty() {
        return Ok(Expansion {
            jobs: Vec::new(),
            warnings,
        });
    }

    let mut points = Vec::new();
    expand_grid(&grid, 0, Vec::with_capacity(grid.len()), &mut points)?;
    let jobs = points
        .into_iter()
        .enumerate()
        .map(|(index, point)| Job::new(index, point, Arc::clone(&classification)))
        .collect::<Vec<_>>();
    tracing::debug!(jobs = jobs.len(), "expanded parameter grid");
    Ok(Expansion { jobs, warnings })
}

fn expand_grid(
    params: &[&Parameter],
    idx: usize,
    current: Vec<(String, Value, String)>,
    outputs: &mut Vec<Vec<(String, Value, String)>>,
) -> Result<(), BatchError> {
    if idx == params.len() {
        outputs.push(current);
        return Ok(());
    }
    let param = params[idx];
    for value in &param.values {
        let rendered = render_value(value).ok_or_else(|| {
            BatchError::Config(
                ErrorInfo::new("unsupported_value", "parameter values must be scalars")
                    .with_context("key", param.name.clone()),
            )
        })?;
        let mut next = current.clone();
        next.push((param.name.clone(), value.clone(), rendered));
        expand_grid(params, idx + 1, next, outputs)?;
    }
    Ok(())
}

/// Number of jobs [`expand`] yields for `params`.
pub fn job_count(params: &ParameterSet) -> usize {
    params
        .iter()
        .filter(|param| !is_seed_key(&param.name))
        .map(|param| param.values.len())
        .product()
}
