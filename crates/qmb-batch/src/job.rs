use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use qmb_core::errors::{BatchError, ErrorInfo};
use qmb_core::hash::short_hash;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::params::{Classification, SeedRange};

/// Array index variable substituted by the scheduler for each task.
pub const ARRAY_TASK_VAR: &str = "$SLURM_ARRAY_TASK_ID";

/// Caller supplied replacement of a key's rendered command-line value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Redefinition {
    /// Every job renders this string for the key.
    Fixed(String),
    /// Maps a rendered value to its replacement; unmatched values pass through.
    Lookup(BTreeMap<String, String>),
}

impl Redefinition {
    fn apply(&self, rendered: &str) -> Option<String> {
        match self {
            Redefinition::Fixed(value) => Some(value.clone()),
            Redefinition::Lookup(table) => table.get(rendered).cloned(),
        }
    }
}

/// Seed token appended to the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeedArg {
    None,
    Fixed(u64),
    ArrayTask,
}

impl SeedArg {
    pub(crate) fn token(self) -> Option<String> {
        match self {
            SeedArg::None => None,
            SeedArg::Fixed(seed) => Some(format!("--seed={seed}")),
            SeedArg::ArrayTask => Some(format!("--seed={ARRAY_TASK_VAR}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
struct Assignment {
    key: String,
    value: Value,
    rendered: String,
}

/// One point of the parameter grid.
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    index: usize,
    assignment: Vec<Assignment>,
    classification: Arc<Classification>,
    overrides: BTreeMap<String, String>,
}

impl Job {
    /// Creates a job from `(key, value, rendered)` triples in declared order.
    pub(crate) fn new(
        index: usize,
        assignment: Vec<(String, Value, String)>,
        classification: Arc<Classification>,
    ) -> Self {
        let assignment = assignment
            .into_iter()
            .map(|(key, value, rendered)| Assignment {
                key,
                value,
                rendered,
            })
            .collect();
        Self {
            index,
            assignment,
            classification,
            overrides: BTreeMap::new(),
        }
    }

    /// Position of the job in the expansion order.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn value(&self, key: &str) -> Option<&Value> {
        self.find(key).map(|entry| &entry.value)
    }

    /// Value as it appears on the command line, after overrides.
    pub fn rendered(&self, key: &str) -> Option<&str> {
        self.overrides
            .get(key)
            .map(String::as_str)
            .or_else(|| self.find(key).map(|entry| entry.rendered.as_str()))
    }

    pub fn classification(&self) -> &Classification {
        &self.classification
    }

    pub fn seed_range(&self) -> Option<SeedRange> {
        self.classification.seed_range()
    }

    fn find(&self, key: &str) -> Option<&Assignment> {
        self.assignment.iter().find(|entry| entry.key == key)
    }

    fn pairs<'a>(&'a self, keys: &'a [String]) -> String {
        keys.iter()
            .filter_map(|key| self.find(key))
            .map(|entry| format!("{}_{}", entry.key, entry.rendered))
            .collect::<Vec<_>>()
            .join("_")
    }

    /// `key_value` pairs of the system keys.
    pub fn system_descriptor(&self) -> String {
        self.pairs(self.classification.system_keys())
    }

    /// `key_value` pairs of the module keys.
    pub fn module_descriptor(&self) -> String {
        self.pairs(self.classification.module_keys())
    }

    /// Canonical descriptor: system pairs followed by module pairs.
    ///
    /// Overrides never reach the descriptor; the post-processing side parses
    /// this string back with [`parse_descriptor`].
    pub fn descriptor(&self) -> String {
        [self.system_descriptor(), self.module_descriptor()]
            .into_iter()
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join("_")
    }

    /// Directory under `results_root` where the executable stores its output.
    pub fn results_dir(&self, results_root: &Path) -> PathBuf {
        let mut dir = results_root.to_path_buf();
        for part in [self.system_descriptor(), self.module_descriptor()] {
            if !part.is_empty() {
                dir.push(part);
            }
        }
        dir
    }

    /// Command-line tokens for the external executable.
    pub fn command_args(&self, results_root: &Path, seed: SeedArg, extra: &[String]) -> Vec<String> {
        let mut args: Vec<String> = self
            .assignment
            .iter()
            .filter(|entry| {
                self.classification
                    .role(&entry.key)
                    .is_some_and(|role| !role.is_seed())
            })
            .map(|entry| {
                let rendered = self.rendered(&entry.key).unwrap_or(&entry.rendered);
                format!("--{}={}", entry.key, rendered)
            })
            .collect();
        args.push(format!("--results={}", self.results_dir(results_root).display()));
        args.extend(seed.token());
        args.extend(extra.iter().cloned());
        args
    }

    /// Replaces the rendered command-line value of `key`.
    pub fn apply_override(&mut self, key: &str, value: impl Into<String>) -> Result<(), BatchError> {
        if self.find(key).is_none() {
            return Err(BatchError::Config(
                ErrorInfo::new("override_key", "override targets an unknown parameter")
                    .with_context("key", key.to_string()),
            ));
        }
        self.overrides.insert(key.to_string(), value.into());
        Ok(())
    }

    /// Applies a batch-wide redefinition table.
    pub fn apply_redefinitions(
        &mut self,
        redef: &BTreeMap<String, Redefinition>,
    ) -> Result<(), BatchError> {
        for (key, rule) in redef {
            let Some(entry) = self.find(key) else {
                return Err(BatchError::Config(
                    ErrorInfo::new("redef_key", "redefinition targets an unknown parameter")
                        .with_context("key", key.clone()),
                ));
            };
            if let Some(replacement) = rule.apply(&entry.rendered) {
                self.apply_override(key, replacement)?;
            }
        }
        Ok(())
    }

    /// Short content hash over the full assignment and overrides.
    ///
    /// Auxiliary keys are not part of the descriptor, so script names carry
    /// this fingerprint to stay unique.
    pub fn fingerprint(&self, salt: &str) -> Result<String, BatchError> {
        short_hash(&(salt, &self.assignment, &self.overrides))
    }
}

/// Splits a descriptor back into `(key, value)` pairs for the given key order.
///
/// Each value ends at the next `_<key>_` marker and the last value takes the
/// remainder of the string, so `L_8_dW_1.0_extra` yields `dW = 1.0_extra`.
/// Classification rejects values embedding a marker, which keeps descriptors
/// built by [`Job::descriptor`] splittable.
pub fn parse_descriptor(descriptor: &str, keys: &[&str]) -> Result<Vec<(String, String)>, BatchError> {
    let mismatch = |key: &str| {
        BatchError::Config(
            ErrorInfo::new("descriptor_mismatch", "descriptor does not follow the key order")
                .with_context("descriptor", descriptor.to_string())
                .with_context("key", key.to_string()),
        )
    };
    let mut rest = descriptor;
    let mut pairs = Vec::with_capacity(keys.len());
    for (idx, key) in keys.iter().enumerate() {
        rest = rest
            .strip_prefix(*key)
            .and_then(|tail| tail.strip_prefix('_'))
            .ok_or_else(|| mismatch(key))?;
        let value = match keys.get(idx + 1) {
            Some(next) => {
                let marker = format!("_{next}_");
                let end = rest.find(&marker).ok_or_else(|| mismatch(next))?;
                let (value, tail) = rest.split_at(end);
                rest = &tail[1..];
                value
            }
            None => std::mem::take(&mut rest),
        };
        pairs.push((key.to_string(), value.to_string()));
    }
    if !rest.is_empty() {
        return Err(mismatch(rest));
    }
    Ok(pairs)
}

/// Removes `disorder_key` and its value from a descriptor.
///
/// Returns the remaining descriptor and the numeric disorder value, e.g.
/// `L_8_dW_1.0_W_0.0` with `dW` yields `("L_8_W_0.0", 1.0)`.
pub fn extract_disorder(descriptor: &str, disorder_key: &str) -> Result<(String, f64), BatchError> {
    let key = disorder_key.trim_matches('_');
    let marker = format!("_{key}_");
    let padded = format!("_{descriptor}");
    let missing = || {
        BatchError::Config(
            ErrorInfo::new("disorder_key", "disorder key not found exactly once")
                .with_context("descriptor", descriptor.to_string())
                .with_context("key", key.to_string()),
        )
    };
    let mut parts = padded.split(marker.as_str());
    let (Some(head), Some(tail), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(missing());
    };
    let (raw, remainder) = match tail.find('_') {
        Some(split) => tail.split_at(split),
        None => (tail, ""),
    };
    let value = raw.parse::<f64>().map_err(|err| {
        BatchError::Config(
            ErrorInfo::new("disorder_value", err.to_string())
                .with_context("descriptor", descriptor.to_string())
                .with_context("value", raw.to_string()),
        )
    })?;
    let rest = format!("{}{}", head.trim_start_matches('_'), remainder);
    Ok((rest.trim_start_matches('_').to_string(), value))
}
