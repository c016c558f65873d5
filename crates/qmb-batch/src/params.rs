use std::collections::BTreeMap;
use std::fmt;

use qmb_core::errors::{BatchError, ErrorInfo};
use serde::de::{self, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// Reserved key holding the first disorder realization index.
pub const MIN_SEED: &str = "min_seed";
/// Reserved key holding the exclusive upper bound of the seed range.
pub const MAX_SEED: &str = "max_seed";
/// Reserved key holding the seed stride.
pub const STEP_SEED: &str = "step_seed";

const SEED_KEYS: [&str; 3] = [MIN_SEED, MAX_SEED, STEP_SEED];

/// Returns true for the implicitly classified seed keys.
pub fn is_seed_key(key: &str) -> bool {
    SEED_KEYS.contains(&key)
}

/// A named parameter with its candidate values.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: String,
    pub values: Vec<Value>,
}

/// Ordered mapping from parameter name to candidate values.
///
/// Declaration order is preserved through (de)serialization and drives the
/// enumeration order of the expanded jobs.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParameterSet {
    parameters: Vec<Parameter>,
}

impl ParameterSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a parameter. Replacing keeps the original position.
    pub fn insert(&mut self, name: impl Into<String>, values: Vec<Value>) {
        let name = name.into();
        match self.parameters.iter_mut().find(|param| param.name == name) {
            Some(existing) => existing.values = values,
            None => self.parameters.push(Parameter { name, values }),
        }
    }

    /// Builder form of [`ParameterSet::insert`].
    pub fn with(mut self, name: impl Into<String>, values: Vec<Value>) -> Self {
        self.insert(name, values);
        self
    }

    pub fn get(&self, name: &str) -> Option<&[Value]> {
        self.parameters
            .iter()
            .find(|param| param.name == name)
            .map(|param| param.values.as_slice())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Parameter> {
        self.parameters.iter()
    }

    /// Parameter names in declaration order.
    pub fn names(&self) -> Vec<&str> {
        self.parameters.iter().map(|param| param.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }
}

impl Serialize for ParameterSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.parameters.len()))?;
        for param in &self.parameters {
            map.serialize_entry(&param.name, &param.values)?;
        }
        map.end()
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    Many(Vec<Value>),
    One(Value),
}

impl<'de> Deserialize<'de> for ParameterSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct SetVisitor;

        impl<'de> Visitor<'de> for SetVisitor {
            type Value = ParameterSet;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of parameter names to value lists")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<ParameterSet, A::Error> {
                let mut set = ParameterSet::new();
                while let Some((name, values)) = access.next_entry::<String, OneOrMany>()? {
                    if set.contains(&name) {
                        return Err(de::Error::custom(format!("duplicate parameter `{name}`")));
                    }
                    let values = match values {
                        OneOrMany::Many(values) => values,
                        OneOrMany::One(value) => vec![value],
                    };
                    set.parameters.push(Parameter { name, values });
                }
                Ok(set)
            }
        }

        deserializer.deserialize_map(SetVisitor)
    }
}

/// Semantic role of a parameter key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ParamRole {
    /// Structural parameters such as the system size.
    System,
    /// Hamiltonian module couplings and disorder strengths.
    Module,
    /// Post-processing controls; passed on the command line but not part of the descriptor.
    Auxiliary,
    SeedMin,
    SeedMax,
    SeedStep,
}

impl ParamRole {
    fn for_seed_key(key: &str) -> Option<Self> {
        match key {
            MIN_SEED => Some(ParamRole::SeedMin),
            MAX_SEED => Some(ParamRole::SeedMax),
            STEP_SEED => Some(ParamRole::SeedStep),
            _ => None,
        }
    }

    pub fn is_seed(self) -> bool {
        matches!(
            self,
            ParamRole::SeedMin | ParamRole::SeedMax | ParamRole::SeedStep
        )
    }
}

/// Caller supplied key lists, one per explicit role.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct KeyRoles {
    #[serde(default)]
    pub system: Vec<String>,
    #[serde(default)]
    pub module: Vec<String>,
    #[serde(default)]
    pub auxiliary: Vec<String>,
}

impl KeyRoles {
    pub fn new<S: Into<String>>(
        system: impl IntoIterator<Item = S>,
        module: impl IntoIterator<Item = S>,
        auxiliary: impl IntoIterator<Item = S>,
    ) -> Self {
        Self {
            system: system.into_iter().map(Into::into).collect(),
            module: module.into_iter().map(Into::into).collect(),
            auxiliary: auxiliary.into_iter().map(Into::into).collect(),
        }
    }

    fn lists(&self) -> [(ParamRole, &[String]); 3] {
        [
            (ParamRole::System, self.system.as_slice()),
            (ParamRole::Module, self.module.as_slice()),
            (ParamRole::Auxiliary, self.auxiliary.as_slice()),
        ]
    }
}

/// Half-open seed range `[min, max)` walked with `step`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedRange {
    pub min: u64,
    pub max: u64,
    pub step: u64,
}

impl SeedRange {
    pub fn new(min: u64, max: u64, step: u64) -> Result<Self, BatchError> {
        if step == 0 {
            return Err(BatchError::Config(
                ErrorInfo::new("seed_step", "step_seed must be at least 1")
                    .with_context(STEP_SEED, step.to_string()),
            ));
        }
        if min >= max {
            return Err(BatchError::Config(
                ErrorInfo::new("seed_range", "min_seed must be below max_seed")
                    .with_context(MIN_SEED, min.to_string())
                    .with_context(MAX_SEED, max.to_string())
                    .with_hint("max_seed is exclusive"),
            ));
        }
        Ok(Self { min, max, step })
    }

    pub fn seeds(&self) -> impl Iterator<Item = u64> {
        (self.min..self.max).step_by(self.step as usize)
    }

    /// Number of seeds visited by the range.
    pub fn count(&self) -> usize {
        ((self.max - self.min - 1) / self.step + 1) as usize
    }

    /// Last seed actually visited by the range.
    pub fn last(&self) -> u64 {
        self.min + (self.max - 1 - self.min) / self.step * self.step
    }

    /// Scheduler array specification, e.g. `1-3:2`.
    pub fn array_spec(&self) -> String {
        if self.step == 1 {
            format!("{}-{}", self.min, self.last())
        } else {
            format!("{}-{}:{}", self.min, self.last(), self.step)
        }
    }
}

/// Validated role assignment for every key of a [`ParameterSet`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    roles: BTreeMap<String, ParamRole>,
    system: Vec<String>,
    module: Vec<String>,
    seed: Option<SeedRange>,
}

impl Classification {
    pub fn role(&self, key: &str) -> Option<ParamRole> {
        self.roles.get(key).copied()
    }

    /// System keys in the caller's order.
    pub fn system_keys(&self) -> &[String] {
        &self.system
    }

    /// Module keys in the caller's order.
    pub fn module_keys(&self) -> &[String] {
        &self.module
    }

    /// Keys making up the descriptor: system keys followed by module keys.
    pub fn descriptor_keys(&self) -> impl Iterator<Item = &str> {
        self.system
            .iter()
            .chain(self.module.iter())
            .map(String::as_str)
    }

    pub fn seed_range(&self) -> Option<SeedRange> {
        self.seed
    }
}

/// Renders a parameter value the way it appears in descriptors and on the command line.
pub fn render_value(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

/// Validates the parameter set against the caller's key lists.
///
/// Every non-seed key must appear in exactly one list and every listed key
/// must exist. Seed keys are recognised implicitly and must form a valid
/// range. Nothing touches the filesystem here.
pub fn classify(params: &ParameterSet, keys: &KeyRoles) -> Result<Classification, BatchError> {
    let mut roles: BTreeMap<String, ParamRole> = BTreeMap::new();
    let mut system = Vec::new();
    let mut module = Vec::new();

    for (role, list) in keys.lists() {
        for key in list {
            if is_seed_key(key) {
                tracing::warn!(key = %key, role = ?role, "seed keys are classified implicitly; ignoring");
                continue;
            }
            if let Some(previous) = roles.insert(key.clone(), role) {
                return Err(BatchError::Config(
                    ErrorInfo::new("duplicate_role", "parameter key listed in more than one role")
                        .with_context("key", key.clone())
                        .with_context("roles", format!("{previous:?},{role:?}")),
                ));
            }
            if !params.contains(key) {
                return Err(BatchError::Config(
                    ErrorInfo::new("unknown_key", "classified key is missing from the parameter set")
                        .with_context("key", key.clone())
                        .with_context("role", format!("{role:?}")),
                ));
            }
            match role {
                ParamRole::System => system.push(key.clone()),
                ParamRole::Module => module.push(key.clone()),
                _ => {}
            }
        }
    }

    for param in params.iter() {
        if let Some(seed_role) = ParamRole::for_seed_key(&param.name) {
            roles.insert(param.name.clone(), seed_role);
            continue;
        }
        if !roles.contains_key(&param.name) {
            return Err(BatchError::Config(
                ErrorInfo::new("unclassified_key", "parameter key has no role")
                    .with_context("key", param.name.clone())
                    .with_hint("add the key to the system, module or auxiliary list"),
            ));
        }
        if let Some(bad) = param.values.iter().find(|value| render_value(value).is_none()) {
            return Err(BatchError::Config(
                ErrorInfo::new("unsupported_value", "parameter values must be scalars")
                    .with_context("key", param.name.clone())
                    .with_context("value", bad.to_string()),
            ));
        }
    }

    check_descriptor_values(params, &system, &module)?;
    let seed = seed_range(params)?;
    Ok(Classification {
        roles,
        system,
        module,
        seed,
    })
}

/// Rejects descriptor values that would contain a `_<key>_` marker once
/// joined, since the descriptor could then not be split back into pairs.
fn check_descriptor_values(
    params: &ParameterSet,
    system: &[String],
    module: &[String],
) -> Result<(), BatchError> {
    let keys: Vec<&String> = system.iter().chain(module.iter()).collect();
    for key in &keys {
        let Some(values) = params.get(key) else {
            continue;
        };
        for rendered in values.iter().filter_map(render_value) {
            let padded = format!("{rendered}_");
            let clash = keys
                .iter()
                .find(|other| padded.contains(&format!("_{other}_")));
            if let Some(other) = clash {
                return Err(BatchError::Config(
                    ErrorInfo::new("ambiguous_value", "descriptor value embeds a key marker")
                        .with_context("key", key.to_string())
                        .with_context("value", rendered.clone())
                        .with_context("marker", other.to_string()),
                ));
            }
        }
    }
    Ok(())
}

fn seed_value(params: &ParameterSet, key: &str) -> Result<Option<u64>, BatchError> {
    let Some(values) = params.get(key) else {
        return Ok(None);
    };
    let malformed = |reason: &str| {
        BatchError::Config(
            ErrorInfo::new("seed_value", reason.to_string()).with_context("key", key.to_string()),
        )
    };
    match values {
        [value] => value
            .as_u64()
            .map(Some)
            .ok_or_else(|| malformed("seed keys take a non-negative integer")),
        _ => Err(malformed("seed keys take exactly one value")),
    }
}

fn seed_range(params: &ParameterSet) -> Result<Option<SeedRange>, BatchError> {
    let min = seed_value(params, MIN_SEED)?;
    let max = seed_value(params, MAX_SEED)?;
    let step = seed_value(params, STEP_SEED)?;
    match (min, max) {
        (Some(min), Some(max)) => SeedRange::new(min, max, step.unwrap_or(1)).map(Some),
        (None, None) if step.is_none() => Ok(None),
        _ => Err(BatchError::Config(
            ErrorInfo::new("seed_triple", "incomplete seed range")
                .with_hint("min_seed and max_seed must be given together"),
        )),
    }
}
