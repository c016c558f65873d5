//! Structured error types shared across the qmb batch crates.

use std::collections::BTreeMap;
use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Structured payload attached to every [`BatchError`] variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Stable machine readable error code.
    pub code: String,
    /// Human readable diagnostic message.
    pub message: String,
    /// Contextual key value pairs (parameter keys, paths, descriptors).
    #[serde(default)]
    pub context: BTreeMap<String, String>,
    /// Optional hint that may help the caller resolve the issue.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl ErrorInfo {
    /// Creates a new error payload with the provided code and message.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            context: BTreeMap::new(),
            hint: None,
        }
    }

    /// Adds a context entry to the payload.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Sets a human readable hint for remediation.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

/// Canonical error type for batch preparation and dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(tag = "family", content = "detail")]
pub enum BatchError {
    /// Parameter classification, seed range and plan validation errors.
    #[error("config error: {0}")]
    Config(ErrorInfo),
    /// Storage root and working directory errors.
    #[error("layout error: {0}")]
    Layout(ErrorInfo),
    /// Script submission or local execution errors.
    #[error("dispatch error: {0}")]
    Dispatch(ErrorInfo),
    /// Unresolved upstream submissions for dependent stages.
    #[error("dependency error: {0}")]
    Dependency(ErrorInfo),
    /// Serialization and schema errors.
    #[error("serde error: {0}")]
    Serde(ErrorInfo),
}

impl Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code: {})", self.message, self.code)?;
        if !self.context.is_empty() {
            write!(f, " | context: [")?;
            for (idx, (key, value)) in self.context.iter().enumerate() {
                if idx > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{key}={value}")?;
            }
            write!(f, "]")?;
        }
        if let Some(hint) = &self.hint {
            write!(f, " | hint: {hint}")?;
        }
        Ok(())
    }
}

impl BatchError {
    /// Returns a reference to the payload describing the error.
    pub fn info(&self) -> &ErrorInfo {
        match self {
            BatchError::Config(info)
            | BatchError::Layout(info)
            | BatchError::Dispatch(info)
            | BatchError::Dependency(info)
            | BatchError::Serde(info) => info,
        }
    }

    /// Shorthand for a configuration error.
    pub fn config(code: &str, message: impl Into<String>) -> Self {
        BatchError::Config(ErrorInfo::new(code, message))
    }

    /// Wraps a filesystem failure for the given path.
    pub fn layout(code: &str, path: impl Display, err: impl ToString) -> Self {
        BatchError::Layout(
            ErrorInfo::new(code, err.to_string()).with_context("path", path.to_string()),
        )
    }

    /// Returns true for the families that must abort a batch before dispatch.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            BatchError::Config(_) | BatchError::Layout(_) | BatchError::Serde(_)
        )
    }
}
