//! Structured error types shared across segeval crates.

use std::collections::BTreeMap;
use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Structured payload attached to every [`EvalError`] variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Stable machine readable error code.
    pub code: String,
    /// Human readable diagnostic message.
    pub message: String,
    /// Contextual key value pairs (paths, counts, indices).
    #[serde(default)]
    pub context: BTreeMap<String, String>,
    /// Optional hint that may help the evaluator resolve the issue.
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

/// Canonical error type for the evaluation engine.
///
/// Variants are grouped by the layer that raised them. `Config` errors block
/// the action that triggered them; `Dataset` and `Store` errors abort only the
/// failing operation and leave the cursor and score table usable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(tag = "family", content = "detail")]
pub enum EvalError {
    /// Invalid or incomplete experiment configuration, including score input.
    #[error("config error: {0}")]
    Config(ErrorInfo),
    /// Volume or segmentation retrieval failures.
    #[error("dataset error: {0}")]
    Dataset(ErrorInfo),
    /// Score table persistence, export and resumption failures.
    #[error("store error: {0}")]
    Store(ErrorInfo),
    /// Navigation requested in a state that cannot honour it.
    #[error("navigation error: {0}")]
    Navigation(ErrorInfo),
    /// Randomness and seeding errors.
    #[error("rng error: {0}")]
    Rng(ErrorInfo),
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

impl EvalError {
    /// Returns a reference to the payload describing the error.
    pub fn info(&self) -> &ErrorInfo {
        match self {
            EvalError::Config(info)
            | EvalError::Dataset(info)
            | EvalError::Store(info)
            | EvalError::Navigation(info)
            | EvalError::Rng(info)
            | EvalError::Serde(info) => info,
        }
    }

    /// Returns the stable error code.
    pub fn code(&self) -> &str {
        &self.info().code
    }

    /// Whether the error stems from configuration the user must fix before retrying.
    pub fn is_config(&self) -> bool {
        matches!(self, EvalError::Config(_))
    }
}
