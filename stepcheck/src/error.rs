//! Error types for the stepcheck validation library.
//!
//! Errors raised while building a plan are returned directly to the caller.
//! Errors raised while evaluating a single step are captured into that step's
//! result as a [`StepError`] so the rest of the plan keeps running.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors returned by plan building, interrogation and report access.
#[derive(Error, Debug)]
pub enum StepcheckError {
    /// A malformed step definition or plan option, detected before any data is read.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A column referenced by a step is not present in the bound table.
    #[error("Column '{column}' not found in table")]
    ColumnNotFound { column: String },

    /// An operand is not comparable with the column it targets.
    #[error("Type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: String, found: String },

    /// A report lookup used an index with no matching step result.
    #[error("Step {index} not found in validation report")]
    StepNotFound { index: usize },

    /// A deferred query failed to plan or execute.
    #[error("DataFusion error: {0}")]
    DataFusion(#[from] datafusion::error::DataFusionError),

    /// An Arrow kernel rejected its input on the eager backend.
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    /// An adapter failed outside of predicate evaluation.
    #[error("Data source error ({source_type}): {message}")]
    DataSource {
        /// Adapter family, such as `memory` or `datafusion`.
        source_type: String,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A report could not be rendered as JSON.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Interrogation did not finish within the configured timeout.
    #[error("Interrogation timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// The request does not apply to this step or backend.
    #[error("Operation not supported: {0}")]
    NotSupported(String),

    /// A broken internal assumption.
    #[error("Internal error: {0}")]
    Internal(String),

    /// Input rejected by the identifier or pattern checks.
    #[error("Security error: {0}")]
    SecurityError(String),
}

pub type Result<T> = std::result::Result<T, StepcheckError>;

impl StepcheckError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// An adapter error with no underlying cause.
    pub fn data_source(source_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self::DataSource {
            source_type: source_type.into(),
            message: message.into(),
            source: None,
        }
    }

    /// An adapter error that keeps its cause reachable through `source()`.
    pub fn data_source_with_source(
        source_type: impl Into<String>,
        message: impl Into<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        Self::DataSource {
            source_type: source_type.into(),
            message: message.into(),
            source: Some(source),
        }
    }

    pub fn type_mismatch(expected: impl Into<String>, found: impl Into<String>) -> Self {
        Self::TypeMismatch {
            expected: expected.into(),
            found: found.into(),
        }
    }

    /// Returns true for errors that belong to plan construction rather than evaluation.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_) | Self::SecurityError(_))
    }
}

impl From<serde_json::Error> for StepcheckError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Classification of an evaluation error captured inside a step result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ColumnNotFound,
    TypeMismatch,
    Configuration,
    Backend,
    Internal,
}

/// A cloneable snapshot of an evaluation error, stored in a step result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepError {
    pub kind: ErrorKind,
    pub message: String,
}

impl StepError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl From<&StepcheckError> for StepError {
    fn from(err: &StepcheckError) -> Self {
        let kind = match err {
            StepcheckError::ColumnNotFound { .. } => ErrorKind::ColumnNotFound,
            StepcheckError::TypeMismatch { .. } => ErrorKind::TypeMismatch,
            StepcheckError::Configuration(_) | StepcheckError::SecurityError(_) => {
                ErrorKind::Configuration
            }
            StepcheckError::DataFusion(_)
            | StepcheckError::Arrow(_)
            | StepcheckError::DataSource { .. }
            | StepcheckError::NotSupported(_)
            | StepcheckError::Timeout(_) => ErrorKind::Backend,
            StepcheckError::StepNotFound { .. }
            | StepcheckError::Serialization(_)
            | StepcheckError::Internal(_) => ErrorKind::Internal,
        };
        Self::new(kind, err.to_string())
    }
}

impl std::fmt::Display for StepError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// Prefixes errors with what was being attempted.
///
/// Column and type errors pass through unchanged so that a captured
/// [`StepError`] keeps its kind.
pub trait ErrorContext<T> {
    fn context(self, msg: &str) -> Result<T>;

    /// Like [`context`](Self::context), building the message only on error.
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E> ErrorContext<T> for std::result::Result<T, E>
where
    E: Into<StepcheckError>,
{
    fn context(self, msg: &str) -> Result<T> {
        self.map_err(|e| wrap(msg, e.into()))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| wrap(&f(), e.into()))
    }
}

fn wrap(msg: &str, err: StepcheckError) -> StepcheckError {
    match err {
        StepcheckError::Configuration(inner) => {
            StepcheckError::Configuration(format!("{msg}: {inner}"))
        }
        StepcheckError::Internal(inner) => StepcheckError::Internal(format!("{msg}: {inner}")),
        err @ (StepcheckError::ColumnNotFound { .. }
        | StepcheckError::TypeMismatch { .. }
        | StepcheckError::StepNotFound { .. }) => err,
        other => StepcheckError::DataSource {
            source_type: "backend".to_string(),
            message: format!("{msg}: {other}"),
            source: Some(Box::new(other)),
        },
    }
}
