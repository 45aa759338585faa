//! Step results produced by interrogation.

use crate::core::expr::Predicate;
use crate::core::step::{StepDefinition, StepKind, StepValues};
use crate::core::thresholds::{ThresholdOutcome, ThresholdStatus, Thresholds};
use crate::error::StepError;
use crate::sources::{ExtractHandle, UnitCounts};
use serde::{Deserialize, Serialize};
use std::fmt;

/// How far a step got during interrogation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    /// The step ran and produced counts.
    Evaluated,
    /// The step was inactive.
    Skipped,
    /// An earlier step reached `stop` while halting was enabled.
    Halted,
    /// The step could not be evaluated; see [`StepResult::error`].
    Error,
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Evaluated => "evaluated",
            Self::Skipped => "skipped",
            Self::Halted => "halted",
            Self::Error => "error",
        };
        f.write_str(s)
    }
}

/// The outcome of one expanded step.
///
/// A step over `k` columns yields `k` results that share a `step_id` and
/// have distinct indices `i`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    /// Position of this result in the report.
    pub i: usize,
    /// Ordinal of the step definition this result was expanded from.
    pub step_id: usize,
    pub kind: StepKind,
    /// Target column, `None` for table-level steps.
    pub column: Option<String>,
    pub values: StepValues,
    pub inclusive: (bool, bool),
    pub na_pass: bool,
    pub precondition: Option<Predicate>,
    pub label: Option<String>,
    pub brief: Option<String>,
    pub active: bool,
    pub status: StepStatus,
    /// Units the step applied to.
    pub n: u64,
    pub n_pass: u64,
    pub n_fail: u64,
    pub f_passed: f64,
    pub f_failed: f64,
    pub thresholds: Thresholds,
    pub outcome: ThresholdOutcome,
    pub threshold_status: ThresholdStatus,
    pub error: Option<StepError>,
    pub fingerprint: String,
    #[serde(skip)]
    pub(crate) extract: Option<ExtractHandle>,
}

impl StepResult {
    fn base(step: &StepDefinition, column: Option<String>, status: StepStatus) -> Self {
        Self {
            i: 0,
            step_id: step.id(),
            kind: step.kind(),
            column,
            values: step.values().clone(),
            inclusive: step.inclusive(),
            na_pass: step.na_pass(),
            precondition: step.precondition().cloned(),
            label: step.label().map(String::from),
            brief: step.brief().map(String::from),
            active: step.is_active(),
            status,
            n: 0,
            n_pass: 0,
            n_fail: 0,
            f_passed: 0.0,
            f_failed: 0.0,
            thresholds: step.thresholds(),
            outcome: ThresholdOutcome::default(),
            threshold_status: ThresholdStatus::Ok,
            error: None,
            fingerprint: step.fingerprint(),
            extract: None,
        }
    }

    /// A result with counts, classified against the step's thresholds.
    pub(crate) fn evaluated(
        step: &StepDefinition,
        column: Option<String>,
        counts: UnitCounts,
        extract: Option<ExtractHandle>,
    ) -> Self {
        let mut result = Self::base(step, column, StepStatus::Evaluated);
        let n_fail = counts.n_fail();
        result.n = counts.n;
        result.n_pass = counts.n_pass;
        result.n_fail = n_fail;
        if counts.n > 0 {
            result.f_passed = counts.n_pass as f64 / counts.n as f64;
            result.f_failed = n_fail as f64 / counts.n as f64;
        }
        result.outcome = result.thresholds.evaluate(n_fail, counts.n);
        result.threshold_status = result.outcome.status();
        result.extract = extract;
        result
    }

    pub(crate) fn skipped(step: &StepDefinition, column: Option<String>) -> Self {
        Self::base(step, column, StepStatus::Skipped)
    }

    pub(crate) fn halted(step: &StepDefinition, column: Option<String>) -> Self {
        Self::base(step, column, StepStatus::Halted)
    }

    pub(crate) fn errored(step: &StepDefinition, column: Option<String>, error: StepError) -> Self {
        let mut result = Self::base(step, column, StepStatus::Error);
        result.error = Some(error);
        result
    }

    pub(crate) fn with_index(mut self, i: usize) -> Self {
        self.i = i;
        self
    }

    /// True when the step ran without error and every unit passed.
    pub fn all_passed(&self) -> bool {
        self.status == StepStatus::Evaluated && self.n_fail == 0
    }

    pub fn is_error(&self) -> bool {
        self.status == StepStatus::Error
    }

    /// True when row-level extraction is available for this result.
    pub fn has_extract(&self) -> bool {
        self.extract.is_some()
    }

    /// Display label: the step label, or `kind(column)`.
    pub fn display_label(&self) -> String {
        match (&self.label, &self.column) {
            (Some(label), _) => label.clone(),
            (None, Some(column)) => format!("{}({column})", self.kind),
            (None, None) => self.kind.to_string(),
        }
    }
}
