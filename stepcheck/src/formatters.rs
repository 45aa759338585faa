//! Report formatting for stepcheck validation reports.
//!
//! Two projections are provided: a JSON array with one object per step
//! result, and a plain-text summary for consoles and logs. Both return
//! strings; writing them anywhere is up to the caller.
//!
//! # Examples
//!
//! ```rust,ignore
//! use stepcheck::formatters::{HumanFormatter, JsonFormatter, ResultFormatter};
//!
//! let json = JsonFormatter::new()
//!     .with_fields(Some(&["i", "assertion_type", "n_failed"]), None)?
//!     .format(&report)?;
//! let text = HumanFormatter::new().format(&report)?;
//! ```

use crate::core::report::ValidationReport;
use crate::core::result::{StepResult, StepStatus};
use crate::core::step::StepValues;
use crate::core::thresholds::ThresholdStatus;
use crate::error::{Result, StepcheckError};
use serde_json::{json, Map, Value};
use std::fmt::Write;

/// Field names of the JSON report, in output order.
pub const JSON_REPORT_FIELDS: &[&str] = &[
    "i",
    "i_o",
    "assertion_type",
    "column",
    "values",
    "inclusive",
    "na_pass",
    "pre",
    "thresholds",
    "label",
    "brief",
    "active",
    "eval_error",
    "all_passed",
    "n",
    "n_passed",
    "n_failed",
    "f_passed",
    "f_failed",
    "warn",
    "stop",
    "notify",
    "status",
    "fingerprint",
];

/// Configuration options for formatting validation reports.
#[derive(Debug, Clone)]
pub struct FormatterConfig {
    /// Include start and end timestamps
    pub include_timestamps: bool,
    /// Include the bound table's schema snapshot
    pub include_schema: bool,
    /// Maximum number of step lines to show (`None` for all)
    pub max_steps: Option<usize>,
}

impl Default for FormatterConfig {
    fn default() -> Self {
        Self {
            include_timestamps: true,
            include_schema: false,
            max_steps: None,
        }
    }
}

impl FormatterConfig {
    /// Summary only, no step lines.
    pub fn minimal() -> Self {
        Self {
            include_timestamps: false,
            include_schema: false,
            max_steps: Some(0),
        }
    }

    pub fn detailed() -> Self {
        Self {
            include_timestamps: true,
            include_schema: true,
            max_steps: None,
        }
    }

    pub fn with_timestamps(mut self, include: bool) -> Self {
        self.include_timestamps = include;
        self
    }

    pub fn with_schema(mut self, include: bool) -> Self {
        self.include_schema = include;
        self
    }

    pub fn with_max_steps(mut self, max: usize) -> Self {
        self.max_steps = Some(max);
        self
    }
}

/// Converts a validation report into a string representation.
pub trait ResultFormatter {
    fn format(&self, report: &ValidationReport) -> Result<String>;

    /// Formats with explicit options. The default ignores them.
    fn format_with_config(
        &self,
        report: &ValidationReport,
        _config: &FormatterConfig,
    ) -> Result<String> {
        self.format(report)
    }
}

/// Which JSON report fields to emit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum FieldSelection {
    #[default]
    All,
    Use(Vec<String>),
    Exclude(Vec<String>),
}

impl FieldSelection {
    /// Builds a selection from optional keep and drop lists.
    pub fn from_lists(use_fields: Option<&[&str]>, exclude_fields: Option<&[&str]>) -> Result<Self> {
        let selection = match (use_fields, exclude_fields) {
            (Some(_), Some(_)) => {
                return Err(StepcheckError::configuration(
                    "Cannot specify both use_fields and exclude_fields",
                ))
            }
            (Some(fields), None) => Self::Use(fields.iter().map(|f| f.to_string()).collect()),
            (None, Some(fields)) => Self::Exclude(fields.iter().map(|f| f.to_string()).collect()),
            (None, None) => Self::All,
        };
        selection.check_names()?;
        Ok(selection)
    }

    fn check_names(&self) -> Result<()> {
        let names = match self {
            Self::All => return Ok(()),
            Self::Use(names) | Self::Exclude(names) => names,
        };
        match names
            .iter()
            .find(|n| !JSON_REPORT_FIELDS.contains(&n.as_str()))
        {
            Some(unknown) => Err(StepcheckError::configuration(format!(
                "Unknown report field '{unknown}'"
            ))),
            None => Ok(()),
        }
    }

    fn includes(&self, field: &str) -> bool {
        match self {
            Self::All => true,
            Self::Use(names) => names.iter().any(|n| n == field),
            Self::Exclude(names) => !names.iter().any(|n| n == field),
        }
    }
}

/// Formats a report as a JSON array, one object per step result.
///
/// Field names are listed in [`JSON_REPORT_FIELDS`].
#[derive(Debug, Clone)]
pub struct JsonFormatter {
    fields: FieldSelection,
    pretty: bool,
}

impl JsonFormatter {
    pub fn new() -> Self {
        Self {
            fields: FieldSelection::All,
            pretty: true,
        }
    }

    /// Restricts the emitted fields. Fails on conflicting or unknown names.
    pub fn with_fields(
        mut self,
        use_fields: Option<&[&str]>,
        exclude_fields: Option<&[&str]>,
    ) -> Result<Self> {
        self.fields = FieldSelection::from_lists(use_fields, exclude_fields)?;
        Ok(self)
    }

    pub fn with_pretty(mut self, pretty: bool) -> Self {
        self.pretty = pretty;
        self
    }

    fn step_object(&self, result: &StepResult) -> Value {
        let values = match &result.values {
            StepValues::None => Value::Null,
            other => Value::String(other.to_string()),
        };
        let all_passed = match result.status {
            StepStatus::Evaluated | StepStatus::Error => Some(result.all_passed()),
            StepStatus::Skipped | StepStatus::Halted => None,
        };
        let full = json!({
            "i": result.i,
            "i_o": result.step_id,
            "assertion_type": result.kind.as_str(),
            "column": result.column,
            "values": values,
            "inclusive": [result.inclusive.0, result.inclusive.1],
            "na_pass": result.na_pass,
            "pre": result.precondition.as_ref().map(ToString::to_string),
            "thresholds": result.thresholds,
            "label": result.label,
            "brief": result.brief,
            "active": result.active,
            "eval_error": result.is_error(),
            "all_passed": all_passed,
            "n": result.n,
            "n_passed": result.n_pass,
            "n_failed": result.n_fail,
            "f_passed": result.f_passed,
            "f_failed": result.f_failed,
            "warn": result.outcome.warn,
            "stop": result.outcome.stop,
            "notify": result.outcome.notify,
            "status": result.status,
            "fingerprint": result.fingerprint,
        });

        let Value::Object(mut full) = full else {
            return Value::Null;
        };
        let mut selected = Map::new();
        for field in JSON_REPORT_FIELDS {
            if self.fields.includes(field) {
                if let Some(value) = full.remove(*field) {
                    selected.insert(field.to_string(), value);
                }
            }
        }
        Value::Object(selected)
    }
}

impl Default for JsonFormatter {
    fn default() -> Self {
        Self::new()
    }
}

impl ResultFormatter for JsonFormatter {
    fn format(&self, report: &ValidationReport) -> Result<String> {
        let steps: Vec<Value> = report
            .results()
            .iter()
            .map(|r| self.step_object(r))
            .collect();
        let rendered = if self.pretty {
            serde_json::to_string_pretty(&steps)
        } else {
            serde_json::to_string(&steps)
        };
        rendered.map_err(|e| {
            StepcheckError::Serialization(format!("Failed to serialize report to JSON: {e}"))
        })
    }
}

/// Formats a report as plain text for consoles and logs.
#[derive(Debug, Clone, Default)]
pub struct HumanFormatter {
    config: FormatterConfig,
}

impl HumanFormatter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: FormatterConfig) -> Self {
        Self { config }
    }

    fn render(
        &self,
        report: &ValidationReport,
        config: &FormatterConfig,
        out: &mut String,
    ) -> std::fmt::Result {
        let verdict = if report.all_passed() { "PASSED" } else { "FAILED" };
        writeln!(out, "Validation {verdict}")?;
        if let Some(label) = report.label() {
            writeln!(out, "Plan: {label}")?;
        }
        writeln!(
            out,
            "Table: {} ({} backend, {} rows)",
            report.table_name(),
            report.backend(),
            report.row_count()
        )?;
        if config.include_timestamps {
            writeln!(out, "Started: {}", report.started_at().to_rfc3339())?;
            writeln!(out, "Finished: {}", report.finished_at().to_rfc3339())?;
        }
        if config.include_schema {
            let columns: Vec<String> = report
                .schema()
                .columns()
                .iter()
                .map(|c| format!("{} {}", c.name, c.data_type))
                .collect();
            writeln!(out, "Schema: {}", columns.join(", "))?;
        }

        let results = report.results();
        let count = |status: StepStatus| results.iter().filter(|r| r.status == status).count();
        writeln!(out)?;
        writeln!(
            out,
            "Steps: {} evaluated, {} skipped, {} halted, {} errors",
            count(StepStatus::Evaluated),
            count(StepStatus::Skipped),
            count(StepStatus::Halted),
            count(StepStatus::Error)
        )?;
        writeln!(out, "Worst threshold status: {}", report.worst_status())?;

        let shown = config.max_steps.unwrap_or(results.len()).min(results.len());
        if shown > 0 {
            writeln!(out)?;
        }
        for r in &results[..shown] {
            write!(
                out,
                "  [{}] {} {}: {}/{} passed",
                r.i,
                r.status,
                r.display_label(),
                r.n_pass,
                r.n
            )?;
            if r.threshold_status != ThresholdStatus::Ok {
                write!(out, " ({})", r.threshold_status)?;
            }
            if let Some(error) = &r.error {
                write!(out, " error: {error}")?;
            }
            writeln!(out)?;
        }
        if results.len() > shown && shown > 0 {
            writeln!(out, "  ... and {} more steps", results.len() - shown)?;
        }
        Ok(())
    }
}

impl ResultFormatter for HumanFormatter {
    fn format(&self, report: &ValidationReport) -> Result<String> {
        self.format_with_config(report, &self.config)
    }

    fn format_with_config(
        &self,
        report: &ValidationReport,
        config: &FormatterConfig,
    ) -> Result<String> {
        let mut output = String::new();
        self.render(report, config, &mut output)
            .map_err(|e| StepcheckError::Internal(format!("Failed to format report: {e}")))?;
        Ok(output)
    }
}
