//! Validation plans and their fluent builder.

use crate::core::engine::{InterrogationConfig, Interrogator};
use crate::core::expr::{Literal, Operand, Predicate};
use crate::core::report::ValidationReport;
use crate::core::schema::Schema;
use crate::core::step::{Columns, StepDefinition, StepKind, StepValues};
use crate::core::thresholds::Thresholds;
use crate::error::{Result, StepcheckError};
use crate::security::InputSecurity;
use crate::sources::TableAdapter;
use serde::Serialize;
use std::sync::Arc;

/// An ordered, append-only sequence of step definitions.
///
/// A plan holds no data. It is bound to a table only for the duration of an
/// [`interrogate`](Self::interrogate) call.
///
/// # Examples
///
/// ```rust
/// use stepcheck::core::{col, ValidationPlan};
///
/// let plan = ValidationPlan::builder()
///     .label("orders")
///     .col_vals_gt("amount", 0)
///     .col_vals_not_null(["customer_id", "order_id"])
///     .col_vals_le("discount", 5)
///     .precondition(col("amount").gt(100))
///     .build()
///     .unwrap();
///
/// assert_eq!(plan.len(), 3);
/// ```
#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationPlan {
    label: Option<String>,
    table_name: Option<String>,
    thresholds: Thresholds,
    steps: Vec<StepDefinition>,
}

impl ValidationPlan {
    /// Creates an empty plan.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> ValidationPlanBuilder {
        ValidationPlanBuilder::default()
    }

    /// Validates `step`, assigns it the next ordinal and returns the extended plan.
    pub fn append(mut self, step: StepDefinition) -> Result<Self> {
        step.validate()?;
        self.push(step);
        Ok(self)
    }

    fn push(&mut self, step: StepDefinition) {
        let id = self.steps.len();
        self.steps
            .push(step.with_id(id).inherit_thresholds(&self.thresholds));
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// Display name for the target table, overriding the adapter's.
    pub fn table_name(&self) -> Option<&str> {
        self.table_name.as_deref()
    }

    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    pub fn steps(&self) -> &[StepDefinition] {
        &self.steps
    }

    pub fn step(&self, id: usize) -> Option<&StepDefinition> {
        self.steps.get(id)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Runs the plan against `source` with the default configuration.
    pub async fn interrogate(&self, source: Arc<dyn TableAdapter>) -> Result<ValidationReport> {
        Interrogator::new(InterrogationConfig::default())
            .interrogate(self, source)
            .await
    }

    /// Runs the plan against `source` with an explicit configuration.
    pub async fn interrogate_with(
        &self,
        source: Arc<dyn TableAdapter>,
        config: InterrogationConfig,
    ) -> Result<ValidationReport> {
        Interrogator::new(config).interrogate(self, source).await
    }
}

/// Fluent builder for [`ValidationPlan`].
///
/// Each `col_vals_*` call opens a new step. Option methods such as
/// [`na_pass`](Self::na_pass) or [`precondition`](Self::precondition) apply
/// to the most recently opened step. Configuration errors are collected and
/// reported together by [`build`](Self::build).
#[derive(Debug, Default)]
pub struct ValidationPlanBuilder {
    label: Option<String>,
    table_name: Option<String>,
    thresholds: Thresholds,
    pending: Option<StepDefinition>,
    steps: Vec<StepDefinition>,
    errors: Vec<String>,
}

impl ValidationPlanBuilder {
    /// Sets the plan label shown in reports.
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Names the target table in reports instead of the adapter's name.
    pub fn table_name(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        match InputSecurity::validate_table_name(&name) {
            Ok(()) => self.table_name = Some(name),
            Err(e) => self.errors.push(e.to_string()),
        }
        self
    }

    /// Sets thresholds on the open step, or plan-wide defaults when called
    /// before the first step.
    pub fn thresholds(mut self, warn: Option<f64>, stop: Option<f64>, notify: Option<f64>) -> Self {
        let thresholds = match Thresholds::new(warn, stop, notify) {
            Ok(t) => t,
            Err(e) => {
                self.errors.push(e.to_string());
                return self;
            }
        };
        match self.pending.take() {
            Some(step) => self.pending = Some(step.with_thresholds(thresholds)),
            None => self.thresholds = thresholds,
        }
        self
    }

    /// Appends a fully formed step definition.
    pub fn step(mut self, step: StepDefinition) -> Self {
        self.flush();
        self.pending = Some(step);
        self
    }

    fn open(self, kind: StepKind, columns: impl Into<Columns>, values: StepValues) -> Self {
        self.step(StepDefinition::new(kind, columns, values))
    }

    fn flush(&mut self) {
        if let Some(step) = self.pending.take() {
            self.steps.push(step);
        }
    }

    fn modify(mut self, option: &str, f: impl FnOnce(StepDefinition) -> StepDefinition) -> Self {
        match self.pending.take() {
            Some(step) => self.pending = Some(f(step)),
            None => self
                .errors
                .push(format!("'{option}' was called before any step was declared")),
        }
        self
    }

    pub fn col_vals_gt(self, columns: impl Into<Columns>, value: impl Into<Operand>) -> Self {
        self.open(StepKind::ColValsGt, columns, StepValues::Single(value.into()))
    }

    pub fn col_vals_lt(self, columns: impl Into<Columns>, value: impl Into<Operand>) -> Self {
        self.open(StepKind::ColValsLt, columns, StepValues::Single(value.into()))
    }

    pub fn col_vals_eq(self, columns: impl Into<Columns>, value: impl Into<Operand>) -> Self {
        self.open(StepKind::ColValsEq, columns, StepValues::Single(value.into()))
    }

    pub fn col_vals_ne(self, columns: impl Into<Columns>, value: impl Into<Operand>) -> Self {
        self.open(StepKind::ColValsNe, columns, StepValues::Single(value.into()))
    }

    pub fn col_vals_ge(self, columns: impl Into<Columns>, value: impl Into<Operand>) -> Self {
        self.open(StepKind::ColValsGe, columns, StepValues::Single(value.into()))
    }

    pub fn col_vals_le(self, columns: impl Into<Columns>, value: impl Into<Operand>) -> Self {
        self.open(StepKind::ColValsLe, columns, StepValues::Single(value.into()))
    }

    /// Values must lie within `[left, right]`; see [`inclusive`](Self::inclusive).
    pub fn col_vals_between(
        self,
        columns: impl Into<Columns>,
        left: impl Into<Operand>,
        right: impl Into<Operand>,
    ) -> Self {
        let values = StepValues::Range {
            left: left.into(),
            right: right.into(),
        };
        self.open(StepKind::ColValsBetween, columns, values)
    }

    /// Values must lie outside `[left, right]`; see [`inclusive`](Self::inclusive).
    pub fn col_vals_outside(
        self,
        columns: impl Into<Columns>,
        left: impl Into<Operand>,
        right: impl Into<Operand>,
    ) -> Self {
        let values = StepValues::Range {
            left: left.into(),
            right: right.into(),
        };
        self.open(StepKind::ColValsOutside, columns, values)
    }

    pub fn col_vals_in_set<L: Into<Literal>>(
        self,
        columns: impl Into<Columns>,
        set: impl IntoIterator<Item = L>,
    ) -> Self {
        let values = StepValues::Set(set.into_iter().map(Into::into).collect());
        self.open(StepKind::ColValsInSet, columns, values)
    }

    pub fn col_vals_not_in_set<L: Into<Literal>>(
        self,
        columns: impl Into<Columns>,
        set: impl IntoIterator<Item = L>,
    ) -> Self {
        let values = StepValues::Set(set.into_iter().map(Into::into).collect());
        self.open(StepKind::ColValsNotInSet, columns, values)
    }

    pub fn col_vals_null(self, columns: impl Into<Columns>) -> Self {
        self.open(StepKind::ColValsNull, columns, StepValues::None)
    }

    pub fn col_vals_not_null(self, columns: impl Into<Columns>) -> Self {
        self.open(StepKind::ColValsNotNull, columns, StepValues::None)
    }

    pub fn col_vals_regex(self, columns: impl Into<Columns>, pattern: impl Into<String>) -> Self {
        self.open(
            StepKind::ColValsRegex,
            columns,
            StepValues::Pattern(pattern.into()),
        )
    }

    /// Rows must satisfy a custom predicate.
    pub fn col_vals_expr(self, expr: Predicate) -> Self {
        self.open(StepKind::ColValsExpr, Columns::none(), StepValues::Expr(expr))
    }

    pub fn col_exists(self, columns: impl Into<Columns>) -> Self {
        self.open(StepKind::ColExists, columns, StepValues::None)
    }

    /// The (precondition-filtered) row count must equal `count`.
    pub fn row_count_match(self, count: u64) -> Self {
        self.open(
            StepKind::RowCountMatch,
            Columns::none(),
            StepValues::Count(count),
        )
    }

    pub fn col_schema_match(self, schema: Schema) -> Self {
        self.open(
            StepKind::ColSchemaMatch,
            Columns::none(),
            StepValues::Schema(schema),
        )
    }

    pub fn na_pass(self, na_pass: bool) -> Self {
        self.modify("na_pass", |s| s.with_na_pass(na_pass))
    }

    pub fn inclusive(self, left: bool, right: bool) -> Self {
        self.modify("inclusive", |s| s.with_inclusive(left, right))
    }

    pub fn precondition(self, precondition: Predicate) -> Self {
        self.modify("precondition", |s| s.with_precondition(precondition))
    }

    pub fn step_label(self, label: impl Into<String>) -> Self {
        let label = label.into();
        self.modify("step_label", |s| s.with_label(label))
    }

    pub fn brief(self, brief: impl Into<String>) -> Self {
        let brief = brief.into();
        self.modify("brief", |s| s.with_brief(brief))
    }

    pub fn active(self, active: bool) -> Self {
        self.modify("active", |s| s.with_active(active))
    }

    /// Validates every step and freezes the plan.
    pub fn build(mut self) -> Result<ValidationPlan> {
        self.flush();

        let mut errors = self.errors;
        for (position, step) in self.steps.iter().enumerate() {
            if let Err(e) = step.validate() {
                errors.push(format!("step {position}: {e}"));
            }
        }
        if !errors.is_empty() {
            return Err(StepcheckError::Configuration(errors.join("; ")));
        }

        let mut plan = ValidationPlan {
            label: self.label,
            table_name: self.table_name,
            thresholds: self.thresholds,
            steps: Vec::with_capacity(self.steps.len()),
        };
        for step in self.steps {
            plan.push(step);
        }
        Ok(plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::expr::col;
    use crate::core::thresholds::ThresholdValue;

    #[test]
    fn test_builder_assigns_ordinals() {
        let plan = ValidationPlan::builder()
            .col_vals_gt("a", 1)
            .col_vals_regex("b", "^x")
            .row_count_match(3)
            .build()
            .unwrap();

        let ids: Vec<usize> = plan.steps().iter().map(|s| s.id()).collect();
        assert_eq!(ids, vec![0, 1, 2]);
        assert_eq!(plan.step(1).unwrap().kind(), StepKind::ColValsRegex);
    }

    #[test]
    fn test_options_apply_to_open_step() {
        let plan = ValidationPlan::builder()
            .col_vals_le("c", 5)
            .precondition(col("d").gt(100))
            .na_pass(true)
            .step_label("c small")
            .col_vals_not_null("d")
            .build()
            .unwrap();

        let first = &plan.steps()[0];
        assert!(first.na_pass());
        assert!(first.precondition().is_some());
        assert_eq!(first.label(), Some("c small"));

        let second = &plan.steps()[1];
        assert!(!second.na_pass());
        assert!(second.precondition().is_none());
    }

    #[test]
    fn test_plan_thresholds_are_inherited() {
        let plan = ValidationPlan::builder()
            .thresholds(Some(0.1), Some(0.5), None)
            .col_vals_gt("a", 0)
            .col_vals_gt("b", 0)
            .thresholds(None, Some(2.0), None)
            .build()
            .unwrap();

        assert_eq!(
            plan.steps()[0].thresholds().warn,
            Some(ThresholdValue::Fraction(0.1))
        );
        assert_eq!(plan.steps()[1].thresholds().warn, None);
        assert_eq!(
            plan.steps()[1].thresholds().stop,
            Some(ThresholdValue::Count(2))
        );
    }

    #[test]
    fn test_table_name_is_validated() {
        let plan = ValidationPlan::builder()
            .table_name("sales.orders")
            .col_vals_gt("a", 1)
            .build()
            .unwrap();
        assert_eq!(plan.table_name(), Some("sales.orders"));

        assert!(ValidationPlan::builder()
            .table_name("orders; DROP TABLE orders")
            .build()
            .is_err());
    }

    #[test]
    fn test_build_collects_configuration_errors() {
        let err = ValidationPlan::builder()
            .na_pass(true)
            .col_vals_in_set("a", Vec::<i64>::new())
            .col_vals_regex("b", "(")
            .build()
            .unwrap_err();

        assert!(err.is_configuration());
        let msg = err.to_string();
        assert!(msg.contains("na_pass"));
        assert!(msg.contains("step 0"));
        assert!(msg.contains("step 1"));
    }

    #[test]
    fn test_append_is_validated() {
        let plan = ValidationPlan::new()
            .append(StepDefinition::new(
                StepKind::ColValsNotNull,
                "a",
                StepValues::None,
            ))
            .unwrap();
        assert_eq!(plan.len(), 1);

        let bad = StepDefinition::new(StepKind::ColValsGt, "a", StepValues::None);
        assert!(plan.clone().append(bad).is_err());

        let bad_pattern = StepDefinition::new(
            StepKind::ColValsRegex,
            "a",
            StepValues::Pattern("(unclosed".into()),
        );
        assert!(matches!(
            plan.clone().append(bad_pattern),
            Err(StepcheckError::Configuration(_))
        ));

        let plan = plan
            .append(StepDefinition::new(
                StepKind::ColExists,
                vec!["a", "b"],
                StepValues::None,
            ))
            .unwrap();
        assert_eq!(plan.steps()[1].id(), 1);
    }
}
