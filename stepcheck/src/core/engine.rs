//! The interrogation engine.
//!
//! [`Interrogator`] walks a [`ValidationPlan`] in declaration order against
//! one [`TableAdapter`]. Schema and row count are snapshotted once at bind
//! time; after that every step is evaluated independently, and evaluation
//! errors are captured into the step's result rather than aborting the run.

use crate::core::expr::Predicate;
use crate::core::plan::ValidationPlan;
use crate::core::report::ValidationReport;
use crate::core::result::StepResult;
use crate::core::schema::SchemaSnapshot;
use crate::core::step::{StepDefinition, StepKind, StepValues};
use crate::core::thresholds::ThresholdStatus;
use crate::error::{ErrorContext, Result, StepError, StepcheckError};
use crate::logging::{truncate_field, LogConfig};
use crate::sources::{CompiledPredicate, ExtractHandle, TableAdapter, UnitCounts};
use chrono::Utc;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, instrument, warn};

/// Options for one interrogation run.
///
/// # Examples
///
/// ```rust
/// use stepcheck::core::InterrogationConfig;
/// use std::time::Duration;
///
/// let config = InterrogationConfig::default()
///     .with_max_concurrency(4)
///     .with_timeout(Duration::from_secs(30));
/// assert_eq!(config.max_concurrency, 4);
/// assert!(!config.halt_on_stop);
/// ```
#[derive(Debug, Clone)]
pub struct InterrogationConfig {
    /// Maximum number of step evaluations in flight at once.
    pub max_concurrency: usize,
    /// Upper bound on the whole run. Partial results are discarded on expiry.
    pub timeout: Option<Duration>,
    /// Record every step after the first `stop` breach as halted.
    pub halt_on_stop: bool,
    pub log_config: LogConfig,
}

impl Default for InterrogationConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 1,
            timeout: None,
            halt_on_stop: false,
            log_config: LogConfig::default(),
        }
    }
}

impl InterrogationConfig {
    /// Values below 1 are treated as 1.
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Halting forces sequential evaluation.
    pub fn with_halt_on_stop(mut self, halt_on_stop: bool) -> Self {
        self.halt_on_stop = halt_on_stop;
        self
    }

    pub fn with_log_config(mut self, log_config: LogConfig) -> Self {
        self.log_config = log_config;
        self
    }
}

/// One expanded step: a definition paired with at most one target column.
#[derive(Debug)]
struct Unit<'a> {
    step: &'a StepDefinition,
    column: Option<String>,
}

fn expand(plan: &ValidationPlan) -> Vec<Unit<'_>> {
    plan.steps()
        .iter()
        .flat_map(|step| {
            if step.columns().is_empty() {
                vec![Unit { step, column: None }]
            } else {
                step.columns()
                    .iter()
                    .map(|c| Unit {
                        step,
                        column: Some(c.clone()),
                    })
                    .collect()
            }
        })
        .collect()
}

/// Runs validation plans against table adapters.
#[derive(Debug, Clone, Default)]
pub struct Interrogator {
    config: InterrogationConfig,
}

impl Interrogator {
    pub fn new(config: InterrogationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &InterrogationConfig {
        &self.config
    }

    /// Evaluates every step of `plan` against `source`.
    ///
    /// Fails only when the source cannot be bound (schema or row count
    /// unavailable) or the configured timeout expires. Per-step failures are
    /// recorded in the report.
    #[instrument(skip(self, plan, source), fields(
        plan.label = ?plan.label(),
        plan.steps = plan.len(),
        table.name = %source.table_name(),
        table.backend = %source.kind()
    ))]
    pub async fn interrogate(
        &self,
        plan: &ValidationPlan,
        source: Arc<dyn TableAdapter>,
    ) -> Result<ValidationReport> {
        match self.config.timeout {
            Some(limit) => tokio::time::timeout(limit, self.run(plan, source))
                .await
                .map_err(|_| StepcheckError::Timeout(limit))?,
            None => self.run(plan, source).await,
        }
    }

    async fn run(
        &self,
        plan: &ValidationPlan,
        source: Arc<dyn TableAdapter>,
    ) -> Result<ValidationReport> {
        let started_at = Utc::now();
        let start = Instant::now();
        info!(
            plan.label = ?plan.label(),
            plan.steps = plan.len(),
            "Starting interrogation"
        );

        let schema = source
            .schema()
            .await
            .context("Failed to snapshot table schema")?;
        let row_count = source
            .row_count()
            .await
            .context("Failed to count table rows")?;
        crate::log_data_op!(
            self.config.log_config,
            table.name = %source.table_name(),
            table.rows = row_count,
            table.columns = schema.len(),
            "Bound data source"
        );

        let units = expand(plan);
        let results = if self.config.halt_on_stop || self.config.max_concurrency <= 1 {
            self.run_sequential(&units, source.as_ref(), &schema).await
        } else {
            stream::iter(
                units
                    .iter()
                    .map(|unit| self.evaluate_unit(unit, source.as_ref(), &schema)),
            )
            .buffered(self.config.max_concurrency)
            .collect::<Vec<_>>()
            .await
        };

        let results: Vec<StepResult> = results
            .into_iter()
            .enumerate()
            .map(|(i, r)| r.with_index(i))
            .collect();

        if self.config.log_config.log_metrics {
            let failed = results.iter().filter(|r| r.n_fail > 0).count();
            let errors = results.iter().filter(|r| r.is_error()).count();
            info!(
                results.total = results.len(),
                results.with_failures = failed,
                results.errors = errors,
                duration_ms = start.elapsed().as_millis() as u64,
                "Interrogation completed"
            );
        }

        Ok(ValidationReport::new(
            plan.label().map(String::from),
            plan.table_name().map(String::from),
            source,
            row_count,
            schema,
            results,
            started_at,
            Utc::now(),
        ))
    }

    async fn run_sequential(
        &self,
        units: &[Unit<'_>],
        source: &dyn TableAdapter,
        schema: &SchemaSnapshot,
    ) -> Vec<StepResult> {
        let mut results = Vec::with_capacity(units.len());
        let mut halted = false;
        for unit in units {
            if halted && unit.step.is_active() {
                results.push(StepResult::halted(unit.step, unit.column.clone()));
                continue;
            }
            let result = self.evaluate_unit(unit, source, schema).await;
            if self.config.halt_on_stop && result.threshold_status == ThresholdStatus::Stop {
                warn!(
                    step.id = result.step_id,
                    "Stop threshold reached, halting remaining steps"
                );
                halted = true;
            }
            results.push(result);
        }
        results
    }

    async fn evaluate_unit(
        &self,
        unit: &Unit<'_>,
        source: &dyn TableAdapter,
        schema: &SchemaSnapshot,
    ) -> StepResult {
        let step = unit.step;
        let column = unit.column.clone();
        if !step.is_active() {
            debug!(step.id = step.id(), step.kind = %step.kind(), "Skipping inactive step");
            return StepResult::skipped(step, column);
        }

        match self.count_units(unit, source, schema).await {
            Ok((counts, extract)) => {
                let result = StepResult::evaluated(step, column, counts, extract);
                debug!(
                    step.id = result.step_id,
                    step.kind = %result.kind,
                    step.column = ?result.column,
                    step.n = result.n,
                    step.n_pass = result.n_pass,
                    step.n_fail = result.n_fail,
                    "Step evaluated"
                );
                if result.threshold_status.is_at_least(ThresholdStatus::Warn) {
                    warn!(
                        step.id = result.step_id,
                        step.kind = %result.kind,
                        step.column = ?result.column,
                        step.f_failed = result.f_failed,
                        step.threshold_status = %result.threshold_status,
                        "Step reached failure threshold"
                    );
                }
                result
            }
            Err(e) => {
                error!(
                    step.id = step.id(),
                    step.kind = %step.kind(),
                    step.column = ?unit.column,
                    error = %e,
                    "Step evaluation failed"
                );
                StepResult::errored(step, column, StepError::from(&e))
            }
        }
    }

    /// Counts the units of one expanded step and, for row-based steps,
    /// keeps the compiled predicates for later extraction.
    async fn count_units(
        &self,
        unit: &Unit<'_>,
        source: &dyn TableAdapter,
        schema: &SchemaSnapshot,
    ) -> Result<(UnitCounts, Option<ExtractHandle>)> {
        let step = unit.step;
        let column = unit.column.as_deref();

        match (step.kind(), step.values()) {
            (StepKind::ColExists, _) => {
                let present = column.is_some_and(|c| schema.contains(c));
                Ok((UnitCounts::new(1, u64::from(present)), None))
            }
            (StepKind::ColSchemaMatch, StepValues::Schema(expected)) => {
                let matched = expected.matches(schema);
                Ok((UnitCounts::new(1, u64::from(matched)), None))
            }
            (StepKind::RowCountMatch, StepValues::Count(expected)) => {
                let applicable = self.compile_applicable(step, source, schema).await?;
                let rows = source.count_rows(applicable.as_ref()).await?;
                Ok((UnitCounts::new(1, u64::from(rows == *expected)), None))
            }
            (kind, _) => {
                let passing = step.pass_predicate(column).ok_or_else(|| {
                    StepcheckError::Internal(format!("step '{kind}' has no row predicate"))
                })?;
                self.log_predicate(step, &passing);

                let applicable = self.compile_applicable(step, source, schema).await?;
                let passing = source.compile(&passing, schema).await?;
                let counts = source.count(applicable.as_ref(), &passing).await?;
                Ok((counts, Some(ExtractHandle::new(applicable, passing))))
            }
        }
    }

    async fn compile_applicable(
        &self,
        step: &StepDefinition,
        source: &dyn TableAdapter,
        schema: &SchemaSnapshot,
    ) -> Result<Option<CompiledPredicate>> {
        match step.applicable_predicate() {
            Some(p) => Ok(Some(
                source
                    .compile(&p, schema)
                    .await
                    .context("Failed to compile precondition")?,
            )),
            None => Ok(None),
        }
    }

    fn log_predicate(&self, step: &StepDefinition, predicate: &Predicate) {
        let config = &self.config.log_config;
        crate::log_step!(
            config,
            step.id = step.id(),
            step.predicate = %truncate_field(&predicate.to_string(), config.max_field_length),
            "Compiled step predicate"
        );
    }
}
