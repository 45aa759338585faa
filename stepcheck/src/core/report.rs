//! The validation report returned by interrogation.

use crate::core::result::{StepResult, StepStatus};
use crate::core::schema::SchemaSnapshot;
use crate::core::step::StepKind;
use crate::core::thresholds::{ThresholdOutcome, ThresholdStatus};
use crate::error::{Result, StepcheckError};
use crate::formatters::{HumanFormatter, JsonFormatter, ResultFormatter};
use crate::sources::{BackendKind, ExtractHandle, Partition, TableAdapter};
use arrow::record_batch::RecordBatch;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, instrument};

/// One row of the tabular report projection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportRow {
    pub i: usize,
    pub step_id: usize,
    pub kind: StepKind,
    pub column: Option<String>,
    pub label: String,
    pub status: StepStatus,
    pub units: u64,
    pub pass: u64,
    pub fail: u64,
    pub threshold_status: ThresholdStatus,
    pub error: Option<String>,
}

/// Step results of one interrogation, plus the source metadata taken at
/// bind time.
///
/// The report keeps a handle to the adapter so that rows can be extracted
/// after the fact. Extraction on deferred adapters re-runs a query.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    label: Option<String>,
    table_name: String,
    backend: BackendKind,
    row_count: u64,
    schema: SchemaSnapshot,
    results: Vec<StepResult>,
    started_at: DateTime<Utc>,
    finished_at: DateTime<Utc>,
    #[serde(skip)]
    source: Arc<dyn TableAdapter>,
}

impl ValidationReport {
    pub(crate) fn new(
        label: Option<String>,
        table_name: Option<String>,
        source: Arc<dyn TableAdapter>,
        row_count: u64,
        schema: SchemaSnapshot,
        results: Vec<StepResult>,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
    ) -> Self {
        Self {
            label,
            table_name: table_name.unwrap_or_else(|| source.table_name().to_string()),
            backend: source.kind(),
            row_count,
            schema,
            results,
            started_at,
            finished_at,
            source,
        }
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    pub fn backend(&self) -> BackendKind {
        self.backend
    }

    /// Row count snapshotted at bind time.
    pub fn row_count(&self) -> u64 {
        self.row_count
    }

    pub fn schema(&self) -> &SchemaSnapshot {
        &self.schema
    }

    pub fn results(&self) -> &[StepResult] {
        &self.results
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn finished_at(&self) -> DateTime<Utc> {
        self.finished_at
    }

    /// One row per expanded step, in plan order.
    pub fn get_report_table(&self) -> Vec<ReportRow> {
        self.results
            .iter()
            .map(|r| ReportRow {
                i: r.i,
                step_id: r.step_id,
                kind: r.kind,
                column: r.column.clone(),
                label: r.display_label(),
                status: r.status,
                units: r.n,
                pass: r.n_pass,
                fail: r.n_fail,
                threshold_status: r.threshold_status,
                error: r.error.as_ref().map(ToString::to_string),
            })
            .collect()
    }

    /// Looks up a result by its index.
    pub fn get_step_result(&self, i: usize) -> Result<&StepResult> {
        self.results
            .get(i)
            .ok_or(StepcheckError::StepNotFound { index: i })
    }

    /// True when every step that ran passed all of its units. Skipped steps
    /// are ignored; halted and errored steps count as not passed.
    pub fn all_passed(&self) -> bool {
        self.results
            .iter()
            .filter(|r| r.status != StepStatus::Skipped)
            .all(StepResult::all_passed)
    }

    pub fn any_stop(&self) -> bool {
        self.results.iter().any(|r| r.outcome.stop == Some(true))
    }

    pub fn any_warn(&self) -> bool {
        self.results.iter().any(|r| r.outcome.warn == Some(true))
    }

    pub fn any_notify(&self) -> bool {
        self.results.iter().any(|r| r.outcome.notify == Some(true))
    }

    /// The strictest threshold status over all results.
    pub fn worst_status(&self) -> ThresholdStatus {
        self.results
            .iter()
            .map(|r| r.threshold_status)
            .max()
            .unwrap_or_default()
    }

    fn select(&self, indices: Option<&[usize]>) -> Result<Vec<&StepResult>> {
        match indices {
            None => Ok(self.results.iter().collect()),
            Some(indices) => indices.iter().map(|&i| self.get_step_result(i)).collect(),
        }
    }

    fn collect_by<T>(
        &self,
        indices: Option<&[usize]>,
        f: impl Fn(&StepResult) -> T,
    ) -> Result<BTreeMap<usize, T>> {
        Ok(self.select(indices)?.into_iter().map(|r| (r.i, f(r))).collect())
    }

    /// Units per result, keyed by result index.
    pub fn n(&self, indices: Option<&[usize]>) -> Result<BTreeMap<usize, u64>> {
        self.collect_by(indices, |r| r.n)
    }

    pub fn n_passed(&self, indices: Option<&[usize]>) -> Result<BTreeMap<usize, u64>> {
        self.collect_by(indices, |r| r.n_pass)
    }

    pub fn n_failed(&self, indices: Option<&[usize]>) -> Result<BTreeMap<usize, u64>> {
        self.collect_by(indices, |r| r.n_fail)
    }

    pub fn f_passed(&self, indices: Option<&[usize]>) -> Result<BTreeMap<usize, f64>> {
        self.collect_by(indices, |r| r.f_passed)
    }

    pub fn f_failed(&self, indices: Option<&[usize]>) -> Result<BTreeMap<usize, f64>> {
        self.collect_by(indices, |r| r.f_failed)
    }

    /// Warn flags; `None` where no warn level is set.
    pub fn warn(&self, indices: Option<&[usize]>) -> Result<BTreeMap<usize, Option<bool>>> {
        self.collect_by(indices, |r| r.outcome.warn)
    }

    pub fn stop(&self, indices: Option<&[usize]>) -> Result<BTreeMap<usize, Option<bool>>> {
        self.collect_by(indices, |r| r.outcome.stop)
    }

    pub fn notify(&self, indices: Option<&[usize]>) -> Result<BTreeMap<usize, Option<bool>>> {
        self.collect_by(indices, |r| r.outcome.notify)
    }

    /// Per-level outcome of one result.
    pub fn outcome(&self, i: usize) -> Result<ThresholdOutcome> {
        Ok(self.get_step_result(i)?.outcome)
    }

    /// Rows of one row-based step that passed or failed.
    pub async fn get_step_extract(&self, i: usize, partition: Partition) -> Result<RecordBatch> {
        let result = self.get_step_result(i)?;
        let handle = result.extract.as_ref().ok_or_else(|| {
            StepcheckError::NotSupported(format!(
                "step {i} ({}) has no row-level extract",
                result.kind
            ))
        })?;
        self.source.extract(handle, partition).await
    }

    /// Failing rows of each row-based step, keyed by result index.
    ///
    /// With `None`, every result with an extract is included. Explicitly
    /// requested indices must exist and must have an extract.
    #[instrument(skip(self))]
    pub async fn get_data_extracts(
        &self,
        indices: Option<&[usize]>,
    ) -> Result<BTreeMap<usize, RecordBatch>> {
        let mut extracts = BTreeMap::new();
        match indices {
            None => {
                for result in self.results.iter().filter(|r| r.has_extract()) {
                    extracts.insert(
                        result.i,
                        self.get_step_extract(result.i, Partition::Fail).await?,
                    );
                }
            }
            Some(indices) => {
                for &i in indices {
                    extracts.insert(i, self.get_step_extract(i, Partition::Fail).await?);
                }
            }
        }
        Ok(extracts)
    }

    /// Splits the original table into rows that passed every evaluated
    /// row-level step and rows that failed at least one.
    ///
    /// Errored, skipped, halted and table-level steps do not take part.
    /// Rows excluded by a step's precondition count as passing that step.
    #[instrument(skip(self), fields(table.name = %self.table_name))]
    pub async fn get_sundered_data(&self, partition: Partition) -> Result<RecordBatch> {
        let handles: Vec<&ExtractHandle> = self
            .results
            .iter()
            .filter(|r| r.status == StepStatus::Evaluated)
            .filter_map(|r| r.extract.as_ref())
            .collect();
        debug!(steps = handles.len(), ?partition, "Sundering table");
        self.source.sunder(&handles, partition).await
    }

    /// JSON array with one object per result.
    ///
    /// `use_fields` keeps only the named fields; `exclude_fields` drops them.
    /// Passing both, or an unknown field name, is a configuration error.
    pub fn get_json_report(
        &self,
        use_fields: Option<&[&str]>,
        exclude_fields: Option<&[&str]>,
    ) -> Result<String> {
        JsonFormatter::new()
            .with_fields(use_fields, exclude_fields)?
            .format(self)
    }

    /// Plain-text summary.
    pub fn summary(&self) -> Result<String> {
        HumanFormatter::new().format(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::expr::col;
    use crate::core::plan::ValidationPlan;
    use crate::test_helpers::{deferred_source, eager_source};

    async fn report(source: Arc<dyn TableAdapter>) -> ValidationReport {
        ValidationPlan::builder()
            .label("sample")
            .col_vals_gt("d", 100)
            .thresholds(Some(0.25), None, None)
            .col_vals_not_null("s")
            .col_vals_le("c", 5)
            .precondition(col("d").gt(100))
            .row_count_match(4)
            .build()
            .unwrap()
            .interrogate(source)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_report_table() {
        let report = report(eager_source()).await;
        let table = report.get_report_table();
        assert_eq!(table.len(), 4);
        assert_eq!(table[0].label, "col_vals_gt(d)");
        assert_eq!((table[0].units, table[0].pass, table[0].fail), (4, 2, 2));
        assert_eq!(table[0].threshold_status, ThresholdStatus::Warn);
        assert_eq!(table[3].kind, StepKind::RowCountMatch);
        assert_eq!(report.label(), Some("sample"));
        assert_eq!(report.table_name(), "data");
        assert_eq!(report.row_count(), 4);
        assert!(report.started_at() <= report.finished_at());
    }

    #[tokio::test]
    async fn test_step_lookup() {
        let report = report(eager_source()).await;
        assert_eq!(report.get_step_result(1).unwrap().n_pass, 3);
        assert!(matches!(
            report.get_step_result(9),
            Err(StepcheckError::StepNotFound { index: 9 })
        ));
    }

    #[tokio::test]
    async fn test_scalar_accessors() {
        let report = report(eager_source()).await;
        assert!(!report.all_passed());
        assert!(report.any_warn());
        assert!(!report.any_stop());
        assert!(!report.any_notify());
        assert_eq!(report.worst_status(), ThresholdStatus::Warn);

        let n = report.n(None).unwrap();
        assert_eq!(n.get(&2), Some(&2));
        let failed = report.n_failed(Some(&[0, 1])).unwrap();
        assert_eq!(failed.into_iter().collect::<Vec<_>>(), vec![(0, 2), (1, 1)]);
        assert_eq!(report.f_passed(Some(&[0])).unwrap()[&0], 0.5);
        assert_eq!(report.warn(Some(&[0, 1])).unwrap()[&1], None);
        assert!(report.stop(Some(&[12])).is_err());
    }

    #[tokio::test]
    async fn test_sundered_data_partitions_table() {
        for source in [eager_source(), deferred_source().await] {
            let report = report(source).await;
            let pass = report.get_sundered_data(Partition::Pass).await.unwrap();
            let fail = report.get_sundered_data(Partition::Fail).await.unwrap();
            // Rows 0 and 3 fail d > 100, row 1 fails c <= 5 under its
            // precondition and row 2 has a NULL s.
            assert_eq!(pass.num_rows() + fail.num_rows(), 4);
            assert_eq!(pass.num_rows(), 0);
        }
    }

    #[tokio::test]
    async fn test_data_extracts() {
        let report = report(eager_source()).await;
        let extracts = report.get_data_extracts(None).await.unwrap();
        assert_eq!(extracts.keys().copied().collect::<Vec<_>>(), vec![0, 1, 2]);
        assert_eq!(extracts[&0].num_rows(), 2);
        assert_eq!(extracts[&2].num_rows(), 1);

        let passing = report.get_step_extract(0, Partition::Pass).await.unwrap();
        assert_eq!(passing.num_rows(), 2);

        assert!(matches!(
            report.get_data_extracts(Some(&[3])).await,
            Err(StepcheckError::NotSupported(_))
        ));
    }
}
