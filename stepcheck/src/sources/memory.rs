//! Eager adapter over an in-memory Arrow batch.

use super::{BackendKind, CompiledPredicate, ExtractHandle, Partition, TableAdapter, UnitCounts};
use crate::core::expr::{CompareOp, Literal, Operand, Predicate};
use crate::core::schema::SchemaSnapshot;
use crate::error::{Result, StepcheckError};
use crate::security::InputSecurity;
use arrow::array::{
    Array, ArrayRef, AsArray, BooleanArray, Date32Array, Datum, Float64Array, Int64Array, Scalar,
    StringArray,
};
use arrow::compute::kernels::boolean::{and, and_kleene, not, or, or_kleene};
use arrow::compute::kernels::cmp;
use arrow::compute::{cast, concat_batches, filter_record_batch, is_not_null, is_null};
use arrow::datatypes::{DataType, SchemaRef};
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use chrono::Datelike;
use datafusion::logical_expr::type_coercion::binary::comparison_coercion;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Days between 0001-01-01 (CE) and the Unix epoch.
const EPOCH_DAYS_FROM_CE: i32 = 719_163;

/// An eager table: every predicate is evaluated to a boolean mask on compile.
///
/// The batch is shared, not copied; `RecordBatch` clones are reference
/// counted.
#[derive(Debug, Clone)]
pub struct InMemoryTable {
    name: String,
    batch: RecordBatch,
}

impl InMemoryTable {
    pub fn new(name: impl Into<String>, batch: RecordBatch) -> Result<Self> {
        let name = name.into();
        InputSecurity::validate_column_name(&name)?;
        Ok(Self { name, batch })
    }

    /// Concatenates `batches` into a single table.
    pub fn from_batches(
        name: impl Into<String>,
        schema: SchemaRef,
        batches: &[RecordBatch],
    ) -> Result<Self> {
        let batch = concat_batches(&schema, batches)?;
        Self::new(name, batch)
    }

    pub fn batch(&self) -> &RecordBatch {
        &self.batch
    }

    fn len(&self) -> usize {
        self.batch.num_rows()
    }

    fn column(&self, name: &str) -> Result<&ArrayRef> {
        self.batch
            .column_by_name(name)
            .ok_or_else(|| StepcheckError::ColumnNotFound {
                column: name.to_string(),
            })
    }

    fn constant(&self, value: Option<bool>) -> BooleanArray {
        BooleanArray::from(vec![value; self.len()])
    }

    fn operand_type(&self, operand: &Operand) -> Result<DataType> {
        Ok(match operand {
            Operand::Column(name) => self.column(name)?.data_type().clone(),
            Operand::Literal(lit) => literal_type(lit),
        })
    }

    /// Materializes an operand as an array (columns) or a scalar (literals)
    /// of `target` type.
    fn datum(&self, operand: &Operand, target: &DataType) -> Result<Box<dyn Datum>> {
        match operand {
            Operand::Column(name) => {
                let array = cast(self.column(name)?, target)?;
                Ok(Box::new(array))
            }
            Operand::Literal(lit) => {
                let array = cast(&literal_array(lit), target)?;
                Ok(Box::new(Scalar::new(array)))
            }
        }
    }

    fn evaluate(&self, predicate: &Predicate) -> Result<BooleanArray> {
        match predicate {
            Predicate::Compare { left, op, right } => {
                let target = comparison_type(&self.operand_type(left)?, &self.operand_type(right)?)?;
                let l = self.datum(left, &target)?;
                let r = self.datum(right, &target)?;
                let result = compare(*op, l.as_ref(), r.as_ref())?;
                Ok(self.broadcast(result))
            }
            Predicate::IsNull(operand) => match operand {
                Operand::Column(name) => Ok(is_null(self.column(name)?.as_ref())?),
                Operand::Literal(_) => Ok(self.constant(Some(false))),
            },
            Predicate::IsNotNull(operand) => match operand {
                Operand::Column(name) => Ok(is_not_null(self.column(name)?.as_ref())?),
                Operand::Literal(_) => Ok(self.constant(Some(true))),
            },
            Predicate::InSet {
                operand,
                values,
                negated,
            } => {
                let mut acc: Option<BooleanArray> = None;
                for value in values {
                    let target = comparison_type(&self.operand_type(operand)?, &literal_type(value))?;
                    let l = self.datum(operand, &target)?;
                    let r = self.datum(&Operand::Literal(value.clone()), &target)?;
                    let hit = self.broadcast(cmp::eq(l.as_ref(), r.as_ref())?);
                    acc = Some(match acc {
                        Some(prev) => or_kleene(&prev, &hit)?,
                        None => hit,
                    });
                }
                let found = acc.unwrap_or_else(|| self.constant(Some(false)));
                if *negated {
                    Ok(not(&found)?)
                } else {
                    Ok(found)
                }
            }
            Predicate::Regex { operand, pattern } => {
                let re = InputSecurity::validate_regex_pattern(pattern)?;
                match operand {
                    Operand::Column(name) => {
                        let values = cast(self.column(name)?, &DataType::Utf8)?;
                        Ok(values
                            .as_string::<i32>()
                            .iter()
                            .map(|v| v.map(|s| re.is_match(s)))
                            .collect())
                    }
                    Operand::Literal(Literal::Utf8(s)) => Ok(self.constant(Some(re.is_match(s)))),
                    Operand::Literal(other) => Err(StepcheckError::type_mismatch(
                        "string",
                        other.type_class().as_str(),
                    )),
                }
            }
            Predicate::And(a, b) => Ok(and_kleene(&self.evaluate(a)?, &self.evaluate(b)?)?),
            Predicate::Or(a, b) => Ok(or_kleene(&self.evaluate(a)?, &self.evaluate(b)?)?),
            Predicate::Not(inner) => Ok(not(&self.evaluate(inner)?)?),
            Predicate::IsTrue(inner) => Ok(nulls_as_false(&self.evaluate(inner)?)),
            Predicate::Const(v) => Ok(self.constant(Some(*v))),
        }
    }

    /// Scalar-vs-scalar comparisons yield one value; repeat it for every row.
    fn broadcast(&self, result: BooleanArray) -> BooleanArray {
        if result.len() == self.len() {
            return result;
        }
        let value = (!result.is_empty() && result.is_valid(0)).then(|| result.value(0));
        self.constant(value)
    }

    fn applicable_mask(&self, applicable: Option<&CompiledPredicate>) -> Result<BooleanArray> {
        match applicable {
            Some(p) => Ok(nulls_as_false(p.as_mask()?)),
            None => Ok(self.constant(Some(true))),
        }
    }

    /// Per-row "did not fail" for one handle: outside the applicable set, or passing.
    fn row_ok(&self, handle: &ExtractHandle) -> Result<BooleanArray> {
        let passing = nulls_as_false(handle.passing().as_mask()?);
        match handle.applicable() {
            Some(app) => Ok(or(&not(&nulls_as_false(app.as_mask()?))?, &passing)?),
            None => Ok(passing),
        }
    }
}

#[async_trait]
impl TableAdapter for InMemoryTable {
    fn kind(&self) -> BackendKind {
        BackendKind::Eager
    }

    fn table_name(&self) -> &str {
        &self.name
    }

    async fn schema(&self) -> Result<SchemaSnapshot> {
        Ok(SchemaSnapshot::from_arrow(self.batch.schema().as_ref()))
    }

    async fn row_count(&self) -> Result<u64> {
        Ok(self.len() as u64)
    }

    #[instrument(skip(self, predicate, schema), fields(table = %self.name, predicate = %predicate))]
    async fn compile(
        &self,
        predicate: &Predicate,
        schema: &SchemaSnapshot,
    ) -> Result<CompiledPredicate> {
        predicate.check_types(schema)?;
        let mask = self.evaluate(predicate)?;
        debug!(rows = mask.len(), "Evaluated eager predicate");
        Ok(CompiledPredicate::Mask(mask))
    }

    async fn count(
        &self,
        applicable: Option<&CompiledPredicate>,
        passing: &CompiledPredicate,
    ) -> Result<UnitCounts> {
        let applicable = self.applicable_mask(applicable)?;
        let passing = nulls_as_false(passing.as_mask()?);
        let n = applicable.true_count() as u64;
        let n_pass = and(&applicable, &passing)?.true_count() as u64;
        Ok(UnitCounts::new(n, n_pass))
    }

    async fn count_rows(&self, applicable: Option<&CompiledPredicate>) -> Result<u64> {
        Ok(self.applicable_mask(applicable)?.true_count() as u64)
    }

    async fn extract(&self, handle: &ExtractHandle, partition: Partition) -> Result<RecordBatch> {
        let applicable = self.applicable_mask(handle.applicable())?;
        let passing = nulls_as_false(handle.passing().as_mask()?);
        let selected = match partition {
            Partition::Pass => passing,
            Partition::Fail => not(&passing)?,
        };
        Ok(filter_record_batch(&self.batch, &and(&applicable, &selected)?)?)
    }

    async fn sunder(
        &self,
        handles: &[&ExtractHandle],
        partition: Partition,
    ) -> Result<RecordBatch> {
        let mut all_ok = self.constant(Some(true));
        for handle in handles {
            all_ok = and(&all_ok, &self.row_ok(handle)?)?;
        }
        let selected = match partition {
            Partition::Pass => all_ok,
            Partition::Fail => not(&all_ok)?,
        };
        Ok(filter_record_batch(&self.batch, &selected)?)
    }
}

fn compare(op: CompareOp, l: &dyn Datum, r: &dyn Datum) -> Result<BooleanArray> {
    let result = match op {
        CompareOp::Gt => cmp::gt(l, r),
        CompareOp::GtEq => cmp::gt_eq(l, r),
        CompareOp::Lt => cmp::lt(l, r),
        CompareOp::LtEq => cmp::lt_eq(l, r),
        CompareOp::Eq => cmp::eq(l, r),
        CompareOp::NotEq => cmp::neq(l, r),
    }?;
    Ok(result)
}

fn literal_type(lit: &Literal) -> DataType {
    match lit {
        Literal::Int(_) => DataType::Int64,
        Literal::Float(_) => DataType::Float64,
        Literal::Utf8(_) => DataType::Utf8,
        Literal::Boolean(_) => DataType::Boolean,
        Literal::Date(_) => DataType::Date32,
    }
}

fn literal_array(lit: &Literal) -> ArrayRef {
    match lit {
        Literal::Int(v) => Arc::new(Int64Array::from(vec![*v])),
        Literal::Float(v) => Arc::new(Float64Array::from(vec![*v])),
        Literal::Utf8(v) => Arc::new(StringArray::from(vec![v.as_str()])),
        Literal::Boolean(v) => Arc::new(BooleanArray::from(vec![*v])),
        Literal::Date(d) => Arc::new(Date32Array::from(vec![
            d.num_days_from_ce() - EPOCH_DAYS_FROM_CE,
        ])),
    }
}

/// A mask with NULL folded into false and no validity buffer.
fn nulls_as_false(mask: &BooleanArray) -> BooleanArray {
    match mask.nulls() {
        Some(nulls) => BooleanArray::new(mask.values() & nulls.inner(), None),
        None => BooleanArray::new(mask.values().clone(), None),
    }
}

/// The type both sides are cast to before comparing.
///
/// Uses DataFusion's comparison coercion so that the deferred backend, which
/// applies the same rule while planning, sees identical values.
fn comparison_type(left: &DataType, right: &DataType) -> Result<DataType> {
    comparison_coercion(left, right).ok_or_else(|| {
        StepcheckError::type_mismatch(format!("type comparable with {left}"), right.to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::expr::col;
    use crate::test_helpers::sample_batch;
    use arrow::array::{Date64Array, TimestampMicrosecondArray, UInt64Array};
    use arrow::datatypes::{Field, Schema, TimeUnit};
    use chrono::NaiveDate;

    fn table() -> InMemoryTable {
        InMemoryTable::new("data", sample_batch()).unwrap()
    }

    async fn mask(t: &InMemoryTable, p: Predicate) -> Vec<Option<bool>> {
        let schema = t.schema().await.unwrap();
        let compiled = t.compile(&p, &schema).await.unwrap();
        compiled.as_mask().unwrap().iter().collect()
    }

    #[tokio::test]
    async fn test_numeric_comparison() {
        let t = table();
        // d = [50, 150, 250, NULL]
        assert_eq!(
            mask(&t, col("d").gt(100)).await,
            vec![Some(false), Some(true), Some(true), None]
        );
        assert_eq!(
            mask(&t, col("d").gt(100).is_true()).await,
            vec![Some(false), Some(true), Some(true), Some(false)]
        );
        // integer column against a float literal
        assert_eq!(
            mask(&t, col("d").lt_eq(150.5).is_true()).await,
            vec![Some(true), Some(true), Some(false), Some(false)]
        );
    }

    fn single_column(field: Field, values: ArrayRef) -> InMemoryTable {
        let schema = Arc::new(Schema::new(vec![field]));
        InMemoryTable::new("t", RecordBatch::try_new(schema, vec![values]).unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_column_without_nulls() {
        let t = single_column(
            Field::new("d", DataType::Int64, false),
            Arc::new(Int64Array::from(vec![50, 150, 250])),
        );
        assert!(t.batch().column(0).nulls().is_none());

        let schema = t.schema().await.unwrap();
        let pass = t.compile(&col("d").gt(100).is_true(), &schema).await.unwrap();
        assert_eq!(t.count(None, &pass).await.unwrap(), UnitCounts::new(3, 2));

        let handle = ExtractHandle::new(None, pass);
        assert_eq!(t.extract(&handle, Partition::Fail).await.unwrap().num_rows(), 1);
        assert_eq!(t.sunder(&[&handle], Partition::Pass).await.unwrap().num_rows(), 2);
    }

    #[test]
    fn test_nulls_as_false() {
        let with_nulls = BooleanArray::from(vec![Some(true), None, Some(false)]);
        let folded = nulls_as_false(&with_nulls);
        assert!(folded.nulls().is_none());
        assert_eq!(folded.iter().collect::<Vec<_>>(), vec![Some(true), Some(false), Some(false)]);

        let plain = BooleanArray::from(vec![true, false]);
        assert_eq!(nulls_as_false(&plain), plain);
    }

    #[tokio::test]
    async fn test_uint64_beyond_f64_precision() {
        let big = (1u64 << 53) + 1;
        let t = single_column(
            Field::new("u", DataType::UInt64, false),
            Arc::new(UInt64Array::from(vec![big, 1])),
        );
        assert_eq!(
            mask(&t, col("u").gt(1i64 << 53)).await,
            vec![Some(true), Some(false)]
        );
    }

    #[tokio::test]
    async fn test_date64_keeps_time_of_day() {
        // 2024-03-01T10:00:00Z and 2024-02-29T10:00:00Z
        let t = single_column(
            Field::new("at", DataType::Date64, false),
            Arc::new(Date64Array::from(vec![1_709_287_200_000, 1_709_200_800_000])),
        );
        let day = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        assert_eq!(
            mask(&t, col("at").gt(day)).await,
            vec![Some(true), Some(false)]
        );
    }

    #[tokio::test]
    async fn test_timestamp_against_date() {
        // 2024-03-01T10:00:00 and 2024-02-29T23:59:59
        let t = single_column(
            Field::new("ts", DataType::Timestamp(TimeUnit::Microsecond, None), true),
            Arc::new(TimestampMicrosecondArray::from(vec![
                Some(1_709_287_200_000_000),
                Some(1_709_251_199_000_000),
                None,
            ])),
        );
        let day = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        assert_eq!(
            mask(&t, col("ts").gt_eq(day)).await,
            vec![Some(true), Some(false), None]
        );
    }

    #[tokio::test]
    async fn test_column_to_column_comparison() {
        let t = table();
        // c = [1.0, 7.5, 3.0, NULL], d = [50, 150, 250, NULL]
        assert_eq!(
            mask(&t, col("c").lt(col("d"))).await,
            vec![Some(true), Some(true), Some(true), None]
        );
    }

    #[tokio::test]
    async fn test_set_membership_and_regex() {
        let t = table();
        // s = ["apple", "banana", NULL, "cherry"]
        assert_eq!(
            mask(&t, col("s").in_set(["apple", "cherry"])).await,
            vec![Some(true), Some(false), None, Some(true)]
        );
        assert_eq!(
            mask(&t, col("s").not_in_set(["apple"])).await,
            vec![Some(false), Some(true), None, Some(true)]
        );
        assert_eq!(
            mask(&t, col("s").matches("an")).await,
            vec![Some(false), Some(true), None, Some(false)]
        );
    }

    #[tokio::test]
    async fn test_date_comparison() {
        let t = table();
        let cutoff = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        assert_eq!(
            mask(&t, col("day").gt_eq(cutoff).is_true()).await,
            vec![Some(false), Some(true), Some(true), Some(false)]
        );
    }

    #[tokio::test]
    async fn test_type_mismatch_and_missing_column() {
        let t = table();
        let schema = t.schema().await.unwrap();
        let err = t
            .compile(&col("day").gt("2024-01-01"), &schema)
            .await
            .unwrap_err();
        assert!(matches!(err, StepcheckError::TypeMismatch { .. }));

        let err = t.compile(&col("nope").is_null(), &schema).await.unwrap_err();
        assert!(matches!(err, StepcheckError::ColumnNotFound { .. }));
    }

    #[tokio::test]
    async fn test_count_with_precondition() {
        let t = table();
        let schema = t.schema().await.unwrap();
        let pre = t.compile(&col("d").gt(100).is_true(), &schema).await.unwrap();
        let pass = t.compile(&col("c").lt_eq(5).is_true(), &schema).await.unwrap();

        let counts = t.count(Some(&pre), &pass).await.unwrap();
        assert_eq!(counts, UnitCounts::new(2, 1));
        assert_eq!(t.count_rows(Some(&pre)).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_extract_and_sunder() {
        let t = table();
        let schema = t.schema().await.unwrap();
        let pre = t.compile(&col("d").gt(100).is_true(), &schema).await.unwrap();
        let pass = t.compile(&col("c").lt_eq(5).is_true(), &schema).await.unwrap();
        let handle = ExtractHandle::new(Some(pre), pass);

        let failed = t.extract(&handle, Partition::Fail).await.unwrap();
        assert_eq!(failed.num_rows(), 1);

        // rows outside the precondition count as passing
        let pass_rows = t.sunder(&[&handle], Partition::Pass).await.unwrap();
        let fail_rows = t.sunder(&[&handle], Partition::Fail).await.unwrap();
        assert_eq!(pass_rows.num_rows(), 3);
        assert_eq!(fail_rows.num_rows(), 1);
    }
}
