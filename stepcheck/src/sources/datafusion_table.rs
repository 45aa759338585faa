//! Deferred adapter over a DataFusion logical plan.

use super::{BackendKind, CompiledPredicate, ExtractHandle, Partition, TableAdapter, UnitCounts};
use crate::core::expr::{CompareOp, Literal, Operand, Predicate};
use crate::core::schema::SchemaSnapshot;
use crate::error::{Result, StepcheckError};
use crate::security::InputSecurity;
use arrow::array::{Array, Int64Array};
use arrow::compute::concat_batches;
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use chrono::Datelike;
use datafusion::common::ScalarValue;
use datafusion::execution::context::{SessionConfig, SessionContext};
use datafusion::execution::memory_pool::{FairSpillPool, MemoryPool};
use datafusion::execution::runtime_env::RuntimeEnvBuilder;
use datafusion::functions_aggregate::expr_fn::count;
use datafusion::logical_expr::{ident, lit, when, BinaryExpr, Expr, Operator};
use datafusion::prelude::DataFrame;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, instrument};

const EPOCH_DAYS_FROM_CE: i32 = 719_163;

/// Configuration for the session that backs a [`DeferredTable`] built from
/// in-memory batches.
#[derive(Debug, Clone)]
pub struct DeferredContextConfig {
    /// Batch size for query execution
    pub batch_size: usize,
    /// Target number of partitions for parallel execution
    pub target_partitions: usize,
    /// Maximum memory for query execution (in bytes)
    pub max_memory: usize,
    /// Memory fraction to use before spilling (0.0 to 1.0)
    pub memory_fraction: f64,
}

impl Default for DeferredContextConfig {
    fn default() -> Self {
        Self {
            batch_size: 8192,
            target_partitions: std::thread::available_parallelism()
                .map(|p| p.get())
                .unwrap_or(4),
            max_memory: 2 * 1024 * 1024 * 1024, // 2GB
            memory_fraction: 0.9,
        }
    }
}

impl DeferredContextConfig {
    /// Builds a session context with a bounded, spilling memory pool.
    #[instrument(skip(self))]
    pub fn build_context(&self) -> Result<SessionContext> {
        if !(0.0..=1.0).contains(&self.memory_fraction) || self.memory_fraction == 0.0 {
            return Err(StepcheckError::configuration(format!(
                "memory_fraction must be in (0, 1], got {}",
                self.memory_fraction
            )));
        }

        let session_config = SessionConfig::new()
            .with_batch_size(self.batch_size)
            .with_target_partitions(self.target_partitions.max(1));

        let pool_size = (self.max_memory as f64 * self.memory_fraction) as usize;
        let memory_pool = Arc::new(FairSpillPool::new(pool_size)) as Arc<dyn MemoryPool>;

        let runtime_env = RuntimeEnvBuilder::new()
            .with_memory_pool(memory_pool)
            .with_temp_file_path(std::env::temp_dir())
            .build()
            .map(Arc::new)?;

        Ok(SessionContext::new_with_config_rt(session_config, runtime_env))
    }
}

/// A deferred table: predicates compile to DataFusion expressions and only
/// scalar counts are collected during interrogation.
#[derive(Clone)]
pub struct DeferredTable {
    name: String,
    df: DataFrame,
}

impl fmt::Debug for DeferredTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeferredTable")
            .field("name", &self.name)
            .field("columns", &self.df.schema().fields().len())
            .finish()
    }
}

impl DeferredTable {
    /// Binds to a table already registered in `ctx`.
    pub async fn from_table(ctx: &SessionContext, name: &str) -> Result<Self> {
        InputSecurity::validate_table_name(name)?;
        let df = ctx.table(name).await.map_err(|e| {
            StepcheckError::data_source_with_source(
                "datafusion",
                format!("Could not resolve table '{name}'"),
                Box::new(e),
            )
        })?;
        Ok(Self {
            name: name.to_string(),
            df,
        })
    }

    /// Wraps an arbitrary lazy `DataFrame` (a view, a join, a filtered scan).
    pub fn from_dataframe(name: impl Into<String>, df: DataFrame) -> Result<Self> {
        let name = name.into();
        InputSecurity::validate_column_name(&name)?;
        Ok(Self { name, df })
    }

    /// Registers `batch` in a fresh session and binds to it.
    pub async fn from_batch(
        name: &str,
        batch: RecordBatch,
        config: &DeferredContextConfig,
    ) -> Result<Self> {
        InputSecurity::validate_table_name(name)?;
        let ctx = config.build_context()?;
        ctx.register_batch(name, batch)?;
        Self::from_table(&ctx, name).await
    }

    pub fn dataframe(&self) -> &DataFrame {
        &self.df
    }

    async fn collect_filtered(&self, filter: Expr) -> Result<RecordBatch> {
        let schema = Arc::new(self.df.schema().as_arrow().clone());
        let batches = self.df.clone().filter(filter)?.collect().await?;
        let schema = batches.first().map(|b| b.schema()).unwrap_or(schema);
        Ok(concat_batches(&schema, &batches)?)
    }
}

#[async_trait]
impl TableAdapter for DeferredTable {
    fn kind(&self) -> BackendKind {
        BackendKind::Deferred
    }

    fn table_name(&self) -> &str {
        &self.name
    }

    async fn schema(&self) -> Result<SchemaSnapshot> {
        Ok(SchemaSnapshot::from_arrow(self.df.schema().as_arrow()))
    }

    #[instrument(skip(self), fields(table = %self.name))]
    async fn row_count(&self) -> Result<u64> {
        Ok(self.df.clone().count().await? as u64)
    }

    async fn compile(
        &self,
        predicate: &Predicate,
        schema: &SchemaSnapshot,
    ) -> Result<CompiledPredicate> {
        predicate.check_types(schema)?;
        Ok(CompiledPredicate::Expr(to_expr(predicate)))
    }

    #[instrument(skip(self, applicable, passing), fields(table = %self.name))]
    async fn count(
        &self,
        applicable: Option<&CompiledPredicate>,
        passing: &CompiledPredicate,
    ) -> Result<UnitCounts> {
        let mut df = self.df.clone();
        if let Some(pre) = applicable {
            df = df.filter(pre.as_expr()?.clone())?;
        }

        let passed = when(passing.as_expr()?.clone(), lit(1i64)).end()?;
        let batches = df
            .aggregate(
                vec![],
                vec![count(lit(1i64)).alias("n"), count(passed).alias("n_pass")],
            )?
            .collect()
            .await?;

        let n = scalar_count(&batches, 0)?;
        let n_pass = scalar_count(&batches, 1)?;
        debug!(n, n_pass, "Collected deferred step counts");
        Ok(UnitCounts::new(n, n_pass))
    }

    async fn count_rows(&self, applicable: Option<&CompiledPredicate>) -> Result<u64> {
        let mut df = self.df.clone();
        if let Some(pre) = applicable {
            df = df.filter(pre.as_expr()?.clone())?;
        }
        Ok(df.count().await? as u64)
    }

    #[instrument(skip(self, handle), fields(table = %self.name))]
    async fn extract(&self, handle: &ExtractHandle, partition: Partition) -> Result<RecordBatch> {
        let passing = handle.passing().as_expr()?.clone();
        let selected = match partition {
            Partition::Pass => passing,
            Partition::Fail => !passing,
        };
        let filter = match handle.applicable() {
            Some(pre) => pre.as_expr()?.clone().and(selected),
            None => selected,
        };
        self.collect_filtered(filter).await
    }

    #[instrument(skip(self, handles), fields(table = %self.name, steps = handles.len()))]
    async fn sunder(
        &self,
        handles: &[&ExtractHandle],
        partition: Partition,
    ) -> Result<RecordBatch> {
        let mut all_ok = lit(true);
        for handle in handles {
            all_ok = all_ok.and(row_ok(handle)?);
        }
        let filter = match partition {
            Partition::Pass => all_ok,
            Partition::Fail => !all_ok,
        };
        self.collect_filtered(filter).await
    }
}

/// "Did not fail" for one handle. Compiled step predicates never yield NULL,
/// so the negations below are two-valued.
fn row_ok(handle: &ExtractHandle) -> Result<Expr> {
    let passing = handle.passing().as_expr()?.clone();
    Ok(match handle.applicable() {
        Some(pre) => (!pre.as_expr()?.clone()).or(passing),
        None => passing,
    })
}

fn scalar_count(batches: &[RecordBatch], column: usize) -> Result<u64> {
    let batch = batches
        .iter()
        .find(|b| b.num_rows() > 0)
        .ok_or_else(|| StepcheckError::Internal("count query returned no rows".to_string()))?;
    let values = batch
        .column(column)
        .as_any()
        .downcast_ref::<Int64Array>()
        .ok_or_else(|| StepcheckError::Internal("count column is not Int64".to_string()))?;
    if values.is_null(0) {
        return Ok(0);
    }
    Ok(values.value(0).max(0) as u64)
}

fn operand_expr(operand: &Operand) -> Expr {
    match operand {
        Operand::Column(name) => ident(name),
        Operand::Literal(value) => literal_expr(value),
    }
}

fn literal_expr(value: &Literal) -> Expr {
    match value {
        Literal::Int(v) => lit(*v),
        Literal::Float(v) => lit(*v),
        Literal::Utf8(v) => lit(v.clone()),
        Literal::Boolean(v) => lit(*v),
        Literal::Date(d) => lit(ScalarValue::Date32(Some(
            d.num_days_from_ce() - EPOCH_DAYS_FROM_CE,
        ))),
    }
}

fn to_expr(predicate: &Predicate) -> Expr {
    match predicate {
        Predicate::Compare { left, op, right } => {
            let l = operand_expr(left);
            let r = operand_expr(right);
            match op {
                CompareOp::Gt => l.gt(r),
                CompareOp::GtEq => l.gt_eq(r),
                CompareOp::Lt => l.lt(r),
                CompareOp::LtEq => l.lt_eq(r),
                CompareOp::Eq => l.eq(r),
                CompareOp::NotEq => l.not_eq(r),
            }
        }
        Predicate::IsNull(o) => operand_expr(o).is_null(),
        Predicate::IsNotNull(o) => operand_expr(o).is_not_null(),
        Predicate::InSet {
            operand,
            values,
            negated,
        } => operand_expr(operand).in_list(values.iter().map(literal_expr).collect(), *negated),
        Predicate::Regex { operand, pattern } => Expr::BinaryExpr(BinaryExpr::new(
            Box::new(operand_expr(operand)),
            Operator::RegexMatch,
            Box::new(lit(pattern.clone())),
        )),
        Predicate::And(a, b) => to_expr(a).and(to_expr(b)),
        Predicate::Or(a, b) => to_expr(a).or(to_expr(b)),
        Predicate::Not(inner) => !to_expr(inner),
        Predicate::IsTrue(inner) => to_expr(inner).is_true(),
        Predicate::Const(v) => lit(*v),
    }
}
