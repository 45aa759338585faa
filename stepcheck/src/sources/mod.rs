//! Backend adapters for stepcheck.
//!
//! A [`TableAdapter`] gives the interrogation engine uniform access to one
//! table, whatever its execution model. Two families are provided:
//!
//! - [`InMemoryTable`]: an eager adapter over a materialized Arrow
//!   `RecordBatch`. Predicates compile to boolean masks immediately.
//! - [`DeferredTable`]: a deferred adapter over a DataFusion `DataFrame`.
//!   Predicates compile to logical expressions, and nothing executes until
//!   a count or extraction is requested. Counts come back as two scalars.
//!
//! The engine never inspects which family it is talking to; all of the
//! branching lives behind this trait.
//!
//! # Examples
//!
//! ```rust
//! use stepcheck::sources::{DeferredContextConfig, DeferredTable, InMemoryTable, TableAdapter};
//! use arrow::array::Int64Array;
//! use arrow::datatypes::{DataType, Field, Schema};
//! use arrow::record_batch::RecordBatch;
//! use std::sync::Arc;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! # tokio::runtime::Runtime::new()?.block_on(async {
//! let schema = Arc::new(Schema::new(vec![Field::new("d", DataType::Int64, false)]));
//! let batch = RecordBatch::try_new(schema, vec![Arc::new(Int64Array::from(vec![1, 2, 3]))])?;
//!
//! let eager = InMemoryTable::new("orders", batch.clone())?;
//! let deferred =
//!     DeferredTable::from_batch("orders", batch, &DeferredContextConfig::default()).await?;
//! assert_eq!(eager.row_count().await?, deferred.row_count().await?);
//! # Ok::<(), stepcheck::error::StepcheckError>(())
//! # })?;
//! # Ok(())
//! # }
//! ```

use crate::core::expr::Predicate;
use crate::core::schema::SchemaSnapshot;
use crate::error::{Result, StepcheckError};
use arrow::array::BooleanArray;
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use datafusion::logical_expr::Expr;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Debug};
use std::str::FromStr;

mod datafusion_table;
mod memory;

pub use datafusion_table::{DeferredContextConfig, DeferredTable};
pub use memory::InMemoryTable;

/// Execution model of an adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Eager,
    Deferred,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Eager => f.write_str("eager"),
            Self::Deferred => f.write_str("deferred"),
        }
    }
}

/// Which side of a pass/fail split to extract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Partition {
    Pass,
    Fail,
}

impl FromStr for Partition {
    type Err = StepcheckError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "pass" => Ok(Self::Pass),
            "fail" => Ok(Self::Fail),
            other => Err(StepcheckError::configuration(format!(
                "Unknown partition '{other}', expected 'pass' or 'fail'"
            ))),
        }
    }
}

/// A predicate compiled for one backend.
#[derive(Debug, Clone)]
pub enum CompiledPredicate {
    /// Materialized per-row result, aligned with the table's rows.
    Mask(BooleanArray),
    /// Logical expression, evaluated only when a query is executed.
    Expr(Expr),
}

impl CompiledPredicate {
    pub fn as_mask(&self) -> Result<&BooleanArray> {
        match self {
            Self::Mask(mask) => Ok(mask),
            Self::Expr(_) => Err(StepcheckError::Internal(
                "expected a materialized mask, found a deferred expression".to_string(),
            )),
        }
    }

    pub fn as_expr(&self) -> Result<&Expr> {
        match self {
            Self::Expr(expr) => Ok(expr),
            Self::Mask(_) => Err(StepcheckError::Internal(
                "expected a deferred expression, found a materialized mask".to_string(),
            )),
        }
    }
}

/// Opaque handle for re-extracting the rows of one evaluated step.
///
/// Eager adapters store masks, so extraction is a filter over memory.
/// Deferred adapters store expressions, so extraction re-runs a query.
#[derive(Debug, Clone)]
pub struct ExtractHandle {
    applicable: Option<CompiledPredicate>,
    passing: CompiledPredicate,
}

impl ExtractHandle {
    pub fn new(applicable: Option<CompiledPredicate>, passing: CompiledPredicate) -> Self {
        Self {
            applicable,
            passing,
        }
    }

    /// Rows the step applied to; `None` means every row.
    pub fn applicable(&self) -> Option<&CompiledPredicate> {
        self.applicable.as_ref()
    }

    pub fn passing(&self) -> &CompiledPredicate {
        &self.passing
    }
}

/// Applicable and passing unit counts for one step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitCounts {
    pub n: u64,
    pub n_pass: u64,
}

impl UnitCounts {
    pub fn new(n: u64, n_pass: u64) -> Self {
        Self { n, n_pass }
    }

    pub fn n_fail(&self) -> u64 {
        self.n.saturating_sub(self.n_pass)
    }
}

/// Uniform access to one table for the interrogation engine.
///
/// Implementations must be read-only with respect to the underlying data.
#[async_trait]
pub trait TableAdapter: Debug + Send + Sync {
    /// The execution model of this adapter.
    fn kind(&self) -> BackendKind;

    /// Name reported in validation reports.
    fn table_name(&self) -> &str;

    /// Column names and types.
    async fn schema(&self) -> Result<SchemaSnapshot>;

    /// Total rows. Deferred adapters run a count query.
    async fn row_count(&self) -> Result<u64>;

    /// Type-checks `predicate` against `schema` and compiles it.
    ///
    /// Fails with `ColumnNotFound` or `TypeMismatch` instead of coercing.
    async fn compile(
        &self,
        predicate: &Predicate,
        schema: &SchemaSnapshot,
    ) -> Result<CompiledPredicate>;

    /// Counts rows selected by `applicable` (all rows when `None`) and how
    /// many of those satisfy `passing`.
    async fn count(
        &self,
        applicable: Option<&CompiledPredicate>,
        passing: &CompiledPredicate,
    ) -> Result<UnitCounts>;

    /// Counts rows selected by `applicable`.
    async fn count_rows(&self, applicable: Option<&CompiledPredicate>) -> Result<u64>;

    /// Rows of one step: applicable and passing, or applicable and failing.
    async fn extract(&self, handle: &ExtractHandle, partition: Partition) -> Result<RecordBatch>;

    /// Splits the whole table into rows passing every handle and rows
    /// failing at least one. Rows outside a handle's applicable set count
    /// as passing for that handle.
    async fn sunder(&self, handles: &[&ExtractHandle], partition: Partition)
        -> Result<RecordBatch>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partition_parsing() {
        assert_eq!("pass".parse::<Partition>().unwrap(), Partition::Pass);
        assert_eq!("FAIL".parse::<Partition>().unwrap(), Partition::Fail);
        assert!("both".parse::<Partition>().is_err());
    }

    #[test]
    fn test_unit_counts() {
        let counts = UnitCounts::new(3, 2);
        assert_eq!(counts.n_fail(), 1);
        assert_eq!(UnitCounts::default().n_fail(), 0);
    }

    #[test]
    fn test_compiled_predicate_accessors() {
        let mask = CompiledPredicate::Mask(BooleanArray::from(vec![true]));
        assert!(mask.as_mask().is_ok());
        assert!(mask.as_expr().is_err());
    }
}
