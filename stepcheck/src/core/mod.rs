//! Core validation types for stepcheck.
//!
//! ## Overview
//!
//! - **[`ValidationPlan`]**: an ordered, append-only list of step definitions
//! - **[`StepDefinition`]**: one validation rule over one or more columns
//! - **[`Predicate`]**: the backend-neutral row expression used for
//!   preconditions and custom checks
//! - **[`Interrogator`]**: evaluates a plan against a bound table
//! - **[`ValidationReport`]**: step results plus extraction and accessors
//!
//! ## Architecture
//!
//! ```text
//! ValidationPlan ──interrogate──▶ Interrogator ──▶ TableAdapter (eager | deferred)
//!     ├── step 0 (d > 100)               │
//!     ├── step 1 (a, b not null)         ▼
//!     └── step 2 (row count = 10)   ValidationReport
//!                                       ├── result 0  (step 0, d)
//!                                       ├── result 1  (step 1, a)
//!                                       ├── result 2  (step 1, b)
//!                                       └── result 3  (step 2)
//! ```
//!
//! ## Example
//!
//! ```rust
//! use stepcheck::core::{col, ValidationPlan};
//! use stepcheck::sources::InMemoryTable;
//! use arrow::array::Int64Array;
//! use arrow::datatypes::{DataType, Field, Schema};
//! use arrow::record_batch::RecordBatch;
//! use std::sync::Arc;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! # tokio::runtime::Runtime::new()?.block_on(async {
//! let schema = Arc::new(Schema::new(vec![Field::new("d", DataType::Int64, true)]));
//! let batch = RecordBatch::try_new(schema, vec![Arc::new(Int64Array::from(vec![50, 150, 250]))])?;
//!
//! let plan = ValidationPlan::builder()
//!     .col_vals_gt("d", 100)
//!     .col_vals_lt("d", 1000)
//!     .precondition(col("d").gt(100))
//!     .build()?;
//!
//! let report = plan.interrogate(Arc::new(InMemoryTable::new("data", batch)?)).await?;
//! let first = report.get_step_result(0)?;
//! assert_eq!((first.n, first.n_pass, first.n_fail), (3, 2, 1));
//! assert_eq!(report.get_step_result(1)?.n, 2);
//! # Ok::<(), stepcheck::error::StepcheckError>(())
//! # })?;
//! # Ok(())
//! # }
//! ```

pub mod engine;
pub mod expr;
pub mod plan;
pub mod report;
pub mod result;
pub mod schema;
pub mod step;
pub mod thresholds;

pub use engine::{InterrogationConfig, Interrogator};
pub use expr::{col, lit, CompareOp, Literal, Operand, Predicate};
pub use plan::{ValidationPlan, ValidationPlanBuilder};
pub use report::{ReportRow, ValidationReport};
pub use result::{StepResult, StepStatus};
pub use schema::{ColumnInfo, Schema, SchemaSnapshot, TypeClass};
pub use step::{Columns, StepDefinition, StepKind, StepValues};
pub use thresholds::{ThresholdOutcome, ThresholdStatus, ThresholdValue, Thresholds};
