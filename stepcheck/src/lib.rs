//! # stepcheck - step-based data validation for Arrow and DataFusion
//!
//! stepcheck interrogates a table with an ordered plan of validation steps.
//! Each step checks one rule over one or more
//! columns, counts the units that pass and fail, classifies the outcome
//! against warn/stop/notify thresholds, and keeps enough state to pull the
//! failing rows back out on demand.
//!
//! ## Quick Start
//!
//! ```rust
//! use stepcheck::prelude::*;
//! use arrow::array::{Float64Array, Int64Array};
//! use arrow::datatypes::{DataType, Field, Schema};
//! use arrow::record_batch::RecordBatch;
//! use std::sync::Arc;
//!
//! # fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
//! # tokio::runtime::Runtime::new()?.block_on(async {
//! let schema = Arc::new(Schema::new(vec![
//!     Field::new("d", DataType::Int64, true),
//!     Field::new("c", DataType::Float64, true),
//! ]));
//! let batch = RecordBatch::try_new(
//!     schema,
//!     vec![
//!         Arc::new(Int64Array::from(vec![50, 150, 250])),
//!         Arc::new(Float64Array::from(vec![1.0, 7.5, 3.0])),
//!     ],
//! )?;
//!
//! let plan = ValidationPlan::builder()
//!     .label("measurements")
//!     .thresholds(Some(0.1), Some(0.5), None)
//!     .col_vals_gt("d", 100)
//!     .col_vals_le("c", 5)
//!     .precondition(col("d").gt(100))
//!     .build()?;
//!
//! let report = plan.interrogate(Arc::new(InMemoryTable::new("data", batch)?)).await?;
//!
//! let first = report.get_step_result(0)?;
//! assert_eq!((first.n, first.n_pass, first.n_fail), (3, 2, 1));
//!
//! for row in report.get_report_table() {
//!     println!("{} {}: {}/{} passed", row.i, row.label, row.pass, row.units);
//! }
//! let failing = report.get_sundered_data(Partition::Fail).await?;
//! println!("{} rows failed at least one step", failing.num_rows());
//!
//! if report.any_stop() {
//!     eprintln!("{}", report.summary()?);
//! }
//! # Ok::<(), StepcheckError>(())
//! # })?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Backends
//!
//! - [`sources::InMemoryTable`] evaluates steps eagerly over an Arrow
//!   `RecordBatch` with Arrow compute kernels.
//! - [`sources::DeferredTable`] compiles steps to DataFusion expressions
//!   and pushes the counting into the query, so only two scalars per step
//!   leave the engine. Rows are fetched only when extracted.
//!
//! Both produce identical counts for the same plan and data.
//!
//! ## Modules
//!
//! - **`core`**: plans, steps, predicates, the engine and the report
//! - **`sources`**: the `TableAdapter` trait and both backends
//! - **`formatters`**: JSON and plain-text report projections
//! - **`logging`**: `tracing` configuration
//! - **`security`**: identifier, pattern and threshold validation
//! - **`error`**: the crate error type

pub mod core;
pub mod error;
pub mod formatters;
pub mod logging;
pub mod prelude;
pub mod security;
pub mod sources;

#[cfg(test)]
pub mod test_helpers;
