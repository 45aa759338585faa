//! Prelude for commonly used types and traits in stepcheck.

pub use crate::core::{
    col, lit, InterrogationConfig, Predicate, StepStatus, ThresholdStatus, Thresholds,
    ValidationPlan, ValidationReport,
};
pub use crate::error::{ErrorContext, Result, StepcheckError};
pub use crate::formatters::{FormatterConfig, ResultFormatter};
pub use crate::logging::LogConfig;
pub use crate::sources::{DeferredTable, InMemoryTable, Partition, TableAdapter};
