//! Shared fixtures for unit tests.

use crate::sources::{DeferredContextConfig, DeferredTable, InMemoryTable, TableAdapter};
use arrow::array::{ArrayRef, BooleanArray, Date32Array, Float64Array, Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use chrono::{Datelike, NaiveDate};
use std::sync::Arc;

fn days(y: i32, m: u32, d: u32) -> i32 {
    NaiveDate::from_ymd_opt(y, m, d)
        .map(|date| date.num_days_from_ce() - 719_163)
        .unwrap_or_default()
}

/// Four rows:
///
/// | d    | c    | s      | day        | flag  |
/// |------|------|--------|------------|-------|
/// | 50   | 1.0  | apple  | 2024-01-15 | true  |
/// | 150  | 7.5  | banana | 2024-03-01 | false |
/// | 250  | 3.0  | NULL   | 2024-06-30 | true  |
/// | NULL | NULL | cherry | NULL       | NULL  |
pub fn sample_batch() -> RecordBatch {
    let schema = Arc::new(Schema::new(vec![
        Field::new("d", DataType::Int64, true),
        Field::new("c", DataType::Float64, true),
        Field::new("s", DataType::Utf8, true),
        Field::new("day", DataType::Date32, true),
        Field::new("flag", DataType::Boolean, true),
    ]));

    let columns: Vec<ArrayRef> = vec![
        Arc::new(Int64Array::from(vec![Some(50), Some(150), Some(250), None])),
        Arc::new(Float64Array::from(vec![Some(1.0), Some(7.5), Some(3.0), None])),
        Arc::new(StringArray::from(vec![
            Some("apple"),
            Some("banana"),
            None,
            Some("cherry"),
        ])),
        Arc::new(Date32Array::from(vec![
            Some(days(2024, 1, 15)),
            Some(days(2024, 3, 1)),
            Some(days(2024, 6, 30)),
            None,
        ])),
        Arc::new(BooleanArray::from(vec![Some(true), Some(false), Some(true), None])),
    ];

    RecordBatch::try_new(schema, columns).unwrap()
}

pub fn eager_source() -> Arc<dyn TableAdapter> {
    Arc::new(InMemoryTable::new("data", sample_batch()).unwrap())
}

pub async fn deferred_source() -> Arc<dyn TableAdapter> {
    Arc::new(
        DeferredTable::from_batch("data", sample_batch(), &DeferredContextConfig::default())
            .await
            .unwrap(),
    )
}
