//! Shared fixtures for integration tests.

#![allow(dead_code)]

use arrow::array::{
    ArrayRef, Date32Array, Date64Array, Float64Array, Int64Array, StringArray,
    TimestampMicrosecondArray, UInt64Array,
};
use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use arrow::record_batch::RecordBatch;
use chrono::{Datelike, NaiveDate};
use std::sync::Arc;
use stepcheck::sources::{DeferredContextConfig, DeferredTable, InMemoryTable, TableAdapter};

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn days(date: NaiveDate) -> i32 {
    date.num_days_from_ce() - 719_163
}

/// Eight orders with a sprinkling of NULLs:
///
/// | id | amount | status    | region | shipped    | discount |
/// |----|--------|-----------|--------|------------|----------|
/// | 1  | 120.0  | shipped   | north  | 2024-01-03 | 0        |
/// | 2  | 35.5   | pending   | south  | NULL       | 5        |
/// | 3  | NULL   | shipped   | east   | 2024-01-09 | 10       |
/// | 4  | 980.0  | cancelled | NULL   | NULL       | 0        |
/// | 5  | 15.0   | shipped   | north  | 2024-02-11 | 25       |
/// | 6  | 250.0  | NULL      | west   | 2024-02-20 | NULL     |
/// | 7  | 75.0   | pending   | south  | NULL       | 5        |
/// | 8  | 500.0  | shipped   | east   | 2024-03-01 | 15       |
pub fn orders_batch() -> RecordBatch {
    let schema = Arc::new(Schema::new(vec![
        Field::new("id", DataType::Int64, false),
        Field::new("amount", DataType::Float64, true),
        Field::new("status", DataType::Utf8, true),
        Field::new("region", DataType::Utf8, true),
        Field::new("shipped", DataType::Date32, true),
        Field::new("discount", DataType::Int64, true),
    ]));

    let shipped = [
        Some(date(2024, 1, 3)),
        None,
        Some(date(2024, 1, 9)),
        None,
        Some(date(2024, 2, 11)),
        Some(date(2024, 2, 20)),
        None,
        Some(date(2024, 3, 1)),
    ];

    let columns: Vec<ArrayRef> = vec![
        Arc::new(Int64Array::from((1..=8).collect::<Vec<i64>>())),
        Arc::new(Float64Array::from(vec![
            Some(120.0),
            Some(35.5),
            None,
            Some(980.0),
            Some(15.0),
            Some(250.0),
            Some(75.0),
            Some(500.0),
        ])),
        Arc::new(StringArray::from(vec![
            Some("shipped"),
            Some("pending"),
            Some("shipped"),
            Some("cancelled"),
            Some("shipped"),
            None,
            Some("pending"),
            Some("shipped"),
        ])),
        Arc::new(StringArray::from(vec![
            Some("north"),
            Some("south"),
            Some("east"),
            None,
            Some("north"),
            Some("west"),
            Some("south"),
            Some("east"),
        ])),
        Arc::new(Date32Array::from(
            shipped.iter().map(|d| d.map(days)).collect::<Vec<_>>(),
        )),
        Arc::new(Int64Array::from(vec![
            Some(0),
            Some(5),
            Some(10),
            Some(0),
            Some(25),
            None,
            Some(5),
            Some(15),
        ])),
    ];

    RecordBatch::try_new(schema, columns).unwrap()
}

/// A single nullable Int64 column named `d`.
pub fn int_batch(values: Vec<Option<i64>>) -> RecordBatch {
    let schema = Arc::new(Schema::new(vec![Field::new("d", DataType::Int64, true)]));
    RecordBatch::try_new(schema, vec![Arc::new(Int64Array::from(values)) as ArrayRef]).unwrap()
}

/// A single Int64 column named `d` without a validity buffer.
pub fn dense_int_batch(values: Vec<i64>) -> RecordBatch {
    let schema = Arc::new(Schema::new(vec![Field::new("d", DataType::Int64, false)]));
    RecordBatch::try_new(schema, vec![Arc::new(Int64Array::from(values)) as ArrayRef]).unwrap()
}

/// Milliseconds since the epoch at `hour`:00 UTC on the given day.
pub fn epoch_millis(day: NaiveDate, hour: u32) -> i64 {
    day.and_hms_opt(hour, 0, 0).unwrap().and_utc().timestamp_millis()
}

/// Columns whose comparisons need care to stay exact:
///
/// | u          | at (Date64)      | ts (microseconds)   |
/// |------------|------------------|---------------------|
/// | 2^53 + 1   | 2024-03-01 10:00 | 2024-03-01 10:00:00 |
/// | 2^53       | 2024-03-01 00:00 | 2024-02-29 23:00:00 |
/// | 7          | 2024-02-29 10:00 | NULL                |
/// | u64::MAX   | NULL             | 2024-03-02 00:00:00 |
pub fn precise_batch() -> RecordBatch {
    let schema = Arc::new(Schema::new(vec![
        Field::new("u", DataType::UInt64, false),
        Field::new("at", DataType::Date64, true),
        Field::new("ts", DataType::Timestamp(TimeUnit::Microsecond, None), true),
    ]));
    let march1 = date(2024, 3, 1);
    let feb29 = date(2024, 2, 29);
    let columns: Vec<ArrayRef> = vec![
        Arc::new(UInt64Array::from(vec![(1 << 53) + 1, 1 << 53, 7, u64::MAX])),
        Arc::new(Date64Array::from(vec![
            Some(epoch_millis(march1, 10)),
            Some(epoch_millis(march1, 0)),
            Some(epoch_millis(feb29, 10)),
            None,
        ])),
        Arc::new(TimestampMicrosecondArray::from(vec![
            Some(epoch_millis(march1, 10) * 1000),
            Some(epoch_millis(feb29, 23) * 1000),
            None,
            Some(epoch_millis(date(2024, 3, 2), 0) * 1000),
        ])),
    ];
    RecordBatch::try_new(schema, columns).unwrap()
}

pub fn eager(batch: RecordBatch) -> Arc<dyn TableAdapter> {
    Arc::new(InMemoryTable::new("orders", batch).unwrap())
}

pub async fn deferred(batch: RecordBatch) -> Arc<dyn TableAdapter> {
    Arc::new(
        DeferredTable::from_batch("orders", batch, &DeferredContextConfig::default())
            .await
            .unwrap(),
    )
}

/// Both backends over the same batch, eager first.
pub async fn both(batch: RecordBatch) -> Vec<Arc<dyn TableAdapter>> {
    vec![eager(batch.clone()), deferred(batch).await]
}

/// Values of an Int64 column, sorted, for order-insensitive comparisons.
pub fn sorted_ids(batch: &RecordBatch, column: &str) -> Vec<i64> {
    let mut ids: Vec<i64> = batch
        .column_by_name(column)
        .unwrap()
        .as_any()
        .downcast_ref::<Int64Array>()
        .unwrap()
        .iter()
        .flatten()
        .collect();
    ids.sort_unstable();
    ids
}
