//! Benchmarks comparing eager and deferred interrogation.

use arrow::array::{ArrayRef, Float64Array, Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use std::hint::black_box;
use std::sync::Arc;
use std::time::Duration;
use stepcheck::core::{col, InterrogationConfig, ValidationPlan};
use stepcheck::sources::{DeferredContextConfig, DeferredTable, InMemoryTable, TableAdapter};
use tokio::runtime::Runtime;

const STATUSES: [&str; 4] = ["new", "paid", "shipped", "returned"];

fn batch(rows: usize) -> RecordBatch {
    let schema = Arc::new(Schema::new(vec![
        Field::new("id", DataType::Int64, false),
        Field::new("amount", DataType::Float64, true),
        Field::new("status", DataType::Utf8, true),
    ]));
    let ids: Vec<i64> = (0..rows as i64).collect();
    let amounts: Vec<Option<f64>> = (0..rows)
        .map(|i| (i % 17 != 0).then_some((i % 1000) as f64 * 1.5))
        .collect();
    let statuses: Vec<Option<&str>> = (0..rows)
        .map(|i| (i % 23 != 0).then_some(STATUSES[i % STATUSES.len()]))
        .collect();

    RecordBatch::try_new(
        schema,
        vec![
            Arc::new(Int64Array::from(ids)) as ArrayRef,
            Arc::new(Float64Array::from(amounts)) as ArrayRef,
            Arc::new(StringArray::from(statuses)) as ArrayRef,
        ],
    )
    .unwrap()
}

fn plan() -> ValidationPlan {
    ValidationPlan::builder()
        .thresholds(Some(0.05), Some(0.2), None)
        .col_vals_not_null(["amount", "status"])
        .col_vals_between("amount", 0, 1200)
        .col_vals_in_set("status", STATUSES)
        .col_vals_regex("status", "^(new|paid)$")
        .precondition(col("amount").lt(500))
        .col_vals_gt("id", -1)
        .row_count_match(0)
        .build()
        .unwrap()
}

fn bench_backends(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let plan = plan();

    let mut group = c.benchmark_group("interrogate");
    group.measurement_time(Duration::from_secs(8));

    for rows in [1_000usize, 100_000] {
        let data = batch(rows);
        let eager: Arc<dyn TableAdapter> =
            Arc::new(InMemoryTable::new("orders", data.clone()).unwrap());
        let deferred: Arc<dyn TableAdapter> = Arc::new(
            rt.block_on(DeferredTable::from_batch(
                "orders",
                data,
                &DeferredContextConfig::default(),
            ))
            .unwrap(),
        );

        for (name, source) in [("eager", eager), ("deferred", deferred)] {
            group.bench_with_input(BenchmarkId::new(name, rows), &source, |b, source| {
                b.iter(|| rt.block_on(plan.interrogate(black_box(source.clone()))).unwrap());
            });
        }
    }

    group.finish();
}

fn bench_concurrency(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let plan = plan();
    let source: Arc<dyn TableAdapter> = Arc::new(
        rt.block_on(DeferredTable::from_batch(
            "orders",
            batch(100_000),
            &DeferredContextConfig::default(),
        ))
        .unwrap(),
    );

    let mut group = c.benchmark_group("deferred_concurrency");
    for concurrency in [1usize, 4] {
        let config = InterrogationConfig::default().with_max_concurrency(concurrency);
        group.bench_with_input(
            BenchmarkId::from_parameter(concurrency),
            &config,
            |b, config| {
                b.iter(|| {
                    rt.block_on(plan.interrogate_with(black_box(source.clone()), config.clone()))
                        .unwrap()
                });
            },
        );
    }
    group.finish();
}

fn bench_sunder(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let plan = plan();
    let source: Arc<dyn TableAdapter> =
        Arc::new(InMemoryTable::new("orders", batch(100_000)).unwrap());
    let report = rt.block_on(plan.interrogate(source)).unwrap();

    c.bench_function("eager_sunder_fail", |b| {
        b.iter(|| {
            rt.block_on(report.get_sundered_data(black_box(stepcheck::sources::Partition::Fail)))
                .unwrap()
        });
    });
}

criterion_group!(benches, bench_backends, bench_concurrency, bench_sunder);
criterion_main!(benches);
