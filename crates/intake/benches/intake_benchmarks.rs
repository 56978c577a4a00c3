use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use chrono::Utc;
use serde_json::json;
use stockledger_intake::{ColumnAliases, IntakeOptions, RawRow, normalize, normalize_counts};
use stockledger_inventory::plan_adjustment;

fn sheet(rows: usize) -> Vec<RawRow> {
    let aliases = ColumnAliases::default();
    (0..rows)
        .map(|i| {
            let record = json!({
                "cod": (i % 500) as i64 + 1,
                "quantidade": format!("{}.0", i % 7),
                "data": "2024-05-01",
            });
            match record {
                serde_json::Value::Object(map) => RawRow::from_columns(&map, &aliases),
                _ => RawRow::default(),
            }
        })
        .collect()
}

fn bench_normalize(c: &mut Criterion) {
    let options = IntakeOptions::new(Utc::now());
    let mut group = c.benchmark_group("intake_normalize");

    for size in [100usize, 1_000, 10_000] {
        let rows = sheet(size);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::new("movements", size), &rows, |b, rows| {
            b.iter(|| normalize(black_box(rows), &options))
        });
        group.bench_with_input(BenchmarkId::new("counts", size), &rows, |b, rows| {
            b.iter(|| normalize_counts(black_box(rows), &options))
        });
    }

    group.finish();
}

fn bench_plan_adjustment(c: &mut Criterion) {
    c.bench_function("plan_adjustment", |b| {
        b.iter(|| {
            for recorded in -50i64..50 {
                let _ = black_box(plan_adjustment(recorded, black_box(10)));
            }
        })
    });
}

criterion_group!(benches, bench_normalize, bench_plan_adjustment);
criterion_main!(benches);
