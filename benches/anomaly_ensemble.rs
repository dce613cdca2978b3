use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use csv_profiler::anomaly::{AnomalyEnsemble, IsolationForestScorer, KnnScorer, OutlierScorer};
use csv_profiler::dataset::{Column, Table};
use std::hint::black_box;

fn generate_readings(rows: usize) -> Table {
    let columns = (0..4)
        .map(|col| {
            let values = (0..rows)
                .map(|row| {
                    let base = ((row * (col + 3)) % 97) as f64 / 9.7;
                    if row % 211 == 0 { base * 40.0 } else { base }
                })
                .collect::<Vec<_>>();
            Column::numbers(format!("sensor_{col}"), &values)
        })
        .collect();
    Table::new(columns).expect("aligned columns")
}

fn bench_scorers(c: &mut Criterion) {
    let mut group = c.benchmark_group("scorers");
    group.sample_size(10);
    for rows in [500usize, 2_000] {
        let table = generate_readings(rows);
        let matrix = (0..rows)
            .map(|row| {
                table
                    .columns()
                    .iter()
                    .filter_map(|column| column.values[row].as_ref().and_then(|v| v.as_number()))
                    .collect::<Vec<f64>>()
            })
            .collect::<Vec<_>>();
        let knn = KnnScorer::new(5, 0.1);
        group.bench_with_input(BenchmarkId::new("knn", rows), &matrix, |b, m| {
            b.iter(|| knn.score(black_box(m)).expect("knn scores"))
        });
        let forest = IsolationForestScorer::new(100, 256, 42, 0.1);
        group.bench_with_input(BenchmarkId::new("isolation_forest", rows), &matrix, |b, m| {
            b.iter(|| forest.score(black_box(m)).expect("forest scores"))
        });
    }
    group.finish();
}

fn bench_ensemble(c: &mut Criterion) {
    let table = generate_readings(1_000);
    let ensemble = AnomalyEnsemble::default();
    c.bench_function("ensemble_detect_1000", |b| {
        b.iter(|| {
            ensemble
                .detect_anomalies(black_box(&table))
                .expect("detection")
        })
    });
}

criterion_group!(benches, bench_scorers, bench_ensemble);
criterion_main!(benches);
