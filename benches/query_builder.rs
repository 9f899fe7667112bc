//! Query rendering benchmarks
//!
//! Measures statement assembly per dialect, the positional rewrite and the
//! cache key digest. No database is involved.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rustf_db::cache::result_key;
use rustf_db::{Condition, DatabaseBackend, QueryBuilder, Value};

fn report_query(backend: DatabaseBackend) -> QueryBuilder {
    QueryBuilder::for_backend(backend)
        .select(vec!["U.id", "U.name", "O.total amount"])
        .from("users U")
        .left_join("orders O", Condition::on("O.user_id", "U.id"))
        .where_(Condition::and(vec![
            Condition::eq("U.status", "active"),
            Condition::is_in("U.role", vec![1, 2, 3]),
            Condition::or(vec![
                Condition::gt("O.total", 100),
                Condition::is_null("O.total"),
            ]),
        ]))
        .order("U.name")
        .limit(25, 50)
}

fn benchmark_build_per_dialect(c: &mut Criterion) {
    let mut group = c.benchmark_group("build_select");
    for backend in [
        DatabaseBackend::MySQL,
        DatabaseBackend::Postgres,
        DatabaseBackend::MsSql,
    ] {
        group.bench_with_input(BenchmarkId::from_parameter(backend), &backend, |b, backend| {
            b.iter(|| report_query(black_box(*backend)).build())
        });
    }
    group.finish();
}

fn benchmark_wide_insert(c: &mut Criterion) {
    let row: Vec<(String, Value)> = (0..40)
        .map(|i| (format!("col_{}", i), Value::Int(i)))
        .collect();

    c.bench_function("build_insert_40_columns", |b| {
        b.iter(|| {
            QueryBuilder::for_backend(DatabaseBackend::Postgres)
                .insert("wide", black_box(row.clone()))
                .build()
        })
    });
}

fn benchmark_text_rendering(c: &mut Criterion) {
    let query = report_query(DatabaseBackend::MySQL);
    c.bench_function("text_interpolated", |b| b.iter(|| black_box(&query).text()));
}

fn benchmark_cache_key(c: &mut Criterion) {
    let (sql, params) = report_query(DatabaseBackend::MySQL)
        .build()
        .unwrap_or_default();
    c.bench_function("result_cache_key", |b| {
        b.iter(|| result_key(black_box(&sql), black_box(&params)))
    });
}

criterion_group!(
    benches,
    benchmark_build_per_dialect,
    benchmark_wide_insert,
    benchmark_text_rendering,
    benchmark_cache_key
);
criterion_main!(benches);
