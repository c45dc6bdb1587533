//! Executor Benchmarks
//!
//! End-to-end cost of the executor on `SQLite`: statement building, binding,
//! execution and result materialization.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use serde_json::json;
use sqlmend::{ConnectionProfile, Executor, FetchMode, Params};

fn setup(rows: i64) -> Executor {
    let mut db = Executor::new(ConnectionProfile::sqlite(":memory:")).expect("open database");
    db.exec("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT, age INTEGER)")
        .expect("create table");

    db.begin_transaction().expect("begin");
    for i in 1..=rows {
        db.insert("users", &json!({"name": format!("User {i}"), "age": i % 90}))
            .expect("insert");
    }
    db.commit().expect("commit");
    db
}

fn bench_insert(c: &mut Criterion) {
    let mut db = setup(0);
    let row = json!({"name": "Bench", "age": 30});

    c.bench_function("executor_insert_single", |b| {
        b.iter(|| db.insert("users", black_box(&row)).expect("insert"));
    });
}

fn bench_fetch_one(c: &mut Criterion) {
    let mut db = setup(1000);

    c.bench_function("executor_fetch_one_by_id", |b| {
        b.iter(|| {
            db.fetch_one("SELECT * FROM users WHERE id = :id", json!({"id": 500}), FetchMode::Assoc)
                .expect("fetch")
        });
    });
}

fn bench_fetch_many(c: &mut Criterion) {
    let mut db = setup(1000);

    for mode in [FetchMode::Assoc, FetchMode::Num, FetchMode::Both] {
        c.bench_function(&format!("executor_fetch_1000_rows_{mode}"), |b| {
            b.iter(|| {
                let cursor = db.fetch_many("SELECT * FROM users", Params::None, mode).expect("fetch");
                black_box(cursor.fetch_all())
            });
        });
    }
}

criterion_group!(benches, bench_insert, bench_fetch_one, bench_fetch_many);
criterion_main!(benches);
