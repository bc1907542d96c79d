use std::hint::black_box;

use criterion::{criterion_group, criterion_main, Criterion};

use facetbase::construct::Registry;
use facetbase::datatype::{ColumnType, Value, ValueType};
use facetbase::select::{Engine, SelectOptions};

const BOOKS: usize = 100;
const USERS: usize = 10_000;

fn populated_registry() -> Registry {
    let mut registry = Registry::new();
    registry.create_table("Books", Some(ValueType::Text)).unwrap();
    registry.create_column("Books", "pages", ColumnType::Int).unwrap();
    registry.create_table("Users", Some(ValueType::Text)).unwrap();
    registry
        .create_column("Users", "book", ColumnType::Reference { table: "Books".into() })
        .unwrap();
    registry.create_column("Users", "bio", ColumnType::Text).unwrap();

    for b in 0..BOOKS {
        let id = registry.add("Books", Value::text(format!("book-{b}"))).unwrap();
        registry.set("Books", id, "pages", Value::int((b as i64 + 1) * 10)).unwrap();
    }
    for u in 0..USERS {
        let id = registry.add("Users", Value::text(format!("user-{u}"))).unwrap();
        // every tenth user keeps its reference unset
        if u % 10 != 0 {
            registry
                .set("Users", id, "book", Value::text(format!("book-{}", u % BOOKS)))
                .unwrap();
        }
        registry
            .set("Users", id, "bio", Value::text(format!("reader {u} of many books")))
            .unwrap();
    }
    registry.build_token_index("Users", "bio").unwrap();
    registry
}

fn criterion_benchmark(c: &mut Criterion) {
    let registry = populated_registry();
    let engine = Engine::new(&registry);

    c.bench_function("select_filter_scan", |bencher| {
        let options = SelectOptions {
            filter: Some("book == \"book-42\"".to_string()),
            output_columns: Some(vec!["_key".into()]),
            ..SelectOptions::default()
        };
        bencher.iter(|| {
            let result = engine.select("Users", black_box(&options)).unwrap();
            black_box(result.hit_count)
        });
    });

    c.bench_function("select_drill_down", |bencher| {
        let options = SelectOptions {
            output_columns: Some(vec!["_key".into()]),
            limit: Some(0),
            drill_down: vec!["book".into()],
            ..SelectOptions::default()
        };
        bencher.iter(|| {
            let result = engine.select("Users", black_box(&options)).unwrap();
            black_box(result.drill_down["book"].group_count)
        });
    });

    c.bench_function("select_token_match", |bencher| {
        let options = SelectOptions {
            query: Some("reader".to_string()),
            output_columns: Some(vec!["_id".into()]),
            limit: Some(10),
            ..SelectOptions::default()
        };
        bencher.iter(|| {
            let result = engine.select("Users", black_box(&options)).unwrap();
            black_box(result.hit_count)
        });
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
