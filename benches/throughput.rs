//! Throughput benchmarks for the store, the request parser and dispatch.

use bytes::Bytes;
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use emberkv::commands::CommandHandler;
use emberkv::protocol::{parse_command, Command};
use emberkv::storage::StorageEngine;
use std::sync::Arc;
use std::time::Duration;

fn bench_set(c: &mut Criterion) {
    let engine = Arc::new(StorageEngine::new());

    let mut group = c.benchmark_group("set");
    group.throughput(Throughput::Elements(1));

    group.bench_function("set_small", |b| {
        let mut i = 0u64;
        b.iter(|| {
            engine.set(Bytes::from(format!("key:{}", i)), Bytes::from("small_value"));
            i += 1;
        });
    });

    group.bench_function("set_1kb", |b| {
        let mut i = 0u64;
        let value = Bytes::from("x".repeat(1024));
        b.iter(|| {
            engine.set(Bytes::from(format!("key:{}", i)), value.clone());
            i += 1;
        });
    });

    group.bench_function("set_with_ttl", |b| {
        let mut i = 0u64;
        b.iter(|| {
            engine.set_with_ttl(
                Bytes::from(format!("ttl:{}", i)),
                Bytes::from("value"),
                Duration::from_secs(3600),
            );
            i += 1;
        });
    });

    group.bench_function("set_if_absent", |b| {
        let mut i = 0u64;
        b.iter(|| {
            // Half of the keys already exist after the first pass
            let key = Bytes::from(format!("nx:{}", i % 50_000));
            black_box(engine.set_if_absent(key, Bytes::from("value"), None));
            i += 1;
        });
    });

    group.finish();
}

fn bench_get(c: &mut Criterion) {
    let engine = Arc::new(StorageEngine::new());

    for i in 0..100_000 {
        engine.set(
            Bytes::from(format!("key:{}", i)),
            Bytes::from(format!("value:{}", i)),
        );
    }

    let mut group = c.benchmark_group("get");
    group.throughput(Throughput::Elements(1));

    group.bench_function("get_existing", |b| {
        let mut i = 0u64;
        b.iter(|| {
            let key = Bytes::from(format!("key:{}", i % 100_000));
            black_box(engine.get(&key));
            i += 1;
        });
    });

    group.bench_function("get_missing", |b| {
        let mut i = 0u64;
        b.iter(|| {
            let key = Bytes::from(format!("missing:{}", i));
            black_box(engine.get(&key));
            i += 1;
        });
    });

    group.finish();
}

fn bench_delete(c: &mut Criterion) {
    let engine = Arc::new(StorageEngine::new());

    let mut group = c.benchmark_group("delete");
    group.throughput(Throughput::Elements(4));

    group.bench_function("delete_many", |b| {
        let mut i = 0u64;
        b.iter(|| {
            let keys: Vec<Bytes> = (0..4).map(|j| Bytes::from(format!("d:{}:{}", i, j))).collect();
            for key in &keys[..2] {
                engine.set(key.clone(), Bytes::from("v"));
            }
            black_box(engine.delete_many(&keys));
            i += 1;
        });
    });

    group.finish();
}

fn bench_concurrent(c: &mut Criterion) {
    let engine = Arc::new(StorageEngine::new());

    for i in 0..10_000 {
        engine.set(Bytes::from(format!("key:{}", i)), Bytes::from("value"));
    }

    let mut group = c.benchmark_group("concurrent");
    group.throughput(Throughput::Elements(4 * 1_000));

    group.bench_function("mixed_4_threads", |b| {
        b.iter(|| {
            let handles: Vec<_> = (0..4)
                .map(|t| {
                    let engine = Arc::clone(&engine);
                    std::thread::spawn(move || {
                        for i in 0..1_000 {
                            let key = Bytes::from(format!("key:{}", (t * 1_000 + i) % 10_000));
                            if i % 5 == 0 {
                                engine.set(key, Bytes::from("updated"));
                            } else {
                                black_box(engine.get(&key));
                            }
                        }
                    })
                })
                .collect();

            for handle in handles {
                let _ = handle.join();
            }
        });
    });

    group.finish();
}

fn bench_parse(c: &mut Criterion) {
    let framed = b"*3\r\n$3\r\nSET\r\n$4\r\nname\r\n$11\r\nhello world\r\n";
    let inline = b"SET name \"hello world\"\r\n";

    let mut group = c.benchmark_group("parse");
    group.throughput(Throughput::Elements(1));

    group.bench_function("framed_set", |b| {
        b.iter(|| black_box(parse_command(black_box(framed))))
    });

    group.bench_function("inline_set", |b| {
        b.iter(|| black_box(parse_command(black_box(inline))))
    });

    group.finish();
}

fn bench_dispatch(c: &mut Criterion) {
    let handler = CommandHandler::new(Arc::new(StorageEngine::new()));
    let set = Command::new(vec![
        Bytes::from("SET"),
        Bytes::from("name"),
        Bytes::from("value"),
        Bytes::from("PX"),
        Bytes::from("60000"),
    ]);
    let get = Command::new(vec![Bytes::from("GET"), Bytes::from("name")]);

    let mut group = c.benchmark_group("dispatch");
    group.throughput(Throughput::Elements(2));

    group.bench_function("set_then_get", |b| {
        b.iter(|| {
            black_box(handler.execute(&set));
            black_box(handler.execute(&get).reply.serialize());
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_set,
    bench_get,
    bench_delete,
    bench_concurrent,
    bench_parse,
    bench_dispatch
);
criterion_main!(benches);
