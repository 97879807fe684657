use criterion::{black_box, criterion_group, criterion_main, Criterion};
use plccache::connection::ReadRequest;
use plccache::{ConnectionPool, DriverRegistry};
use std::sync::Arc;
use tokio::runtime::Runtime;

fn build_pool(rt: &Runtime) -> Arc<ConnectionPool> {
    rt.block_on(async {
        let pool = Arc::new(ConnectionPool::new(
            DriverRegistry::with_builtin_drivers(),
            Default::default(),
        ));
        // Connect once up front so the benchmark measures the idle path.
        let connection = pool.get_connection("loopback://bench").await.unwrap();
        connection.close();
        pool
    })
}

fn bench_acquire_release(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let pool = build_pool(&rt);

    c.bench_function("acquire_release", |b| {
        b.to_async(&rt).iter(|| async {
            let connection = pool.get_connection("loopback://bench").await.unwrap();
            black_box(connection.lease_id());
            connection.close();
        });
    });
}

fn bench_acquire_read_release(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let pool = build_pool(&rt);
    let request = ReadRequest::new().tag("speed", "%MW10");

    c.bench_function("acquire_read_release", |b| {
        b.to_async(&rt).iter(|| async {
            let connection = pool.get_connection("loopback://bench").await.unwrap();
            let response = connection.read(request.clone()).await.unwrap();
            black_box(response);
            connection.close();
        });
    });
}

fn bench_contended_acquire(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let pool = build_pool(&rt);

    c.bench_function("contended_acquire_8", |b| {
        b.to_async(&rt).iter(|| async {
            let mut tasks = Vec::with_capacity(8);
            for _ in 0..8 {
                let pool = Arc::clone(&pool);
                tasks.push(tokio::spawn(async move {
                    let connection = pool.get_connection("loopback://bench").await.unwrap();
                    connection.close();
                }));
            }
            for task in tasks {
                task.await.unwrap();
            }
        });
    });
}

criterion_group!(
    benches,
    bench_acquire_release,
    bench_acquire_read_release,
    bench_contended_acquire
);
criterion_main!(benches);
