use criterion::{black_box, criterion_group, criterion_main, Criterion};
use segeval_core::Seed;
use segeval_exp::{generate_order, EvaluationCursor};

fn bench_generate_order(c: &mut Criterion) {
    c.bench_function("generate_order_500", |b| {
        b.iter(|| {
            let order = generate_order(Seed::new(4242), 500);
            black_box(order.hash().expect("hash"));
        });
    });
}

fn bench_cursor_walk(c: &mut Criterion) {
    c.bench_function("cursor_walk_2000", |b| {
        b.iter(|| {
            let mut cursor = EvaluationCursor::new(2_000).expect("cursor");
            while cursor.next().moved() {}
            while cursor.previous().moved() {}
            black_box(cursor.index());
        });
    });
}

criterion_group!(benches, bench_generate_order, bench_cursor_walk);
criterion_main!(benches);
