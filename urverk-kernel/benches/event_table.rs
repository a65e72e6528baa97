use criterion::{criterion_group, criterion_main, BatchSize, Criterion};

use urverk_core::time::Time;
use urverk_kernel::{EventTable, SimulatorId};

fn populated_table(simulators: usize) -> (EventTable, Vec<SimulatorId>) {
    let mut table = EventTable::new(Time::ZERO);
    let mut ids = Vec::with_capacity(simulators);
    for i in 0..simulators {
        let id = SimulatorId::from_index(i);
        table.register(id, i as u64, false);
        ids.push(id);
    }
    (table, ids)
}

fn bench_schedule_reschedule(c: &mut Criterion) {
    c.bench_function("schedule_internal x1024 with reschedule", |b| {
        b.iter_batched(
            || populated_table(1024),
            |(mut table, ids)| {
                for (i, &id) in ids.iter().enumerate() {
                    table.schedule_internal(id, Time::new(i as f64)).unwrap();
                }
                // every simulator reschedules once: old entries go stale
                for (i, &id) in ids.iter().enumerate() {
                    table
                        .schedule_internal(id, Time::new(i as f64 + 0.5))
                        .unwrap();
                }
                table
            },
            BatchSize::SmallInput,
        )
    });
}

fn bench_pop_bags(c: &mut Criterion) {
    c.bench_function("pop 256 single-simulator bags", |b| {
        b.iter_batched(
            || {
                let (mut table, ids) = populated_table(256);
                for (i, &id) in ids.iter().enumerate() {
                    table.schedule_internal(id, Time::new(i as f64)).unwrap();
                }
                table
            },
            |mut table| {
                while !table.next_time().is_infinite() {
                    let bag = table.pop_bag();
                    criterion::black_box(&bag);
                }
                table
            },
            BatchSize::SmallInput,
        )
    });
}

fn bench_wide_bag(c: &mut Criterion) {
    c.bench_function("pop one 1024-wide bag", |b| {
        b.iter_batched(
            || {
                let (mut table, ids) = populated_table(1024);
                for &id in &ids {
                    table.schedule_internal(id, Time::new(1.0)).unwrap();
                }
                table
            },
            |mut table| {
                let bag = table.pop_bag();
                criterion::black_box(bag.transitions.len());
                table
            },
            BatchSize::SmallInput,
        )
    });
}

criterion_group!(
    benches,
    bench_schedule_reschedule,
    bench_pop_bags,
    bench_wide_bag
);
criterion_main!(benches);
