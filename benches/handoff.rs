use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use cothread::{Baton, CondvarBaton, Config, EventBaton, ThreadCoroutine, ThreadYielder};
use criterion::{criterion_group, criterion_main, Criterion};

fn handoff_round_trip<B: Baton>(name: &str, c: &mut Criterion) {
    let stop = Arc::new(AtomicBool::new(false));
    let stop2 = stop.clone();
    let mut co = ThreadCoroutine::<B>::with_baton(Config::new(move |y: &ThreadYielder<B>| {
        while !stop2.load(Ordering::Relaxed) {
            y.yield_now();
        }
    }))
    .expect("failed to create thread coroutine");

    c.bench_function(name, |b| b.iter(|| co.yield_now()));

    stop.store(true, Ordering::Relaxed);
    co.yield_now();
    co.teardown();
}

fn condvar_round_trip(c: &mut Criterion) {
    handoff_round_trip::<CondvarBaton>("handoff_condvar", c);
}

fn event_round_trip(c: &mut Criterion) {
    handoff_round_trip::<EventBaton>("handoff_event", c);
}

criterion_group!(benches, condvar_round_trip, event_round_trip);
criterion_main!(benches);
