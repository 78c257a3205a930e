use brrtgate::recorder::ResponseTimeRecorder;
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use std::hint::black_box;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Benchmark single-threaded latency recording (baseline)
fn bench_single_thread_recording(c: &mut Criterion) {
    let mut group = c.benchmark_group("single_thread_recording");

    for num_actions in [1, 10, 100].iter() {
        group.bench_with_input(
            BenchmarkId::new("record", num_actions),
            num_actions,
            |b, &num_actions| {
                let recorder = ResponseTimeRecorder::new();
                let actions: Vec<String> = (0..num_actions).map(|i| format!("Action{i}")).collect();

                b.iter(|| {
                    for action in &actions {
                        recorder.record(black_box(action), black_box(Duration::from_micros(1000)));
                    }
                });
            },
        );
    }

    group.finish();
}

/// Benchmark concurrent recording against one action (high contention)
fn bench_concurrent_same_action(c: &mut Criterion) {
    let mut group = c.benchmark_group("concurrent_same_action");
    group.sample_size(10);

    for num_threads in [2, 4, 8, 16].iter() {
        group.bench_with_input(
            BenchmarkId::new("high_contention", num_threads),
            num_threads,
            |b, &num_threads| {
                b.iter(|| {
                    let recorder = Arc::new(ResponseTimeRecorder::new());
                    let hot: Arc<str> = Arc::from("SendText");
                    let handles: Vec<_> = (0..num_threads)
                        .map(|_| {
                            let recorder = Arc::clone(&recorder);
                            let hot = Arc::clone(&hot);
                            thread::spawn(move || {
                                for _ in 0..1000 {
                                    let mark = recorder.mark(black_box(&hot));
                                    black_box(recorder.complete(mark));
                                }
                            })
                        })
                        .collect();
                    for handle in handles {
                        handle.join().unwrap();
                    }
                });
            },
        );
    }

    group.finish();
}

/// Benchmark concurrent recording spread over several actions with readers alongside
fn bench_concurrent_mixed_actions(c: &mut Criterion) {
    let mut group = c.benchmark_group("concurrent_mixed_actions");
    group.sample_size(10);

    for num_threads in [2, 4, 8, 16].iter() {
        group.bench_with_input(
            BenchmarkId::new("medium_contention", num_threads),
            num_threads,
            |b, &num_threads| {
                b.iter(|| {
                    let recorder = Arc::new(ResponseTimeRecorder::new());
                    let handles: Vec<_> = (0..num_threads)
                        .map(|thread_id| {
                            let recorder = Arc::clone(&recorder);
                            thread::spawn(move || {
                                for i in 0..1000 {
                                    let action = format!("Action{}", (thread_id + i) % 10);
                                    recorder.record(
                                        black_box(&action),
                                        black_box(Duration::from_micros(1000 + (i % 100) as u64)),
                                    );
                                    if i % 50 == 0 {
                                        black_box(recorder.snapshot());
                                    }
                                }
                            })
                        })
                        .collect();
                    for handle in handles {
                        handle.join().unwrap();
                    }
                });
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_single_thread_recording,
    bench_concurrent_same_action,
    bench_concurrent_mixed_actions
);
criterion_main!(benches);
