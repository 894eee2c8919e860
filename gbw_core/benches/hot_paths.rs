use criterion::{Criterion, black_box, criterion_group, criterion_main};
use gbw_core::{FilterCfg, KalmanFilter, WeightHistory, WeightSample};
use std::time::{Duration, Instant};

fn bench_kalman(c: &mut Criterion) {
    let mut kf = KalmanFilter::new(FilterCfg::default());
    let mut i = 0u32;
    c.bench_function("kalman_update", |b| {
        b.iter(|| {
            i = i.wrapping_add(1);
            let m = 18.0 + (i % 7) as f32 * 0.01;
            black_box(kf.update(black_box(m)))
        })
    });
}

fn bench_history(c: &mut Criterion) {
    let t0 = Instant::now();
    let mut h = WeightHistory::new();
    for i in 0..WeightHistory::CAPACITY {
        h.push(WeightSample {
            value: i as f32 * 0.1,
            at: t0 + Duration::from_millis(i as u64 * 100),
        });
    }
    let now = t0 + Duration::from_millis(WeightHistory::CAPACITY as u64 * 100);

    c.bench_function("history_push_full", |b| {
        let mut k = 0u64;
        b.iter(|| {
            k += 1;
            h.push(WeightSample {
                value: 1.0,
                at: now + Duration::from_millis(k),
            });
        })
    });

    let mut h2 = WeightHistory::new();
    for i in 0..WeightHistory::CAPACITY {
        h2.push(WeightSample {
            value: i as f32 * 0.1,
            at: t0 + Duration::from_millis(i as u64 * 100),
        });
    }
    c.bench_function("history_average_1s", |b| {
        b.iter(|| black_box(h2.average_over(black_box(now), Duration::from_secs(1))))
    });
    c.bench_function("history_min_max_2s", |b| {
        b.iter(|| {
            let w = Duration::from_secs(2);
            black_box((h2.min_over(now, w), h2.max_over(now, w)))
        })
    });
}

criterion_group!(benches, bench_kalman, bench_history);
criterion_main!(benches);
