use chrono::{Duration as ChronoDuration, Utc};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::collections::HashMap;
use std::time::Duration;

use db_sentinel::monitoring::{default_alert_rules, AlertEngine, HealthScorer, MetricKind, MetricStore, TrendAnalyzer};

fn benchmark_metric_ingestion(c: &mut Criterion) {
    let store = MetricStore::new(1000, Duration::from_secs(3600));
    let mut value = 0.0;
    c.bench_function("metric_record", |b| {
        b.iter(|| {
            value += 1.0;
            store.record(black_box("system_cpu_usage"), value % 100.0, MetricKind::Gauge, HashMap::new())
        })
    });
}

fn benchmark_trend_update(c: &mut Criterion) {
    let analyzer = TrendAnalyzer::new(100);
    let start = Utc::now();
    let mut step = 0i64;
    c.bench_function("trend_update_window_100", |b| {
        b.iter(|| {
            step += 1;
            analyzer.update(
                black_box("database_active_sessions"),
                (step % 50) as f64,
                start + ChronoDuration::seconds(step),
            )
        })
    });
}

fn benchmark_health_and_alerts(c: &mut Criterion) {
    let store = MetricStore::default();
    for (name, value) in [
        ("system_cpu_usage", 85.0),
        ("system_memory_usage", 70.0),
        ("system_disk_usage", 92.0),
        ("database_active_sessions", 30.0),
        ("database_failed_sessions", 2.0),
    ] {
        for _ in 0..100 {
            store.record_gauge(name, value);
        }
    }
    let scorer = HealthScorer::default();
    let engine = AlertEngine::new(default_alert_rules());

    c.bench_function("health_compute", |b| {
        b.iter(|| scorer.compute(black_box(&store.current_values()), Utc::now()))
    });
    c.bench_function("alert_cycle_default_rules", |b| b.iter(|| engine.run_cycle(black_box(&store))));
}

criterion_group!(
    benches,
    benchmark_metric_ingestion,
    benchmark_trend_update,
    benchmark_health_and_alerts
);
criterion_main!(benches);
