use chrono::{DateTime, Duration as ChronoDuration, Utc};
use proptest::prelude::*;
use std::collections::HashMap;
use std::time::Duration;

use db_sentinel::constants::{application, database, resilience, system};
use db_sentinel::monitoring::{AlertEngine, AlertLevel, AlertRule, Comparison, HealthScorer, MetricKind, MetricStore, TrendAnalyzer};

fn at(seconds: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(1_700_000_000, 0).unwrap() + ChronoDuration::seconds(seconds)
}

/// Any f64, including the awkward ones
fn any_reading() -> impl Strategy<Value = f64> {
    prop_oneof![
        8 => -1.0e6..1.0e6f64,
        1 => Just(f64::NAN),
        1 => Just(f64::INFINITY),
        1 => Just(f64::NEG_INFINITY),
    ]
}

proptest! {
    /// Property: a series never holds more than its capacity and keeps the newest points
    #[test]
    fn series_are_bounded(capacity in 1usize..50, values in prop::collection::vec(-1000.0..1000.0f64, 0..200)) {
        let store = MetricStore::new(capacity, Duration::from_secs(3600));
        for (i, value) in values.iter().enumerate() {
            store.record_at("m", *value, MetricKind::Gauge, HashMap::new(), at(i as i64));
        }

        prop_assert_eq!(store.series_len("m"), values.len().min(capacity));
        prop_assert_eq!(store.current("m"), values.last().copied());

        let kept = store.values_since("m", at(-1));
        let expected: Vec<f64> = values.iter().rev().take(capacity).rev().copied().collect();
        prop_assert_eq!(kept, expected);
    }

    /// Property: per-metric timestamps never go backwards, whatever order samples arrive in
    #[test]
    fn timestamps_are_monotonic(offsets in prop::collection::vec(0i64..10_000, 1..100)) {
        let store = MetricStore::new(1000, Duration::from_secs(1_000_000));
        for offset in &offsets {
            store.record_at("m", 1.0, MetricKind::Gauge, HashMap::new(), at(*offset));
        }

        let points = store.get_at(None, Duration::from_secs(1_000_000), at(20_000)).remove("m").unwrap();
        prop_assert!(points.windows(2).all(|pair| pair[0].timestamp <= pair[1].timestamp));
    }

    /// Property: after pruning only points inside the retention window remain
    #[test]
    fn retention_prunes_old_points(
        retention in 1u64..500,
        offsets in prop::collection::vec(0i64..1000, 1..100),
        now in 0i64..1500,
    ) {
        let store = MetricStore::new(1000, Duration::from_secs(retention));
        let mut sorted = offsets.clone();
        sorted.sort_unstable();
        for offset in &sorted {
            store.record_at("m", *offset as f64, MetricKind::Gauge, HashMap::new(), at(*offset));
        }

        store.prune_expired_at(at(now));
        let cutoff = now - retention as i64;
        let remaining = store.values_since("m", at(-1));
        let expected: Vec<f64> = sorted.iter().filter(|o| **o >= cutoff).map(|o| *o as f64).collect();
        prop_assert_eq!(remaining, expected);
        // The current value survives pruning
        prop_assert_eq!(store.current("m"), sorted.last().map(|o| *o as f64));
    }

    /// Property: every health score stays within [0, 100]
    #[test]
    fn health_scores_are_bounded(
        active in any_reading(),
        failed in any_reading(),
        hit_rate in any_reading(),
        cpu in any_reading(),
        memory in any_reading(),
        disk in any_reading(),
        threads in any_reading(),
        process_cpu in any_reading(),
        engine in any_reading(),
    ) {
        let values: HashMap<String, f64> = [
            (database::ACTIVE_SESSIONS, active),
            (database::FAILED_SESSIONS, failed),
            (database::CACHE_HIT_RATE, hit_rate),
            (system::CPU_USAGE, cpu),
            (system::MEMORY_USAGE, memory),
            (system::DISK_USAGE, disk),
            (application::THREAD_COUNT, threads),
            (application::CPU_USAGE, process_cpu),
            (resilience::HEALTH_SCORE, engine),
        ]
        .into_iter()
        .map(|(name, value)| (name.to_string(), value))
        .collect();

        let scores = HealthScorer::score(&values);
        for score in [scores.database, scores.system, scores.application, scores.resilience, scores.overall()] {
            prop_assert!((0.0..=100.0).contains(&score), "score out of range: {}", score);
        }
    }

    /// Property: a duration rule fires exactly when every sample in its window breaches
    #[test]
    fn sustained_breach_requires_every_sample(samples in prop::collection::vec(prop::bool::ANY, 1..12)) {
        let store = MetricStore::default();
        let rule = AlertRule::new("hot", "m", 90.0, Comparison::Gt, 60, AlertLevel::Warning);
        let engine = AlertEngine::new(vec![rule]);

        // One sample every 5s, all inside the 60s window
        for (i, breach) in samples.iter().enumerate() {
            let value = if *breach { 95.0 } else { 50.0 };
            store.record_at("m", value, MetricKind::Gauge, HashMap::new(), at(i as i64 * 5));
        }
        let now = at((samples.len() as i64 - 1) * 5);

        let report = engine.run_cycle_at(&store, now);
        prop_assert_eq!(report.triggered.len() == 1, samples.iter().all(|b| *b));
    }

    /// Property: trend strength and anomaly scores are finite and normalised
    #[test]
    fn trend_scores_are_normalised(values in prop::collection::vec(-1.0e6..1.0e6f64, 10..150)) {
        let analyzer = TrendAnalyzer::new(100);
        for (i, value) in values.iter().enumerate() {
            analyzer.update("m", *value, at(i as i64));
        }

        let state = analyzer.state("m").unwrap();
        prop_assert!(state.len() <= 100);
        prop_assert!((0.0..=1.0).contains(&state.strength));
        prop_assert!(state.anomaly_score.is_finite() && state.anomaly_score >= 0.0);
        prop_assert!(state.predicted_next.map_or(true, f64::is_finite));
    }
}
