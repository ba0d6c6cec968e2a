//! Tests for the stats module

use super::*;
use crate::types::{CommitStatsResult, EmissionStats, PartitionKey, StateKey, StreamDescriptor};
use pretty_assertions::assert_eq;
use std::sync::Arc;

fn stream() -> StreamDescriptor {
    StreamDescriptor::new(Some("public"), "users")
}

fn keys(names: &[&str]) -> Vec<PartitionKey> {
    names.iter().map(|name| PartitionKey::from(*name)).collect()
}

fn histogram(values: &[(&str, f64)]) -> PartitionHistogram {
    values
        .iter()
        .map(|(key, value)| (PartitionKey::from(*key), *value))
        .collect()
}

// ============================================================================
// CommittedStatsStore Tests
// ============================================================================

#[test]
fn test_commit_all_partitions_then_drained_partition_is_zero() {
    let store = CommittedStatsStore::new();
    store.accept_stats(
        &stream(),
        &histogram(&[("p1", 10.0), ("p2", 20.0)]),
        &histogram(&[("p1", 100.0), ("p2", 200.0)]),
    );

    let first = store.commit_stats(&stream(), &StateKey::new(1, keys(&["p1", "p2"])));
    assert_eq!(first.committed_stats, EmissionStats::new(30, 300));
    assert_eq!(first.cumulative_stats, EmissionStats::new(30, 300));

    let second = store.commit_stats(&stream(), &StateKey::new(2, keys(&["p1"])));
    assert_eq!(second.committed_stats, EmissionStats::zero());
    assert_eq!(second.cumulative_stats, EmissionStats::new(30, 300));
}

#[test]
fn test_accepts_merge_before_commit() {
    let store = CommittedStatsStore::new();
    store.accept_stats(
        &stream(),
        &histogram(&[("p1", 10.0)]),
        &histogram(&[("p1", 100.0)]),
    );
    store.accept_stats(
        &stream(),
        &histogram(&[("p1", 5.0)]),
        &histogram(&[("p1", 50.0)]),
    );

    let result = store.commit_stats(&stream(), &StateKey::new(1, keys(&["p1"])));
    assert_eq!(result.committed_stats, EmissionStats::new(15, 150));
}

#[test]
fn test_partial_commit_leaves_remainder_live() {
    let store = CommittedStatsStore::new();
    store.accept_stats(
        &stream(),
        &histogram(&[("a", 3.0), ("b", 4.0)]),
        &histogram(&[("a", 30.0), ("b", 40.0)]),
    );

    let first = store.commit_stats(&stream(), &StateKey::new(1, keys(&["a"])));
    assert_eq!(first.committed_stats, EmissionStats::new(3, 30));
    assert_eq!(
        store.live_partition_stats(&stream(), &PartitionKey::from("b")),
        EmissionStats::new(4, 40)
    );

    let second = store.commit_stats(&stream(), &StateKey::new(2, keys(&["b"])));
    assert_eq!(second.committed_stats, EmissionStats::new(4, 40));
    assert_eq!(second.cumulative_stats, EmissionStats::new(7, 70));
    assert_eq!(store.live_stats(&stream()), EmissionStats::zero());
}

#[test]
fn test_unknown_partition_and_stream_commit_to_zero() {
    let store = CommittedStatsStore::new();
    store.accept_stats(
        &stream(),
        &histogram(&[("p1", 1.0)]),
        &histogram(&[("p1", 1.0)]),
    );

    let result = store.commit_stats(&stream(), &StateKey::new(1, keys(&["never-seen"])));
    assert_eq!(result.committed_stats, EmissionStats::zero());

    let other = StreamDescriptor::named("orders");
    let result = store.commit_stats(&other, &StateKey::new(2, keys(&["p1"])));
    assert_eq!(result, CommitStatsResult::default());
}

#[test]
fn test_empty_state_key_is_all_zero_and_touches_nothing() {
    let store = CommittedStatsStore::new();
    store.accept_stats(
        &stream(),
        &histogram(&[("p1", 2.0)]),
        &histogram(&[("p1", 20.0)]),
    );
    store.commit_stats(&stream(), &StateKey::new(1, keys(&["p1"])));
    store.accept_stats(
        &stream(),
        &histogram(&[("p1", 1.0)]),
        &histogram(&[("p1", 10.0)]),
    );

    let result = store.commit_stats(&stream(), &StateKey::new(2, vec![]));
    assert_eq!(result, CommitStatsResult::default());
    assert_eq!(store.live_stats(&stream()), EmissionStats::new(1, 10));
    assert_eq!(store.cumulative_stats(&stream()), EmissionStats::new(2, 20));
}

#[test]
fn test_remove_live_stats_is_idempotent() {
    let store = CommittedStatsStore::new();
    let p1 = PartitionKey::from("p1");
    store.accept_record(&stream(), &p1, 128);
    store.accept_record(&stream(), &p1, 64);

    assert_eq!(
        store.remove_live_stats(&stream(), &p1),
        EmissionStats::new(2, 192)
    );
    assert_eq!(store.remove_live_stats(&stream(), &p1), EmissionStats::zero());
    // raw removal does no cumulative bookkeeping
    assert_eq!(store.cumulative_stats(&stream()), EmissionStats::zero());
}

#[test]
fn test_retract_record_undoes_one_accept() {
    let store = CommittedStatsStore::new();
    let s = stream();
    let p1 = PartitionKey::new("p1");
    store.accept_record(&s, &p1, 40);
    store.accept_record(&s, &p1, 10);
    store.retract_record(&s, &p1, 10);

    assert_eq!(store.live_partition_stats(&s, &p1), EmissionStats::new(1, 40));
    // retracting on a stream never seen is a no-op
    store.retract_record(&StreamDescriptor::named("other"), &p1, 5);
    assert!(store.streams().iter().all(|known| known == &s));
}

#[test]
fn test_remove_live_stats_for_state_key() {
    let store = CommittedStatsStore::new();
    store.accept_stats(
        &stream(),
        &histogram(&[("p1", 1.0), ("p2", 2.0), ("p3", 3.0)]),
        &histogram(&[("p1", 10.0), ("p2", 20.0), ("p3", 30.0)]),
    );

    let removed = store.remove_live_stats_for(&stream(), &StateKey::new(7, keys(&["p1", "p3"])));
    assert_eq!(removed, EmissionStats::new(4, 40));
    assert_eq!(store.live_stats(&stream()), EmissionStats::new(2, 20));
}

#[test]
fn test_cumulative_equals_sum_of_commits() {
    let store = CommittedStatsStore::new();
    let mut committed_total = EmissionStats::zero();

    for round in 1..=5_u64 {
        let partition = format!("p{round}");
        store.accept_stats(
            &stream(),
            &histogram(&[(partition.as_str(), round as f64)]),
            &histogram(&[(partition.as_str(), (round * 100) as f64)]),
        );
        let result = store.commit_stats(&stream(), &StateKey::new(round, keys(&[partition.as_str()])));
        committed_total += result.committed_stats;
        assert_eq!(result.cumulative_stats, committed_total);
    }

    assert_eq!(committed_total, EmissionStats::new(15, 1500));
    assert_eq!(store.cumulative_stats(&stream()), committed_total);
}

#[test]
fn test_streams_are_independent() {
    let store = CommittedStatsStore::new();
    let users = stream();
    let orders = StreamDescriptor::named("orders");
    store.accept_stats(&users, &histogram(&[("p1", 1.0)]), &histogram(&[("p1", 1.0)]));
    store.accept_stats(&orders, &histogram(&[("p1", 9.0)]), &histogram(&[("p1", 9.0)]));

    let result = store.commit_stats(&users, &StateKey::new(1, keys(&["p1"])));
    assert_eq!(result.committed_stats, EmissionStats::new(1, 1));
    assert_eq!(store.live_stats(&orders), EmissionStats::new(9, 9));

    let mut streams = store.streams();
    streams.sort();
    // unnamespaced streams sort first
    assert_eq!(streams, vec![orders, users]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_producers_on_distinct_partitions() {
    let store = Arc::new(CommittedStatsStore::new());

    let handles: Vec<_> = (1..=10_i32)
        .map(|i| {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                let key = format!("p{i}");
                store.accept_stats(
                    &stream(),
                    &histogram(&[(key.as_str(), f64::from(i))]),
                    &histogram(&[(key.as_str(), f64::from(i * 10))]),
                );
            })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap();
    }

    let all: Vec<String> = (1..=10).map(|i| format!("p{i}")).collect();
    let all: Vec<&str> = all.iter().map(String::as_str).collect();
    let result = store.commit_stats(&stream(), &StateKey::new(1, keys(&all)));
    assert_eq!(result.committed_stats, EmissionStats::new(55, 550));
}

#[test]
fn test_commit_racing_increments_never_loses_records() {
    let store = Arc::new(CommittedStatsStore::new());
    let p1 = PartitionKey::from("p1");

    let producer = {
        let store = Arc::clone(&store);
        let p1 = p1.clone();
        std::thread::spawn(move || {
            for _ in 0..10_000 {
                store.accept_record(&stream(), &p1, 10);
            }
        })
    };

    let mut committed = EmissionStats::zero();
    for id in 0..100 {
        committed += store
            .commit_stats(&stream(), &StateKey::new(id, vec![p1.clone()]))
            .committed_stats;
    }
    producer.join().unwrap();
    committed += store
        .commit_stats(&stream(), &StateKey::new(100, vec![p1]))
        .committed_stats;

    assert_eq!(committed, EmissionStats::new(10_000, 100_000));
    assert_eq!(store.cumulative_stats(&stream()), committed);
}

// ============================================================================
// StateAdditionalStatsStore Tests
// ============================================================================

#[test]
fn test_drain_reports_every_metric() {
    let store: StateAdditionalStatsStore = StateAdditionalStatsStore::new();
    let p1 = PartitionKey::from("p1");
    store.add(&p1, &stream(), ObservabilityMetric::NulledValueCount, 3.0);

    let drained = store.drain(&[p1]);
    let row = &drained[&stream()];
    assert_eq!(row.len(), ObservabilityMetric::all().len());
    assert_eq!(row["nulledValueCount"], 3.0);
    assert_eq!(row["truncatedValueCount"], 0.0);
    assert_eq!(row["truncatedByteCount"], 0.0);
}

#[test]
fn test_drain_sums_only_named_partitions_and_resets() {
    let store: StateAdditionalStatsStore = StateAdditionalStatsStore::new();
    let (p1, p2) = (PartitionKey::from("p1"), PartitionKey::from("p2"));
    store.add(&p1, &stream(), ObservabilityMetric::TruncatedValueCount, 2.0);
    store.add(&p1, &stream(), ObservabilityMetric::TruncatedValueCount, 1.0);
    store.add(&p2, &stream(), ObservabilityMetric::TruncatedValueCount, 5.0);

    let row = store.drain_stream(&stream(), &[p1.clone()]);
    assert_eq!(row["truncatedValueCount"], 3.0);

    let row = store.drain_stream(&stream(), &[p1]);
    assert_eq!(row["truncatedValueCount"], 0.0);

    let row = store.drain_stream(&stream(), &[p2]);
    assert_eq!(row["truncatedValueCount"], 5.0);
}

#[test]
fn test_drain_unknown_stream_is_complete_default_row() {
    let store: StateAdditionalStatsStore = StateAdditionalStatsStore::new();
    let row = store.drain_stream(&StreamDescriptor::named("ghost"), &keys(&["p1"]));
    assert_eq!(row.len(), 3);
    assert!(row.values().all(|value| *value == 0.0));
    assert!(store.drain(&keys(&["p1"])).is_empty());
}

#[test]
fn test_drain_covers_every_known_stream() {
    let store: StateAdditionalStatsStore = StateAdditionalStatsStore::new();
    let p1 = PartitionKey::from("p1");
    let orders = StreamDescriptor::named("orders");
    store.add(&p1, &stream(), ObservabilityMetric::NulledValueCount, 1.0);
    store.add(&p1, &orders, ObservabilityMetric::TruncatedByteCount, 64.0);

    let drained = store.drain(&[p1]);
    assert_eq!(drained.len(), 2);
    assert_eq!(drained[&stream()]["truncatedByteCount"], 0.0);
    assert_eq!(drained[&orders]["truncatedByteCount"], 64.0);
}
