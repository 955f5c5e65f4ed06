mod common;

use std::collections::BTreeMap;

use common::{at, seed_march_2025, TestEnv};
use issue_tracker::aggregate::{Aggregator, Dimension, MonthKey, Window, UNSET_GROUP_KEY};
use issue_tracker::models::NewIssue;
use proptest::prelude::*;

const MARCH: Window = Window::Month(MonthKey { year: 2025, month: 3 });

fn map(pairs: &[(&str, u64)]) -> BTreeMap<String, u64> {
    pairs.iter().map(|(k, v)| ((*k).to_string(), *v)).collect()
}

#[test]
fn test_march_snapshot() {
    let env = TestEnv::new();
    seed_march_2025(&env);
    let conn = env.db.get_connection().expect("conn");
    let stats = Aggregator::new(&conn).snapshot(MARCH).expect("snapshot");

    assert_eq!(stats.total, 3);
    assert_eq!(stats.completion.completed, 2);
    assert_eq!(stats.completion.uncompleted, 1);
    assert_eq!(stats.source_stats, map(&[("Email", 2), ("電話", 1)]));
    assert_eq!(stats.issue_types, map(&[("網路", 1), ("系統", 1), ("設備", 1)]));
}

#[test]
fn test_snapshot_stays_consistent_under_concurrent_inserts() {
    let env = TestEnv::new();
    seed_march_2025(&env);

    let writer_db = env.db.clone();
    let writer = std::thread::spawn(move || {
        for i in 0..40 {
            let status = if i % 2 == 0 { "Closed" } else { "Pending" };
            writer_db
                .create_issue(&NewIssue {
                    title: format!("burst {i}"),
                    status: Some(status.to_string()),
                    source: Some("Email".to_string()),
                    created_at: Some(at("2025-03-10 08:00:00")),
                    ..NewIssue::default()
                })
                .expect("insert");
        }
    });

    let conn = env.db.get_connection().expect("conn");
    let aggregator = Aggregator::new(&conn);
    loop {
        let done = writer.is_finished();
        let stats = aggregator.snapshot(MARCH).expect("snapshot");
        assert_eq!(stats.completion.total(), stats.total);
        assert_eq!(stats.source_stats.values().sum::<u64>(), stats.total);
        assert_eq!(stats.issue_types.values().sum::<u64>(), stats.total);
        if done {
            assert_eq!(stats.total, 43);
            break;
        }
    }
    writer.join().expect("writer thread");
}

#[test]
fn test_snapshot_inside_a_caller_transaction() {
    let env = TestEnv::new();
    seed_march_2025(&env);
    let mut conn = env.db.get_connection().expect("conn");
    let tx = conn.transaction().expect("transaction");

    let stats = Aggregator::new(&tx).snapshot(MARCH).expect("snapshot");
    assert_eq!(stats.total, 3);
    tx.commit().expect("commit");
}

#[test]
fn test_window_edges_are_half_open() {
    let env = TestEnv::new();
    seed_march_2025(&env);
    let conn = env.db.get_connection().expect("conn");
    let aggregator = Aggregator::new(&conn);

    let feb = Window::Month(MonthKey::new(2025, 2).expect("month"));
    let may = Window::Month(MonthKey::new(2025, 5).expect("month"));
    let april = Window::Month(MonthKey::new(2025, 4).expect("month"));

    assert_eq!(aggregator.count_by_period(feb).expect("count"), 1);
    assert_eq!(aggregator.count_by_period(april).expect("count"), 0);
    assert_eq!(aggregator.count_by_period(may).expect("count"), 1);
    assert_eq!(aggregator.count_by_period(Window::Year(2025)).expect("count"), 5);
    assert_eq!(aggregator.count_by_period(Window::Year(2024)).expect("count"), 0);
}

#[test]
fn test_null_dimension_values_group_under_null_key() {
    let env = TestEnv::new();
    seed_march_2025(&env);
    let conn = env.db.get_connection().expect("conn");
    let aggregator = Aggregator::new(&conn);

    let may = Window::Month(MonthKey::new(2025, 5).expect("month"));
    assert_eq!(
        aggregator.group_by(may, Dimension::Source).expect("group"),
        map(&[(UNSET_GROUP_KEY, 1)])
    );
    assert_eq!(
        aggregator.group_by(Window::AllTime, Dimension::Status).expect("group"),
        map(&[("Closed", 2), ("In Progress", 1), ("Pending", 1), ("已完成", 1)])
    );
}

#[test]
fn test_unknown_status_counts_as_uncompleted() {
    let env = TestEnv::new();
    env.seed("Legacy", "Resolved?", None, None, "2025-03-02 00:00:00");
    env.seed("Done", "已完成", None, None, "2025-03-02 00:00:00");
    let conn = env.db.get_connection().expect("conn");
    let split = Aggregator::new(&conn).completion_split(MARCH).expect("split");
    assert_eq!((split.completed, split.uncompleted), (1, 1));
}

#[test]
fn test_empty_window() {
    let env = TestEnv::new();
    let conn = env.db.get_connection().expect("conn");
    let stats = Aggregator::new(&conn).snapshot(MARCH).expect("snapshot");
    assert_eq!(stats.total, 0);
    assert_eq!(stats.completion.total(), 0);
    assert!(stats.source_stats.is_empty());
    assert!(stats.issue_types.is_empty());
}

#[test]
fn test_monthly_counts_oldest_first() {
    let env = TestEnv::new();
    seed_march_2025(&env);
    let conn = env.db.get_connection().expect("conn");
    let counts = Aggregator::new(&conn).monthly_counts().expect("counts");
    assert_eq!(
        counts,
        vec![
            ("2025-02".to_string(), 1),
            ("2025-03".to_string(), 3),
            ("2025-05".to_string(), 1)
        ]
    );
}

fn status_strategy() -> impl Strategy<Value = &'static str> {
    prop::sample::select(vec!["Pending", "In Progress", "Closed", "已完成", "Reopened"])
}

fn source_strategy() -> impl Strategy<Value = Option<&'static str>> {
    prop::option::of(prop::sample::select(vec!["Email", "電話", "業務"]))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    // Groups and the completion split always account for every issue in the window
    #[test]
    fn prop_groups_sum_to_total(
        rows in prop::collection::vec((status_strategy(), source_strategy(), 1u32..=28, 2u32..=4), 0..25)
    ) {
        let env = TestEnv::new();
        for (i, (status, source, day, month)) in rows.iter().enumerate() {
            env.seed(
                &format!("issue {i}"),
                status,
                *source,
                None,
                &format!("2025-{month:02}-{day:02} 12:00:00"),
            );
        }

        let conn = env.db.get_connection().expect("conn");
        let aggregator = Aggregator::new(&conn);
        let stats = aggregator.snapshot(MARCH).expect("snapshot");
        let expected = rows.iter().filter(|(_, _, _, month)| *month == 3).count() as u64;

        prop_assert_eq!(stats.total, expected);
        prop_assert_eq!(stats.completion.total(), expected);
        prop_assert_eq!(stats.source_stats.values().sum::<u64>(), expected);
        prop_assert_eq!(stats.issue_types.values().sum::<u64>(), expected);
    }
}
