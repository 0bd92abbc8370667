//! Orchestrator behaviour against scripted hosts

mod common;

use common::{count_level, drain, inxi_report, Failure, HostScript, ScriptedConnector};
use fleet_inventory::{
    CollectionStatus, EventLevel, InventoryError, InventoryOrchestrator, OrchestratorOptions,
    ProgressSink, Target,
};
use std::collections::HashSet;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

fn options(max_workers: usize) -> OrchestratorOptions {
    OrchestratorOptions {
        max_workers,
        max_retries: 2,
        retry_backoff: Duration::ZERO,
        breaker_threshold: 10,
    }
}

#[tokio::test]
async fn test_end_to_end_three_targets() {
    let connector = ScriptedConnector::new()
        .host(
            "10.0.0.1",
            HostScript::inxi(&inxi_report("Intel Core i5-8400", 6, 7.7, 223.57)),
        )
        .host(
            "10.0.0.2",
            HostScript::inxi(&inxi_report("Intel Celeron J1800", 2, 3.8, 111.79)),
        )
        .host("10.0.0.3", HostScript::failing(Failure::Auth));
    let orchestrator = InventoryOrchestrator::new(connector, options(3));
    let targets = vec![
        Target::new("10.0.0.1").with_terminal(1, 1),
        Target::new("10.0.0.2").with_terminal(1, 2),
        Target::new("10.0.0.3").with_terminal(1, 3),
    ];

    let (sink, mut rx) = ProgressSink::channel(64);
    let set = orchestrator.run(targets, &sink).await.unwrap();
    let events = drain(&mut rx);

    assert_eq!(set.results.len(), 3);
    assert_eq!(set.online(), 2);
    assert_eq!(set.offline(), 1);
    assert!(!set.tripped);

    let by_ip = |ip: &str| set.results.iter().find(|r| r.target.ip == ip).unwrap();
    assert_eq!(by_ip("10.0.0.1").status, CollectionStatus::Success);
    assert_eq!(by_ip("10.0.0.1").snapshot.ram, "8GB DDR4");
    assert_eq!(by_ip("10.0.0.2").snapshot.ram, "4GB DDR4");
    assert_ne!(by_ip("10.0.0.1").snapshot, by_ip("10.0.0.2").snapshot);
    let denied = by_ip("10.0.0.3");
    assert_eq!(denied.status, CollectionStatus::AuthFailure);
    assert_eq!(denied.attempts, 1);
    assert!(denied.error.as_deref().unwrap().contains("password rejected"));

    let progress: Vec<f64> = events.iter().filter_map(|e| e.percent()).collect();
    assert_eq!(progress.len(), 3);
    assert!(progress.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(progress.last().copied(), Some(100.0));
    assert_eq!(count_level(&events, EventLevel::Error), 0);
    assert_eq!(count_level(&events, EventLevel::Warning), 1);
}

async fn assert_breaker_skips_last_two(options: OrchestratorOptions) {
    let connector = ScriptedConnector::new();
    let connects = Arc::clone(&connector.connects);
    let orchestrator = InventoryOrchestrator::new(connector, options);
    let targets: Vec<Target> = (1..=12)
        .map(|n| Target::new(format!("10.9.0.{n}")))
        .collect();

    let (sink, mut rx) = ProgressSink::channel(128);
    let set = orchestrator.run(targets, &sink).await.unwrap();
    let events = drain(&mut rx);

    assert!(set.tripped);
    assert_eq!(set.results.len(), 10);
    assert_eq!(set.skipped, 2);
    assert!(set
        .results
        .iter()
        .all(|r| r.status == CollectionStatus::ConnectionFailure));
    assert_eq!(count_level(&events, EventLevel::Error), 1);
    assert_eq!(connects.load(Ordering::SeqCst), 10);

    let submitted: HashSet<&str> = set.results.iter().map(|r| r.target.ip.as_str()).collect();
    assert!(!submitted.contains("10.9.0.11"));
    assert!(!submitted.contains("10.9.0.12"));

    assert!(matches!(
        set.ensure_complete(10),
        Err(InventoryError::CircuitOpen { failures: 10 })
    ));
}

#[tokio::test]
async fn test_breaker_stops_submission_after_ten_connection_failures() {
    assert_breaker_skips_last_two(OrchestratorOptions {
        max_retries: 0,
        ..options(1)
    })
    .await;
}

#[tokio::test]
async fn test_breaker_holds_submission_with_default_workers() {
    assert_breaker_skips_last_two(OrchestratorOptions {
        max_retries: 0,
        retry_backoff: Duration::ZERO,
        ..OrchestratorOptions::default()
    })
    .await;
}

#[tokio::test]
async fn test_breaker_holds_submission_with_full_pool() {
    assert_breaker_skips_last_two(OrchestratorOptions {
        max_retries: 0,
        ..options(15)
    })
    .await;
}

#[tokio::test]
async fn test_panicking_task_recorded_as_unknown_error() {
    let connector = ScriptedConnector::new()
        .host(
            "10.0.0.1",
            HostScript::inxi(&inxi_report("Intel Core i3-7100", 2, 3.8, 111.79)),
        )
        .host("10.0.0.2", HostScript::panicking());
    let orchestrator = InventoryOrchestrator::new(connector, options(2));
    let targets = vec![Target::new("10.0.0.1"), Target::new("10.0.0.2")];

    let (sink, mut rx) = ProgressSink::channel(64);
    let set = orchestrator.run(targets, &sink).await.unwrap();
    let events = drain(&mut rx);

    assert_eq!(set.results.len(), 2);
    let failed = set
        .results
        .iter()
        .find(|r| r.target.ip == "10.0.0.2")
        .unwrap();
    assert_eq!(failed.status, CollectionStatus::UnknownError);
    assert!(failed.error.as_deref().unwrap().contains("panic"));
    assert_eq!(set.online(), 1);
    assert_eq!(set.offline(), 1);

    let progress: Vec<f64> = events.iter().filter_map(|e| e.percent()).collect();
    assert_eq!(progress.last().copied(), Some(100.0));
}

#[tokio::test]
async fn test_breaker_stays_closed_after_an_early_success() {
    let mut connector = ScriptedConnector::new().host(
        "10.9.0.1",
        HostScript::inxi(&inxi_report("AMD Ryzen 5 3400G", 4, 15.6, 476.94)),
    );
    for n in 2..=12 {
        connector = connector.host(&format!("10.9.0.{n}"), HostScript::failing(Failure::Connection));
    }
    let orchestrator = InventoryOrchestrator::new(
        connector,
        OrchestratorOptions {
            max_retries: 0,
            ..options(1)
        },
    );
    let targets: Vec<Target> = (1..=12)
        .map(|n| Target::new(format!("10.9.0.{n}")))
        .collect();

    let set = orchestrator
        .run(targets, &ProgressSink::disabled())
        .await
        .unwrap();
    assert!(!set.tripped);
    assert_eq!(set.results.len(), 12);
    assert_eq!(set.online(), 1);
}

#[tokio::test]
async fn test_transient_failures_are_retried_within_bound() {
    let report = inxi_report("Intel Core i3-7100", 2, 3.9, 119.2);
    let connector = ScriptedConnector::new()
        .host(
            "10.0.1.1",
            HostScript::inxi(&report).after_failures(Failure::Connection, 2),
        )
        .host(
            "10.0.1.2",
            HostScript::inxi(&report).after_failures(Failure::Connection, 3),
        )
        .host("10.0.1.3", HostScript::failing(Failure::Protocol));
    let orchestrator = InventoryOrchestrator::new(connector, options(2));
    let targets = vec![
        Target::new("10.0.1.1"),
        Target::new("10.0.1.2"),
        Target::new("10.0.1.3"),
    ];

    let set = orchestrator
        .run(targets, &ProgressSink::disabled())
        .await
        .unwrap();
    let by_ip = |ip: &str| set.results.iter().find(|r| r.target.ip == ip).unwrap();

    let recovered = by_ip("10.0.1.1");
    assert_eq!(recovered.status, CollectionStatus::Success);
    assert_eq!(recovered.attempts, 3);
    assert_eq!(recovered.snapshot.disk_capacity, "120GB");

    let exhausted = by_ip("10.0.1.2");
    assert_eq!(exhausted.status, CollectionStatus::ConnectionFailure);
    assert_eq!(exhausted.attempts, 3);

    let broken = by_ip("10.0.1.3");
    assert_eq!(broken.status, CollectionStatus::ProtocolError);
    assert_eq!(broken.attempts, 1);
}

#[tokio::test]
async fn test_every_target_processed_once_and_sessions_closed() {
    let mut connector = ScriptedConnector::new();
    for n in 1..=40 {
        let report = inxi_report("Intel Core i5-6500", 4, 7.8, 465.76);
        connector = connector.host(&format!("10.2.0.{n}"), HostScript::inxi(&report));
    }
    let closed = Arc::clone(&connector.closed);
    let orchestrator = InventoryOrchestrator::new(connector, options(15));
    let targets: Vec<Target> = (1..=40)
        .map(|n| Target::new(format!("10.2.0.{n}")))
        .collect();

    let (sink, mut rx) = ProgressSink::channel(256);
    let set = orchestrator.run(targets, &sink).await.unwrap();
    let events = drain(&mut rx);

    let unique: HashSet<&str> = set.results.iter().map(|r| r.target.ip.as_str()).collect();
    assert_eq!(set.results.len(), 40);
    assert_eq!(unique.len(), 40);
    assert_eq!(closed.load(Ordering::SeqCst), 40);

    let progress: Vec<f64> = events.iter().filter_map(|e| e.percent()).collect();
    assert!(progress.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(progress.last().copied(), Some(100.0));
}

#[tokio::test]
async fn test_rejects_invalid_target_lists() {
    let orchestrator = InventoryOrchestrator::new(ScriptedConnector::new(), options(2));
    let sink = ProgressSink::disabled();

    let empty = orchestrator.run(Vec::new(), &sink).await;
    assert!(matches!(empty, Err(InventoryError::InvalidTargets(_))));

    let blank = orchestrator
        .run(vec![Target::new("10.0.0.1"), Target::new("")], &sink)
        .await;
    assert!(matches!(blank, Err(InventoryError::InvalidTargets(_))));
}
