//! Bounded-concurrency collection across a target list
//!
//! At most `max_workers` hosts are in flight; a new target is submitted only
//! when a running one completes. A [`CircuitBreaker`] owned by the run holds
//! submission at its threshold until the first outcomes show at least one
//! host that is not a connection failure, and stops it entirely on a trip.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{Id, JoinSet};
use tracing::{error, info, warn};

use crate::detection::DetectionEngine;
use crate::error::{InventoryError, Result};
use crate::events::ProgressSink;
use crate::model::{CollectionStatus, HostResult, Target};
use crate::ssh::{Connector, RemoteShell};

/// Hard ceiling on concurrent sessions
pub const MAX_WORKERS_LIMIT: usize = 15;

/// Tuning for one orchestrator
#[derive(Debug, Clone)]
pub struct OrchestratorOptions {
    /// Concurrent hosts, clamped to `1..=MAX_WORKERS_LIMIT`
    pub max_workers: usize,
    /// Extra connection attempts after a transient failure
    pub max_retries: u32,
    /// Pause between connection attempts
    pub retry_backoff: Duration,
    /// Leading completions that must all fail to connect to trip the breaker; 0 disables it
    pub breaker_threshold: usize,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self {
            max_workers: 8,
            max_retries: 2,
            retry_backoff: Duration::from_secs(1),
            breaker_threshold: 10,
        }
    }
}

impl OrchestratorOptions {
    #[must_use]
    pub fn effective_workers(&self) -> usize {
        self.max_workers.clamp(1, MAX_WORKERS_LIMIT)
    }
}

/// Fail-fast guard over the first completed outcomes of a run
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    threshold: usize,
    attempted: usize,
    consecutive_connection_failures: usize,
    tripped: bool,
}

impl CircuitBreaker {
    pub fn new(threshold: usize) -> Self {
        Self {
            threshold,
            attempted: 0,
            consecutive_connection_failures: 0,
            tripped: false,
        }
    }

    /// Record one completed outcome. Returns `true` exactly once, on the
    /// outcome that trips the breaker.
    pub fn record(&mut self, status: CollectionStatus) -> bool {
        if self.tripped {
            return false;
        }

        self.attempted += 1;
        if status == CollectionStatus::ConnectionFailure {
            self.consecutive_connection_failures += 1;
        } else {
            self.consecutive_connection_failures = 0;
        }

        if self.threshold > 0
            && self.attempted == self.threshold
            && self.consecutive_connection_failures == self.threshold
        {
            self.tripped = true;
            return true;
        }
        false
    }

    /// Whether another target may be submitted when `submitted` have been
    /// handed out. While every outcome so far is a connection failure, no
    /// more than `threshold` targets are started.
    #[must_use]
    pub fn admits(&self, submitted: usize) -> bool {
        if self.tripped {
            return false;
        }
        let window_open = self.threshold > 0
            && self.attempted < self.threshold
            && self.consecutive_connection_failures == self.attempted;
        !window_open || submitted < self.threshold
    }

    #[must_use]
    pub fn is_tripped(&self) -> bool {
        self.tripped
    }

    #[must_use]
    pub fn attempted(&self) -> usize {
        self.attempted
    }

    #[must_use]
    pub fn consecutive_connection_failures(&self) -> usize {
        self.consecutive_connection_failures
    }
}

/// Everything gathered by one run
#[derive(Debug, Clone, Default)]
pub struct ResultSet {
    /// Completed hosts, in completion order
    pub results: Vec<HostResult>,
    /// Targets handed to the run
    pub total: usize,
    /// Targets never submitted because the breaker tripped
    pub skipped: usize,
    /// Whether the circuit breaker aborted the run
    pub tripped: bool,
}

impl ResultSet {
    #[must_use]
    pub fn online(&self) -> usize {
        self.results.iter().filter(|r| r.status.is_online()).count()
    }

    #[must_use]
    pub fn offline(&self) -> usize {
        self.results.len() - self.online()
    }

    /// Fail with the aggregate breaker error when the run was aborted
    pub fn ensure_complete(&self, threshold: usize) -> Result<()> {
        if self.tripped {
            Err(InventoryError::CircuitOpen {
                failures: threshold,
            })
        } else {
            Ok(())
        }
    }
}

/// Schedules hardware collection across many hosts
pub struct InventoryOrchestrator<C: Connector> {
    connector: Arc<C>,
    options: OrchestratorOptions,
}

impl<C: Connector> InventoryOrchestrator<C> {
    pub fn new(connector: C, options: OrchestratorOptions) -> Self {
        Self {
            connector: Arc::new(connector),
            options,
        }
    }

    #[must_use]
    pub fn options(&self) -> &OrchestratorOptions {
        &self.options
    }

    /// Collect every target once.
    ///
    /// Progress and one line per host go to `sink`. Returns the results
    /// gathered up to completion, or up to the breaker trip.
    pub async fn run(&self, targets: Vec<Target>, sink: &ProgressSink) -> Result<ResultSet> {
        validate_targets(&targets)?;

        let total = targets.len();
        let workers = self.options.effective_workers().min(total);
        let mut breaker = CircuitBreaker::new(self.options.breaker_threshold);
        let mut pending = targets.into_iter();
        let mut tasks = JoinSet::new();
        let mut in_flight: HashMap<Id, Target> = HashMap::with_capacity(workers);
        let mut results = Vec::with_capacity(total);
        let mut submitted = 0usize;
        let mut processed = 0usize;

        info!(total, workers, "Starting hardware collection");
        sink.info(format!("Collecting hardware from {total} terminals with {workers} workers"))
            .await;

        while tasks.len() < workers && breaker.admits(submitted) {
            let Some(target) = pending.next() else { break };
            self.submit(&mut tasks, &mut in_flight, target);
            submitted += 1;
        }

        while let Some(joined) = tasks.join_next_with_id().await {
            let result = match joined {
                Ok((id, result)) => {
                    in_flight.remove(&id);
                    result
                }
                Err(e) => {
                    let Some(target) = in_flight.remove(&e.id()) else {
                        error!(error = %e, "Collection task failed for an unknown target");
                        continue;
                    };
                    error!(host = %target.ip, error = %e, "Collection task failed");
                    HostResult::failed(
                        target,
                        CollectionStatus::UnknownError,
                        format!("collection task failed: {e}"),
                        1,
                    )
                }
            };

            processed += 1;
            let percent = processed as f64 / total as f64 * 100.0;
            let line = host_line(&result);
            if result.status.is_online() {
                sink.info(line).await;
            } else {
                sink.warning(line).await;
            }
            sink.progress(format!("Processed {}", result.target.ip), percent)
                .await;

            let tripped = breaker.record(result.status);
            results.push(result);

            if tripped {
                let message = format!(
                    "Circuit breaker: the first {} connections all failed; likely a credential, network or firewall issue. Aborting.",
                    self.options.breaker_threshold
                );
                error!(in_flight = tasks.len(), "{message}");
                sink.error(message).await;
                // In-flight sessions finish on their own; their results are dropped
                tasks.detach_all();
                break;
            }

            while tasks.len() < workers && breaker.admits(submitted) {
                let Some(target) = pending.next() else { break };
                self.submit(&mut tasks, &mut in_flight, target);
                submitted += 1;
            }
        }

        let skipped = total - submitted;
        info!(
            processed = results.len(),
            skipped,
            tripped = breaker.is_tripped(),
            "Hardware collection finished"
        );

        Ok(ResultSet {
            results,
            total,
            skipped,
            tripped: breaker.is_tripped(),
        })
    }

    fn submit(
        &self,
        tasks: &mut JoinSet<HostResult>,
        in_flight: &mut HashMap<Id, Target>,
        target: Target,
    ) {
        let connector = Arc::clone(&self.connector);
        let options = self.options.clone();
        let task = target.clone();
        let handle =
            tasks.spawn(async move { collect_host(connector.as_ref(), task, &options).await });
        in_flight.insert(handle.id(), target);
    }
}

fn validate_targets(targets: &[Target]) -> Result<()> {
    if targets.is_empty() {
        return Err(InventoryError::InvalidTargets(
            "the target list is empty".to_string(),
        ));
    }
    if let Some(position) = targets.iter().position(|t| t.ip.trim().is_empty()) {
        return Err(InventoryError::InvalidTargets(format!(
            "target #{} has no IP address",
            position + 1
        )));
    }
    Ok(())
}

fn host_line(result: &HostResult) -> String {
    match &result.error {
        Some(error) => format!("{} {}: {}", result.target.ip, result.status, error),
        None => format!(
            "{} {}: {} | {}",
            result.target.ip, result.status, result.snapshot.processor, result.snapshot.ram
        ),
    }
}

/// Connect with bounded retries, detect, close
async fn collect_host<C: Connector>(
    connector: &C,
    target: Target,
    options: &OrchestratorOptions,
) -> HostResult {
    let mut attempts = 0u32;

    loop {
        attempts += 1;
        match connector.connect(&target).await {
            Ok(mut shell) => {
                let (snapshot, status) = DetectionEngine::new(&shell).detect().await;
                shell.close().await;
                return HostResult {
                    target,
                    snapshot,
                    status,
                    error: None,
                    attempts,
                };
            }
            Err(err) if err.is_retryable() && attempts <= options.max_retries => {
                warn!(
                    host = %target.ip,
                    attempt = attempts,
                    max_attempts = options.max_retries + 1,
                    error = %err,
                    "Connection attempt failed, retrying"
                );
                tokio::time::sleep(options.retry_backoff).await;
            }
            Err(err) => {
                warn!(host = %target.ip, attempts, error = %err, status = %err.status(), "Host unavailable");
                return HostResult::failed(target, err.status(), err.to_string(), attempts);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_breaker_trips_on_leading_connection_failures() {
        let mut breaker = CircuitBreaker::new(3);
        assert!(!breaker.record(CollectionStatus::ConnectionFailure));
        assert!(!breaker.record(CollectionStatus::ConnectionFailure));
        assert!(breaker.record(CollectionStatus::ConnectionFailure));
        assert!(breaker.is_tripped());
        assert!(!breaker.record(CollectionStatus::ConnectionFailure));
        assert_eq!(breaker.attempted(), 3);
    }

    #[test]
    fn test_breaker_ignores_failures_after_a_success() {
        let mut breaker = CircuitBreaker::new(3);
        breaker.record(CollectionStatus::Success);
        for _ in 0..10 {
            assert!(!breaker.record(CollectionStatus::ConnectionFailure));
        }
        assert!(!breaker.is_tripped());
        assert_eq!(breaker.consecutive_connection_failures(), 10);
    }

    #[test]
    fn test_breaker_counts_only_connection_failures() {
        let mut breaker = CircuitBreaker::new(2);
        breaker.record(CollectionStatus::AuthFailure);
        assert!(!breaker.record(CollectionStatus::ConnectionFailure));
        assert!(!breaker.is_tripped());
    }

    #[test]
    fn test_breaker_admits_up_to_threshold_while_window_open() {
        let mut breaker = CircuitBreaker::new(3);
        assert!(breaker.admits(2));
        assert!(!breaker.admits(3));

        breaker.record(CollectionStatus::ConnectionFailure);
        assert!(!breaker.admits(3));

        breaker.record(CollectionStatus::AuthFailure);
        assert!(breaker.admits(3));
        assert!(breaker.admits(50));
    }

    #[test]
    fn test_breaker_admits_nothing_after_trip() {
        let mut breaker = CircuitBreaker::new(2);
        breaker.record(CollectionStatus::ConnectionFailure);
        breaker.record(CollectionStatus::ConnectionFailure);
        assert!(!breaker.admits(0));
    }

    #[test]
    fn test_breaker_disabled_with_zero_threshold() {
        let mut breaker = CircuitBreaker::new(0);
        for _ in 0..20 {
            assert!(!breaker.record(CollectionStatus::ConnectionFailure));
        }
        assert!(breaker.admits(100));
    }

    #[test]
    fn test_effective_workers_clamped() {
        let mut options = OrchestratorOptions::default();
        assert_eq!(options.effective_workers(), 8);
        options.max_workers = 0;
        assert_eq!(options.effective_workers(), 1);
        options.max_workers = 64;
        assert_eq!(options.effective_workers(), MAX_WORKERS_LIMIT);
    }

    #[test]
    fn test_validate_targets() {
        assert!(matches!(
            validate_targets(&[]),
            Err(InventoryError::InvalidTargets(_))
        ));
        let targets = vec![Target::new("10.0.0.1"), Target::new("  ")];
        let err = validate_targets(&targets).unwrap_err();
        assert!(err.to_string().contains("#2"));
        assert!(validate_targets(&[Target::new("10.0.0.1")]).is_ok());
    }

    #[test]
    fn test_result_set_counts() {
        let set = ResultSet {
            results: vec![
                HostResult::failed(
                    Target::new("10.0.0.1"),
                    CollectionStatus::AuthFailure,
                    "denied",
                    1,
                ),
                HostResult {
                    target: Target::new("10.0.0.2"),
                    snapshot: Default::default(),
                    status: CollectionStatus::PartialSuccess,
                    error: None,
                    attempts: 1,
                },
            ],
            total: 2,
            skipped: 0,
            tripped: false,
        };
        assert_eq!(set.online(), 1);
        assert_eq!(set.offline(), 1);
        assert!(set.ensure_complete(10).is_ok());
    }
}
