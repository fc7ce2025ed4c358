use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde::Serialize;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info};

use super::executor::ProbeExecutor;
use super::scheduler::BatchJob;
use super::types::{EndpointTarget, ProbeError, ProbeResult};
use crate::database::Database;
use crate::database::models::Check;

/// Knobs for one batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunnerSettings {
    /// Most endpoints selected per batch
    pub batch_limit: usize,
    /// Most probes in flight at once
    pub max_concurrent_probes: usize,
}

/// Outcome counters of one batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub selected: usize,
    pub available: usize,
    pub unavailable: usize,
    pub persist_failures: usize,
}

/// Batch runner - probes the selected endpoints and records every result
pub struct BatchRunner {
    database: Arc<dyn Database>,
    executor: Arc<ProbeExecutor>,
    settings: RunnerSettings,
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Probe one endpoint, turning a panic into an `EXCEPTION` result.
///
/// The timestamp is taken once, before the probe, and used for both the check and
/// the status row.
async fn probe(executor: &ProbeExecutor, target: &EndpointTarget) -> (ProbeResult, DateTime<Utc>) {
    let checked_at = Utc::now();

    let result = match AssertUnwindSafe(executor.execute(target)).catch_unwind().await {
        Ok(result) => result,
        Err(payload) => ProbeResult::failure(ProbeError::exception(format!(
            "probe task panicked: {}",
            panic_message(payload.as_ref())
        ))),
    };

    (result, checked_at)
}

impl BatchRunner {
    pub fn new(database: Arc<dyn Database>, executor: Arc<ProbeExecutor>, settings: RunnerSettings) -> Self {
        Self { database, executor, settings }
    }

    /// Run one batch.
    ///
    /// Only selecting the endpoints can fail; per-endpoint probe and persistence
    /// failures are logged and counted.
    pub async fn process_batch(&self) -> Result<BatchReport> {
        let targets = self.database.enabled_targets(self.settings.batch_limit).await?;

        if targets.is_empty() {
            info!("No enabled endpoints to check");
            return Ok(BatchReport::default());
        }

        debug!("Checking {} endpoints", targets.len());
        let mut report = BatchReport { selected: targets.len(), ..BatchReport::default() };

        let semaphore = Arc::new(Semaphore::new(self.settings.max_concurrent_probes.max(1)));
        let mut tasks = JoinSet::new();

        for target in targets {
            let executor = self.executor.clone();
            let semaphore = semaphore.clone();

            tasks.spawn(async move {
                // The semaphore is never closed
                let _permit = semaphore.acquire_owned().await.ok();
                let (result, checked_at) = probe(&executor, &target).await;
                (target, result, checked_at)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            let (target, result, checked_at) = match joined {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!("Probe task failed: {}", e);
                    report.persist_failures += 1;
                    continue;
                }
            };

            info!(
                "{} [{}] {} -> ok={} status={:?} height={:?} delay_ms={:?} error={:?}",
                target.name,
                target.kind,
                target.url,
                result.is_available(),
                result.status_code,
                result.block_height,
                result.block_delay_ms,
                result.error_message()
            );

            if result.is_available() {
                report.available += 1;
            } else {
                report.unavailable += 1;
            }

            let check = Check::from_probe(target.endpoint_id, &result, checked_at);
            if let Err(e) = self.database.record_check(&check).await {
                error!("Failed to save check for endpoint {} ({}): {:#}", target.endpoint_id, target.url, e);
                report.persist_failures += 1;
            }
        }

        Ok(report)
    }
}

#[async_trait]
impl BatchJob for BatchRunner {
    async fn run_batch(&self) -> Result<BatchReport> {
        self.process_batch().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::repository::tests::{create_test_database, seed_network};
    use crate::monitoring::checker::Checker;

    /// Answers per URL: panics for URLs containing "boom", fails for "down", succeeds otherwise
    struct Scripted;

    #[async_trait]
    impl Checker for Scripted {
        async fn check(&self, base_url: &str, _expected_chain_id: Option<&str>) -> ProbeResult {
            if base_url.contains("boom") {
                panic!("malformed payload from {base_url}");
            }
            if base_url.contains("down") {
                return ProbeResult::failure(ProbeError::ConnectionRefused);
            }
            ProbeResult::available(200).with_freshness(Some(1_200), Some("77".into()))
        }
    }

    fn settings(batch_limit: usize) -> RunnerSettings {
        RunnerSettings { batch_limit, max_concurrent_probes: 2 }
    }

    fn executor() -> Arc<ProbeExecutor> {
        Arc::new(ProbeExecutor::with_checkers(Arc::new(Scripted), Arc::new(Scripted)))
    }

    #[tokio::test]
    async fn test_panicking_probe_does_not_abort_batch() -> Result<()> {
        let (database, _dir) = create_test_database().await?;
        let ids = seed_network(
            &database,
            "cosmoshub-4",
            &[
                ("rpc", "https://a.example.com", true),
                ("api", "https://boom.example.com", true),
                ("rpc", "https://down.example.com", true),
                ("api", "https://d.example.com", true),
            ],
        )
        .await?;

        let runner = BatchRunner::new(database.clone(), executor(), settings(100));
        let report = runner.process_batch().await?;

        assert_eq!(report, BatchReport { selected: 4, available: 2, unavailable: 2, persist_failures: 0 });

        for id in [ids[0], ids[3]] {
            let status = database.get_endpoint_status(id).await?.unwrap();
            assert!(status.is_available);
            assert_eq!(status.last_block_height.as_deref(), Some("77"));
        }

        let panicked = database.get_endpoint_status(ids[1]).await?.unwrap();
        assert!(!panicked.is_available);
        assert!(
            panicked
                .error_message
                .as_deref()
                .unwrap()
                .starts_with("EXCEPTION: probe task panicked: malformed payload")
        );

        let refused = database.get_endpoint_status(ids[2]).await?.unwrap();
        assert_eq!(refused.error_message.as_deref(), Some("CONNECTION_REFUSED"));
        Ok(())
    }

    #[tokio::test]
    async fn test_check_and_status_agree_after_batch() -> Result<()> {
        let (database, _dir) = create_test_database().await?;
        let ids = seed_network(&database, "juno-1", &[("rpc", "https://a.example.com", true)]).await?;

        let runner = BatchRunner::new(database.clone(), executor(), settings(100));
        runner.process_batch().await?;
        runner.process_batch().await?;

        let history = database.get_recent_checks(ids[0], 10).await?;
        assert_eq!(history.len(), 2);

        let status = database.get_endpoint_status(ids[0]).await?.unwrap();
        assert_eq!(status.checked_at, history[0].checked_at);
        assert_eq!(status.block_delay_ms, history[0].block_delay_ms);
        assert_eq!(status.status_code, history[0].status_code);
        Ok(())
    }

    #[tokio::test]
    async fn test_disabled_endpoints_are_skipped_and_limit_is_honoured() -> Result<()> {
        let (database, _dir) = create_test_database().await?;
        let ids = seed_network(
            &database,
            "osmosis-1",
            &[
                ("rpc", "https://a.example.com", true),
                ("rpc", "https://b.example.com", false),
                ("rpc", "https://c.example.com", true),
            ],
        )
        .await?;

        let runner = BatchRunner::new(database.clone(), executor(), settings(1));
        assert_eq!(runner.process_batch().await?.selected, 1);
        assert_eq!(runner.process_batch().await?.selected, 1);

        // Least recently checked first: both enabled endpoints got one check each
        assert_eq!(database.get_recent_checks(ids[0], 10).await?.len(), 1);
        assert_eq!(database.get_recent_checks(ids[2], 10).await?.len(), 1);
        assert!(database.get_recent_checks(ids[1], 10).await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_empty_batch() -> Result<()> {
        let (database, _dir) = create_test_database().await?;
        let runner = BatchRunner::new(database, executor(), settings(10));
        assert_eq!(runner.run_batch().await?, BatchReport::default());
        Ok(())
    }
}
