use anyhow::Result;
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info};

use super::runner::BatchReport;

/// One unit of scheduled work
#[async_trait]
pub trait BatchJob: Send + Sync {
    async fn run_batch(&self) -> Result<BatchReport>;
}

/// Scheduler state, observable through [`Scheduler::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// Waiting for the next interval
    Idle,
    /// One batch in flight
    Running,
}

/// Monitoring scheduler - runs one batch, sleeps for the interval, repeats
pub struct Scheduler {
    job: Arc<dyn BatchJob>,
    interval: Duration,
    state_tx: watch::Sender<SchedulerState>,
}

impl Scheduler {
    pub fn new(job: Arc<dyn BatchJob>, interval: Duration) -> Self {
        let (state_tx, _) = watch::channel(SchedulerState::Idle);
        Self { job, interval, state_tx }
    }

    pub fn subscribe(&self) -> watch::Receiver<SchedulerState> {
        self.state_tx.subscribe()
    }

    pub fn state(&self) -> SchedulerState {
        *self.state_tx.borrow()
    }

    /// Run exactly one batch.
    ///
    /// The batch runs on its own task; an error or a panic is logged and reported
    /// as `None` so the caller's loop keeps going.
    pub async fn run_iteration(&self) -> Option<BatchReport> {
        self.state_tx.send_replace(SchedulerState::Running);
        info!("Starting monitoring iteration");

        let job = self.job.clone();
        let outcome = tokio::spawn(async move { job.run_batch().await }).await;

        let report = match outcome {
            Ok(Ok(report)) => {
                info!(
                    "Iteration done: {} selected, {} available, {} unavailable, {} persist failures",
                    report.selected, report.available, report.unavailable, report.persist_failures
                );
                Some(report)
            }
            Ok(Err(e)) => {
                error!("Monitoring iteration failed: {:#}", e);
                None
            }
            Err(e) if e.is_panic() => {
                error!("Monitoring iteration panicked: {}", e);
                None
            }
            Err(e) => {
                error!("Monitoring iteration was cancelled: {}", e);
                None
            }
        };

        self.state_tx.send_replace(SchedulerState::Idle);
        report
    }

    /// Loop until `shutdown` resolves.
    ///
    /// Shutdown is honoured while idle; an in-flight batch always completes.
    pub async fn run_until<F>(&self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        info!("Scheduler started (interval {:?})", self.interval);
        tokio::pin!(shutdown);

        loop {
            self.run_iteration().await;

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = &mut shutdown => {
                    info!("Shutdown requested, scheduler stopping");
                    break;
                }
            }
        }
    }
}
