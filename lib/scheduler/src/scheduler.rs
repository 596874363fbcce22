//! Polls due wakeups and resumes their runs.

use crate::error::SchedulerError;
use crate::wakeup::WakeupStore;
use async_trait::async_trait;
use encore_core::FlowRunId;
use encore_flow::{Clock, Engine, EngineError, RunProgress};
use rootcause::Report;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

/// Continues a suspended run.
#[async_trait]
pub trait RunResumer: Send + Sync {
    async fn resume(&self, run_id: FlowRunId) -> Result<RunProgress, Report<EngineError>>;
}

#[async_trait]
impl RunResumer for Engine {
    async fn resume(&self, run_id: FlowRunId) -> Result<RunProgress, Report<EngineError>> {
        Engine::resume(self, run_id).await
    }
}

/// Scheduler settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Seconds between polls for due wakeups.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Maximum wakeups handled per poll.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

fn default_poll_interval_secs() -> u64 {
    5
}

fn default_batch_size() -> usize {
    100
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            batch_size: default_batch_size(),
        }
    }
}

/// Counts from one scheduler pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Runs resumed and their wakeups removed.
    pub resumed: usize,
    /// Wakeups removed because their run no longer exists.
    pub dropped: usize,
    /// Resumes that failed; their wakeups stay for the next pass.
    pub failed: usize,
    /// Handled wakeups that could not be removed and will come due again.
    pub unacknowledged: usize,
}

/// Resumes suspended runs when their wakeups come due.
pub struct ResumeScheduler {
    wakeups: Arc<dyn WakeupStore>,
    resumer: Arc<dyn RunResumer>,
    clock: Arc<dyn Clock>,
    config: SchedulerConfig,
}

impl ResumeScheduler {
    #[must_use]
    pub fn new(
        wakeups: Arc<dyn WakeupStore>,
        resumer: Arc<dyn RunResumer>,
        clock: Arc<dyn Clock>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            wakeups,
            resumer,
            clock,
            config,
        }
    }

    /// Handles one batch of due wakeups.
    ///
    /// A wakeup is removed once its run has been resumed, whatever state the
    /// run ends in. A failed resume leaves the wakeup to be retried.
    ///
    /// # Errors
    ///
    /// Returns an error if due wakeups cannot be listed.
    #[instrument(skip(self))]
    pub async fn tick(&self) -> Result<TickReport, Report<SchedulerError>> {
        let now = self.clock.now();
        let due = self
            .wakeups
            .due(now, self.config.batch_size)
            .await
            .map_err(SchedulerError::DueQuery)?;

        let mut report = TickReport::default();
        for wakeup in due {
            match self.resumer.resume(wakeup.run_id).await {
                Ok(progress) => {
                    debug!(run_id = %wakeup.run_id, ?progress, "run resumed");
                    report.resumed += 1;
                }
                Err(error)
                    if matches!(error.current_context(), EngineError::RunNotFound { .. }) =>
                {
                    warn!(run_id = %wakeup.run_id, "dropping wakeup for missing run");
                    report.dropped += 1;
                }
                Err(error) => {
                    warn!(run_id = %wakeup.run_id, %error, "failed to resume run");
                    report.failed += 1;
                    continue;
                }
            }
            if let Err(error) = self.wakeups.acknowledge(&wakeup).await {
                warn!(run_id = %wakeup.run_id, %error, "failed to acknowledge wakeup");
                report.unacknowledged += 1;
            }
        }

        if report != TickReport::default() {
            info!(
                resumed = report.resumed,
                dropped = report.dropped,
                failed = report.failed,
                unacknowledged = report.unacknowledged,
                "scheduler pass finished"
            );
        }
        Ok(report)
    }

    /// Polls until `shutdown` becomes `true`.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut interval =
            tokio::time::interval(Duration::from_secs(self.config.poll_interval_secs));
        info!(
            poll_interval_secs = self.config.poll_interval_secs,
            "resume scheduler started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(error) = self.tick().await {
                        warn!(%error, "scheduler pass failed");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        info!("resume scheduler stopped");
    }
}
