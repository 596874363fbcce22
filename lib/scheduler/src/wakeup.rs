//! Stored wakeups for suspended runs.
//!
//! A run has at most one wakeup. Scheduling replaces the previous one, and
//! acknowledging only removes the exact wakeup that was handled, so a run
//! that suspends again while being resumed keeps its new wakeup.

use crate::error::WakeupError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use encore_core::FlowRunId;
use encore_flow::{NodeId, SuspendError, Suspender};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// When a suspended run should resume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Wakeup {
    pub run_id: FlowRunId,
    /// The wait node the run is suspended at.
    pub node_id: NodeId,
    pub resume_at: DateTime<Utc>,
}

impl Wakeup {
    #[must_use]
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.resume_at <= now
    }
}

/// Storage of wakeups.
#[async_trait]
pub trait WakeupStore: Send + Sync {
    /// Stores a wakeup, replacing any existing wakeup for the same run.
    async fn schedule(&self, wakeup: &Wakeup) -> Result<(), WakeupError>;

    /// Lists up to `limit` wakeups with `resume_at <= now`, earliest first.
    async fn due(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<Wakeup>, WakeupError>;

    /// Removes `wakeup` if it is still the run's stored wakeup.
    async fn acknowledge(&self, wakeup: &Wakeup) -> Result<(), WakeupError>;
}

/// A [`Suspender`] that writes wakeups to a [`WakeupStore`].
#[derive(Clone)]
pub struct WakeupSuspender {
    store: Arc<dyn WakeupStore>,
}

impl WakeupSuspender {
    #[must_use]
    pub fn new(store: Arc<dyn WakeupStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Suspender for WakeupSuspender {
    async fn sleep_until(
        &self,
        run_id: FlowRunId,
        node_id: NodeId,
        at: DateTime<Utc>,
    ) -> Result<(), SuspendError> {
        self.store
            .schedule(&Wakeup {
                run_id,
                node_id,
                resume_at: at,
            })
            .await?;
        debug!(%run_id, %node_id, resume_at = %at, "wakeup scheduled");
        Ok(())
    }
}
