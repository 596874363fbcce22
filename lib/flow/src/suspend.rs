//! Durable suspension and time.
//!
//! A run never sleeps in memory. A `wait` records its attempt, registers a
//! wakeup through [`Suspender`] and returns; a scheduler later calls back
//! into the engine to resume the run.

use crate::error::SuspendError;
use crate::node::NodeId;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use encore_core::FlowRunId;

/// Registers the point in time a suspended run should resume.
#[async_trait]
pub trait Suspender: Send + Sync {
    /// Schedules `run_id` to resume at `at`, replacing any earlier wakeup for the run.
    async fn sleep_until(
        &self,
        run_id: FlowRunId,
        node_id: NodeId,
        at: DateTime<Utc>,
    ) -> Result<(), SuspendError>;
}

/// Source of the current time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// The system wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
