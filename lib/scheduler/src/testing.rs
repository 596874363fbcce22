//! In-memory collaborators for tests.

use crate::error::WakeupError;
use crate::wakeup::{Wakeup, WakeupStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use encore_core::FlowRunId;
use std::sync::Mutex;

#[derive(Default)]
pub(crate) struct InMemoryWakeups {
    wakeups: Mutex<Vec<Wakeup>>,
    failure: Mutex<Option<String>>,
    stuck: Mutex<Vec<FlowRunId>>,
}

impl InMemoryWakeups {
    pub(crate) fn all(&self) -> Vec<Wakeup> {
        self.wakeups.lock().unwrap().clone()
    }

    pub(crate) fn fail_with(&self, message: &str) {
        *self.failure.lock().unwrap() = Some(message.to_string());
    }

    pub(crate) fn fail_acknowledge(&self, run_id: FlowRunId) {
        self.stuck.lock().unwrap().push(run_id);
    }

    fn check(&self) -> Result<(), WakeupError> {
        match self.failure.lock().unwrap().clone() {
            Some(message) => Err(WakeupError::Storage { message }),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl WakeupStore for InMemoryWakeups {
    async fn schedule(&self, wakeup: &Wakeup) -> Result<(), WakeupError> {
        self.check()?;
        let mut wakeups = self.wakeups.lock().unwrap();
        wakeups.retain(|w| w.run_id != wakeup.run_id);
        wakeups.push(*wakeup);
        Ok(())
    }

    async fn due(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<Wakeup>, WakeupError> {
        self.check()?;
        let mut due: Vec<Wakeup> = self
            .wakeups
            .lock()
            .unwrap()
            .iter()
            .filter(|w| w.is_due(now))
            .copied()
            .collect();
        due.sort_by_key(|w| w.resume_at);
        due.truncate(limit);
        Ok(due)
    }

    async fn acknowledge(&self, wakeup: &Wakeup) -> Result<(), WakeupError> {
        self.check()?;
        if self.stuck.lock().unwrap().contains(&wakeup.run_id) {
            return Err(WakeupError::Storage {
                message: "delete timed out".to_string(),
            });
        }
        self.wakeups.lock().unwrap().retain(|w| w != wakeup);
        Ok(())
    }
}
