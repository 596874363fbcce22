//! Error types for the scheduler crate.
//!
//! - `WakeupError`: errors from wakeup storage
//! - `SchedulerError`: errors from a scheduler pass, wrapped in `Report`

use encore_flow::SuspendError;
use std::fmt;

/// Errors from wakeup storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WakeupError {
    /// The backing store failed.
    Storage { message: String },
}

impl fmt::Display for WakeupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Storage { message } => write!(f, "wakeup storage failed: {message}"),
        }
    }
}

impl std::error::Error for WakeupError {}

impl From<WakeupError> for SuspendError {
    fn from(e: WakeupError) -> Self {
        match e {
            WakeupError::Storage { message } => Self::Storage { message },
        }
    }
}

/// Errors from a scheduler pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    /// Due wakeups could not be listed.
    DueQuery(WakeupError),
}

impl fmt::Display for SchedulerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DueQuery(e) => write!(f, "failed to list due wakeups: {e}"),
        }
    }
}

impl std::error::Error for SchedulerError {}
