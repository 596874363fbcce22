//! Durable wakeups for suspended flow runs.
//!
//! This crate provides:
//!
//! - **Wakeups**: the stored record of when a suspended run resumes, and a
//!   [`Suspender`](encore_flow::Suspender) that writes them
//! - **Resume scheduler**: polls due wakeups and hands each run back to the
//!   engine

pub mod error;
pub mod scheduler;
pub mod wakeup;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{SchedulerError, WakeupError};
pub use scheduler::{ResumeScheduler, RunResumer, SchedulerConfig, TickReport};
pub use wakeup::{Wakeup, WakeupStore, WakeupSuspender};
