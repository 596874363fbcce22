//! encore flow worker.
//!
//! Runs the flow engine against Postgres storage and HTTP providers: it
//! consumes trigger events from NATS, resumes suspended runs when their
//! wakeups come due, and recovers in-flight runs on startup.

pub mod config;
pub mod db;
pub mod error;
pub mod intake;
