//! Worker startup and runtime errors.

use std::fmt;

/// Errors that stop the worker.
#[derive(Debug)]
pub enum WorkerError {
    /// Configuration is missing or invalid.
    Config { details: String },
    /// The database could not be reached or migrated.
    Database { details: String },
    /// An HTTP provider client could not be built.
    Provider { details: String },
    /// The trigger bus could not be set up.
    Bus { details: String },
    /// Active runs could not be listed for recovery.
    Recovery { details: String },
}

impl fmt::Display for WorkerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config { details } => write!(f, "invalid configuration: {details}"),
            Self::Database { details } => write!(f, "database error: {details}"),
            Self::Provider { details } => write!(f, "provider setup failed: {details}"),
            Self::Bus { details } => write!(f, "trigger bus error: {details}"),
            Self::Recovery { details } => write!(f, "run recovery failed: {details}"),
        }
    }
}

impl std::error::Error for WorkerError {}
