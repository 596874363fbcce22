//! Postgres implementations of the engine's collaborators.
//!
//! This module provides storage for:
//! - Flow definitions
//! - Runs, attempts and wakeups
//! - Fans, sender settings and connected accounts
//! - Templates, deliveries, orders and trackable assets

pub mod asset;
pub mod contact;
pub mod flow;
pub mod order;
pub mod run;
pub mod template;
pub mod wakeup;

pub use asset::PgAssetResolver;
pub use contact::PgContactStore;
pub use flow::PgGraphStore;
pub use order::PgOrderLedger;
pub use run::PgRunLedger;
pub use template::PgTemplateStore;
pub use wakeup::PgWakeupStore;

use encore_flow::{LedgerError, ProviderError, StoreError};
use encore_scheduler::WakeupError;
use std::fmt;
use std::str::FromStr;

/// Builds the error returned for a stored value that cannot be decoded.
fn invalid_data(message: String) -> sqlx::Error {
    sqlx::Error::Decode(Box::new(std::io::Error::new(
        std::io::ErrorKind::InvalidData,
        message,
    )))
}

/// Parses a stored id or enum column.
pub(crate) fn parse_column<T>(column: &str, value: &str) -> Result<T, sqlx::Error>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    T::from_str(value).map_err(|e| invalid_data(format!("invalid {column} '{value}': {e}")))
}

/// Parses an optional stored id column.
pub(crate) fn parse_optional_column<T>(
    column: &str,
    value: Option<&str>,
) -> Result<Option<T>, sqlx::Error>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    value.map(|v| parse_column(column, v)).transpose()
}

/// Maps a stored name through a `from_str_value` lookup.
pub(crate) fn parse_name<T>(
    column: &str,
    value: &str,
    parse: impl FnOnce(&str) -> Option<T>,
) -> Result<T, sqlx::Error> {
    parse(value).ok_or_else(|| invalid_data(format!("unknown {column} '{value}'")))
}

pub(crate) fn store_error(e: sqlx::Error) -> StoreError {
    StoreError::Storage {
        message: e.to_string(),
    }
}

pub(crate) fn ledger_error(e: sqlx::Error) -> LedgerError {
    LedgerError::Storage {
        message: e.to_string(),
    }
}

pub(crate) fn provider_error(e: sqlx::Error) -> ProviderError {
    ProviderError::Transport {
        message: e.to_string(),
    }
}

pub(crate) fn wakeup_error(e: sqlx::Error) -> WakeupError {
    WakeupError::Storage {
        message: e.to_string(),
    }
}
