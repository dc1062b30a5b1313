//! # Datastore Boundary
//!
//! The pipeline persists leads and the record view reads them back through
//! the [`Datastore`] trait. Two stores implement it:
//!
//! - [`RestStore`]: a PostgREST style HTTP endpoint (Supabase)
//! - [`LocalStore`]: an embedded DuckDB database for offline use
//!
//! Records travel as JSON objects so both stores accept the same payloads.

mod lead;
mod local;
mod rest;

use async_trait::async_trait;
use serde_json::Map;
use serde_json::Value;
use thiserror::Error;

pub use lead::LeadId;
pub use lead::PersistedLead;
pub use local::LocalStore;
pub use rest::RestStore;

/// One row as sent to or read from a datastore
pub type Record = Map<String, Value>;

/// Sort direction of [`Datastore::select`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Ascending => "asc",
            Direction::Descending => "desc",
        }
    }
}

#[derive(Error, Debug)]
pub enum DatastoreError {
    #[error("Request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The store answered, but refused the request
    #[error("Datastore error ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Local datastore error: {0}")]
    Local(#[from] duckdb::Error),

    #[error("Invalid identifier '{0}'")]
    InvalidIdentifier(String),

    #[error("Invalid datastore endpoint '{0}'")]
    InvalidEndpoint(String),

    #[error("Unexpected datastore response: {0}")]
    Decode(String),

    #[error("Datastore worker failed: {0}")]
    Worker(String),
}

/// Insert and select over named tables.
#[async_trait]
pub trait Datastore: Send + Sync {
    /// Persists `records` as one unit: either every record is stored or none is.
    async fn insert(&self, table: &str, records: &[Record]) -> Result<(), DatastoreError>;

    /// Reads every record of `table` ordered by one column.
    async fn select(&self, table: &str, order_by: &str, direction: Direction) -> Result<Vec<Record>, DatastoreError>;
}

/// Table and column names are spliced into queries, so only plain identifiers pass.
pub(crate) fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(first) if first == '_' || first.is_ascii_alphabetic())
        && chars.all(|c| c == '_' || c.is_ascii_alphanumeric())
}

pub(crate) fn check_identifier(name: &str) -> Result<&str, DatastoreError> {
    if is_identifier(name) {
        Ok(name)
    } else {
        Err(DatastoreError::InvalidIdentifier(name.to_owned()))
    }
}
