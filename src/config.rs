//! Runtime settings, resolved from flags and environment variables.

use crate::database::Datastore;
use crate::database::DatastoreError;
use crate::database::LocalStore;
use crate::database::RestStore;
use crate::pipeline::batch::BatchIngestor;
use crate::pipeline::batch::DEFAULT_CHUNK_DELAY;
use crate::pipeline::batch::DEFAULT_CHUNK_SIZE;
use crate::pipeline::mapper::ColumnOverride;
use crate::pipeline::mapper::FieldMapper;
use crate::pipeline::notify::DEFAULT_WEBHOOK_URL;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::error;

pub const DATASTORE_URL: &str = "SUPABASE_URL";
pub const DATASTORE_KEY: &str = "SUPABASE_ANON_KEY";
pub const LOCAL_DATABASE: &str = "SHEET_SYNC_LOCAL";
pub const TABLE: &str = "SHEET_SYNC_TABLE";
pub const CHUNK_SIZE: &str = "SHEET_SYNC_CHUNK_SIZE";
pub const CHUNK_DELAY_MS: &str = "SHEET_SYNC_CHUNK_DELAY_MS";
pub const WEBHOOK_URL: &str = "SHEET_SYNC_WEBHOOK_URL";

pub const DEFAULT_TABLE: &str = "leads";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing configuration: {0} is not set")]
    Missing(&'static str),

    #[error("Invalid configuration: {key}='{value}'")]
    Invalid { key: &'static str, value: String },
}

/// Where records are persisted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DatastoreConfig {
    Rest { endpoint: String, access_key: String },
    Local { path: PathBuf },
}

impl DatastoreConfig {
    /// A local database path wins; otherwise both the endpoint and the key are required.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        if let Some(path) = non_empty(&lookup, LOCAL_DATABASE) {
            return Ok(DatastoreConfig::Local { path: PathBuf::from(path) });
        }
        let endpoint = required(&lookup, DATASTORE_URL)?;
        let access_key = required(&lookup, DATASTORE_KEY)?;
        Ok(DatastoreConfig::Rest { endpoint, access_key })
    }

    pub fn connect(&self) -> Result<Arc<dyn Datastore>, DatastoreError> {
        Ok(match self {
            DatastoreConfig::Rest { endpoint, access_key } => Arc::new(RestStore::new(endpoint, access_key.clone())?),
            DatastoreConfig::Local { path } => Arc::new(LocalStore::open(path)?),
        })
    }
}

/// Chunking and throttling of inserts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IngestSettings {
    pub chunk_size: usize,
    pub chunk_delay: Duration,
}

impl Default for IngestSettings {
    fn default() -> Self {
        IngestSettings { chunk_size: DEFAULT_CHUNK_SIZE, chunk_delay: DEFAULT_CHUNK_DELAY }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Settings {
    pub datastore: DatastoreConfig,
    pub table: String,
    pub ingest: IngestSettings,
    pub webhook_url: String,
    pub columns: Vec<ColumnOverride>,
}

impl Settings {
    /// Resolves every setting through `lookup`, keyed by the environment variable names above.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let datastore = DatastoreConfig::from_lookup(&lookup)?;
        let chunk_size = match non_empty(&lookup, CHUNK_SIZE) {
            Some(value) => parse::<usize>(CHUNK_SIZE, &value).filter(|size| *size > 0).ok_or_else(|| invalid(CHUNK_SIZE, value))?,
            None => DEFAULT_CHUNK_SIZE,
        };
        let chunk_delay = match non_empty(&lookup, CHUNK_DELAY_MS) {
            Some(value) => parse::<u64>(CHUNK_DELAY_MS, &value).map(Duration::from_millis).ok_or_else(|| invalid(CHUNK_DELAY_MS, value))?,
            None => DEFAULT_CHUNK_DELAY,
        };
        Ok(Settings {
            datastore,
            table: non_empty(&lookup, TABLE).unwrap_or_else(|| DEFAULT_TABLE.to_owned()),
            ingest: IngestSettings { chunk_size, chunk_delay },
            webhook_url: non_empty(&lookup, WEBHOOK_URL).unwrap_or_else(|| DEFAULT_WEBHOOK_URL.to_owned()),
            columns: Vec::new(),
        })
    }

    pub fn with_columns(mut self, columns: Vec<ColumnOverride>) -> Self {
        self.columns = columns;
        self
    }

    pub fn mapper(&self) -> FieldMapper {
        FieldMapper::default().with_overrides(&self.columns)
    }

    pub fn ingestor(&self, store: Arc<dyn Datastore>) -> BatchIngestor {
        BatchIngestor::new(store, self.table.clone())
            .with_chunk_size(self.ingest.chunk_size)
            .with_chunk_delay(self.ingest.chunk_delay)
    }
}

fn non_empty(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<String> {
    lookup(key).map(|value| value.trim().to_owned()).filter(|value| !value.is_empty())
}

fn required(lookup: &impl Fn(&str) -> Option<String>, key: &'static str) -> Result<String, ConfigError> {
    non_empty(lookup, key).ok_or_else(|| {
        error!(key, "missing datastore configuration");
        ConfigError::Missing(key)
    })
}

fn parse<T: std::str::FromStr>(key: &'static str, value: &str) -> Option<T> {
    let parsed = value.parse().ok();
    if parsed.is_none() {
        error!(key, value, "unparsable configuration value");
    }
    parsed
}

fn invalid(key: &'static str, value: String) -> ConfigError {
    ConfigError::Invalid { key, value }
}
