//! Chunked, throttled persistence of mapped records.

use crate::database::Datastore;
use crate::database::DatastoreError;
use crate::database::Record;
use crate::pipeline::mapper::LeadField;
use crate::pipeline::mapper::MappedRecord;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::info;
use tracing::warn;

pub const DEFAULT_CHUNK_SIZE: usize = 50;
pub const DEFAULT_CHUNK_DELAY: Duration = Duration::from_millis(200);

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("No records to ingest")]
    EmptyInput,

    #[error("Chunk size must be at least 1")]
    InvalidChunkSize,

    /// The datastore refused chunk `chunk_index` (zero based); earlier chunks stay persisted
    #[error("Failed to store chunk {chunk_index}: {source}")]
    ChunkInsertFailed {
        chunk_index: usize,
        #[source]
        source: DatastoreError,
    },
}

/// Counters of one ingestion run.
#[derive(Debug, Default)]
pub struct IngestionOutcome {
    /// Records handed to the datastore, including those of a failed chunk
    pub attempted: usize,
    /// Records confirmed persisted
    pub succeeded: usize,
    pub chunks_submitted: usize,
    /// The first chunk failure; set means no later chunk was submitted
    pub failure: Option<IngestError>,
}

impl IngestionOutcome {
    pub fn is_complete(&self) -> bool {
        self.failure.is_none()
    }

    /// Index of the first record not known to be persisted.
    pub fn resume_from(&self) -> usize {
        self.succeeded
    }
}

/// Sends records to one table in fixed-size chunks, one chunk at a time.
#[derive(Clone)]
pub struct BatchIngestor {
    store: Arc<dyn Datastore>,
    table: String,
    chunk_size: usize,
    chunk_delay: Duration,
}

impl BatchIngestor {
    pub fn new(store: Arc<dyn Datastore>, table: impl Into<String>) -> Self {
        BatchIngestor {
            store,
            table: table.into(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_delay: DEFAULT_CHUNK_DELAY,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_chunk_delay(mut self, chunk_delay: Duration) -> Self {
        self.chunk_delay = chunk_delay;
        self
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Persists `records` chunk by chunk and stops at the first rejected chunk.
    ///
    /// Chunk `k + 1` is submitted only after chunk `k` succeeded and the chunk
    /// delay elapsed. Nothing is retried.
    pub async fn ingest(&self, records: &[MappedRecord]) -> Result<IngestionOutcome, IngestError> {
        if records.is_empty() {
            return Err(IngestError::EmptyInput);
        }
        if self.chunk_size == 0 {
            return Err(IngestError::InvalidChunkSize);
        }

        let chunk_count = records.len().div_ceil(self.chunk_size);
        let mut outcome = IngestionOutcome::default();
        for (chunk_index, chunk) in records.chunks(self.chunk_size).enumerate() {
            let payload: Vec<Record> = chunk.iter().map(to_record).collect();
            outcome.attempted += chunk.len();
            outcome.chunks_submitted += 1;

            if let Err(source) = self.store.insert(&self.table, &payload).await {
                warn!(chunk = chunk_index + 1, of = chunk_count, error = %source, "chunk rejected, stopping");
                outcome.failure = Some(IngestError::ChunkInsertFailed { chunk_index, source });
                return Ok(outcome);
            }
            outcome.succeeded += chunk.len();
            info!(chunk = chunk_index + 1, of = chunk_count, persisted = outcome.succeeded, "chunk persisted");

            if chunk_index + 1 < chunk_count && !self.chunk_delay.is_zero() {
                tokio::time::sleep(self.chunk_delay).await;
            }
        }
        Ok(outcome)
    }
}

fn to_record(record: &MappedRecord) -> Record {
    LeadField::ALL
        .iter()
        .map(|field| (field.as_str().to_owned(), Value::String(record.get(*field).to_owned())))
        .collect()
}
