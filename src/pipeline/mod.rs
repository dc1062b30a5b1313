//! # Ingestion Pipeline
//!
//! One run takes an uploaded workbook through
//!
//! ```text
//! Idle → Validating → Parsing → Mapping → Ingesting → Notifying → Done
//!            └──────────┴─────────┴──────────┴──────────────────→ Failed
//! ```
//!
//! Input problems stop the run before anything is written. A rejected chunk
//! stops it with the partial counts. A failed notification is reported on the
//! finished run and undoes nothing. A finished run stays in `Done` or `Failed`
//! until [`Pipeline::reset`] is called.

pub mod batch;
pub mod mapper;
pub mod notify;
pub mod validator;

use crate::pipeline::batch::BatchIngestor;
use crate::pipeline::batch::IngestError;
use crate::pipeline::batch::IngestionOutcome;
use crate::pipeline::mapper::FieldMapper;
use crate::pipeline::notify::NotificationError;
use crate::pipeline::notify::SyncSummary;
use crate::pipeline::notify::WebhookNotifier;
use crate::pipeline::validator::FileDescriptor;
use crate::pipeline::validator::ValidationError;
use crate::spreadsheet;
use crate::spreadsheet::SpreadsheetError;
use std::fmt::Display;
use std::path::Path;
use thiserror::Error;
use tracing::info;
use tracing::warn;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Please select an Excel file to upload")]
    MissingFile,

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Spreadsheet(#[from] SpreadsheetError),

    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error(transparent)]
    Notification(#[from] NotificationError),

    #[error("A previous run has not been reset")]
    NotIdle,
}

/// A workbook handed in by the caller.
#[derive(Clone, Debug)]
pub struct Upload {
    pub name: String,
    pub media_type: String,
    pub bytes: Vec<u8>,
}

impl Upload {
    /// Reads a file from disk; the name is its final path component.
    pub async fn from_path(path: impl AsRef<Path>, media_type: impl Into<String>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Upload { name, media_type: media_type.into(), bytes })
    }

    pub fn descriptor(&self) -> FileDescriptor {
        FileDescriptor {
            name: self.name.clone(),
            media_type: self.media_type.clone(),
            size: self.bytes.len() as u64,
        }
    }
}

/// Name of a pipeline state, as recorded in the run history.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Status {
    Idle,
    Validating,
    Parsing,
    Mapping,
    Ingesting,
    Notifying,
    Done,
    Failed,
}

impl Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Status::Idle => "idle",
            Status::Validating => "validating",
            Status::Parsing => "parsing",
            Status::Mapping => "mapping",
            Status::Ingesting => "ingesting",
            Status::Notifying => "notifying",
            Status::Done => "done",
            Status::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Result of a run that persisted every record.
#[derive(Debug)]
pub struct RunReport {
    pub outcome: IngestionOutcome,
    /// Set when the webhook could not be notified
    pub notification_error: Option<NotificationError>,
}

impl RunReport {
    pub fn message(&self) -> String {
        format!("Successfully uploaded {} records to database!", self.outcome.succeeded)
    }
}

/// Why and where a run stopped.
#[derive(Debug)]
pub struct PipelineFailure {
    /// The state the run was in when it failed
    pub stage: Status,
    pub error: PipelineError,
    /// Counters of an ingestion that stopped part way; its failure is moved into `error`
    pub outcome: Option<IngestionOutcome>,
}

#[derive(Debug, Default)]
pub enum PipelineState {
    #[default]
    Idle,
    Validating,
    Parsing,
    Mapping,
    Ingesting,
    Notifying,
    Done(RunReport),
    Failed(PipelineFailure),
}

impl PipelineState {
    pub fn status(&self) -> Status {
        match self {
            PipelineState::Idle => Status::Idle,
            PipelineState::Validating => Status::Validating,
            PipelineState::Parsing => Status::Parsing,
            PipelineState::Mapping => Status::Mapping,
            PipelineState::Ingesting => Status::Ingesting,
            PipelineState::Notifying => Status::Notifying,
            PipelineState::Done(_) => Status::Done,
            PipelineState::Failed(_) => Status::Failed,
        }
    }
}

/// Drives one upload at a time from validation to notification.
pub struct Pipeline {
    mapper: FieldMapper,
    ingestor: BatchIngestor,
    notifier: WebhookNotifier,
    state: PipelineState,
    history: Vec<Status>,
}

impl Pipeline {
    pub fn new(mapper: FieldMapper, ingestor: BatchIngestor, notifier: WebhookNotifier) -> Self {
        Pipeline {
            mapper,
            ingestor,
            notifier,
            state: PipelineState::Idle,
            history: vec![Status::Idle],
        }
    }

    pub fn state(&self) -> &PipelineState {
        &self.state
    }

    /// States entered since the last reset, oldest first.
    pub fn history(&self) -> &[Status] {
        &self.history
    }

    /// Returns a finished pipeline to `Idle` and clears its history.
    pub fn reset(&mut self) {
        self.state = PipelineState::Idle;
        self.history = vec![Status::Idle];
    }

    /// Runs one upload to `Done` or `Failed` and returns that state.
    /// Only a pipeline in `Idle` accepts a run, anything else is `NotIdle`.
    pub async fn run(&mut self, upload: Option<Upload>, webhook_url: &str) -> Result<&PipelineState, PipelineError> {
        if !matches!(self.state, PipelineState::Idle) {
            return Err(PipelineError::NotIdle);
        }
        self.state = self.execute(upload, webhook_url).await;
        self.record();
        Ok(&self.state)
    }

    async fn execute(&mut self, upload: Option<Upload>, webhook_url: &str) -> PipelineState {
        self.enter(PipelineState::Validating);
        let Some(upload) = upload else {
            return failed(Status::Validating, PipelineError::MissingFile);
        };
        if let Some(error) = validator::validate(&upload.descriptor()) {
            return failed(Status::Validating, error);
        }
        let endpoint = match notify::parse_endpoint(webhook_url) {
            Ok(endpoint) => endpoint,
            Err(error) => return failed(Status::Validating, error),
        };

        self.enter(PipelineState::Parsing);
        let rows = match spreadsheet::parse_deferred(upload.bytes).await {
            Ok(rows) => rows,
            Err(error) => return failed(Status::Parsing, error),
        };

        self.enter(PipelineState::Mapping);
        let records = self.mapper.map_rows(&rows);

        self.enter(PipelineState::Ingesting);
        let mut outcome = match self.ingestor.ingest(&records).await {
            Ok(outcome) => outcome,
            Err(error) => return failed(Status::Ingesting, error),
        };
        if let Some(error) = outcome.failure.take() {
            return PipelineState::Failed(PipelineFailure {
                stage: Status::Ingesting,
                error: error.into(),
                outcome: Some(outcome),
            });
        }

        self.enter(PipelineState::Notifying);
        let notification_error = self
            .notifier
            .notify(&endpoint, &SyncSummary::new(records.len()))
            .await
            .err();
        PipelineState::Done(RunReport { outcome, notification_error })
    }

    fn enter(&mut self, state: PipelineState) {
        self.state = state;
        self.record();
    }

    fn record(&mut self) {
        let status = self.state.status();
        match &self.state {
            PipelineState::Failed(failure) => {
                warn!(stage = %failure.stage, error = %failure.error, "pipeline failed")
            }
            PipelineState::Done(report) => info!(records = report.outcome.succeeded, "pipeline done"),
            _ => info!(state = %status, "pipeline state"),
        }
        self.history.push(status);
    }
}

fn failed(stage: Status, error: impl Into<PipelineError>) -> PipelineState {
    PipelineState::Failed(PipelineFailure { stage, error: error.into(), outcome: None })
}
