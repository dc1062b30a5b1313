//! # Spreadsheet Lead Sync
//!
//! Ingests lead spreadsheets into a datastore and offers a searchable, paged
//! view over the stored records.
//!
//! ## Features
//!
//! - **Excel decoding**: `.xlsx` (Office Open XML) and `.xls` (BIFF8) workbooks,
//!   detected by content, read without any native dependency
//! - **Declarative mapping**: spreadsheet headers are projected onto lead fields
//!   through a configurable table
//! - **Throttled batch inserts**: fixed-size chunks, one at a time, with a pause
//!   between chunks and a hard stop on the first rejected chunk
//! - **Completion webhook**: a single JSON notification once every record is stored
//! - **Two datastores**: a PostgREST/Supabase endpoint, or an embedded DuckDB file
//! - **Record view**: newest-first listing with case-insensitive search and page windows
//!
//! ## Pipeline
//!
//! [`Pipeline`] drives one upload through validation, parsing, mapping,
//! ingestion and notification, and records every state it passes through.
//! [`RecordQueryView`] is the independent read path.

mod error;
mod helpers;

pub mod config;
pub mod database;
pub mod pipeline;
pub mod spreadsheet;
pub mod view;

pub use config::Settings;
pub use database::Datastore;
pub use pipeline::Pipeline;
pub use pipeline::PipelineState;
pub use pipeline::Upload;
pub use view::RecordQueryView;
