//! Ingestion policy and bulk import helpers.

pub mod auto_ingest;
pub mod markdown;

pub use auto_ingest::{AutoIngestConfig, AutoIngestController, AutoIngestStatus, IngestKind, ProjectOverride};
pub use markdown::split_markdown_segments;
