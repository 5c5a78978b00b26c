//! HTTP ingest endpoint for worker events.

pub mod ingest_http;

pub use ingest_http::{IngestHttpConfig, IngestHttpServer};
