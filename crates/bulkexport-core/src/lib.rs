//! Core types and traits for bulkexport.
//!
//! This crate provides the data model shared by the scanner and the export
//! engine: node identities and records, the [`Repository`] contract the engine
//! consumes, revision label ordering, configuration and error types.

mod config;
mod error;
mod node;
mod repository;
pub mod version;

pub use config::{
    DEFAULT_CHUNK_SIZE, DEFAULT_PRINCIPAL, DEFAULT_THREADS, DenyList, ExportConfig,
    ExportConfigBuilder, IgnoreRules, RunParameters, parse_count, parse_flag,
};
pub use error::{
    CacheError, ConfigError, EngineError, NodeExportError, RepositoryError, ScanError,
    VersionError,
};
pub use node::{NodeId, NodeKind, NodeRecord, Revision};
pub use repository::{ContentStream, Repository, Session};
pub use version::{VersionLabel, head_of};
