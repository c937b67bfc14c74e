//! Parallel export engine for bulkexport.
//!
//! This crate writes a repository subtree into a filesystem tree that bulk
//! import tools can load back: one file per document (or per revision), one
//! directory per folder, and a `.metadata.properties.xml` sidecar for each.
//!
//! # Overview
//!
//! - [`Engine`] drives a run: node list from a scan or the cache, then
//!   [`partition`] into [`ExportTask`]s, then the [`TaskExecutor`]
//! - [`NodeExporter`] handles one node: folders, head-only documents and
//!   full version history
//! - Progress updates via broadcast channels, a final [`ExportReport`]
//!
//! # Example
//!
//! ```rust,no_run
//! use bulkexport_export::{Engine, ExportConfig, RunOutcome};
//! use bulkexport_repo::FsRepository;
//!
//! let repo = FsRepository::open("/srv/content").unwrap();
//! let mut config = ExportConfig::new("/srv/export");
//! config.threads = 4;
//!
//! let engine = Engine::new(config).unwrap();
//! match engine.run(&repo, &repo.root_id()).unwrap() {
//!     RunOutcome::Completed(report) => println!("{}", report.summary()),
//!     RunOutcome::CacheGenerated { cache_path, .. } => {
//!         println!("Cache written to {}", cache_path.display())
//!     }
//! }
//! ```

mod engine;
mod executor;
mod exporter;
pub mod metadata;
mod partition;
mod progress;

pub use engine::{Engine, RunOutcome};
pub use executor::{PROGRESS_CHANNEL_SIZE, TaskExecutor};
pub use exporter::{NodeExporter, SYNTHETIC_HEAD_LABEL};
pub use metadata::{SIDECAR_SUFFIX, sidecar_path};
pub use partition::{ExportTask, partition};
pub use progress::{
    ExportCounters, ExportProgress, ExportReport, NodeFailure, TaskReport, TaskStatus,
};

// Re-export core types for convenience
pub use bulkexport_core::{EngineError, ExportConfig, IgnoreRules, NodeExportError, NodeId};
