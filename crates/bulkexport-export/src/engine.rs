//! Export run orchestration: node list, partitioning, dispatch.

use std::path::PathBuf;
use std::time::Instant;

use tokio::sync::broadcast;
use tracing::{debug, info};

use bulkexport_core::{EngineError, ExportConfig, NodeId, Repository, ScanError, Session};
use bulkexport_scan::{NodeListCache, ScanProgress, TreeScanner};

use crate::executor::TaskExecutor;
use crate::partition::partition;
use crate::progress::{ExportProgress, ExportReport};

/// Terminal outcome of a run that did not fail.
#[derive(Debug, Clone)]
pub enum RunOutcome {
    /// Every task ran. Individual nodes may still have failed; see the report.
    Completed(ExportReport),
    /// The node list was scanned and cached, nothing was exported. Run again
    /// to export from the cache.
    CacheGenerated {
        /// Cache file written.
        cache_path: PathBuf,
        /// Nodes in the cached list.
        node_count: usize,
    },
}

impl RunOutcome {
    /// Check if this run only produced the node cache.
    pub fn is_cache_generated(&self) -> bool {
        matches!(self, RunOutcome::CacheGenerated { .. })
    }

    /// The export report, if an export took place.
    pub fn report(&self) -> Option<&ExportReport> {
        match self {
            RunOutcome::Completed(report) => Some(report),
            RunOutcome::CacheGenerated { .. } => None,
        }
    }
}

/// Runs a complete export of one repository subtree.
///
/// A run scans (or loads) the node list, splits it into tasks of
/// `chunk_size` nodes and waits for the worker pool to export them all.
/// With `use_node_cache` set and no cache present, the run stops after
/// writing the cache and reports [`RunOutcome::CacheGenerated`].
pub struct Engine {
    config: ExportConfig,
    scanner: TreeScanner,
    executor: TaskExecutor,
}

impl Engine {
    /// Create an engine for a validated configuration.
    pub fn new(config: ExportConfig) -> Result<Self, EngineError> {
        config.validate()?;
        Ok(Self {
            scanner: TreeScanner::new(config.ignore.clone()),
            executor: TaskExecutor::new(config.threads),
            config,
        })
    }

    /// Configuration of this engine.
    pub fn config(&self) -> &ExportConfig {
        &self.config
    }

    /// Subscribe to scan progress updates.
    pub fn subscribe_scan(&self) -> broadcast::Receiver<ScanProgress> {
        self.scanner.subscribe()
    }

    /// Subscribe to export progress updates.
    pub fn subscribe(&self) -> broadcast::Receiver<ExportProgress> {
        self.executor.subscribe()
    }

    /// Node list cache used by this engine.
    pub fn cache(&self) -> NodeListCache {
        NodeListCache::new(&self.config.base_path)
    }

    /// Export the subtree under `root`.
    pub fn run<R>(&self, repository: &R, root: &NodeId) -> Result<RunOutcome, EngineError>
    where
        R: Repository + ?Sized,
    {
        let start = Instant::now();
        info!(
            root = %root,
            base = %self.config.base_path.display(),
            threads = self.config.threads,
            chunk_size = self.config.chunk_size,
            export_versions = self.config.export_versions,
            revision_head_naming = self.config.revision_head_naming,
            use_node_cache = self.config.use_node_cache,
            skip_existing = self.config.skip_existing,
            "Starting export"
        );

        let (nodes, from_cache) = if self.config.use_node_cache {
            let cache = self.cache();
            match cache.load(root)? {
                Some(nodes) => (nodes, true),
                None => {
                    let nodes = self.scan(repository, root)?;
                    let cache_path = cache.save(root, &nodes)?;
                    info!(
                        path = %cache_path.display(),
                        nodes = nodes.len(),
                        "Cache file generated, no export performed"
                    );
                    return Ok(RunOutcome::CacheGenerated {
                        cache_path,
                        node_count: nodes.len(),
                    });
                }
            }
        } else {
            (self.scan(repository, root)?, false)
        };

        let tasks = partition(&nodes, self.config.chunk_size);
        for task in &tasks {
            let first = (task.task_number - 1) * self.config.chunk_size;
            debug!(
                task = task.task_number,
                from = first,
                to = first + task.len(),
                "Task range"
            );
        }

        let reports = self.executor.run(repository, &self.config, &tasks)?;
        let report =
            ExportReport::from_tasks(root.clone(), nodes.len(), from_cache, reports, start.elapsed());

        info!(
            elapsed_ms = report.elapsed.as_millis() as u64,
            failed = report.failures.len(),
            "{}",
            report.summary()
        );
        Ok(RunOutcome::Completed(report))
    }

    /// Scan the tree with a scan-scoped session.
    pub fn scan<R>(&self, repository: &R, root: &NodeId) -> Result<Vec<NodeId>, EngineError>
    where
        R: Repository + ?Sized,
    {
        let session = Session::scan(self.config.principal.as_str());
        repository
            .authenticate(&session)
            .map_err(|source| ScanError::Repository {
                node: root.clone(),
                source,
            })?;

        Ok(self.scanner.scan(repository, &session, root)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bulkexport_core::CacheError;
    use bulkexport_repo::MemoryRepository;
    use tempfile::TempDir;

    #[test]
    fn test_rejects_invalid_config() {
        let mut config = ExportConfig::new("/tmp/out");
        config.chunk_size = 0;
        assert!(matches!(Engine::new(config), Err(EngineError::Config(_))));
    }

    #[test]
    fn test_cache_generated_then_used() {
        let temp = TempDir::new().unwrap();
        let mut repo = MemoryRepository::new();
        let root = repo.add_root("r");
        repo.add_document(&root, "a.txt", "a");

        let mut config = ExportConfig::new(temp.path());
        config.use_node_cache = true;
        let engine = Engine::new(config).unwrap();

        let first = engine.run(&repo, &root).unwrap();
        assert!(first.is_cache_generated());
        assert!(!temp.path().join("r").exists());

        let second = engine.run(&repo, &root).unwrap();
        let report = second.report().unwrap();
        assert!(report.from_cache);
        assert_eq!(report.counters.documents, 1);
    }

    #[test]
    fn test_corrupt_cache_is_fatal() {
        let temp = TempDir::new().unwrap();
        let mut repo = MemoryRepository::new();
        let root = repo.add_root("r");

        let mut config = ExportConfig::new(temp.path());
        config.use_node_cache = true;
        let engine = Engine::new(config).unwrap();
        std::fs::write(engine.cache().path_for(&root), "garbage").unwrap();

        let err = engine.run(&repo, &root).unwrap_err();
        assert!(matches!(err, EngineError::Cache(CacheError::Corrupt { .. })));
    }

    #[test]
    fn test_scan_failure_is_fatal() {
        let temp = TempDir::new().unwrap();
        let mut repo = MemoryRepository::new();
        let root = repo.add_root("r");
        repo.deny("admin");

        let engine = Engine::new(ExportConfig::new(temp.path())).unwrap();
        assert!(matches!(
            engine.run(&repo, &root),
            Err(EngineError::Scan(_))
        ));
    }
}
