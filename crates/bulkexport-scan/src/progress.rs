//! Scan progress reporting.

use std::time::{Duration, Instant};

use bulkexport_core::NodeId;

/// Progress information during a scan.
#[derive(Debug, Clone)]
pub struct ScanProgress {
    /// Nodes accepted into the export list so far.
    pub nodes_found: u64,
    /// Folders among them.
    pub folders: u64,
    /// Documents among them.
    pub documents: u64,
    /// Subtrees skipped because their root type is ignored.
    pub ignored: u64,
    /// Node being visited.
    pub current: Option<NodeId>,
    /// Time elapsed since scan started.
    pub elapsed: Duration,
}

impl ScanProgress {
    /// Create initial progress state.
    pub fn new() -> Self {
        Self {
            nodes_found: 0,
            folders: 0,
            documents: 0,
            ignored: 0,
            current: None,
            elapsed: Duration::ZERO,
        }
    }

    /// Calculate scan rate in nodes per second.
    pub fn nodes_per_second(&self) -> f64 {
        if self.elapsed.as_secs_f64() > 0.0 {
            self.nodes_found as f64 / self.elapsed.as_secs_f64()
        } else {
            0.0
        }
    }
}

impl Default for ScanProgress {
    fn default() -> Self {
        Self::new()
    }
}

/// Running counters with timing, snapshotted into [`ScanProgress`].
#[derive(Debug)]
pub(crate) struct ProgressTracker {
    start_time: Instant,
    folders: u64,
    documents: u64,
    ignored: u64,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            folders: 0,
            documents: 0,
            ignored: 0,
        }
    }

    pub fn record_folder(&mut self) {
        self.folders += 1;
    }

    pub fn record_document(&mut self) {
        self.documents += 1;
    }

    pub fn record_ignored(&mut self) {
        self.ignored += 1;
    }

    pub fn nodes_found(&self) -> u64 {
        self.folders + self.documents
    }

    pub fn snapshot(&self, current: Option<&NodeId>) -> ScanProgress {
        ScanProgress {
            nodes_found: self.nodes_found(),
            folders: self.folders,
            documents: self.documents,
            ignored: self.ignored,
            current: current.cloned(),
            elapsed: self.start_time.elapsed(),
        }
    }
}
