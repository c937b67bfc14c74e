//! Depth-first discovery of every exportable node under a root.

use tokio::sync::broadcast;
use tracing::{debug, info};

use bulkexport_core::{IgnoreRules, NodeId, NodeKind, Repository, Session, ScanError};

use crate::progress::{ProgressTracker, ScanProgress};

/// Nodes visited between two progress broadcasts.
const PROGRESS_INTERVAL: u64 = 1000;

/// Walks a repository tree and returns the nodes to export, folders first.
///
/// Traversal is pre-order (a folder precedes its descendants) and children
/// keep repository order. A pending-node stack replaces recursion so very deep
/// trees cannot overflow the call stack.
pub struct TreeScanner {
    ignore: IgnoreRules,
    progress_tx: broadcast::Sender<ScanProgress>,
}

impl TreeScanner {
    /// Create a scanner applying the given ignore rules.
    pub fn new(ignore: IgnoreRules) -> Self {
        let (progress_tx, _) = broadcast::channel(100);
        Self {
            ignore,
            progress_tx,
        }
    }

    /// Subscribe to scan progress updates.
    pub fn subscribe(&self) -> broadcast::Receiver<ScanProgress> {
        self.progress_tx.subscribe()
    }

    /// Enumerate the nodes under `root`.
    ///
    /// A node whose type is ignored is dropped together with its whole
    /// subtree. Any repository failure aborts the scan; nothing partial is
    /// returned.
    pub fn scan<R>(
        &self,
        repository: &R,
        session: &Session,
        root: &NodeId,
    ) -> Result<Vec<NodeId>, ScanError>
    where
        R: Repository + ?Sized,
    {
        info!(root = %root, "Finding all nodes to export");

        let mut tracker = ProgressTracker::new();
        let mut nodes = Vec::new();
        let mut pending = vec![root.clone()];

        while let Some(node) = pending.pop() {
            let fail = |source| ScanError::Repository {
                node: node.clone(),
                source,
            };

            let node_type = repository.node_type(session, &node).map_err(fail)?;
            if self.ignore.is_type_ignored(&node_type) {
                debug!(node = %node, node_type = %node_type, "Ignoring subtree");
                tracker.record_ignored();
                continue;
            }

            match repository.kind(session, &node).map_err(fail)? {
                NodeKind::Folder => {
                    let children = repository.children(session, &node).map_err(fail)?;
                    tracker.record_folder();
                    nodes.push(node);
                    pending.extend(children.into_iter().rev());
                }
                NodeKind::Document => {
                    tracker.record_document();
                    nodes.push(node);
                }
            }

            if tracker.nodes_found() % PROGRESS_INTERVAL == 0 {
                let _ = self.progress_tx.send(tracker.snapshot(nodes.last()));
            }
        }

        let summary = tracker.snapshot(None);
        info!(
            nodes = summary.nodes_found,
            folders = summary.folders,
            documents = summary.documents,
            ignored = summary.ignored,
            elapsed_ms = summary.elapsed.as_millis() as u64,
            "Nodes to export"
        );
        let _ = self.progress_tx.send(summary);

        Ok(nodes)
    }
}

impl Default for TreeScanner {
    fn default() -> Self {
        Self::new(IgnoreRules::default())
    }
}
