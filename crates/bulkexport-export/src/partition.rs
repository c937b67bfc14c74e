//! Splitting the node list into export tasks.

use bulkexport_core::NodeId;

/// A contiguous slice of the node list, exported by one worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportTask {
    /// 1-based task number, used in logs and reports.
    pub task_number: usize,
    /// Nodes to export, in scan order.
    pub nodes: Vec<NodeId>,
}

impl ExportTask {
    /// Number of nodes in the task.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Check if the task has no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Split `nodes` into `ceil(len / chunk_size)` tasks of at most `chunk_size`
/// nodes each. Task *i* covers `[(i-1)*chunk_size, min(i*chunk_size, len))`.
///
/// A zero chunk size is treated as one.
pub fn partition(nodes: &[NodeId], chunk_size: usize) -> Vec<ExportTask> {
    nodes
        .chunks(chunk_size.max(1))
        .enumerate()
        .map(|(i, chunk)| ExportTask {
            task_number: i + 1,
            nodes: chunk.to_vec(),
        })
        .collect()
}
