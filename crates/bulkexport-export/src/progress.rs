//! Progress and report types for export runs.

use std::time::Duration;

use serde::Serialize;

use bulkexport_core::NodeId;

/// What exporting a set of nodes wrote (or deliberately did not write).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ExportCounters {
    /// Folders whose directory and sidecar were handled.
    pub folders: u64,
    /// Documents exported (head only or with history).
    pub documents: u64,
    /// Revision files handled in full-history mode.
    pub revisions: u64,
    /// Content files left alone because they already existed.
    pub content_skipped: u64,
    /// Sidecars left alone because they already existed.
    pub sidecars_skipped: u64,
    /// Documents without a content stream.
    pub placeholders: u64,
    /// Bytes of content and metadata written.
    pub bytes_written: u64,
}

impl ExportCounters {
    /// Add another set of counters into this one.
    pub fn merge(&mut self, other: &ExportCounters) {
        self.folders += other.folders;
        self.documents += other.documents;
        self.revisions += other.revisions;
        self.content_skipped += other.content_skipped;
        self.sidecars_skipped += other.sidecars_skipped;
        self.placeholders += other.placeholders;
        self.bytes_written += other.bytes_written;
    }

    /// Nodes successfully exported.
    pub fn nodes(&self) -> u64 {
        self.folders + self.documents
    }
}

/// A node that could not be exported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeFailure {
    /// Task the node belonged to.
    pub task: usize,
    /// The node.
    pub node: NodeId,
    /// Error description.
    pub message: String,
}

/// How a task ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TaskStatus {
    /// Every node was attempted. Individual nodes may still have failed.
    Completed,
    /// The task stopped early (authentication failure or panic).
    Failed { message: String },
}

/// Outcome of one export task.
#[derive(Debug, Clone, Serialize)]
pub struct TaskReport {
    pub task_number: usize,
    /// Nodes assigned to the task.
    pub nodes: usize,
    pub counters: ExportCounters,
    pub failures: Vec<NodeFailure>,
    pub status: TaskStatus,
}

impl TaskReport {
    /// A report for a task that has not exported anything yet.
    pub fn new(task_number: usize, nodes: usize) -> Self {
        Self {
            task_number,
            nodes,
            counters: ExportCounters::default(),
            failures: Vec::new(),
            status: TaskStatus::Completed,
        }
    }

    /// Check if the task stopped early.
    pub fn is_failed(&self) -> bool {
        matches!(self.status, TaskStatus::Failed { .. })
    }
}

/// Progress information while tasks complete.
#[derive(Debug, Clone, Default)]
pub struct ExportProgress {
    /// Tasks finished so far, in completion order.
    pub tasks_completed: usize,
    /// Tasks dispatched in this run.
    pub tasks_total: usize,
    /// Nodes exported by finished tasks.
    pub nodes_exported: u64,
    /// Nodes that failed in finished tasks.
    pub nodes_failed: u64,
    /// Task that just finished.
    pub last_task: Option<usize>,
}

impl ExportProgress {
    /// Get the progress as a percentage (0.0 to 100.0).
    pub fn percentage(&self) -> f64 {
        if self.tasks_total > 0 {
            (self.tasks_completed as f64 / self.tasks_total as f64) * 100.0
        } else {
            0.0
        }
    }
}

/// Summary of a completed export run.
#[derive(Debug, Clone, Serialize)]
pub struct ExportReport {
    /// Root the node list was built from.
    pub root: NodeId,
    /// Nodes in the list.
    pub nodes_total: usize,
    /// Whether the list came from the cache.
    pub from_cache: bool,
    /// Tasks dispatched.
    pub tasks: usize,
    /// Totals over every task.
    pub counters: ExportCounters,
    /// Nodes that failed, by task.
    pub failures: Vec<NodeFailure>,
    /// Tasks that stopped early, with their reason.
    pub failed_tasks: Vec<(usize, String)>,
    /// Wall clock time of the whole run.
    pub elapsed: Duration,
}

impl ExportReport {
    /// Aggregate task reports, ordered by task number.
    pub fn from_tasks(
        root: NodeId,
        nodes_total: usize,
        from_cache: bool,
        mut reports: Vec<TaskReport>,
        elapsed: Duration,
    ) -> Self {
        reports.sort_by_key(|r| r.task_number);

        let mut counters = ExportCounters::default();
        let mut failures = Vec::new();
        let mut failed_tasks = Vec::new();
        for report in &reports {
            counters.merge(&report.counters);
            failures.extend(report.failures.iter().cloned());
            if let TaskStatus::Failed { message } = &report.status {
                failed_tasks.push((report.task_number, message.clone()));
            }
        }

        Self {
            root,
            nodes_total,
            from_cache,
            tasks: reports.len(),
            counters,
            failures,
            failed_tasks,
            elapsed,
        }
    }

    /// Check if every task completed and every node exported.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && self.failed_tasks.is_empty()
    }

    /// Get a short human-readable summary.
    pub fn summary(&self) -> String {
        let mut summary = format!(
            "Exported {} of {} nodes in {} tasks",
            self.counters.nodes(),
            self.nodes_total,
            self.tasks
        );
        if !self.failures.is_empty() {
            summary.push_str(&format!(", {} failed", self.failures.len()));
        }
        if !self.failed_tasks.is_empty() {
            summary.push_str(&format!(", {} tasks aborted", self.failed_tasks.len()));
        }
        summary
    }
}
