//! Running export tasks on a fixed-size worker pool.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use rayon::prelude::*;
use tokio::sync::broadcast;
use tracing::{debug, error, info};

use bulkexport_core::{EngineError, ExportConfig, Repository, RepositoryError, Session};

use crate::exporter::NodeExporter;
use crate::partition::ExportTask;
use crate::progress::{ExportProgress, NodeFailure, TaskReport, TaskStatus};

/// Nodes exported between two "remaining" log lines within a task.
const REMAINING_LOG_INTERVAL: usize = 100;

/// Channel capacity for export progress updates.
pub const PROGRESS_CHANNEL_SIZE: usize = 100;

/// Dispatches export tasks to `threads` workers and waits for all of them.
///
/// Each task runs on a single worker, exports its nodes in order and owns its
/// own [`Session`]. A node that fails or panics is recorded and the task
/// moves on; a task that cannot authenticate or panics outside a node export
/// is recorded as failed without affecting its siblings.
pub struct TaskExecutor {
    threads: usize,
    progress_tx: broadcast::Sender<ExportProgress>,
}

impl TaskExecutor {
    /// Create an executor with a pool of `threads` workers (at least one).
    pub fn new(threads: usize) -> Self {
        let (progress_tx, _) = broadcast::channel(PROGRESS_CHANNEL_SIZE);
        Self {
            threads: threads.max(1),
            progress_tx,
        }
    }

    /// Subscribe to progress updates, sent each time a task finishes.
    pub fn subscribe(&self) -> broadcast::Receiver<ExportProgress> {
        self.progress_tx.subscribe()
    }

    /// Run every task to completion and return their reports in task order.
    ///
    /// Blocks until the last task has finished. Only failing to start the
    /// worker pool is an error.
    pub fn run<R>(
        &self,
        repository: &R,
        config: &ExportConfig,
        tasks: &[ExportTask],
    ) -> Result<Vec<TaskReport>, EngineError>
    where
        R: Repository + ?Sized,
    {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.threads)
            .thread_name(|i| format!("bulkexport-worker-{i}"))
            .build()
            .map_err(|e| EngineError::WorkerPool {
                message: e.to_string(),
            })?;

        info!(
            tasks = tasks.len(),
            threads = self.threads,
            "Dispatching export tasks"
        );

        let total = tasks.len();
        let completed = AtomicUsize::new(0);
        let exported = AtomicU64::new(0);
        let failed = AtomicU64::new(0);

        let reports = pool.install(|| {
            tasks
                .par_iter()
                .with_max_len(1)
                .map(|task| {
                    let report = run_task(repository, config, task);

                    let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
                    exported.fetch_add(report.counters.nodes(), Ordering::Relaxed);
                    failed.fetch_add(report.failures.len() as u64, Ordering::Relaxed);
                    let _ = self.progress_tx.send(ExportProgress {
                        tasks_completed: done,
                        tasks_total: total,
                        nodes_exported: exported.load(Ordering::Relaxed),
                        nodes_failed: failed.load(Ordering::Relaxed),
                        last_task: Some(task.task_number),
                    });

                    report
                })
                .collect::<Vec<_>>()
        });

        info!(tasks = reports.len(), "All export tasks finished");
        Ok(reports)
    }
}

/// Run one task, containing any panic at the task boundary.
fn run_task<R>(repository: &R, config: &ExportConfig, task: &ExportTask) -> TaskReport
where
    R: Repository + ?Sized,
{
    let mut report = TaskReport::new(task.task_number, task.len());

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        export_nodes(repository, config, task, &mut report)
    }));

    match outcome {
        Ok(Ok(())) => {
            info!(
                task = task.task_number,
                exported = report.counters.nodes(),
                failed = report.failures.len(),
                "Task finished"
            );
        }
        Ok(Err(e)) => {
            error!(task = task.task_number, error = %e, "Task could not start");
            report.status = TaskStatus::Failed {
                message: e.to_string(),
            };
        }
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            error!(task = task.task_number, panic = %message, "Task aborted");
            report.status = TaskStatus::Failed {
                message: format!("task panicked: {message}"),
            };
        }
    }

    report
}

fn export_nodes<R>(
    repository: &R,
    config: &ExportConfig,
    task: &ExportTask,
    report: &mut TaskReport,
) -> Result<(), RepositoryError>
where
    R: Repository + ?Sized,
{
    let session = Session::for_task(config.principal.as_str(), task.task_number);
    repository.authenticate(&session)?;
    debug!(task = task.task_number, principal = session.principal(), "Session opened");

    info!(task = task.task_number, nodes = task.len(), "Task started");
    let exporter = NodeExporter::new(repository, &session, config);

    for (index, node) in task.nodes.iter().enumerate() {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| exporter.export(node)));
        let message = match outcome {
            Ok(Ok(counters)) => {
                report.counters.merge(&counters);
                None
            }
            Ok(Err(e)) => {
                error!(task = task.task_number, node = %node, error = %e, "Node export failed");
                Some(e.to_string())
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!(task = task.task_number, node = %node, panic = %message, "Node export panicked");
                Some(format!("panicked: {message}"))
            }
        };
        if let Some(message) = message {
            report.failures.push(NodeFailure {
                task: task.task_number,
                node: node.clone(),
                message,
            });
        }

        let done = index + 1;
        if done % REMAINING_LOG_INTERVAL == 0 && done < task.len() {
            info!(
                task = task.task_number,
                remaining = task.len() - done,
                "Nodes remaining in task"
            );
        }
    }

    debug!(task = task.task_number, "Session closed");
    Ok(())
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
