//! Writing one node into the output tree.

use std::collections::HashSet;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use bulkexport_core::{
    ExportConfig, NodeExportError, NodeId, NodeKind, NodeRecord, Repository, Revision, Session,
    head_of,
};

use crate::metadata::{append_to_path, sidecar_path, write_sidecar};
use crate::progress::ExportCounters;

/// Label given to the only revision of a document without version history.
pub const SYNTHETIC_HEAD_LABEL: &str = "1.0";

/// Exports single nodes for one task.
///
/// Holds the task's session; every repository call is made with it.
pub struct NodeExporter<'a, R: ?Sized> {
    repository: &'a R,
    session: &'a Session,
    config: &'a ExportConfig,
}

impl<'a, R> NodeExporter<'a, R>
where
    R: Repository + ?Sized,
{
    pub fn new(repository: &'a R, session: &'a Session, config: &'a ExportConfig) -> Self {
        Self {
            repository,
            session,
            config,
        }
    }

    /// Export a node according to its kind and the run configuration.
    ///
    /// Returns what was written. On error, files written before the failure
    /// are left in place.
    pub fn export(&self, node: &NodeId) -> Result<ExportCounters, NodeExportError> {
        let mut counters = ExportCounters::default();

        match self.repository.kind(self.session, node)? {
            NodeKind::Folder => self.export_folder(node, &mut counters)?,
            NodeKind::Document if self.config.export_versions => {
                self.export_history(node, &mut counters)?
            }
            NodeKind::Document => self.export_head(node, &mut counters)?,
        }

        Ok(counters)
    }

    fn export_folder(
        &self,
        node: &NodeId,
        counters: &mut ExportCounters,
    ) -> Result<(), NodeExportError> {
        let record = self.record(node)?;
        let target = self.target_path(&record.path)?;

        fs::create_dir_all(&target).map_err(|e| NodeExportError::io(&target, e))?;
        self.write_metadata(&target, &record, counters)?;

        counters.folders += 1;
        debug!(node = %node, path = %target.display(), "Exported folder");
        Ok(())
    }

    fn export_head(
        &self,
        node: &NodeId,
        counters: &mut ExportCounters,
    ) -> Result<(), NodeExportError> {
        let record = self.record(node)?;
        let target = self.target_path(&record.path)?;
        ensure_parent(&target)?;

        self.write_content(node, &target, counters)?;
        self.write_metadata(&target, &record, counters)?;

        counters.documents += 1;
        debug!(node = %node, path = %target.display(), "Exported document");
        Ok(())
    }

    fn export_history(
        &self,
        node: &NodeId,
        counters: &mut ExportCounters,
    ) -> Result<(), NodeExportError> {
        let record = self.record(node)?;
        let base_target = self.target_path(&record.path)?;

        let revisions = match self.repository.version_history(self.session, node)? {
            Some(revisions) => unique_labels(node, revisions),
            None => {
                debug!(node = %node, "No version history, exporting as {SYNTHETIC_HEAD_LABEL}");
                vec![Revision::new(SYNTHETIC_HEAD_LABEL, "", node.clone())]
            }
        };
        let head_label = head_of(&revisions)?.label.clone();

        ensure_parent(&base_target)?;
        for revision in &revisions {
            let label = revision.label.as_deref().unwrap_or_default();
            let is_head = head_label.as_deref() == Some(label);
            let target = self.revision_path(&base_target, label, is_head)?;

            let revision_record = if revision.content_node == *node {
                record.clone()
            } else {
                self.record(&revision.content_node)?
            };

            self.write_content(&revision.content_node, &target, counters)?;
            self.write_metadata(&target, &revision_record, counters)?;
            counters.revisions += 1;

            debug!(
                node = %node,
                label,
                head = is_head,
                path = %target.display(),
                "Exported revision"
            );
        }

        counters.documents += 1;
        Ok(())
    }

    /// Fetch a record with ignored aspects and properties removed.
    fn record(&self, node: &NodeId) -> Result<NodeRecord, NodeExportError> {
        let mut record = self.repository.record(self.session, node)?;
        self.config.ignore.filter_record(&mut record);
        Ok(record)
    }

    /// Map a display path under the base directory.
    ///
    /// Empty, `.` and `..` segments are rejected so nothing is written outside
    /// the base directory.
    fn target_path(&self, display_path: &str) -> Result<PathBuf, NodeExportError> {
        let invalid = |reason: &str| NodeExportError::InvalidPath {
            path: display_path.to_string(),
            reason: reason.to_string(),
        };

        let relative = display_path.strip_prefix('/').unwrap_or(display_path);
        if relative.is_empty() {
            return Err(invalid("empty path"));
        }

        let mut target = self.config.base_path.clone();
        for segment in relative.split('/') {
            match segment {
                "" => return Err(invalid("empty path segment")),
                "." | ".." => return Err(invalid("relative path segment")),
                s if s.contains('\\') || s.contains('\0') => {
                    return Err(invalid("reserved character in segment"));
                }
                s => target.push(s),
            }
        }
        Ok(target)
    }

    /// Output path of one revision: unsuffixed for the head unless head
    /// naming is on, `<path>.<label>` otherwise.
    fn revision_path(
        &self,
        base_target: &Path,
        label: &str,
        is_head: bool,
    ) -> Result<PathBuf, NodeExportError> {
        if is_head && !self.config.revision_head_naming {
            return Ok(base_target.to_path_buf());
        }
        if label.contains(['/', '\\', '\0']) {
            return Err(NodeExportError::InvalidPath {
                path: base_target.display().to_string(),
                reason: format!("revision label {label:?} is not a file name suffix"),
            });
        }
        Ok(append_to_path(base_target, &format!(".{label}")))
    }

    /// Stream a node's content to `target`.
    fn write_content(
        &self,
        content_node: &NodeId,
        target: &Path,
        counters: &mut ExportCounters,
    ) -> Result<(), NodeExportError> {
        if self.config.skip_existing && target.exists() {
            debug!(path = %target.display(), "Content exists, skipping");
            counters.content_skipped += 1;
            return Ok(());
        }

        let Some(mut stream) = self.repository.open_content(self.session, content_node)? else {
            debug!(node = %content_node, "No content stream, writing metadata only");
            counters.placeholders += 1;
            return Ok(());
        };

        let mut file = File::create(target).map_err(|e| NodeExportError::io(target, e))?;
        let written = io::copy(&mut stream, &mut file).map_err(|e| NodeExportError::io(target, e))?;
        counters.bytes_written += written;
        Ok(())
    }

    fn write_metadata(
        &self,
        target: &Path,
        record: &NodeRecord,
        counters: &mut ExportCounters,
    ) -> Result<(), NodeExportError> {
        if self.config.skip_existing && sidecar_path(target).exists() {
            debug!(path = %target.display(), "Metadata exists, skipping");
            counters.sidecars_skipped += 1;
            return Ok(());
        }

        let (_, written) =
            write_sidecar(target, record).map_err(|e| NodeExportError::io(sidecar_path(target), e))?;
        counters.bytes_written += written;
        Ok(())
    }
}

fn ensure_parent(target: &Path) -> Result<(), NodeExportError> {
    match target.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            fs::create_dir_all(parent).map_err(|e| NodeExportError::io(parent, e))
        }
        _ => Ok(()),
    }
}

/// Keep the first revision for each label so output paths stay unique.
fn unique_labels(node: &NodeId, revisions: Vec<Revision>) -> Vec<Revision> {
    let mut seen = HashSet::new();
    revisions
        .into_iter()
        .filter(|revision| match &revision.label {
            Some(label) if !seen.insert(label.clone()) => {
                warn!(node = %node, label = %label, "Duplicate revision label, keeping the first");
                false
            }
            _ => true,
        })
        .collect()
}
