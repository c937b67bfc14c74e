//! The repository service contract consumed by the export engine.

use std::io::Read;

use compact_str::CompactString;

use crate::error::RepositoryError;
use crate::node::{NodeId, NodeKind, NodeRecord, Revision};

/// Streaming content reader handed out by a repository.
pub type ContentStream = Box<dyn Read + Send>;

/// Caller identity for repository calls.
///
/// Each export task builds its own session and drops it when the task ends,
/// so no identity is shared between workers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    principal: CompactString,
    task: Option<usize>,
}

impl Session {
    /// Session used by the single-threaded scan phase.
    pub fn scan(principal: impl Into<CompactString>) -> Self {
        Self {
            principal: principal.into(),
            task: None,
        }
    }

    /// Session owned by one export task.
    pub fn for_task(principal: impl Into<CompactString>, task: usize) -> Self {
        Self {
            principal: principal.into(),
            task: Some(task),
        }
    }

    /// Principal the calls are made as.
    pub fn principal(&self) -> &str {
        &self.principal
    }

    /// Task number, or `None` during the scan.
    pub fn task(&self) -> Option<usize> {
        self.task
    }
}

/// Read-only access to a hierarchical content repository.
///
/// Implementations must tolerate concurrent calls from several worker
/// threads, each with its own [`Session`].
pub trait Repository: Send + Sync {
    /// Establish the session before any other call. Defaults to accepting it.
    fn authenticate(&self, _session: &Session) -> Result<(), RepositoryError> {
        Ok(())
    }

    /// Classify a node as folder or document.
    fn kind(&self, session: &Session, node: &NodeId) -> Result<NodeKind, RepositoryError>;

    /// Prefixed type name of a node (e.g. `cm:folder`).
    fn node_type(&self, session: &Session, node: &NodeId) -> Result<String, RepositoryError>;

    /// Direct children of a folder, in repository order.
    fn children(&self, session: &Session, node: &NodeId) -> Result<Vec<NodeId>, RepositoryError>;

    /// Full record (type, aspects, properties, display path) of a node.
    fn record(&self, session: &Session, node: &NodeId) -> Result<NodeRecord, RepositoryError>;

    /// Open the node's content. `None` means the node has no content stream.
    fn open_content(
        &self,
        session: &Session,
        node: &NodeId,
    ) -> Result<Option<ContentStream>, RepositoryError>;

    /// All revisions of a document. `None` means no version history exists.
    fn version_history(
        &self,
        session: &Session,
        node: &NodeId,
    ) -> Result<Option<Vec<Revision>>, RepositoryError>;
}

impl<R: Repository + ?Sized> Repository for std::sync::Arc<R> {
    fn authenticate(&self, session: &Session) -> Result<(), RepositoryError> {
        (**self).authenticate(session)
    }

    fn kind(&self, session: &Session, node: &NodeId) -> Result<NodeKind, RepositoryError> {
        (**self).kind(session, node)
    }

    fn node_type(&self, session: &Session, node: &NodeId) -> Result<String, RepositoryError> {
        (**self).node_type(session, node)
    }

    fn children(&self, session: &Session, node: &NodeId) -> Result<Vec<NodeId>, RepositoryError> {
        (**self).children(session, node)
    }

    fn record(&self, session: &Session, node: &NodeId) -> Result<NodeRecord, RepositoryError> {
        (**self).record(session, node)
    }

    fn open_content(
        &self,
        session: &Session,
        node: &NodeId,
    ) -> Result<Option<ContentStream>, RepositoryError> {
        (**self).open_content(session, node)
    }

    fn version_history(
        &self,
        session: &Session,
        node: &NodeId,
    ) -> Result<Option<Vec<Revision>>, RepositoryError> {
        (**self).version_history(session, node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_scopes() {
        let scan = Session::scan("admin");
        assert_eq!(scan.principal(), "admin");
        assert_eq!(scan.task(), None);

        let task = Session::for_task("admin", 3);
        assert_eq!(task.task(), Some(3));
        assert_ne!(scan, task);
    }
}
