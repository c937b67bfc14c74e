//! In-memory repository with failure injection.

use std::collections::{HashMap, HashSet};
use std::io::Cursor;

use bulkexport_core::{
    ContentStream, NodeId, NodeKind, NodeRecord, Repository, RepositoryError, Revision, Session,
};

const ID_PREFIX: &str = "memory://store/";

/// Repository call that can be made to fail for a given node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailurePoint {
    Kind,
    NodeType,
    Children,
    Record,
    Content,
    History,
}

#[derive(Debug, Clone)]
struct MemoryNode {
    record: NodeRecord,
    children: Vec<NodeId>,
    content: Option<Vec<u8>>,
    history: Option<Vec<Revision>>,
}

/// Repository held entirely in memory.
///
/// Built with `&mut self` methods, then shared read-only (typically in an
/// `Arc`) with the scanner and the export workers.
#[derive(Debug, Default)]
pub struct MemoryRepository {
    nodes: HashMap<NodeId, MemoryNode>,
    failures: HashSet<(NodeId, FailurePoint)>,
    panics: HashSet<NodeId>,
    denied: HashSet<String>,
    next_id: u64,
}

impl MemoryRepository {
    /// Create an empty repository.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of nodes, revisions included.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Check if the repository holds no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn allocate(&mut self) -> NodeId {
        self.next_id += 1;
        NodeId::new(format!("{ID_PREFIX}{:08}", self.next_id))
    }

    fn insert(&mut self, record: NodeRecord, content: Option<Vec<u8>>) -> NodeId {
        let id = self.allocate();
        self.nodes.insert(
            id.clone(),
            MemoryNode {
                record,
                children: Vec::new(),
                content,
                history: None,
            },
        );
        id
    }

    fn child_path(&self, parent: &NodeId, name: &str) -> String {
        let parent_path = self
            .nodes
            .get(parent)
            .map(|n| n.record.path.as_str())
            .unwrap_or_default();
        format!("{parent_path}/{name}")
    }

    /// Add a top-level folder at `/<name>`.
    pub fn add_root(&mut self, name: &str) -> NodeId {
        let record = NodeRecord::folder("cm:folder", format!("/{name}")).with_property("cm:name", name);
        self.insert(record, None)
    }

    /// Add a child node of any kind and type.
    pub fn add_node(
        &mut self,
        parent: &NodeId,
        name: &str,
        kind: NodeKind,
        node_type: &str,
        content: Option<Vec<u8>>,
    ) -> NodeId {
        let path = self.child_path(parent, name);
        let record = match kind {
            NodeKind::Folder => NodeRecord::folder(node_type, path),
            NodeKind::Document => NodeRecord::document(node_type, path),
        }
        .with_property("cm:name", name);

        let id = self.insert(record, content);
        if let Some(node) = self.nodes.get_mut(parent) {
            node.children.push(id.clone());
        }
        id
    }

    /// Add a `cm:folder` child.
    pub fn add_folder(&mut self, parent: &NodeId, name: &str) -> NodeId {
        self.add_node(parent, name, NodeKind::Folder, "cm:folder", None)
    }

    /// Add a `cm:content` child with content.
    pub fn add_document(&mut self, parent: &NodeId, name: &str, content: impl Into<Vec<u8>>) -> NodeId {
        self.add_node(
            parent,
            name,
            NodeKind::Document,
            "cm:content",
            Some(content.into()),
        )
    }

    /// Add a `cm:content` child without a content stream.
    pub fn add_placeholder(&mut self, parent: &NodeId, name: &str) -> NodeId {
        self.add_node(parent, name, NodeKind::Document, "cm:content", None)
    }

    /// Record a new revision of a document, stored as its own frozen node.
    pub fn add_revision(
        &mut self,
        document: &NodeId,
        label: &str,
        content: impl Into<Vec<u8>>,
    ) -> NodeId {
        self.push_revision(document, Some(label), content.into())
    }

    /// Record a revision whose label went missing.
    pub fn add_unlabelled_revision(&mut self, document: &NodeId, content: impl Into<Vec<u8>>) -> NodeId {
        self.push_revision(document, None, content.into())
    }

    fn push_revision(&mut self, document: &NodeId, label: Option<&str>, content: Vec<u8>) -> NodeId {
        let mut record = match self.nodes.get(document) {
            Some(node) => node.record.clone(),
            None => NodeRecord::document("cm:content", ""),
        };
        if let Some(label) = label {
            record = record
                .with_aspect("cm:versionable")
                .with_property("cm:versionLabel", label);
        }

        let frozen = self.insert(record, Some(content));
        if let Some(node) = self.nodes.get_mut(document) {
            node.record.aspects.insert("cm:versionable".to_string());
            node.history.get_or_insert_with(Vec::new).push(Revision {
                label: label.map(str::to_string),
                comment: String::new(),
                content_node: frozen.clone(),
            });
        }
        frozen
    }

    /// Report an empty (but present) version history for a document.
    pub fn set_empty_history(&mut self, document: &NodeId) {
        if let Some(node) = self.nodes.get_mut(document) {
            node.history = Some(Vec::new());
        }
    }

    /// Mutable access to a node's record, to add aspects or properties.
    pub fn record_mut(&mut self, node: &NodeId) -> Option<&mut NodeRecord> {
        self.nodes.get_mut(node).map(|n| &mut n.record)
    }

    /// Make a repository call fail for a node.
    #[cfg(any(test, feature = "test-util"))]
    pub fn fail(&mut self, node: &NodeId, point: FailurePoint) {
        self.failures.insert((node.clone(), point));
    }

    /// Make `record` panic for a node.
    #[cfg(any(test, feature = "test-util"))]
    pub fn panic_on_record(&mut self, node: &NodeId) {
        self.panics.insert(node.clone());
    }

    /// Refuse sessions for a principal.
    #[cfg(any(test, feature = "test-util"))]
    pub fn deny(&mut self, principal: &str) {
        self.denied.insert(principal.to_string());
    }

    fn lookup(&self, node: &NodeId, point: FailurePoint) -> Result<&MemoryNode, RepositoryError> {
        if self.failures.contains(&(node.clone(), point)) {
            return Err(RepositoryError::backend(node, format!("injected {point:?} failure")));
        }
        self.nodes
            .get(node)
            .ok_or_else(|| RepositoryError::NotFound { node: node.clone() })
    }
}

impl Repository for MemoryRepository {
    fn authenticate(&self, session: &Session) -> Result<(), RepositoryError> {
        if self.denied.contains(session.principal()) {
            return Err(RepositoryError::Authentication {
                principal: session.principal().to_string(),
                message: "principal is disabled".to_string(),
            });
        }
        Ok(())
    }

    fn kind(&self, _session: &Session, node: &NodeId) -> Result<NodeKind, RepositoryError> {
        Ok(self.lookup(node, FailurePoint::Kind)?.record.kind)
    }

    fn node_type(&self, _session: &Session, node: &NodeId) -> Result<String, RepositoryError> {
        Ok(self.lookup(node, FailurePoint::NodeType)?.record.node_type.clone())
    }

    fn children(&self, _session: &Session, node: &NodeId) -> Result<Vec<NodeId>, RepositoryError> {
        Ok(self.lookup(node, FailurePoint::Children)?.children.clone())
    }

    fn record(&self, _session: &Session, node: &NodeId) -> Result<NodeRecord, RepositoryError> {
        if self.panics.contains(node) {
            panic!("record lookup exploded for {node}");
        }
        Ok(self.lookup(node, FailurePoint::Record)?.record.clone())
    }

    fn open_content(
        &self,
        _session: &Session,
        node: &NodeId,
    ) -> Result<Option<ContentStream>, RepositoryError> {
        let stored = self.lookup(node, FailurePoint::Content)?;
        Ok(stored
            .content
            .clone()
            .map(|bytes| Box::new(Cursor::new(bytes)) as ContentStream))
    }

    fn version_history(
        &self,
        _session: &Session,
        node: &NodeId,
    ) -> Result<Option<Vec<Revision>>, RepositoryError> {
        Ok(self.lookup(node, FailurePoint::History)?.history.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    fn session() -> Session {
        Session::scan("admin")
    }

    #[test]
    fn test_tree_building() {
        let mut repo = MemoryRepository::new();
        let root = repo.add_root("Company Home");
        let folder = repo.add_folder(&root, "Sites");
        let doc = repo.add_document(&folder, "a.txt", "hello");

        assert_eq!(repo.children(&session(), &root).unwrap(), vec![folder.clone()]);
        let record = repo.record(&session(), &doc).unwrap();
        assert_eq!(record.path, "/Company Home/Sites/a.txt");
        assert_eq!(repo.kind(&session(), &doc).unwrap(), NodeKind::Document);

        let mut content = String::new();
        repo.open_content(&session(), &doc)
            .unwrap()
            .unwrap()
            .read_to_string(&mut content)
            .unwrap();
        assert_eq!(content, "hello");
    }

    #[test]
    fn test_revisions_are_frozen_nodes() {
        let mut repo = MemoryRepository::new();
        let root = repo.add_root("r");
        let doc = repo.add_document(&root, "d.txt", "v3");
        let v1 = repo.add_revision(&doc, "1.0", "v1");
        repo.add_revision(&doc, "1.1", "v2");

        let history = repo.version_history(&session(), &doc).unwrap().unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].content_node, v1);
        assert_eq!(
            repo.record(&session(), &v1).unwrap().properties.get("cm:versionLabel"),
            Some(&"1.0".to_string())
        );
        // frozen nodes never appear as children
        assert_eq!(repo.children(&session(), &root).unwrap().len(), 1);
    }

    #[test]
    fn test_injected_failures() {
        let mut repo = MemoryRepository::new();
        let root = repo.add_root("r");
        repo.fail(&root, FailurePoint::Children);
        repo.deny("guest");

        assert!(matches!(
            repo.children(&session(), &root),
            Err(RepositoryError::Backend { .. })
        ));
        assert!(repo.record(&session(), &root).is_ok());
        assert!(repo.authenticate(&Session::scan("guest")).is_err());
        assert!(matches!(
            repo.kind(&session(), &NodeId::new("memory://store/missing")),
            Err(RepositoryError::NotFound { .. })
        ));
    }
}
