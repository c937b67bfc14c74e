//! Repository node types.

use std::fmt;

use compact_str::CompactString;
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use strum::Display;

/// Opaque, stable identifier for a repository entry (e.g. `workspace://SpacesStore/<uuid>`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(CompactString);

impl NodeId {
    /// Create a new NodeId from its string form.
    pub fn new(id: impl Into<CompactString>) -> Self {
        Self(id.into())
    }

    /// Get the full string form of this id.
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Last `/`-separated segment of the id (the uuid part of a store reference).
    pub fn local_part(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or_default()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for NodeId {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// Classification of a node as reported by the repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
pub enum NodeKind {
    /// Container node, exported as a directory.
    Folder,
    /// Content node, exported as a file (optionally with revisions).
    Document,
}

impl NodeKind {
    /// Check if this is a folder.
    pub fn is_folder(&self) -> bool {
        matches!(self, NodeKind::Folder)
    }
}

/// Read-only view of a node, built on demand from the repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRecord {
    /// Folder or document.
    pub kind: NodeKind,

    /// Prefixed type name (e.g. `cm:content`).
    pub node_type: String,

    /// Prefixed aspect names, in repository order.
    pub aspects: IndexSet<String>,

    /// Prefixed property names to their string form, in repository order.
    pub properties: IndexMap<String, String>,

    /// Slash-separated display path, unique per node at scan time.
    pub path: String,
}

impl NodeRecord {
    /// Create a folder record with no aspects or properties.
    pub fn folder(node_type: impl Into<String>, path: impl Into<String>) -> Self {
        Self::new(NodeKind::Folder, node_type, path)
    }

    /// Create a document record with no aspects or properties.
    pub fn document(node_type: impl Into<String>, path: impl Into<String>) -> Self {
        Self::new(NodeKind::Document, node_type, path)
    }

    fn new(kind: NodeKind, node_type: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            kind,
            node_type: node_type.into(),
            aspects: IndexSet::new(),
            properties: IndexMap::new(),
            path: path.into(),
        }
    }

    /// Check if this record is a folder.
    pub fn is_folder(&self) -> bool {
        self.kind.is_folder()
    }

    /// Add an aspect.
    pub fn with_aspect(mut self, aspect: impl Into<String>) -> Self {
        self.aspects.insert(aspect.into());
        self
    }

    /// Add or replace a property.
    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }
}

/// One historical state of a versioned document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Revision {
    /// Dotted `major.minor` label. `None` when the repository lost it.
    pub label: Option<String>,

    /// Check-in comment.
    pub comment: String,

    /// Node holding this revision's frozen content and metadata.
    pub content_node: NodeId,
}

impl Revision {
    /// Create a labelled revision.
    pub fn new(
        label: impl Into<String>,
        comment: impl Into<String>,
        content_node: impl Into<NodeId>,
    ) -> Self {
        Self {
            label: Some(label.into()),
            comment: comment.into(),
            content_node: content_node.into(),
        }
    }
}
