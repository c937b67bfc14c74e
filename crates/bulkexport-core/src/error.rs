//! Error types for scanning, caching and exporting.

use std::path::PathBuf;

use thiserror::Error;

use crate::node::NodeId;

/// Errors reported by a repository implementation.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// The node does not exist (or is no longer visible).
    #[error("Node not found: {node}")]
    NotFound { node: NodeId },

    /// The session principal may not read the node.
    #[error("Access denied for {principal} on {node}")]
    AccessDenied { node: NodeId, principal: String },

    /// The session could not be established.
    #[error("Authentication failed for {principal}: {message}")]
    Authentication { principal: String, message: String },

    /// I/O failure while reading repository data.
    #[error("I/O error reading {node}: {source}")]
    Io {
        node: NodeId,
        #[source]
        source: std::io::Error,
    },

    /// Other backend failure.
    #[error("Repository error on {node}: {message}")]
    Backend { node: NodeId, message: String },
}

impl RepositoryError {
    /// Create an I/O error with node context.
    pub fn io(node: &NodeId, source: std::io::Error) -> Self {
        match source.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound { node: node.clone() },
            _ => Self::Io {
                node: node.clone(),
                source,
            },
        }
    }

    /// Create a backend error with node context.
    pub fn backend(node: &NodeId, message: impl Into<String>) -> Self {
        Self::Backend {
            node: node.clone(),
            message: message.into(),
        }
    }
}

/// Fatal errors while enumerating the nodes under a root.
#[derive(Debug, Error)]
pub enum ScanError {
    /// A repository call failed during traversal.
    #[error("Scan aborted at {node}: {source}")]
    Repository {
        node: NodeId,
        #[source]
        source: RepositoryError,
    },
}

/// Errors reading or writing the node list cache.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The cache file exists but could not be read or written.
    #[error("Cache I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The cache file exists but is not a valid cache.
    #[error("Corrupt node cache {path} (line {line}): {reason}")]
    Corrupt {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    /// A node id cannot be represented in the cache format.
    #[error("Node id cannot be cached: {id:?}")]
    InvalidId { id: String },
}

impl CacheError {
    /// Create an I/O error with path context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a corruption error.
    pub fn corrupt(path: impl Into<PathBuf>, line: usize, reason: impl Into<String>) -> Self {
        Self::Corrupt {
            path: path.into(),
            line,
            reason: reason.into(),
        }
    }
}

/// Errors resolving revision labels.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VersionError {
    /// No revisions to choose a head from.
    #[error("No revisions available")]
    Empty,

    /// A revision carries no label.
    #[error("Revision for node was not found (missing label)")]
    MissingLabel,

    /// A label is not of the form `major[.minor]`.
    #[error("Invalid revision label: {label:?}")]
    InvalidLabel { label: String },
}

/// Errors exporting a single node. Never fatal to the task or the run.
#[derive(Debug, Error)]
pub enum NodeExportError {
    /// Repository lookup failed for this node.
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    /// Revision resolution failed for this node.
    #[error(transparent)]
    Version(#[from] VersionError),

    /// Writing to the output tree failed.
    #[error("Write failed at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The display path cannot be mapped under the base directory.
    #[error("Invalid node path {path:?}: {reason}")]
    InvalidPath { path: String, reason: String },
}

impl NodeExportError {
    /// Create an I/O error with path context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Invalid or unreadable configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A value failed validation.
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    /// The configuration file could not be read.
    #[error("Cannot read configuration {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid TOML for this schema.
    #[error("Cannot parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Run-fatal errors surfaced by the engine.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Scan(#[from] ScanError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The worker pool could not be started.
    #[error("Cannot start worker pool: {message}")]
    WorkerPool { message: String },
}
