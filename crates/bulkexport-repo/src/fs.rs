//! A local directory exposed as a repository.
//!
//! Directories are folders (`cm:folder`), regular files are documents
//! (`cm:content`). The version history of `dir/name` is read from
//! `dir/.versions/name/<label>`; an optional `<label>.comment` file next to a
//! revision holds its check-in comment. `.versions` directories are never
//! listed as children.
//!
//! Symbolic links are not followed: they are left out of `children` and any
//! id that names one directly is rejected. A link cycle or a link pointing
//! outside the source directory therefore never reaches an export.

use std::fs::{self, File, Metadata};
use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, SecondsFormat, Utc};
use tracing::{debug, warn};

use bulkexport_core::{
    ContentStream, NodeId, NodeKind, NodeRecord, Repository, RepositoryError, Revision, Session,
};

/// Scheme prefix of every node id handed out by [`FsRepository`].
pub const FS_SCHEME: &str = "fs://local/";

/// Name of the per-directory version store.
pub const VERSIONS_DIR: &str = ".versions";

const COMMENT_SUFFIX: &str = ".comment";

/// Repository backed by a directory tree.
#[derive(Debug, Clone)]
pub struct FsRepository {
    root: PathBuf,
    root_name: String,
}

impl FsRepository {
    /// Open a directory as a repository.
    pub fn open(root: impl AsRef<Path>) -> Result<Self, RepositoryError> {
        let root_id = NodeId::new(FS_SCHEME);
        let root = root
            .as_ref()
            .canonicalize()
            .map_err(|e| RepositoryError::io(&root_id, e))?;
        if !root.is_dir() {
            return Err(RepositoryError::backend(&root_id, "root is not a directory"));
        }
        let root_name = root
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "root".to_string());

        Ok(Self { root, root_name })
    }

    /// Id of the repository root.
    pub fn root_id(&self) -> NodeId {
        NodeId::new(FS_SCHEME)
    }

    /// Directory backing the repository.
    pub fn root_path(&self) -> &Path {
        &self.root
    }

    fn relative<'a>(&self, node: &'a NodeId) -> Result<&'a str, RepositoryError> {
        let rel = node
            .as_str()
            .strip_prefix(FS_SCHEME)
            .ok_or_else(|| RepositoryError::NotFound { node: node.clone() })?;

        let escapes = Path::new(rel)
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if escapes {
            return Err(RepositoryError::NotFound { node: node.clone() });
        }
        Ok(rel)
    }

    fn resolve(&self, node: &NodeId) -> Result<PathBuf, RepositoryError> {
        Ok(self.root.join(self.relative(node)?))
    }

    fn metadata(&self, node: &NodeId) -> Result<(PathBuf, Metadata), RepositoryError> {
        let path = self.resolve(node)?;
        let metadata = fs::symlink_metadata(&path).map_err(|e| RepositoryError::io(node, e))?;
        if metadata.file_type().is_symlink() {
            return Err(RepositoryError::backend(node, "symbolic links are not followed"));
        }
        Ok((path, metadata))
    }

    fn child_id(node: &NodeId, name: &str) -> NodeId {
        if node.as_str() == FS_SCHEME {
            NodeId::new(format!("{FS_SCHEME}{name}"))
        } else {
            NodeId::new(format!("{node}/{name}"))
        }
    }

    fn display_path(&self, rel: &str) -> String {
        if rel.is_empty() {
            format!("/{}", self.root_name)
        } else {
            format!("/{}/{rel}", self.root_name)
        }
    }

    fn versions_dir(path: &Path) -> Option<PathBuf> {
        let name = path.file_name()?;
        Some(path.parent()?.join(VERSIONS_DIR).join(name))
    }

    fn versions_rel(rel: &str) -> String {
        match rel.rsplit_once('/') {
            Some((parent, name)) => format!("{parent}/{VERSIONS_DIR}/{name}"),
            None => format!("{VERSIONS_DIR}/{rel}"),
        }
    }
}

fn rfc3339(time: std::io::Result<SystemTime>) -> Option<String> {
    time.ok()
        .map(|t| DateTime::<Utc>::from(t).to_rfc3339_opts(SecondsFormat::Millis, true))
}

impl Repository for FsRepository {
    fn kind(&self, _session: &Session, node: &NodeId) -> Result<NodeKind, RepositoryError> {
        let (_, metadata) = self.metadata(node)?;
        Ok(if metadata.is_dir() {
            NodeKind::Folder
        } else {
            NodeKind::Document
        })
    }

    fn node_type(&self, session: &Session, node: &NodeId) -> Result<String, RepositoryError> {
        Ok(match self.kind(session, node)? {
            NodeKind::Folder => "cm:folder".to_string(),
            NodeKind::Document => "cm:content".to_string(),
        })
    }

    fn children(&self, _session: &Session, node: &NodeId) -> Result<Vec<NodeId>, RepositoryError> {
        let path = self.resolve(node)?;
        let entries = fs::read_dir(&path).map_err(|e| RepositoryError::io(node, e))?;

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| RepositoryError::io(node, e))?;
            let file_type = entry.file_type().map_err(|e| RepositoryError::io(node, e))?;
            if file_type.is_symlink() {
                debug!(parent = %node, name = ?entry.file_name(), "Skipping symbolic link");
                continue;
            }
            match entry.file_name().into_string() {
                Ok(name) if name == VERSIONS_DIR => {}
                Ok(name) => names.push(name),
                Err(raw) => {
                    warn!(parent = %node, name = ?raw, "Skipping entry with non UTF-8 name");
                }
            }
        }
        names.sort();

        Ok(names.iter().map(|name| Self::child_id(node, name)).collect())
    }

    fn record(&self, session: &Session, node: &NodeId) -> Result<NodeRecord, RepositoryError> {
        let rel = self.relative(node)?;
        let (path, metadata) = self.metadata(node)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.root_name.clone());
        let display = self.display_path(rel);

        let mut record = if metadata.is_dir() {
            NodeRecord::folder("cm:folder", display)
        } else {
            NodeRecord::document("cm:content", display)
                .with_property("cm:contentSize", metadata.len().to_string())
        };

        record = record
            .with_aspect("cm:auditable")
            .with_aspect("sys:referenceable")
            .with_property("cm:name", name)
            .with_property(
                "sys:node-uuid",
                blake3::hash(node.as_str().as_bytes()).to_hex()[..32].to_string(),
            );
        if let Some(created) = rfc3339(metadata.created()) {
            record = record.with_property("cm:created", created);
        }
        if let Some(modified) = rfc3339(metadata.modified()) {
            record = record.with_property("cm:modified", modified);
        }

        if !metadata.is_dir() && self.version_history(session, node)?.is_some() {
            record = record.with_aspect("cm:versionable");
        }

        Ok(record)
    }

    fn open_content(
        &self,
        _session: &Session,
        node: &NodeId,
    ) -> Result<Option<ContentStream>, RepositoryError> {
        let (path, metadata) = self.metadata(node)?;
        if metadata.is_dir() {
            return Ok(None);
        }
        let file = File::open(&path).map_err(|e| RepositoryError::io(node, e))?;
        Ok(Some(Box::new(file)))
    }

    fn version_history(
        &self,
        _session: &Session,
        node: &NodeId,
    ) -> Result<Option<Vec<Revision>>, RepositoryError> {
        let rel = self.relative(node)?;
        let path = self.resolve(node)?;
        let Some(dir) = Self::versions_dir(&path) else {
            return Ok(None);
        };
        match fs::symlink_metadata(&dir) {
            Ok(metadata) if metadata.is_dir() => {}
            _ => return Ok(None),
        }

        let mut labels = Vec::new();
        for entry in fs::read_dir(&dir).map_err(|e| RepositoryError::io(node, e))? {
            let entry = entry.map_err(|e| RepositoryError::io(node, e))?;
            let Ok(label) = entry.file_name().into_string() else {
                continue;
            };
            let is_file = entry.file_type().is_ok_and(|t| t.is_file());
            if is_file && !label.ends_with(COMMENT_SUFFIX) {
                labels.push(label);
            }
        }
        labels.sort();

        let versions_rel = Self::versions_rel(rel);
        let revisions = labels
            .into_iter()
            .map(|label| {
                let comment = fs::read_to_string(dir.join(format!("{label}{COMMENT_SUFFIX}")))
                    .map(|c| c.trim_end().to_string())
                    .unwrap_or_default();
                let content_node = NodeId::new(format!("{FS_SCHEME}{versions_rel}/{label}"));
                Revision {
                    label: Some(label),
                    comment,
                    content_node,
                }
            })
            .collect::<Vec<_>>();

        debug!(node = %node, revisions = revisions.len(), "Read version history");
        Ok(Some(revisions))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use tempfile::TempDir;

    fn create_source() -> TempDir {
        let temp = TempDir::new().unwrap();
        let root = temp.path();

        fs::create_dir_all(root.join("docs/.versions/report.txt")).unwrap();
        fs::write(root.join("docs/report.txt"), "head").unwrap();
        fs::write(root.join("docs/.versions/report.txt/1.0"), "first").unwrap();
        fs::write(root.join("docs/.versions/report.txt/1.1"), "second").unwrap();
        fs::write(root.join("docs/.versions/report.txt/1.1.comment"), "fixed typo\n").unwrap();
        fs::write(root.join("readme.md"), "# hi").unwrap();

        temp
    }

    #[test]
    fn test_children_skip_version_store() {
        let temp = create_source();
        let repo = FsRepository::open(temp.path()).unwrap();
        let session = Session::scan("admin");

        let root_children = repo.children(&session, &repo.root_id()).unwrap();
        assert_eq!(
            root_children,
            vec![NodeId::new("fs://local/docs"), NodeId::new("fs://local/readme.md")]
        );

        let docs = repo.children(&session, &root_children[0]).unwrap();
        assert_eq!(docs, vec![NodeId::new("fs://local/docs/report.txt")]);
    }

    #[test]
    fn test_record_paths_and_metadata() {
        let temp = create_source();
        let repo = FsRepository::open(temp.path()).unwrap();
        let session = Session::scan("admin");
        let root_name = temp.path().canonicalize().unwrap();
        let root_name = root_name.file_name().unwrap().to_string_lossy().to_string();

        let root = repo.record(&session, &repo.root_id()).unwrap();
        assert!(root.is_folder());
        assert_eq!(root.path, format!("/{root_name}"));

        let report = repo
            .record(&session, &NodeId::new("fs://local/docs/report.txt"))
            .unwrap();
        assert_eq!(report.path, format!("/{root_name}/docs/report.txt"));
        assert_eq!(report.node_type, "cm:content");
        assert!(report.aspects.contains("cm:versionable"));
        assert_eq!(report.properties.get("cm:contentSize").map(String::as_str), Some("4"));
        assert!(report.properties.contains_key("cm:modified"));
    }

    #[test]
    fn test_version_history() {
        let temp = create_source();
        let repo = FsRepository::open(temp.path()).unwrap();
        let session = Session::scan("admin");

        let history = repo
            .version_history(&session, &NodeId::new("fs://local/docs/report.txt"))
            .unwrap()
            .unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].label.as_deref(), Some("1.1"));
        assert_eq!(history[1].comment, "fixed typo");

        let mut content = String::new();
        repo.open_content(&session, &history[0].content_node)
            .unwrap()
            .unwrap()
            .read_to_string(&mut content)
            .unwrap();
        assert_eq!(content, "first");

        let none = repo
            .version_history(&session, &NodeId::new("fs://local/readme.md"))
            .unwrap();
        assert!(none.is_none());
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinks_are_not_followed() {
        use std::os::unix::fs::symlink;

        let temp = create_source();
        let outside = TempDir::new().unwrap();
        fs::write(outside.path().join("secret.txt"), "outside").unwrap();
        fs::create_dir(temp.path().join("a")).unwrap();
        fs::write(temp.path().join("a/file.txt"), "inside").unwrap();
        symlink("..", temp.path().join("a/up")).unwrap();
        symlink(outside.path().join("secret.txt"), temp.path().join("a/secret.txt")).unwrap();

        let repo = FsRepository::open(temp.path()).unwrap();
        let session = Session::scan("admin");

        let children = repo
            .children(&session, &NodeId::new("fs://local/a"))
            .unwrap();
        assert_eq!(children, vec![NodeId::new("fs://local/a/file.txt")]);

        assert!(matches!(
            repo.kind(&session, &NodeId::new("fs://local/a/up")),
            Err(RepositoryError::Backend { .. })
        ));
        assert!(repo
            .open_content(&session, &NodeId::new("fs://local/a/secret.txt"))
            .is_err());
    }

    #[test]
    fn test_rejects_escaping_ids() {
        let temp = create_source();
        let repo = FsRepository::open(temp.path()).unwrap();
        let session = Session::scan("admin");

        assert!(matches!(
            repo.kind(&session, &NodeId::new("fs://local/../etc")),
            Err(RepositoryError::NotFound { .. })
        ));
        assert!(repo.kind(&session, &NodeId::new("other://x")).is_err());
    }
}
