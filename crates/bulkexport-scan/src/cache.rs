//! Persisted node list, so a large tree is scanned once per root.
//!
//! The file is plain UTF-8 text:
//!
//! ```text
//! bulkexport-node-cache v1
//! root <root id>
//! count <n>
//! <node id>
//! ...
//! ```

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use bulkexport_core::{CacheError, NodeId};

const HEADER: &str = "bulkexport-node-cache v1";
const ROOT_PREFIX: &str = "root ";
const COUNT_PREFIX: &str = "count ";
const EXTENSION: &str = "cache";

/// Cache files for node lists, stored in the export base directory.
#[derive(Debug, Clone)]
pub struct NodeListCache {
    dir: PathBuf,
}

impl NodeListCache {
    /// Create a cache rooted at `dir` (usually the export base path).
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Location of the cache for a root node.
    pub fn path_for(&self, root: &NodeId) -> PathBuf {
        self.dir.join(format!("{}.{EXTENSION}", cache_stem(root)))
    }

    /// Persist the node list for `root`, replacing any previous cache.
    ///
    /// The list is written to a temporary sibling first and renamed into
    /// place, so readers never see a partial file.
    pub fn save(&self, root: &NodeId, nodes: &[NodeId]) -> Result<PathBuf, CacheError> {
        // one id per line: no line breaks, and no empty lines in the list
        let unrepresentable = |id: &NodeId| id.as_str().contains(['\n', '\r']);
        let invalid = std::iter::once(root)
            .filter(|id| unrepresentable(id))
            .chain(nodes.iter().filter(|id| id.as_str().is_empty() || unrepresentable(id)))
            .next();
        if let Some(id) = invalid {
            return Err(CacheError::InvalidId {
                id: id.as_str().to_string(),
            });
        }

        fs::create_dir_all(&self.dir).map_err(|e| CacheError::io(&self.dir, e))?;

        let path = self.path_for(root);
        let tmp = path.with_extension(format!("{EXTENSION}.tmp"));

        let file = File::create(&tmp).map_err(|e| CacheError::io(&tmp, e))?;
        let mut writer = BufWriter::new(file);
        let write = |writer: &mut BufWriter<File>| -> std::io::Result<()> {
            writeln!(writer, "{HEADER}")?;
            writeln!(writer, "{ROOT_PREFIX}{root}")?;
            writeln!(writer, "{COUNT_PREFIX}{}", nodes.len())?;
            for node in nodes {
                writeln!(writer, "{node}")?;
            }
            writer.flush()?;
            writer.get_ref().sync_all()
        };
        if let Err(e) = write(&mut writer) {
            drop(writer);
            let _ = fs::remove_file(&tmp);
            return Err(CacheError::io(&tmp, e));
        }
        drop(writer);

        fs::rename(&tmp, &path).map_err(|e| CacheError::io(&path, e))?;

        info!(path = %path.display(), nodes = nodes.len(), "Node list cached");
        Ok(path)
    }

    /// Load the cached node list for `root`.
    ///
    /// Returns `Ok(None)` when no cache exists. A cache that exists but
    /// cannot be read or parsed is an error, never a silent rescan.
    pub fn load(&self, root: &NodeId) -> Result<Option<Vec<NodeId>>, CacheError> {
        let path = self.path_for(root);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No node cache");
                return Ok(None);
            }
            Err(e) => return Err(CacheError::io(&path, e)),
        };
        let text = String::from_utf8(bytes)
            .map_err(|_| CacheError::corrupt(&path, 0, "not valid UTF-8"))?;

        let nodes = parse(&path, root, &text)?;
        info!(path = %path.display(), nodes = nodes.len(), "Using cached node list");
        Ok(Some(nodes))
    }

    /// Delete the cache for `root`. Returns whether a file was removed.
    pub fn remove(&self, root: &NodeId) -> Result<bool, CacheError> {
        let path = self.path_for(root);
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(CacheError::io(&path, e)),
        }
    }
}

fn parse(path: &Path, root: &NodeId, text: &str) -> Result<Vec<NodeId>, CacheError> {
    let mut lines = text.lines().enumerate().map(|(i, line)| (i + 1, line));

    match lines.next() {
        Some((_, HEADER)) => {}
        Some((line, other)) => {
            return Err(CacheError::corrupt(
                path,
                line,
                format!("unexpected header {other:?}"),
            ));
        }
        None => return Err(CacheError::corrupt(path, 1, "empty file")),
    }

    let (line, cached_root) = lines
        .next()
        .ok_or_else(|| CacheError::corrupt(path, 2, "missing root line"))?;
    let cached_root = cached_root
        .strip_prefix(ROOT_PREFIX)
        .ok_or_else(|| CacheError::corrupt(path, line, "malformed root line"))?;
    if cached_root != root.as_str() {
        return Err(CacheError::corrupt(
            path,
            line,
            format!("cache belongs to root {cached_root}"),
        ));
    }

    let (line, count) = lines
        .next()
        .ok_or_else(|| CacheError::corrupt(path, 3, "missing count line"))?;
    let count: usize = count
        .strip_prefix(COUNT_PREFIX)
        .and_then(|n| n.parse().ok())
        .ok_or_else(|| CacheError::corrupt(path, line, "malformed count line"))?;

    let mut nodes = Vec::with_capacity(count);
    for (line, id) in lines {
        if id.is_empty() {
            return Err(CacheError::corrupt(path, line, "empty node id"));
        }
        nodes.push(NodeId::new(id));
    }

    if nodes.len() != count {
        return Err(CacheError::corrupt(
            path,
            count + 3,
            format!("expected {count} node ids, found {}", nodes.len()),
        ));
    }

    Ok(nodes)
}

/// File stem derived from a root id: its last segment, restricted to a
/// portable character set.
pub fn cache_stem(root: &NodeId) -> String {
    let stem: String = root
        .local_part()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();

    if stem.is_empty() || stem.chars().all(|c| c == '.') {
        "root".to_string()
    } else {
        stem
    }
}
