//! Export configuration types.

use std::path::{Path, PathBuf};

use derive_builder::Builder;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::node::NodeRecord;

/// Thread count used when none (or an unusable one) is given.
pub const DEFAULT_THREADS: usize = 1;

/// Chunk size used when none (or an unusable one) is given.
pub const DEFAULT_CHUNK_SIZE: usize = 10;

/// Principal export tasks authenticate as by default.
pub const DEFAULT_PRINCIPAL: &str = "admin";

/// Configuration for one export run. Immutable once the run starts.
#[derive(Debug, Clone, Builder, Serialize, Deserialize)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
pub struct ExportConfig {
    /// Directory the tree is exported into.
    #[serde(default)]
    pub base_path: PathBuf,

    /// Number of worker threads.
    #[builder(default = "DEFAULT_THREADS")]
    #[serde(default = "default_threads")]
    pub threads: usize,

    /// Maximum number of nodes per export task.
    #[builder(default = "DEFAULT_CHUNK_SIZE")]
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Export every revision instead of the head only.
    #[builder(default = "false")]
    #[serde(default)]
    pub export_versions: bool,

    /// Suffix the head revision with its label too.
    ///
    /// Off by default: bulk importers expect the head file unsuffixed.
    #[builder(default = "false")]
    #[serde(default)]
    pub revision_head_naming: bool,

    /// Read the node list from the cache file instead of scanning.
    #[builder(default = "false")]
    #[serde(default)]
    pub use_node_cache: bool,

    /// Leave existing content and metadata files untouched.
    #[builder(default = "false")]
    #[serde(default)]
    pub skip_existing: bool,

    /// Principal each task authenticates as.
    #[builder(default = "DEFAULT_PRINCIPAL.to_string()")]
    #[serde(default = "default_principal")]
    pub principal: String,

    /// Types, aspects and properties left out of the export.
    #[builder(default)]
    #[serde(default)]
    pub ignore: IgnoreRules,
}

fn default_threads() -> usize {
    DEFAULT_THREADS
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

fn default_principal() -> String {
    DEFAULT_PRINCIPAL.to_string()
}

impl ExportConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        match self.base_path {
            Some(ref base) if base.as_os_str().is_empty() => {
                return Err("Base path cannot be empty".to_string());
            }
            None => return Err("Base path is required".to_string()),
            _ => {}
        }
        if self.threads == Some(0) {
            return Err("Thread count must be positive".to_string());
        }
        if self.chunk_size == Some(0) {
            return Err("Chunk size must be positive".to_string());
        }
        Ok(())
    }
}

impl ExportConfig {
    /// Create a new config builder.
    pub fn builder() -> ExportConfigBuilder {
        ExportConfigBuilder::default()
    }

    /// Create a config with defaults for everything but the base path.
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
            threads: DEFAULT_THREADS,
            chunk_size: DEFAULT_CHUNK_SIZE,
            export_versions: false,
            revision_head_naming: false,
            use_node_cache: false,
            skip_existing: false,
            principal: default_principal(),
            ignore: IgnoreRules::default(),
        }
    }

    /// Parse a TOML document. The result is not validated; see [`ExportConfig::validate`].
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Read and parse a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Check the invariants the engine relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |message: &str| ConfigError::Invalid {
            message: message.to_string(),
        };
        if self.base_path.as_os_str().is_empty() {
            return Err(invalid("Base path cannot be empty"));
        }
        if self.threads == 0 {
            return Err(invalid("Thread count must be positive"));
        }
        if self.chunk_size == 0 {
            return Err(invalid("Chunk size must be positive"));
        }
        Ok(())
    }
}

/// Names excluded by exact match or by namespace prefix (`ns` in `ns:name`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DenyList {
    /// Exact prefixed names.
    #[serde(default)]
    pub names: Vec<String>,

    /// Namespace prefixes.
    #[serde(default)]
    pub namespaces: Vec<String>,
}

impl DenyList {
    /// Build a deny list from string slices.
    pub fn new(names: &[&str], namespaces: &[&str]) -> Self {
        Self {
            names: names.iter().map(|s| s.to_string()).collect(),
            namespaces: namespaces.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Check whether a prefixed name is denied.
    pub fn matches(&self, name: &str) -> bool {
        if self.names.iter().any(|n| n == name) {
            return true;
        }
        match name.split_once(':') {
            Some((namespace, _)) => self.namespaces.iter().any(|ns| ns == namespace),
            None => false,
        }
    }

    /// Check if nothing is denied.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty() && self.namespaces.is_empty()
    }
}

/// Deny-lists applied during scan (types) and metadata export (aspects, properties).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IgnoreRules {
    /// Node types excluded together with their subtree.
    #[serde(default)]
    pub types: DenyList,

    /// Aspects left out of metadata sidecars.
    #[serde(default)]
    pub aspects: DenyList,

    /// Properties left out of metadata sidecars.
    #[serde(default)]
    pub properties: DenyList,
}

impl Default for IgnoreRules {
    fn default() -> Self {
        Self {
            types: DenyList::new(
                &[
                    "cm:systemfolder",
                    "app:filelink",
                    "cm:rating",
                    "act:action",
                    "act:compositeaction",
                    "pub:PublishingQueue",
                ],
                &[],
            ),
            aspects: DenyList::new(&["cm:taggable"], &["app"]),
            properties: DenyList::new(
                &[
                    "sys:node-dbid",
                    "sys:node-uuid",
                    "cm:categories",
                    "cm:content",
                    "cm:taggable",
                ],
                &["app", "exif"],
            ),
        }
    }
}

impl IgnoreRules {
    /// Rules that ignore nothing.
    pub fn none() -> Self {
        Self {
            types: DenyList::default(),
            aspects: DenyList::default(),
            properties: DenyList::default(),
        }
    }

    /// Check if a node type is ignored.
    pub fn is_type_ignored(&self, node_type: &str) -> bool {
        self.types.matches(node_type)
    }

    /// Check if an aspect is ignored.
    pub fn is_aspect_ignored(&self, aspect: &str) -> bool {
        self.aspects.matches(aspect)
    }

    /// Check if a property is ignored.
    pub fn is_property_ignored(&self, property: &str) -> bool {
        self.properties.matches(property)
    }

    /// Drop ignored aspects and properties from a record, keeping order.
    pub fn filter_record(&self, record: &mut NodeRecord) {
        record.aspects.retain(|a| !self.is_aspect_ignored(a));
        record.properties.retain(|k, _| !self.is_property_ignored(k));
    }
}

/// Run parameters as handed over by a calling layer (query string, form, CLI).
///
/// Parsing is lenient: booleans are only true for the literal `"true"`, and
/// counts fall back to their defaults when missing, non-numeric or zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunParameters {
    /// Root node identifier (`nodeRef`).
    pub node_ref: Option<String>,
    /// Base output path (`base`).
    pub base: Option<PathBuf>,
    /// Skip existing files (`ignoreExported`).
    pub ignore_exported: bool,
    /// Export full version history (`exportVersions`).
    pub export_versions: bool,
    /// Number the head revision too (`revisionHead`).
    pub revision_head: bool,
    /// Use or generate the node cache (`useNodeCache`).
    pub use_node_cache: bool,
    /// Worker thread count (`nbOfThreads`).
    pub nb_of_threads: usize,
    /// Nodes per task (`exportChunkSize`).
    pub export_chunk_size: usize,
}

impl Default for RunParameters {
    fn default() -> Self {
        Self {
            node_ref: None,
            base: None,
            ignore_exported: false,
            export_versions: false,
            revision_head: false,
            use_node_cache: false,
            nb_of_threads: DEFAULT_THREADS,
            export_chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl RunParameters {
    /// Parse parameters from key/value pairs. Unknown keys are ignored.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut params = Self::default();
        for (key, value) in pairs {
            let value = value.as_ref();
            match key.as_ref() {
                "nodeRef" => params.node_ref = Some(value.to_string()),
                "base" => params.base = Some(PathBuf::from(value)),
                "ignoreExported" => params.ignore_exported = parse_flag(Some(value)),
                "exportVersions" => params.export_versions = parse_flag(Some(value)),
                "revisionHead" => params.revision_head = parse_flag(Some(value)),
                "useNodeCache" => params.use_node_cache = parse_flag(Some(value)),
                "nbOfThreads" => params.nb_of_threads = parse_count(Some(value), DEFAULT_THREADS),
                "exportChunkSize" => {
                    params.export_chunk_size = parse_count(Some(value), DEFAULT_CHUNK_SIZE)
                }
                _ => {}
            }
        }
        params
    }

    /// Parse an `a=b&c=d` query string.
    ///
    /// Keys and values are form-decoded (`+` is a space, `%XX` an escaped
    /// byte). A value that does not decode to UTF-8 is kept as written.
    pub fn from_query(query: &str) -> Self {
        Self::from_pairs(
            query
                .split('&')
                .filter(|p| !p.is_empty())
                .map(|p| p.split_once('=').unwrap_or((p, "")))
                .map(|(key, value)| (decode_component(key), decode_component(value))),
        )
    }

    /// Turn the parameters into a validated config with the given ignore rules.
    pub fn into_config(self, ignore: IgnoreRules) -> Result<ExportConfig, ConfigError> {
        let config = ExportConfig {
            base_path: self.base.unwrap_or_default(),
            threads: self.nb_of_threads,
            chunk_size: self.export_chunk_size,
            export_versions: self.export_versions,
            revision_head_naming: self.revision_head,
            use_node_cache: self.use_node_cache,
            skip_existing: self.ignore_exported,
            principal: default_principal(),
            ignore,
        };
        config.validate()?;
        Ok(config)
    }
}

/// A flag is set only by the literal `"true"`.
pub fn parse_flag(value: Option<&str>) -> bool {
    value == Some("true")
}

/// Parse a positive count, falling back to `default` when unusable.
pub fn parse_count(value: Option<&str>, default: usize) -> usize {
    value
        .and_then(|v| v.trim().parse::<usize>().ok())
        .filter(|&n| n > 0)
        .unwrap_or(default)
}

fn decode_component(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    match urlencoding::decode(&spaced) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => spaced,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = ExportConfig::builder()
            .base_path("/export")
            .threads(4usize)
            .chunk_size(50usize)
            .export_versions(true)
            .build()
            .unwrap();

        assert_eq!(config.base_path, PathBuf::from("/export"));
        assert_eq!(config.threads, 4);
        assert_eq!(config.chunk_size, 50);
        assert!(config.export_versions);
        assert!(!config.revision_head_naming);
        assert_eq!(config.principal, "admin");
    }

    #[test]
    fn test_config_builder_rejects_zero_threads() {
        let result = ExportConfig::builder()
            .base_path("/export")
            .threads(0usize)
            .build();
        assert!(result.is_err());

        assert!(ExportConfig::builder().build().is_err());
    }

    #[test]
    fn test_config_from_toml() {
        let config = ExportConfig::from_toml_str(
            r#"
            base_path = "/srv/export"
            threads = 3
            export_versions = true

            [ignore.types]
            names = ["cm:thumbnail"]
            "#,
        )
        .unwrap();

        assert_eq!(config.threads, 3);
        assert_eq!(config.chunk_size, DEFAULT_CHUNK_SIZE);
        assert!(config.export_versions);
        assert!(config.ignore.is_type_ignored("cm:thumbnail"));
        assert!(!config.ignore.is_type_ignored("cm:systemfolder"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_deny_list_matching() {
        let rules = IgnoreRules::default();
        assert!(rules.is_type_ignored("cm:systemfolder"));
        assert!(!rules.is_type_ignored("cm:folder"));
        assert!(rules.is_aspect_ignored("cm:taggable"));
        assert!(rules.is_aspect_ignored("app:uifacets"));
        assert!(!rules.is_aspect_ignored("cm:titled"));
        assert!(rules.is_property_ignored("exif:pixelXDimension"));
        assert!(!rules.is_property_ignored("exifx:foo"));
        assert!(!rules.is_property_ignored("cm:name"));
    }

    #[test]
    fn test_filter_record() {
        let mut record = NodeRecord::document("cm:content", "/a")
            .with_aspect("cm:titled")
            .with_aspect("cm:taggable")
            .with_property("cm:name", "a")
            .with_property("sys:node-uuid", "123")
            .with_property("app:icon", "x");

        IgnoreRules::default().filter_record(&mut record);

        assert_eq!(record.aspects.iter().collect::<Vec<_>>(), vec!["cm:titled"]);
        assert_eq!(record.properties.keys().collect::<Vec<_>>(), vec!["cm:name"]);
    }

    #[test]
    fn test_run_parameters_defaults() {
        let params = RunParameters::from_pairs([
            ("nodeRef", "workspace://SpacesStore/abc"),
            ("base", "/tmp/out"),
            ("ignoreExported", "TRUE"),
            ("exportVersions", "true"),
            ("nbOfThreads", "many"),
            ("exportChunkSize", "0"),
        ]);

        assert_eq!(params.node_ref.as_deref(), Some("workspace://SpacesStore/abc"));
        assert!(!params.ignore_exported);
        assert!(params.export_versions);
        assert!(!params.revision_head);
        assert_eq!(params.nb_of_threads, 1);
        assert_eq!(params.export_chunk_size, 10);
    }

    #[test]
    fn test_run_parameters_into_config() {
        let config = RunParameters::from_query(
            "base=/tmp/out&nbOfThreads=3&exportChunkSize=25&revisionHead=true&useNodeCache=true",
        )
        .into_config(IgnoreRules::none())
        .unwrap();

        assert_eq!(config.threads, 3);
        assert_eq!(config.chunk_size, 25);
        assert!(config.revision_head_naming);
        assert!(config.use_node_cache);
        assert!(!config.skip_existing);

        assert!(RunParameters::default().into_config(IgnoreRules::none()).is_err());
    }

    #[test]
    fn test_run_parameters_query_is_decoded() {
        let params = RunParameters::from_query(
            "nodeRef=workspace%3A%2F%2FSpacesStore%2Fabc-123&base=%2Fsrv%2Fmy+export&exportVersions=true",
        );

        assert_eq!(
            params.node_ref.as_deref(),
            Some("workspace://SpacesStore/abc-123")
        );
        assert_eq!(params.base, Some(PathBuf::from("/srv/my export")));
        assert!(params.export_versions);

        // invalid UTF-8 after decoding keeps the raw value
        let params = RunParameters::from_query("nodeRef=store%FF");
        assert_eq!(params.node_ref.as_deref(), Some("store%FF"));
    }
}
