use bulkexport_core::version::{compare_labels, sort_labels};
use bulkexport_core::{
    DenyList, ExportConfig, IgnoreRules, NodeId, NodeRecord, Revision, RunParameters, VersionError,
    VersionLabel, head_of,
};
use std::cmp::Ordering;

#[test]
fn test_version_ordering_matches_major_minor() {
    let mut labels = vec![
        "0.10".to_string(),
        "0.2".to_string(),
        "0.1".to_string(),
        "0".to_string(),
        "1.10".to_string(),
        "1.2".to_string(),
        "1.1".to_string(),
        "1".to_string(),
        "2.10".to_string(),
        "2".to_string(),
        "2.2".to_string(),
        "2.1".to_string(),
    ];

    sort_labels(&mut labels).unwrap();

    assert_eq!(
        labels,
        vec!["0", "0.1", "0.2", "0.10", "1", "1.1", "1.2", "1.10", "2", "2.1", "2.2", "2.10"]
    );
}

#[test]
fn test_sort_labels_rejects_garbage() {
    let mut labels = vec!["1.0", "beta"];
    assert_eq!(
        sort_labels(&mut labels),
        Err(VersionError::InvalidLabel {
            label: "beta".to_string()
        })
    );
}

#[test]
fn test_compare_labels_major_dominates() {
    assert_eq!(compare_labels("2.0", "1.99").unwrap(), Ordering::Greater);
    assert_eq!(compare_labels("1.1", "1.01").unwrap(), Ordering::Equal);
    assert!(VersionLabel::new(1, 2) < VersionLabel::new(1, 10));
}

#[test]
fn test_head_is_maximum_regardless_of_input_order() {
    let revisions = vec![
        Revision::new("1.1", "second", "version://1.1"),
        Revision::new("1.2", "third", "version://1.2"),
        Revision::new("1.0", "first", "version://1.0"),
    ];

    let head = head_of(&revisions).unwrap();
    assert_eq!(head.label.as_deref(), Some("1.2"));
    assert_eq!(head.comment, "third");
}

#[test]
fn test_node_record_carries_path_and_metadata() {
    let record = NodeRecord::folder("cm:folder", "/Company Home/Sites")
        .with_aspect("cm:auditable")
        .with_property("cm:name", "Sites");

    assert!(record.is_folder());
    assert_eq!(record.path, "/Company Home/Sites");
    assert!(record.aspects.contains("cm:auditable"));
}

#[test]
fn test_ignore_rules_custom_lists() {
    let rules = IgnoreRules {
        types: DenyList::new(&["cm:thumbnail"], &["rn"]),
        ..IgnoreRules::none()
    };

    assert!(rules.is_type_ignored("cm:thumbnail"));
    assert!(rules.is_type_ignored("rn:rendition"));
    assert!(!rules.is_type_ignored("cm:content"));
    assert!(!rules.is_aspect_ignored("cm:taggable"));
    assert!(rules.aspects.is_empty());
}

#[test]
fn test_run_parameters_round_into_config() {
    let params = RunParameters::from_pairs(vec![
        ("nodeRef".to_string(), "workspace://SpacesStore/root".to_string()),
        ("base".to_string(), "/exports/run1".to_string()),
        ("ignoreExported".to_string(), "true".to_string()),
        ("nbOfThreads".to_string(), "".to_string()),
    ]);

    assert_eq!(NodeId::from(params.node_ref.clone().unwrap()).local_part(), "root");

    let config: ExportConfig = params.into_config(IgnoreRules::default()).unwrap();
    assert!(config.skip_existing);
    assert_eq!(config.threads, 1);
    assert_eq!(config.chunk_size, 10);
    assert!(!config.export_versions);
}

#[test]
fn test_config_load_from_file() {
    let temp = tempfile::TempDir::new().unwrap();
    let path = temp.path().join("bulkexport.toml");
    std::fs::write(
        &path,
        r#"
base_path = "/srv/export"
threads = 4
export_versions = true

[ignore.types]
names = ["cm:systemfolder"]
namespaces = ["rule"]
"#,
    )
    .unwrap();

    let config = ExportConfig::load(&path).unwrap();
    assert_eq!(config.threads, 4);
    assert_eq!(config.chunk_size, 10);
    assert!(config.export_versions);
    assert!(config.ignore.is_type_ignored("rule:ruleFolder"));
    // sections left out keep nothing, not the defaults
    assert!(config.ignore.aspects.is_empty());
    config.validate().unwrap();

    assert!(ExportConfig::load(temp.path().join("missing.toml")).is_err());
}
