use std::fs;
use std::path::Path;

use bulkexport_export::{
    Engine, EngineError, ExportConfig, ExportReport, NodeId, RunOutcome, SIDECAR_SUFFIX,
    partition,
};
use bulkexport_repo::{FailurePoint, FsRepository, MemoryRepository};
use bulkexport_scan::{Session, TreeScanner};
use tempfile::TempDir;

fn checksum(path: &Path) -> blake3::Hash {
    blake3::hash(&fs::read(path).unwrap())
}

fn count_files(dir: &Path, suffix: &str) -> usize {
    let mut count = 0;
    let mut pending = vec![dir.to_path_buf()];
    while let Some(dir) = pending.pop() {
        for entry in fs::read_dir(dir).unwrap() {
            let path = entry.unwrap().path();
            if path.is_dir() {
                pending.push(path);
            } else if path.to_string_lossy().ends_with(suffix) {
                count += 1;
            }
        }
    }
    count
}

/// A root folder holding 25 documents.
fn flat_repository() -> (MemoryRepository, NodeId) {
    let mut repo = MemoryRepository::new();
    let root = repo.add_root("Company Home");
    for i in 0..25 {
        repo.add_document(&root, &format!("doc{i:02}.txt"), format!("content of document {i}"));
    }
    (repo, root)
}

fn completed(outcome: RunOutcome) -> ExportReport {
    match outcome {
        RunOutcome::Completed(report) => report,
        other => panic!("expected a completed run, got {other:?}"),
    }
}

#[test]
fn test_end_to_end_twenty_five_documents() {
    let temp = TempDir::new().unwrap();
    let (repo, root) = flat_repository();

    let mut builder = ExportConfig::builder();
    builder.base_path(temp.path()).chunk_size(10usize).threads(3usize);
    let config = builder.build().unwrap();

    let scanned = TreeScanner::new(config.ignore.clone())
        .scan(&repo, &Session::scan("admin"), &root)
        .unwrap();
    assert_eq!(scanned[0], root);

    let sizes = |nodes: &[NodeId]| -> Vec<usize> {
        partition(nodes, config.chunk_size)
            .iter()
            .map(|t| t.len())
            .collect()
    };
    assert_eq!(sizes(&scanned[1..]), vec![10, 10, 5]);
    // the root folder is part of the list too
    assert_eq!(sizes(&scanned), vec![10, 10, 6]);

    let report = completed(Engine::new(config).unwrap().run(&repo, &root).unwrap());

    assert!(report.is_clean());
    assert_eq!(report.nodes_total, 26);
    assert_eq!(report.counters.documents, 25);
    assert_eq!(report.counters.folders, 1);
    assert!(!report.from_cache);

    let out = temp.path().join("Company Home");
    for i in 0..25 {
        let file = out.join(format!("doc{i:02}.txt"));
        assert_eq!(
            fs::read_to_string(&file).unwrap(),
            format!("content of document {i}")
        );
    }
    assert_eq!(count_files(&out, SIDECAR_SUFFIX), 25);
    assert!(temp.path().join("Company Home.metadata.properties.xml").is_file());
    assert_eq!(count_files(temp.path(), SIDECAR_SUFFIX), 26);
}

#[test]
fn test_task_count_follows_chunk_size() {
    let temp = TempDir::new().unwrap();
    let (repo, root) = flat_repository();

    let mut config = ExportConfig::new(temp.path());
    config.chunk_size = 10;
    config.threads = 3;
    let report = completed(Engine::new(config).unwrap().run(&repo, &root).unwrap());

    // 26 nodes including the root folder
    assert_eq!(report.tasks, 3);
}

#[test]
fn test_skip_existing_leaves_files_untouched() {
    let temp = TempDir::new().unwrap();
    let (repo, root) = flat_repository();

    completed(
        Engine::new(ExportConfig::new(temp.path()))
            .unwrap()
            .run(&repo, &root)
            .unwrap(),
    );

    let target = temp.path().join("Company Home/doc07.txt");
    fs::write(&target, "edited by hand").unwrap();
    let before = checksum(&target);

    let mut config = ExportConfig::new(temp.path());
    config.skip_existing = true;
    let report = completed(Engine::new(config).unwrap().run(&repo, &root).unwrap());

    assert_eq!(checksum(&target), before);
    assert_eq!(report.counters.content_skipped, 25);
    assert_eq!(report.counters.sidecars_skipped, 26);

    // without skipping, the file is overwritten
    completed(
        Engine::new(ExportConfig::new(temp.path()))
            .unwrap()
            .run(&repo, &root)
            .unwrap(),
    );
    assert_eq!(
        fs::read_to_string(&target).unwrap(),
        "content of document 7"
    );
}

#[test]
fn test_cache_generated_then_cached_export() {
    let temp = TempDir::new().unwrap();
    let (mut repo, root) = flat_repository();

    let mut config = ExportConfig::new(temp.path());
    config.use_node_cache = true;
    let engine = Engine::new(config).unwrap();

    let outcome = engine.run(&repo, &root).unwrap();
    let RunOutcome::CacheGenerated {
        cache_path,
        node_count,
    } = outcome
    else {
        panic!("expected the cache-generated outcome");
    };
    assert_eq!(node_count, 26);
    assert!(cache_path.starts_with(temp.path()));
    assert!(!temp.path().join("Company Home").exists());

    // a node added after caching is not exported: the cached list is used as is
    repo.add_document(&root, "late.txt", "late");

    let report = completed(engine.run(&repo, &root).unwrap());
    assert!(report.from_cache);
    assert_eq!(report.counters.documents, 25);
    assert!(!temp.path().join("Company Home/late.txt").exists());
}

#[test]
fn test_failures_are_isolated() {
    let temp = TempDir::new().unwrap();
    let mut repo = MemoryRepository::new();
    let root = repo.add_root("root");
    let mut docs = Vec::new();
    for i in 0..12 {
        docs.push(repo.add_document(&root, &format!("d{i:02}"), format!("{i}")));
    }
    repo.fail(&docs[2], FailurePoint::Content);
    repo.panic_on_record(&docs[6]);

    let mut config = ExportConfig::new(temp.path());
    config.chunk_size = 4;
    config.threads = 2;
    let report = completed(Engine::new(config).unwrap().run(&repo, &root).unwrap());

    // tasks: [root, d00, d01, d02] [d03..d06] [d07..d10] [d11]
    assert_eq!(report.tasks, 4);
    assert_eq!(report.failures.len(), 2);
    assert_eq!(report.failures[0].node, docs[2]);
    assert_eq!(report.failures[0].task, 1);
    assert_eq!(report.failures[1].node, docs[6]);
    assert_eq!(report.failures[1].task, 2);
    assert!(report.failed_tasks.is_empty());

    let out = temp.path().join("root");
    assert!(out.join("d01").exists());
    assert!(!out.join("d02").exists());
    assert!(out.join("d03").exists());
    assert!(!out.join("d06").exists());
    assert!(out.join("d07").exists());
    assert!(out.join("d11").exists());
}

#[test]
fn test_panicking_node_does_not_abandon_its_task() {
    let temp = TempDir::new().unwrap();
    let mut repo = MemoryRepository::new();
    let root = repo.add_root("root");
    let mut docs = Vec::new();
    for i in 0..8 {
        docs.push(repo.add_document(&root, &format!("d{i:02}"), format!("{i}")));
    }
    // first node of the second task
    repo.panic_on_record(&docs[3]);

    let mut config = ExportConfig::new(temp.path());
    config.chunk_size = 4;
    config.threads = 2;
    let report = completed(Engine::new(config).unwrap().run(&repo, &root).unwrap());

    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].node, docs[3]);
    assert_eq!(report.failures[0].task, 2);
    assert!(report.failed_tasks.is_empty());
    assert_eq!(report.counters.documents, 7);

    let out = temp.path().join("root");
    assert!(!out.join("d03").exists());
    for sibling in ["d04", "d05", "d06"] {
        assert!(out.join(sibling).exists());
    }
}

#[test]
fn test_version_history_export() {
    let temp = TempDir::new().unwrap();
    let mut repo = MemoryRepository::new();
    let root = repo.add_root("r");
    let versioned = repo.add_document(&root, "report.odt", "live");
    repo.add_revision(&versioned, "1.0", "one");
    repo.add_revision(&versioned, "1.1", "two");
    repo.add_revision(&versioned, "1.2", "three");
    repo.add_document(&root, "plain.txt", "plain");
    let broken = repo.add_document(&root, "broken.txt", "x");
    repo.add_unlabelled_revision(&broken, "y");

    let mut config = ExportConfig::new(temp.path());
    config.export_versions = true;
    let report = completed(Engine::new(config).unwrap().run(&repo, &root).unwrap());

    let out = temp.path().join("r");
    assert_eq!(fs::read_to_string(out.join("report.odt")).unwrap(), "three");
    assert_eq!(fs::read_to_string(out.join("report.odt.1.0")).unwrap(), "one");
    assert_eq!(fs::read_to_string(out.join("report.odt.1.1")).unwrap(), "two");
    assert!(out.join("report.odt.1.1.metadata.properties.xml").exists());
    assert_eq!(fs::read_to_string(out.join("plain.txt")).unwrap(), "plain");

    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].node, broken);
    assert!(report.failed_tasks.is_empty());
    assert_eq!(report.counters.revisions, 4);
}

#[test]
fn test_corrupt_cache_aborts_run() {
    let temp = TempDir::new().unwrap();
    let (repo, root) = flat_repository();

    let mut config = ExportConfig::new(temp.path());
    config.use_node_cache = true;
    let engine = Engine::new(config).unwrap();
    fs::write(engine.cache().path_for(&root), "bulkexport-node-cache v1\nroot x\n").unwrap();

    let err = engine.run(&repo, &root).unwrap_err();
    assert!(matches!(err, EngineError::Cache(_)));
    assert!(!temp.path().join("Company Home").exists());
}

#[test]
fn test_filesystem_source_round_trip() {
    let source = TempDir::new().unwrap();
    fs::create_dir_all(source.path().join("projects/.versions/plan.md")).unwrap();
    fs::write(source.path().join("projects/plan.md"), "# plan v3").unwrap();
    fs::write(source.path().join("projects/.versions/plan.md/1.0"), "# plan v1").unwrap();
    fs::write(source.path().join("projects/.versions/plan.md/1.1"), "# plan v3").unwrap();
    fs::write(source.path().join("notes.txt"), "notes").unwrap();

    let repo = FsRepository::open(source.path()).unwrap();
    let out = TempDir::new().unwrap();
    let mut config = ExportConfig::new(out.path());
    config.export_versions = true;

    let report = completed(
        Engine::new(config)
            .unwrap()
            .run(&repo, &repo.root_id())
            .unwrap(),
    );
    assert!(report.is_clean());

    let root_name = repo.root_path().file_name().unwrap().to_owned();
    let exported = out.path().join(root_name);
    assert_eq!(
        fs::read_to_string(exported.join("projects/plan.md")).unwrap(),
        "# plan v3"
    );
    assert_eq!(
        fs::read_to_string(exported.join("projects/plan.md.1.0")).unwrap(),
        "# plan v1"
    );
    assert!(!exported.join("notes.txt.1.0").exists());
    assert_eq!(fs::read_to_string(exported.join("notes.txt")).unwrap(), "notes");
    assert!(!exported.join("projects/.versions").exists());

    let sidecar =
        fs::read_to_string(exported.join("projects/plan.md.metadata.properties.xml")).unwrap();
    assert!(sidecar.contains("<entry key=\"type\">cm:content</entry>"));
    assert!(!sidecar.contains("sys:node-uuid"));
}
