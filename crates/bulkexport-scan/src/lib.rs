//! Node discovery for bulkexport.
//!
//! This crate turns a repository root into the flat, ordered list of nodes an
//! export run works through.
//!
//! # Overview
//!
//! - **Pre-order traversal** with an explicit stack, so folders always precede
//!   their contents and tree depth is unbounded
//! - **Ignored types** prune whole subtrees
//! - **Progress updates** via broadcast channels
//! - **Node list cache** so a large tree is only walked once per root
//!
//! # Example
//!
//! ```rust,no_run
//! use bulkexport_repo::FsRepository;
//! use bulkexport_scan::{NodeListCache, Session, TreeScanner};
//!
//! let repo = FsRepository::open("/srv/content").unwrap();
//! let root = repo.root_id();
//!
//! let nodes = TreeScanner::default()
//!     .scan(&repo, &Session::scan("admin"), &root)
//!     .unwrap();
//! NodeListCache::new("/srv/export").save(&root, &nodes).unwrap();
//!
//! println!("{} nodes to export", nodes.len());
//! ```
//!
//! # Progress Monitoring
//!
//! ```rust,no_run
//! use bulkexport_repo::FsRepository;
//! use bulkexport_scan::{Session, TreeScanner};
//!
//! let repo = FsRepository::open("/srv/content").unwrap();
//! let scanner = TreeScanner::default();
//! let mut progress_rx = scanner.subscribe();
//!
//! scanner.scan(&repo, &Session::scan("admin"), &repo.root_id()).unwrap();
//! while let Ok(progress) = progress_rx.try_recv() {
//!     println!("Found {} nodes", progress.nodes_found);
//! }
//! ```

mod cache;
mod progress;
mod scanner;

pub use cache::{NodeListCache, cache_stem};
pub use progress::ScanProgress;
pub use scanner::TreeScanner;

// Re-export core types for convenience
pub use bulkexport_core::{CacheError, IgnoreRules, NodeId, NodeKind, Repository, ScanError, Session};
