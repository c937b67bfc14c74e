//! Repository service implementations for bulkexport.
//!
//! - [`MemoryRepository`] keeps a whole tree in memory. With the `test-util`
//!   feature it can also inject failures at any repository call.
//! - [`FsRepository`] exposes a local directory (with an optional on-disk
//!   version store) as a repository, so a plain directory tree can be turned
//!   into a bulk-import package.

mod fs;
mod memory;

pub use fs::{FS_SCHEME, FsRepository, VERSIONS_DIR};
pub use memory::{FailurePoint, MemoryRepository};
