//! # PathTree Core
//!
//! Uniform read-only access to resource hierarchies: plain directories,
//! zip/jar archives, single files, filtered overlays, multi-root unions and
//! cached snapshots.
//!
//! Callers enumerate, resolve and read resources through the [`PathTree`]
//! trait without knowing whether content lives on disk or inside an archive.
//!
//! ## Features
//!
//! - Include/exclude glob filtering
//! - Multi-release jar overrides under `META-INF/versions/<N>/`
//! - Archive mounts shared between concurrent users, unmounted by the last one
//! - Thread-safe memoization of a full walk
//! - Point lookups that reject absolute paths and `..` traversal
//!
//! ## Example
//!
//! ```no_run
//! use pathtree_core::{PathTreeBuilder, PathTreeExt, PathVisit};
//!
//! # fn main() -> pathtree_core::Result<()> {
//! let tree = PathTreeBuilder::new()
//!     .root("./lib/app.jar")
//!     .include("**/*.class")
//!     .build()?;
//!
//! // Enumerate every visible entry
//! tree.walk(&mut |visit: &PathVisit| {
//!     println!("{} -> {}", visit.relative_path(), visit.path());
//! })?;
//!
//! // Read one entry, if present
//! let bytes = tree.apply("com/acme/App.class", |visit| visit.map(|v| v.read()))?;
//! if let Some(bytes) = bytes.transpose()? {
//!     println!("{} bytes", bytes.len());
//! }
//!
//! // Keep the archive mounted across many lookups
//! let open = tree.open()?;
//! let found = open.get_path("com/acme/util/Strings.class")?;
//! println!("{found:?}");
//! open.close()?;
//! # Ok(())
//! # }
//! ```

mod archive;
mod builder;
mod caching;
mod collection;
pub mod config;
mod directory;
mod empty;
mod error;
mod file;
mod filter;
mod filtered;
mod manifest;
mod multi_root;
mod relative;
mod resource;
mod shared;
mod tree;
mod visit;
mod walk;

#[cfg(test)]
mod testing;

pub use archive::{ArchivePathTree, OpenArchivePathTree};
pub use builder::{
    PathTreeBuilder, of_archive, of_archive_with_filter, of_directory_or_archive,
    of_directory_or_file, of_roots,
};
pub use caching::CachingPathTree;
pub use collection::{PathCollection, PathList};
pub use config::{Settings, settings};
pub use directory::DirectoryPathTree;
pub use empty::EmptyPathTree;
pub use error::{Error, Result};
pub use file::FilePathTree;
pub use filter::{PathFilter, glob_to_regex};
pub use filtered::{FilteredOpenPathTree, FilteredPathTree};
pub use manifest::{MANIFEST_PATH, ManifestAttributes, MultiReleaseMapping, VERSIONS_DIR};
pub use multi_root::{MultiRootPathTree, OpenMultiRootPathTree};
pub use relative::{ensure_relative, has_parent_segment, is_absolute};
pub use resource::{ArchiveEntry, ResourcePath};
pub use shared::{SharedArchivePathTree, SharedOpenArchivePathTree};
pub use tree::{OpenPathTree, PathTree, PathTreeExt};
pub use visit::{PathVisit, PathVisitor};
