//! Factories and the fluent tree builder.

use crate::archive::ArchivePathTree;
use crate::collection::PathList;
use crate::config::settings;
use crate::directory::DirectoryPathTree;
use crate::empty::EmptyPathTree;
use crate::error::{Error, Result};
use crate::file::FilePathTree;
use crate::filter::PathFilter;
use crate::multi_root::MultiRootPathTree;
use crate::shared::SharedArchivePathTree;
use crate::tree::PathTree;
use std::fs::Metadata;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

fn existing(path: &Path) -> Result<Metadata> {
    match std::fs::metadata(path) {
        Ok(metadata) => Ok(metadata),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Err(Error::invalid_argument(
            format!("{} does not exist", path.display()),
        )),
        Err(err) => Err(Error::io(path, err)),
    }
}

/// Archive tree for `path`: shared unless a filter is set or sharing is disabled.
fn archive_tree(path: &Path, filter: Option<PathFilter>, share: bool) -> Arc<dyn PathTree> {
    if filter.is_none() && share {
        Arc::new(SharedArchivePathTree::for_path(path))
    } else {
        Arc::new(ArchivePathTree::with_filter(path, filter))
    }
}

/// A directory tree for a directory, a single-entry tree for a file.
pub fn of_directory_or_file(path: impl AsRef<Path>) -> Result<Arc<dyn PathTree>> {
    let path = path.as_ref();
    if existing(path)?.is_dir() {
        Ok(Arc::new(DirectoryPathTree::new(path)))
    } else {
        Ok(Arc::new(FilePathTree::new(path)?))
    }
}

/// A directory tree for a directory, an archive tree for a file.
pub fn of_directory_or_archive(path: impl AsRef<Path>) -> Result<Arc<dyn PathTree>> {
    let path = path.as_ref();
    if existing(path)?.is_dir() {
        Ok(Arc::new(DirectoryPathTree::new(path)))
    } else {
        Ok(archive_tree(path, None, !settings().disable_archive_cache))
    }
}

pub fn of_archive(path: impl AsRef<Path>) -> Result<Arc<dyn PathTree>> {
    of_archive_with_filter(path, None)
}

/// An archive tree over an existing archive file.
pub fn of_archive_with_filter(
    path: impl AsRef<Path>,
    filter: Option<PathFilter>,
) -> Result<Arc<dyn PathTree>> {
    let path = path.as_ref();
    if !existing(path)?.is_file() {
        return Err(Error::invalid_argument(format!(
            "{} is not an archive file",
            path.display()
        )));
    }
    Ok(archive_tree(path, filter, !settings().disable_archive_cache))
}

/// The union of the trees over every existing path of `roots`.
///
/// Missing roots are skipped. A single remaining root yields its tree
/// directly and none yields the empty tree.
pub fn of_roots(roots: &PathList) -> Result<Arc<dyn PathTree>> {
    let mut trees = Vec::with_capacity(roots.as_slice().len());
    for root in roots {
        if !root.exists() {
            tracing::debug!(root = %root.display(), "skipping missing root");
            continue;
        }
        trees.push(of_directory_or_archive(root)?);
    }
    let tree: Arc<dyn PathTree> = match trees.len() {
        0 => EmptyPathTree::instance(),
        1 => trees.remove(0),
        _ => Arc::new(MultiRootPathTree::new(trees)),
    };
    Ok(tree)
}

/// Fluent construction of a tree over one root.
///
/// ```no_run
/// use pathtree_core::PathTreeBuilder;
///
/// # fn main() -> pathtree_core::Result<()> {
/// let tree = PathTreeBuilder::new()
///     .root("target/classes")
///     .include("**/*.class")
///     .exclude("**/Test*.class")
///     .build()?;
/// println!("{:?}", tree.roots());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct PathTreeBuilder {
    root: Option<PathBuf>,
    includes: Vec<String>,
    excludes: Vec<String>,
    archive: Option<bool>,
    manifest_enabled: bool,
    release: Option<u32>,
    share_archives: Option<bool>,
}

impl PathTreeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = Some(root.into());
        self
    }

    pub fn include(mut self, glob: impl Into<String>) -> Self {
        self.includes.push(glob.into());
        self
    }

    pub fn includes<I, S>(mut self, globs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.includes.extend(globs.into_iter().map(Into::into));
        self
    }

    pub fn exclude(mut self, glob: impl Into<String>) -> Self {
        self.excludes.push(glob.into());
        self
    }

    pub fn excludes<I, S>(mut self, globs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.excludes.extend(globs.into_iter().map(Into::into));
        self
    }

    /// Force the root to be treated as an archive (`true`) or as a directory
    /// or plain file (`false`). By default the kind is detected from the root.
    pub fn archive(mut self, archive: bool) -> Self {
        self.archive = Some(archive);
        self
    }

    /// Read the manifest of directory roots. Archives always read theirs.
    pub fn manifest_enabled(mut self, enabled: bool) -> Self {
        self.manifest_enabled = enabled;
        self
    }

    /// Resolve multi-release overrides for `release` instead of the process default.
    pub fn release(mut self, release: u32) -> Self {
        self.release = Some(release);
        self
    }

    /// Override the process-wide archive sharing setting for this tree.
    pub fn share_archives(mut self, share: bool) -> Self {
        self.share_archives = Some(share);
        self
    }

    fn filter(&self) -> Result<Option<PathFilter>> {
        if self.includes.is_empty() && self.excludes.is_empty() {
            return Ok(None);
        }
        PathFilter::new(&self.includes, &self.excludes).map(Some)
    }

    pub fn build(self) -> Result<Arc<dyn PathTree>> {
        let root = self
            .root
            .as_deref()
            .ok_or_else(|| Error::invalid_argument("no root was set on the builder"))?;
        let filter = self.filter()?;

        let metadata = match std::fs::metadata(root) {
            Ok(metadata) => metadata,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                tracing::debug!(root = %root.display(), "root does not exist, building empty tree");
                return Ok(EmptyPathTree::instance());
            }
            Err(err) => return Err(Error::io(root, err)),
        };

        let archive = self.archive.unwrap_or_else(|| metadata.is_file());
        if archive {
            if metadata.is_dir() {
                return Err(Error::invalid_argument(format!(
                    "{} is a directory, not an archive",
                    root.display()
                )));
            }
            let tree: Arc<dyn PathTree> = match self.release {
                Some(release) => {
                    Arc::new(ArchivePathTree::with_filter(root, filter).with_release(release))
                }
                None => {
                    let share = self
                        .share_archives
                        .unwrap_or(!settings().disable_archive_cache);
                    archive_tree(root, filter, share)
                }
            };
            return Ok(tree);
        }

        if metadata.is_dir() {
            let tree = DirectoryPathTree::with_options(root, filter, self.manifest_enabled);
            let tree = match self.release {
                Some(release) => tree.with_release(release),
                None => tree,
            };
            Ok(Arc::new(tree))
        } else {
            Ok(Arc::new(FilePathTree::with_filter(root, filter)?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{write_files, write_jar};
    use crate::tree::PathTreeExt;
    use tempfile::TempDir;

    fn is<T: PathTree>(tree: &Arc<dyn PathTree>) -> bool {
        tree.as_any().downcast_ref::<T>().is_some()
    }

    #[test]
    fn test_of_directory_or_file() {
        let temp_dir = TempDir::new().unwrap();
        write_files(temp_dir.path(), &[("a.txt", "a")]);

        let dir = of_directory_or_file(temp_dir.path()).unwrap();
        assert!(is::<DirectoryPathTree>(&dir));
        let file = of_directory_or_file(temp_dir.path().join("a.txt")).unwrap();
        assert!(is::<FilePathTree>(&file));
        assert_eq!(file.relative_paths().unwrap(), vec!["a.txt"]);

        let err = of_directory_or_file(temp_dir.path().join("missing")).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument { .. }));
    }

    #[test]
    fn test_of_directory_or_archive() {
        let temp_dir = TempDir::new().unwrap();
        let jar = temp_dir.path().join("lib.jar");
        write_jar(&jar, &[("a.txt", "a")]);

        let tree = of_directory_or_archive(&jar).unwrap();
        assert!(tree.is_archive_or_origin());
        if settings().disable_archive_cache {
            assert!(is::<ArchivePathTree>(&tree));
        } else {
            assert!(is::<SharedArchivePathTree>(&tree));
        }
        assert!(tree.contains("a.txt").unwrap());
    }

    #[test]
    fn test_of_archive_requires_file() {
        let temp_dir = TempDir::new().unwrap();
        assert!(of_archive(temp_dir.path()).is_err());
        assert!(of_archive(temp_dir.path().join("missing.jar")).is_err());
    }

    #[test]
    fn test_filtered_archive_is_not_shared() {
        let temp_dir = TempDir::new().unwrap();
        let jar = temp_dir.path().join("lib.jar");
        write_jar(&jar, &[("a.txt", "a"), ("b.class", "b")]);

        let tree =
            of_archive_with_filter(&jar, Some(PathFilter::includes(["*.class"]).unwrap())).unwrap();
        assert!(is::<ArchivePathTree>(&tree));
        assert_eq!(tree.relative_paths().unwrap(), vec!["b.class"]);
    }

    #[test]
    fn test_builder_directory() {
        let temp_dir = TempDir::new().unwrap();
        write_files(
            temp_dir.path(),
            &[("a/B.class", ""), ("a/TestB.class", ""), ("a/B.txt", "")],
        );
        let tree = PathTreeBuilder::new()
            .root(temp_dir.path())
            .include("**/*.class")
            .exclude("**/Test*.class")
            .build()
            .unwrap();
        assert!(is::<DirectoryPathTree>(&tree));
        assert_eq!(tree.relative_paths().unwrap(), vec!["a/B.class"]);
    }

    #[test]
    fn test_builder_missing_root_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let tree = PathTreeBuilder::new()
            .root(temp_dir.path().join("missing"))
            .build()
            .unwrap();
        assert!(is::<EmptyPathTree>(&tree));
        assert!(PathTreeBuilder::new().build().is_err());
    }

    #[test]
    fn test_builder_archive_kind() {
        let temp_dir = TempDir::new().unwrap();
        let jar = temp_dir.path().join("lib.jar");
        write_jar(&jar, &[("a.txt", "a")]);

        let unshared = PathTreeBuilder::new()
            .root(&jar)
            .share_archives(false)
            .build()
            .unwrap();
        assert!(is::<ArchivePathTree>(&unshared));

        let shared = PathTreeBuilder::new()
            .root(&jar)
            .share_archives(true)
            .build()
            .unwrap();
        assert!(is::<SharedArchivePathTree>(&shared));

        let plain_file = PathTreeBuilder::new().root(&jar).archive(false).build().unwrap();
        assert!(is::<FilePathTree>(&plain_file));
        assert_eq!(plain_file.relative_paths().unwrap(), vec!["lib.jar"]);

        let err = PathTreeBuilder::new()
            .root(temp_dir.path())
            .archive(true)
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument { .. }));
    }

    #[test]
    fn test_builder_invalid_pattern() {
        let temp_dir = TempDir::new().unwrap();
        let err = PathTreeBuilder::new()
            .root(temp_dir.path())
            .include("[z-a]")
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::InvalidPattern { .. }));
    }

    #[test]
    fn test_of_roots() {
        let temp_dir = TempDir::new().unwrap();
        let a = temp_dir.path().join("a");
        let b = temp_dir.path().join("b");
        write_files(&a, &[("x.txt", "a")]);
        write_files(&b, &[("y.txt", "b")]);
        let missing = temp_dir.path().join("missing");

        let union = of_roots(&PathList::of([&a, &missing, &b])).unwrap();
        assert!(is::<MultiRootPathTree>(&union));
        assert_eq!(union.roots(), vec![a.clone(), b.clone()]);
        assert!(union.contains("y.txt").unwrap());

        let single = of_roots(&PathList::of([&missing, &a])).unwrap();
        assert!(is::<DirectoryPathTree>(&single));

        let none = of_roots(&PathList::of([&missing])).unwrap();
        assert!(is::<EmptyPathTree>(&none));
    }
}
