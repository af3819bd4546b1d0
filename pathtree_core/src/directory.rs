//! Trees rooted at a directory on the local filesystem.

use crate::config::settings;
use crate::error::{Error, Result};
use crate::filter::PathFilter;
use crate::manifest::{ManifestAttributes, ManifestState};
use crate::resource::ResourcePath;
use crate::tree::{OpenPathTree, PathTree, tree_identity};
use crate::visit::{PathVisit, PathVisitor};
use crate::walk::{self, Container, EntryFn};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A directory seen as a [`Container`].
#[derive(Debug, Clone)]
pub(crate) struct DirContainer {
    root: Arc<Path>,
}

impl DirContainer {
    pub(crate) fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: Arc::from(root.as_ref()),
        }
    }

    fn full_path(&self, relative: &str) -> PathBuf {
        if relative.is_empty() {
            self.root.to_path_buf()
        } else {
            self.root.join(relative)
        }
    }

    fn relative_of(&self, path: &Path) -> Option<String> {
        let rest = path.strip_prefix(&self.root).ok()?;
        let segments: Vec<String> = rest
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        Some(segments.join("/"))
    }
}

impl Container for DirContainer {
    fn root(&self) -> &Arc<Path> {
        &self.root
    }

    fn for_each_entry(&self, start: &str, f: &mut EntryFn<'_>) -> Result<ControlFlow<()>> {
        let walk_root = self.full_path(start);
        if !walk_root.exists() {
            return Ok(ControlFlow::Continue(()));
        }

        let walker = ignore::WalkBuilder::new(&walk_root)
            .standard_filters(false) // Every entry counts, hidden and ignored ones included
            .follow_links(false)
            .sort_by_file_name(|a, b| a.cmp(b))
            .build();

        for entry in walker {
            let entry = entry.map_err(|e| Error::from_walk(&self.root, e))?;
            let Some(relative) = self.relative_of(entry.path()) else {
                continue;
            };
            let is_dir = entry.file_type().is_some_and(|t| t.is_dir());
            if f(&relative, is_dir).is_break() {
                return Ok(ControlFlow::Break(()));
            }
        }
        Ok(ControlFlow::Continue(()))
    }

    fn exists(&self, relative: &str) -> Result<bool> {
        let path = self.full_path(relative);
        match std::fs::symlink_metadata(&path) {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) if e.kind() == std::io::ErrorKind::NotADirectory => Ok(false),
            Err(e) => Err(Error::io(path, e)),
        }
    }

    fn resolve(&self, relative: &str) -> ResourcePath {
        ResourcePath::File(self.full_path(relative))
    }

    fn read(&self, relative: &str) -> Result<Option<Vec<u8>>> {
        let path = self.full_path(relative);
        if !path.is_file() {
            return Ok(None);
        }
        std::fs::read(&path).map(Some).map_err(|e| Error::io(path, e))
    }
}

/// A tree over the content of a directory.
///
/// Directory trees are always open: [`open`](PathTree::open) returns a copy of
/// the tree and [`close`](OpenPathTree::close) does nothing.
#[derive(Clone, Serialize, Deserialize)]
#[serde(into = "DirectoryPathTreeRepr", from = "DirectoryPathTreeRepr")]
pub struct DirectoryPathTree {
    inner: Arc<DirectoryInner>,
}

struct DirectoryInner {
    container: DirContainer,
    filter: Option<PathFilter>,
    manifest: ManifestState,
}

/// Serialized form of a [`DirectoryPathTree`].
#[derive(Debug, Clone, Serialize, Deserialize)]
struct DirectoryPathTreeRepr {
    dir: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    filter: Option<PathFilter>,
    #[serde(default)]
    manifest_enabled: bool,
}

impl DirectoryPathTree {
    /// A tree over `dir` with no filter and manifest handling disabled.
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self::with_options(dir, None, false)
    }

    /// A tree over `dir` restricted by `filter`.
    pub fn with_filter(dir: impl AsRef<Path>, filter: Option<PathFilter>) -> Self {
        Self::with_options(dir, filter, false)
    }

    /// A tree over `dir` with every option spelled out.
    ///
    /// With `manifest_enabled`, `META-INF/MANIFEST.MF` is read and multi-release
    /// overrides under `META-INF/versions` are honored.
    pub fn with_options(
        dir: impl AsRef<Path>,
        filter: Option<PathFilter>,
        manifest_enabled: bool,
    ) -> Self {
        Self::build(dir.as_ref(), filter, manifest_enabled, settings().release)
    }

    /// The same tree resolving multi-release overrides for `release`.
    pub fn with_release(&self, release: u32) -> Self {
        Self::build(
            self.dir(),
            self.inner.filter.clone(),
            self.is_manifest_enabled(),
            release,
        )
    }

    fn build(dir: &Path, filter: Option<PathFilter>, manifest_enabled: bool, release: u32) -> Self {
        Self {
            inner: Arc::new(DirectoryInner {
                container: DirContainer::new(dir),
                filter,
                manifest: ManifestState::new(manifest_enabled, release),
            }),
        }
    }

    /// The root directory.
    pub fn dir(&self) -> &Path {
        &self.inner.container.root
    }

    pub fn filter(&self) -> Option<&PathFilter> {
        self.inner.filter.as_ref()
    }

    pub fn is_manifest_enabled(&self) -> bool {
        self.inner.manifest.is_enabled()
    }

    fn mapping(&self) -> Result<Arc<crate::manifest::MultiReleaseMapping>> {
        self.inner.manifest.mapping(&self.inner.container)
    }
}

impl PathTree for DirectoryPathTree {
    fn roots(&self) -> Vec<PathBuf> {
        vec![self.dir().to_path_buf()]
    }

    fn manifest_attributes(&self) -> Result<Option<ManifestAttributes>> {
        self.inner.manifest.attributes(&self.inner.container)
    }

    fn walk(&self, visitor: &mut dyn PathVisitor) -> Result<()> {
        let mapping = self.mapping()?;
        walk::walk(
            &self.inner.container,
            "",
            self.filter(),
            &mapping,
            visitor,
        )
    }

    fn walk_if_contains(&self, relative: &str, visitor: &mut dyn PathVisitor) -> Result<()> {
        let mapping = self.mapping()?;
        walk::walk_if_contains(
            &self.inner.container,
            relative,
            self.filter(),
            &mapping,
            visitor,
        )
    }

    fn accept(&self, relative: &str, consumer: &mut dyn FnMut(Option<&PathVisit>)) -> Result<()> {
        let mapping = self.mapping()?;
        walk::accept(
            &self.inner.container,
            relative,
            self.filter(),
            &mapping,
            consumer,
        )
    }

    fn contains(&self, relative: &str) -> Result<bool> {
        Ok(self.get_path(relative)?.is_some())
    }

    fn open(&self) -> Result<Box<dyn OpenPathTree>> {
        Ok(Box::new(self.clone()))
    }

    tree_identity!();
}

impl OpenPathTree for DirectoryPathTree {
    fn original_tree(&self) -> &dyn PathTree {
        self
    }

    fn as_path_tree(&self) -> &dyn PathTree {
        self
    }

    fn is_open(&self) -> bool {
        true
    }

    fn get_path(&self, relative: &str) -> Result<Option<ResourcePath>> {
        let mapping = self.mapping()?;
        walk::lookup(&self.inner.container, relative, self.filter(), &mapping)
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }
}

impl PartialEq for DirectoryPathTree {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
            || (self.dir() == other.dir()
                && self.inner.filter == other.inner.filter
                && self.is_manifest_enabled() == other.is_manifest_enabled()
                && self.inner.manifest.release() == other.inner.manifest.release())
    }
}

impl Eq for DirectoryPathTree {}

impl Hash for DirectoryPathTree {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.dir().hash(state);
        self.inner.filter.hash(state);
        self.is_manifest_enabled().hash(state);
    }
}

impl fmt::Debug for DirectoryPathTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectoryPathTree")
            .field("dir", &self.dir())
            .field("filter", &self.inner.filter)
            .field("manifest_enabled", &self.is_manifest_enabled())
            .finish()
    }
}

impl From<DirectoryPathTree> for DirectoryPathTreeRepr {
    fn from(tree: DirectoryPathTree) -> Self {
        let dir = std::path::absolute(tree.dir()).unwrap_or_else(|_| tree.dir().to_path_buf());
        DirectoryPathTreeRepr {
            dir: dir.to_string_lossy().into_owned(),
            filter: tree.inner.filter.clone(),
            manifest_enabled: tree.is_manifest_enabled(),
        }
    }
}

impl From<DirectoryPathTreeRepr> for DirectoryPathTree {
    fn from(repr: DirectoryPathTreeRepr) -> Self {
        DirectoryPathTree::with_options(repr.dir, repr.filter, repr.manifest_enabled)
    }
}
