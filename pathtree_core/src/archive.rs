//! Trees over zip-format archives (jar, zip).

use crate::config::settings;
use crate::error::{Error, Result};
use crate::filter::PathFilter;
use crate::manifest::{ManifestAttributes, ManifestState, MultiReleaseMapping};
use crate::relative;
use crate::resource::{ArchiveEntry, ResourcePath};
use crate::tree::{OpenPathTree, PathTree, tree_identity};
use crate::visit::{PathVisit, PathVisitor};
use crate::walk::{self, Container, EntryFn};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::hash::{Hash, Hasher};
use std::io::{BufReader, Read};
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use zip::ZipArchive;

/// Entry kinds of a mounted archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MountEntry {
    Dir,
    File(usize),
}

/// A mounted archive: the open zip file plus an index of its entries.
///
/// Parent directories missing from the zip's central directory are
/// synthesized so every entry has a parent. Unmounting drops the zip handle;
/// reads after that fail with [`Error::Closed`].
pub(crate) struct ArchiveMount {
    archive: Arc<Path>,
    entries: BTreeMap<String, MountEntry>,
    zip: Mutex<Option<ZipArchive<BufReader<File>>>>,
}

impl ArchiveMount {
    pub(crate) fn mount(archive: &Path) -> Result<Arc<Self>> {
        let file = File::open(archive).map_err(|e| Error::io(archive, e))?;
        let zip = ZipArchive::new(BufReader::new(file)).map_err(|e| Error::archive(archive, e))?;

        let mut entries = BTreeMap::new();
        entries.insert(String::new(), MountEntry::Dir);

        let names: Vec<String> = zip.file_names().map(String::from).collect();
        for raw in names {
            let Some(index) = zip.index_for_name(&raw) else {
                continue;
            };
            let normalized = raw.replace('\\', "/");
            let is_dir = normalized.ends_with('/');
            let name = normalized.trim_start_matches('/').trim_end_matches('/');
            if name.is_empty() || relative::has_parent_segment(name) {
                tracing::warn!(archive = %archive.display(), entry = %raw, "skipping unsafe archive entry");
                continue;
            }

            let mut parent = name;
            while let Some((p, _)) = parent.rsplit_once('/') {
                entries.entry(p.to_string()).or_insert(MountEntry::Dir);
                parent = p;
            }

            let kind = if is_dir {
                MountEntry::Dir
            } else {
                MountEntry::File(index)
            };
            entries.insert(name.to_string(), kind);
        }

        tracing::debug!(archive = %archive.display(), entries = entries.len(), "mounted archive");
        Ok(Arc::new(Self {
            archive: Arc::from(archive),
            entries,
            zip: Mutex::new(Some(zip)),
        }))
    }

    pub(crate) fn archive_path(&self) -> &Path {
        &self.archive
    }

    pub(crate) fn is_open(&self) -> bool {
        self.zip.lock().is_some()
    }

    /// Unmount. Returns whether this call did the unmounting.
    pub(crate) fn close(&self) -> bool {
        let closed = self.zip.lock().take().is_some();
        if closed {
            tracing::debug!(archive = %self.archive.display(), "unmounted archive");
        }
        closed
    }

    pub(crate) fn is_dir(&self, name: &str) -> bool {
        matches!(self.entries.get(name), Some(MountEntry::Dir))
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(Error::closed(&[&*self.archive]))
        }
    }

    /// Content of the file entry `name`; `None` for directories and missing entries.
    pub(crate) fn read(&self, name: &str) -> Result<Option<Vec<u8>>> {
        let Some(MountEntry::File(index)) = self.entries.get(name).copied() else {
            self.ensure_open()?;
            return Ok(None);
        };
        let mut guard = self.zip.lock();
        let zip = guard
            .as_mut()
            .ok_or_else(|| Error::closed(&[&*self.archive]))?;
        let mut file = zip
            .by_index(index)
            .map_err(|e| Error::archive(&*self.archive, e))?;
        let mut buf = Vec::with_capacity(usize::try_from(file.size()).unwrap_or(0));
        file.read_to_end(&mut buf)
            .map_err(|e| Error::io(&*self.archive, e))?;
        Ok(Some(buf))
    }
}

impl fmt::Debug for ArchiveMount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArchiveMount")
            .field("archive", &self.archive)
            .field("entries", &self.entries.len())
            .field("open", &self.is_open())
            .finish()
    }
}

impl Container for Arc<ArchiveMount> {
    fn root(&self) -> &Arc<Path> {
        &self.archive
    }

    fn for_each_entry(&self, start: &str, f: &mut EntryFn<'_>) -> Result<ControlFlow<()>> {
        self.ensure_open()?;
        let under = self
            .entries
            .range::<str, _>((std::ops::Bound::Included(start), std::ops::Bound::Unbounded))
            .take_while(|(name, _)| name.starts_with(start))
            .filter(|(name, _)| relative::is_under(name, start));
        for (name, kind) in under {
            if f(name, *kind == MountEntry::Dir).is_break() {
                return Ok(ControlFlow::Break(()));
            }
        }
        Ok(ControlFlow::Continue(()))
    }

    fn exists(&self, relative: &str) -> Result<bool> {
        self.ensure_open()?;
        Ok(self.entries.contains_key(relative))
    }

    fn resolve(&self, relative: &str) -> ResourcePath {
        ResourcePath::Archive(ArchiveEntry::new(self.clone(), relative))
    }

    fn read(&self, relative: &str) -> Result<Option<Vec<u8>>> {
        ArchiveMount::read(self, relative)
    }
}

/// A tree over the entries of an archive.
///
/// The tree itself holds no open file. [`open`](PathTree::open) mounts the
/// archive and returns a handle that keeps it mounted until closed; the other
/// operations mount the archive for the duration of the call.
#[derive(Clone)]
pub struct ArchivePathTree {
    inner: Arc<ArchiveInner>,
}

struct ArchiveInner {
    archive: Arc<Path>,
    filter: Option<PathFilter>,
    manifest: ManifestState,
}

impl ArchivePathTree {
    pub fn new(archive: impl AsRef<Path>) -> Self {
        Self::with_filter(archive, None)
    }

    pub fn with_filter(archive: impl AsRef<Path>, filter: Option<PathFilter>) -> Self {
        Self::build(archive.as_ref(), filter, settings().release)
    }

    /// The same tree resolving multi-release overrides for `release`.
    pub fn with_release(&self, release: u32) -> Self {
        Self::build(self.archive_path(), self.inner.filter.clone(), release)
    }

    fn build(archive: &Path, filter: Option<PathFilter>, release: u32) -> Self {
        Self {
            inner: Arc::new(ArchiveInner {
                archive: Arc::from(archive),
                filter,
                manifest: ManifestState::new(true, release),
            }),
        }
    }

    pub fn archive_path(&self) -> &Path {
        &self.inner.archive
    }

    pub fn filter(&self) -> Option<&PathFilter> {
        self.inner.filter.as_ref()
    }

    /// Mount the archive and hand out an exclusive handle over the mount.
    pub fn open_archive(&self) -> Result<OpenArchivePathTree> {
        let mount = self.mount()?;
        Ok(OpenArchivePathTree {
            tree: self.clone(),
            mount,
        })
    }

    pub(crate) fn mount(&self) -> Result<Arc<ArchiveMount>> {
        ArchiveMount::mount(&self.inner.archive)
    }

    /// Run `f` over a temporary mount that is unmounted afterwards.
    pub(crate) fn with_mount<R>(&self, f: impl FnOnce(&Arc<ArchiveMount>) -> Result<R>) -> Result<R> {
        let mount = self.mount()?;
        let result = f(&mount);
        mount.close();
        result
    }

    fn mapping(&self, mount: &Arc<ArchiveMount>) -> Result<Arc<MultiReleaseMapping>> {
        self.inner.manifest.mapping(mount)
    }

    pub(crate) fn manifest_on(&self, mount: &Arc<ArchiveMount>) -> Result<Option<ManifestAttributes>> {
        self.inner.manifest.attributes(mount)
    }

    pub(crate) fn cached_manifest(&self) -> Option<Option<ManifestAttributes>> {
        self.inner.manifest.cached_attributes()
    }

    pub(crate) fn walk_on(
        &self,
        mount: &Arc<ArchiveMount>,
        visitor: &mut dyn PathVisitor,
    ) -> Result<()> {
        let mapping = self.mapping(mount)?;
        walk::walk(mount, "", self.filter(), &mapping, visitor)
    }

    pub(crate) fn walk_if_contains_on(
        &self,
        mount: &Arc<ArchiveMount>,
        relative: &str,
        visitor: &mut dyn PathVisitor,
    ) -> Result<()> {
        let mapping = self.mapping(mount)?;
        walk::walk_if_contains(mount, relative, self.filter(), &mapping, visitor)
    }

    pub(crate) fn accept_on(
        &self,
        mount: &Arc<ArchiveMount>,
        relative: &str,
        consumer: &mut dyn FnMut(Option<&PathVisit>),
    ) -> Result<()> {
        let mapping = self.mapping(mount)?;
        walk::accept(mount, relative, self.filter(), &mapping, consumer)
    }

    pub(crate) fn lookup_on(
        &self,
        mount: &Arc<ArchiveMount>,
        relative: &str,
    ) -> Result<Option<ResourcePath>> {
        let mapping = self.mapping(mount)?;
        walk::lookup(mount, relative, self.filter(), &mapping)
    }
}

impl PathTree for ArchivePathTree {
    fn roots(&self) -> Vec<PathBuf> {
        vec![self.archive_path().to_path_buf()]
    }

    fn is_archive_or_origin(&self) -> bool {
        true
    }

    fn manifest_attributes(&self) -> Result<Option<ManifestAttributes>> {
        if let Some(cached) = self.cached_manifest() {
            return Ok(cached);
        }
        self.with_mount(|mount| self.manifest_on(mount))
    }

    fn walk(&self, visitor: &mut dyn PathVisitor) -> Result<()> {
        self.with_mount(|mount| self.walk_on(mount, visitor))
    }

    fn walk_if_contains(&self, relative: &str, visitor: &mut dyn PathVisitor) -> Result<()> {
        relative::ensure_relative(relative)?;
        self.with_mount(|mount| self.walk_if_contains_on(mount, relative, visitor))
    }

    fn accept(&self, relative: &str, consumer: &mut dyn FnMut(Option<&PathVisit>)) -> Result<()> {
        relative::ensure_relative(relative)?;
        self.with_mount(|mount| self.accept_on(mount, relative, consumer))
    }

    fn contains(&self, relative: &str) -> Result<bool> {
        relative::ensure_relative(relative)?;
        self.with_mount(|mount| Ok(self.lookup_on(mount, relative)?.is_some()))
    }

    fn open(&self) -> Result<Box<dyn OpenPathTree>> {
        Ok(Box::new(self.open_archive()?))
    }

    tree_identity!();
}

impl PartialEq for ArchivePathTree {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
            || (self.archive_path() == other.archive_path()
                && self.inner.filter == other.inner.filter
                && self.inner.manifest.release() == other.inner.manifest.release())
    }
}

impl Eq for ArchivePathTree {}

impl Hash for ArchivePathTree {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.archive_path().hash(state);
        self.inner.filter.hash(state);
    }
}

impl fmt::Debug for ArchivePathTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArchivePathTree")
            .field("archive", &self.archive_path())
            .field("filter", &self.inner.filter)
            .finish()
    }
}

/// An exclusively owned mount of an [`ArchivePathTree`].
///
/// The archive is unmounted by [`close`](OpenPathTree::close) or when the
/// handle is dropped.
pub struct OpenArchivePathTree {
    tree: ArchivePathTree,
    mount: Arc<ArchiveMount>,
}

impl OpenArchivePathTree {
    fn live_mount(&self) -> Result<&Arc<ArchiveMount>> {
        if self.mount.is_open() {
            Ok(&self.mount)
        } else {
            Err(Error::closed(&[self.tree.archive_path()]))
        }
    }
}

impl PathTree for OpenArchivePathTree {
    fn roots(&self) -> Vec<PathBuf> {
        self.tree.roots()
    }

    fn is_archive_or_origin(&self) -> bool {
        true
    }

    fn manifest_attributes(&self) -> Result<Option<ManifestAttributes>> {
        if let Some(cached) = self.tree.cached_manifest() {
            return Ok(cached);
        }
        self.tree.manifest_on(self.live_mount()?)
    }

    fn walk(&self, visitor: &mut dyn PathVisitor) -> Result<()> {
        self.tree.walk_on(self.live_mount()?, visitor)
    }

    fn walk_if_contains(&self, relative: &str, visitor: &mut dyn PathVisitor) -> Result<()> {
        self.tree
            .walk_if_contains_on(self.live_mount()?, relative, visitor)
    }

    fn accept(&self, relative: &str, consumer: &mut dyn FnMut(Option<&PathVisit>)) -> Result<()> {
        self.tree.accept_on(self.live_mount()?, relative, consumer)
    }

    fn contains(&self, relative: &str) -> Result<bool> {
        Ok(self.get_path(relative)?.is_some())
    }

    fn open(&self) -> Result<Box<dyn OpenPathTree>> {
        self.tree.open()
    }

    tree_identity!();
}

impl OpenPathTree for OpenArchivePathTree {
    fn original_tree(&self) -> &dyn PathTree {
        &self.tree
    }

    fn as_path_tree(&self) -> &dyn PathTree {
        self
    }

    fn is_open(&self) -> bool {
        self.mount.is_open()
    }

    fn get_path(&self, relative: &str) -> Result<Option<ResourcePath>> {
        self.tree.lookup_on(self.live_mount()?, relative)
    }

    fn close(&self) -> Result<()> {
        self.mount.close();
        Ok(())
    }
}

impl Drop for OpenArchivePathTree {
    fn drop(&mut self) {
        self.mount.close();
    }
}

impl PartialEq for OpenArchivePathTree {
    fn eq(&self, other: &Self) -> bool {
        self.tree == other.tree && Arc::ptr_eq(&self.mount, &other.mount)
    }
}

impl Eq for OpenArchivePathTree {}

impl Hash for OpenArchivePathTree {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.tree.hash(state);
    }
}

impl fmt::Debug for OpenArchivePathTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenArchivePathTree")
            .field("archive", &self.tree.archive_path())
            .field("open", &self.mount.is_open())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::MANIFEST_PATH;
    use crate::testing::write_jar;
    use crate::tree::PathTreeExt;
    use tempfile::TempDir;

    fn jar(temp_dir: &TempDir) -> PathBuf {
        let path = temp_dir.path().join("acme.jar");
        write_jar(
            &path,
            &[
                (MANIFEST_PATH, "Manifest-Version: 1.0\nImplementation-Title: acme\n"),
                ("com/acme/App.class", "app"),
                ("com/acme/util/Strings.class", "strings"),
                ("application.properties", "x=1"),
            ],
        );
        path
    }

    #[test]
    fn test_mount_synthesizes_directories() {
        let temp_dir = TempDir::new().unwrap();
        let mount = ArchiveMount::mount(&jar(&temp_dir)).unwrap();
        assert!(mount.is_dir(""));
        assert!(mount.is_dir("com"));
        assert!(mount.is_dir("com/acme/util"));
        assert!(!mount.is_dir("com/acme/App.class"));
        assert_eq!(mount.read("com/acme/App.class").unwrap().unwrap(), b"app");
        assert_eq!(mount.read("com").unwrap(), None);
        assert!(mount.close());
        assert!(!mount.close());
        assert!(mount.read("com/acme/App.class").unwrap_err().is_closed());
    }

    #[test]
    fn test_mount_missing_archive() {
        let temp_dir = TempDir::new().unwrap();
        let err = ArchiveMount::mount(&temp_dir.path().join("nope.jar")).unwrap_err();
        assert!(matches!(err, Error::Io { .. }));
    }

    #[test]
    fn test_mount_corrupt_archive() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("corrupt.jar");
        std::fs::write(&path, b"definitely not a zip").unwrap();
        let err = ArchiveMount::mount(&path).unwrap_err();
        match err {
            Error::Archive { path: p, .. } => assert_eq!(p, path),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_walk_unopened() {
        let temp_dir = TempDir::new().unwrap();
        let tree = ArchivePathTree::new(jar(&temp_dir));
        let paths = tree.relative_paths().unwrap();
        assert_eq!(
            paths,
            vec![
                "",
                "META-INF",
                "META-INF/MANIFEST.MF",
                "application.properties",
                "com",
                "com/acme",
                "com/acme/App.class",
                "com/acme/util",
                "com/acme/util/Strings.class",
            ]
        );
        assert!(tree.is_archive_or_origin());
    }

    #[test]
    fn test_point_lookups_unopened() {
        let temp_dir = TempDir::new().unwrap();
        let tree = ArchivePathTree::new(jar(&temp_dir));
        assert!(tree.contains("com/acme/App.class").unwrap());
        assert!(tree.contains("com/acme/").unwrap());
        assert!(!tree.contains("com/acme/Missing.class").unwrap());
        assert!(tree.contains("/com").is_err());
        assert!(tree.contains("com/../x").is_err());

        let content = tree
            .apply("application.properties", |v| v.map(|v| v.read().unwrap()))
            .unwrap();
        assert_eq!(content.as_deref(), Some(&b"x=1"[..]));
    }

    #[test]
    fn test_manifest() {
        let temp_dir = TempDir::new().unwrap();
        let tree = ArchivePathTree::new(jar(&temp_dir));
        let attributes = tree.manifest_attributes().unwrap().unwrap();
        assert_eq!(attributes.implementation_title.as_deref(), Some("acme"));
        assert!(!attributes.multi_release);
        // Served from the cache once computed
        assert!(tree.cached_manifest().is_some());
    }

    #[test]
    fn test_open_and_close() {
        let temp_dir = TempDir::new().unwrap();
        let tree = ArchivePathTree::new(jar(&temp_dir));
        let open = tree.open().unwrap();
        assert!(open.is_open());
        assert!(open.original_tree().dyn_eq(&tree));

        let path = open.get_path("com/acme/App.class").unwrap().unwrap();
        assert_eq!(path.read().unwrap(), b"app");
        let entry = path.as_archive_entry().unwrap();
        assert_eq!(entry.name(), "com/acme/App.class");

        open.close().unwrap();
        assert!(!open.is_open());
        assert!(open.contains("com/acme/App.class").unwrap_err().is_closed());
        assert!(open.relative_paths().unwrap_err().is_closed());
        assert!(path.read().unwrap_err().is_closed());
        // Closing twice is harmless
        open.close().unwrap();
    }

    #[test]
    fn test_each_open_mounts_separately() {
        let temp_dir = TempDir::new().unwrap();
        let tree = ArchivePathTree::new(jar(&temp_dir));
        let a = tree.open_archive().unwrap();
        let b = tree.open_archive().unwrap();
        a.close().unwrap();
        assert!(!a.is_open());
        assert!(b.is_open());
        assert!(b.contains("application.properties").unwrap());
    }

    #[test]
    fn test_drop_unmounts() {
        let temp_dir = TempDir::new().unwrap();
        let tree = ArchivePathTree::new(jar(&temp_dir));
        let path = {
            let open = tree.open_archive().unwrap();
            open.get_path("com/acme/App.class").unwrap().unwrap()
        };
        assert!(path.read().unwrap_err().is_closed());
    }

    #[test]
    fn test_filter() {
        let temp_dir = TempDir::new().unwrap();
        let filter = PathFilter::includes(["**/*.class"]).unwrap();
        let tree = ArchivePathTree::with_filter(jar(&temp_dir), Some(filter));
        assert_eq!(
            tree.relative_paths().unwrap(),
            vec!["com/acme/App.class", "com/acme/util/Strings.class"]
        );
        assert!(!tree.contains("application.properties").unwrap());
    }

    #[test]
    fn test_walk_if_contains() {
        let temp_dir = TempDir::new().unwrap();
        let tree = ArchivePathTree::new(jar(&temp_dir));
        let mut paths = Vec::new();
        tree.walk_if_contains("com/acme/util", &mut |v: &PathVisit| {
            paths.push(v.relative_path().to_string())
        })
        .unwrap();
        assert_eq!(paths, vec!["com/acme/util", "com/acme/util/Strings.class"]);
    }

    #[test]
    fn test_equality() {
        let temp_dir = TempDir::new().unwrap();
        let path = jar(&temp_dir);
        assert_eq!(ArchivePathTree::new(&path), ArchivePathTree::new(&path));
        assert_ne!(
            ArchivePathTree::new(&path),
            ArchivePathTree::with_filter(&path, Some(PathFilter::includes(["*"]).unwrap()))
        );
    }
}
