//! Archive trees whose mounts are shared between concurrent users.
//!
//! Opening the same archive many times (one lookup per class, say) would
//! otherwise mount it once per caller. A shared tree keeps its last mount
//! alive while anyone still uses it and hands every caller a cheap view over
//! it. The mount is unmounted when the last view closes, and the archive is
//! then evicted from the process-wide table so the next open mounts fresh.

use crate::archive::{ArchiveMount, ArchivePathTree};
use crate::error::{Error, Result};
use crate::manifest::ManifestAttributes;
use crate::resource::ResourcePath;
use crate::tree::{OpenPathTree, PathTree, tree_identity};
use crate::visit::{PathVisit, PathVisitor};
use dashmap::DashMap;
use once_cell::sync::Lazy;
use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

static SHARED_TREES: Lazy<DashMap<PathBuf, SharedArchivePathTree>> = Lazy::new(DashMap::new);

fn cache_key(path: &Path) -> PathBuf {
    path.canonicalize()
        .or_else(|_| std::path::absolute(path))
        .unwrap_or_else(|_| path.to_path_buf())
}

/// A live mount plus the number of views using it.
struct SharedMount {
    mount: Arc<ArchiveMount>,
    users: AtomicUsize,
    lock: RwLock<()>,
}

impl SharedMount {
    fn new(mount: Arc<ArchiveMount>) -> Self {
        Self {
            mount,
            users: AtomicUsize::new(1),
            lock: RwLock::new(()),
        }
    }

    /// Join the mount if it is still mounted.
    fn acquire(&self) -> bool {
        let _guard = self.lock.read();
        if !self.mount.is_open() {
            return false;
        }
        let users = self.users.fetch_add(1, Ordering::AcqRel) + 1;
        tracing::debug!(archive = %self.mount.archive_path().display(), users, "joined shared mount");
        true
    }

    /// Leave the mount. Returns true when this was the last user and the
    /// archive got unmounted.
    fn release(&self) -> bool {
        let _guard = self.lock.write();
        let users = self.users.fetch_sub(1, Ordering::AcqRel) - 1;
        tracing::debug!(archive = %self.mount.archive_path().display(), users, "left shared mount");
        if users == 0 {
            self.mount.close();
            true
        } else {
            false
        }
    }
}

/// An archive tree registered in the process-wide sharing table.
#[derive(Clone)]
pub struct SharedArchivePathTree {
    inner: Arc<SharedInner>,
}

struct SharedInner {
    key: PathBuf,
    tree: ArchivePathTree,
    last_mount: Mutex<Option<Arc<SharedMount>>>,
}

impl SharedArchivePathTree {
    /// The shared tree for `archive`, registering one if needed.
    pub fn for_path(archive: impl AsRef<Path>) -> Self {
        let archive = archive.as_ref();
        let key = cache_key(archive);
        SHARED_TREES
            .entry(key.clone())
            .or_insert_with(|| {
                tracing::debug!(archive = %key.display(), "registering shared archive tree");
                Self {
                    inner: Arc::new(SharedInner {
                        key: key.clone(),
                        tree: ArchivePathTree::new(archive),
                        last_mount: Mutex::new(None),
                    }),
                }
            })
            .clone()
    }

    /// Whether `archive` currently has an entry in the sharing table.
    pub fn is_registered(archive: impl AsRef<Path>) -> bool {
        SHARED_TREES.contains_key(&cache_key(archive.as_ref()))
    }

    pub fn archive_path(&self) -> &Path {
        self.inner.tree.archive_path()
    }

    /// Join the live mount or mount the archive anew.
    pub fn open_shared(&self) -> Result<SharedOpenArchivePathTree> {
        let mut last = self.inner.last_mount.lock();
        if let Some(shared) = last.as_ref() {
            if shared.acquire() {
                return Ok(self.view(shared.clone()));
            }
        }
        let shared = Arc::new(SharedMount::new(self.inner.tree.mount()?));
        *last = Some(shared.clone());
        Ok(self.view(shared))
    }

    fn view(&self, shared: Arc<SharedMount>) -> SharedOpenArchivePathTree {
        SharedOpenArchivePathTree {
            tree: self.clone(),
            shared,
            closed: AtomicBool::new(false),
        }
    }

    fn with_view<R>(&self, f: impl FnOnce(&SharedOpenArchivePathTree) -> Result<R>) -> Result<R> {
        let view = self.open_shared()?;
        let result = f(&view);
        view.close()?;
        result
    }

    fn evict(&self) {
        let removed = SHARED_TREES
            .remove_if(&self.inner.key, |_, tree| Arc::ptr_eq(&tree.inner, &self.inner))
            .is_some();
        if removed {
            tracing::debug!(archive = %self.inner.key.display(), "evicted shared archive tree");
        }
    }
}

impl PathTree for SharedArchivePathTree {
    fn roots(&self) -> Vec<PathBuf> {
        self.inner.tree.roots()
    }

    fn is_archive_or_origin(&self) -> bool {
        true
    }

    fn manifest_attributes(&self) -> Result<Option<ManifestAttributes>> {
        if let Some(cached) = self.inner.tree.cached_manifest() {
            return Ok(cached);
        }
        self.with_view(|view| view.manifest_attributes())
    }

    fn walk(&self, visitor: &mut dyn PathVisitor) -> Result<()> {
        self.with_view(|view| view.walk(visitor))
    }

    fn walk_if_contains(&self, relative: &str, visitor: &mut dyn PathVisitor) -> Result<()> {
        self.with_view(|view| view.walk_if_contains(relative, visitor))
    }

    fn accept(&self, relative: &str, consumer: &mut dyn FnMut(Option<&PathVisit>)) -> Result<()> {
        self.with_view(|view| view.accept(relative, consumer))
    }

    fn contains(&self, relative: &str) -> Result<bool> {
        self.with_view(|view| view.contains(relative))
    }

    fn open(&self) -> Result<Box<dyn OpenPathTree>> {
        Ok(Box::new(self.open_shared()?))
    }

    tree_identity!();
}

impl PartialEq for SharedArchivePathTree {
    fn eq(&self, other: &Self) -> bool {
        self.inner.tree == other.inner.tree
    }
}

impl Eq for SharedArchivePathTree {}

impl Hash for SharedArchivePathTree {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.tree.hash(state);
    }
}

impl fmt::Debug for SharedArchivePathTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedArchivePathTree")
            .field("archive", &self.archive_path())
            .finish()
    }
}

/// One caller's view over a shared mount.
///
/// Closing is idempotent; dropping an unclosed view closes it.
pub struct SharedOpenArchivePathTree {
    tree: SharedArchivePathTree,
    shared: Arc<SharedMount>,
    closed: AtomicBool,
}

impl SharedOpenArchivePathTree {
    fn live_mount(&self) -> Result<&Arc<ArchiveMount>> {
        if self.is_open() {
            Ok(&self.shared.mount)
        } else {
            Err(Error::closed(&[self.tree.archive_path()]))
        }
    }

    fn archive(&self) -> &ArchivePathTree {
        &self.tree.inner.tree
    }
}

impl PathTree for SharedOpenArchivePathTree {
    fn roots(&self) -> Vec<PathBuf> {
        self.tree.roots()
    }

    fn is_archive_or_origin(&self) -> bool {
        true
    }

    fn manifest_attributes(&self) -> Result<Option<ManifestAttributes>> {
        if let Some(cached) = self.archive().cached_manifest() {
            return Ok(cached);
        }
        self.archive().manifest_on(self.live_mount()?)
    }

    fn walk(&self, visitor: &mut dyn PathVisitor) -> Result<()> {
        self.archive().walk_on(self.live_mount()?, visitor)
    }

    fn walk_if_contains(&self, relative: &str, visitor: &mut dyn PathVisitor) -> Result<()> {
        self.archive()
            .walk_if_contains_on(self.live_mount()?, relative, visitor)
    }

    fn accept(&self, relative: &str, consumer: &mut dyn FnMut(Option<&PathVisit>)) -> Result<()> {
        self.archive()
            .accept_on(self.live_mount()?, relative, consumer)
    }

    fn contains(&self, relative: &str) -> Result<bool> {
        Ok(self.get_path(relative)?.is_some())
    }

    fn open(&self) -> Result<Box<dyn OpenPathTree>> {
        self.tree.open()
    }

    tree_identity!();
}

impl OpenPathTree for SharedOpenArchivePathTree {
    fn original_tree(&self) -> &dyn PathTree {
        &self.tree
    }

    fn as_path_tree(&self) -> &dyn PathTree {
        self
    }

    fn is_open(&self) -> bool {
        !self.closed.load(Ordering::Acquire) && self.shared.mount.is_open()
    }

    fn get_path(&self, relative: &str) -> Result<Option<ResourcePath>> {
        self.archive().lookup_on(self.live_mount()?, relative)
    }

    fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        if self.shared.release() {
            self.tree.evict();
        }
        Ok(())
    }
}

impl Drop for SharedOpenArchivePathTree {
    fn drop(&mut self) {
        // close never fails for shared views
        let _ = self.close();
    }
}

impl PartialEq for SharedOpenArchivePathTree {
    fn eq(&self, other: &Self) -> bool {
        self.tree == other.tree && Arc::ptr_eq(&self.shared, &other.shared)
    }
}

impl Eq for SharedOpenArchivePathTree {}

impl Hash for SharedOpenArchivePathTree {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.tree.hash(state);
    }
}

impl fmt::Debug for SharedOpenArchivePathTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedOpenArchivePathTree")
            .field("archive", &self.tree.archive_path())
            .field("open", &self.is_open())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::write_jar;
    use crate::tree::PathTreeExt;
    use tempfile::TempDir;

    fn jar(temp_dir: &TempDir) -> PathBuf {
        let path = temp_dir.path().join("shared.jar");
        write_jar(
            &path,
            &[("com/acme/App.class", "app"), ("readme.txt", "hello")],
        );
        path
    }

    #[test]
    fn test_for_path_returns_registered_tree() {
        let temp_dir = TempDir::new().unwrap();
        let path = jar(&temp_dir);
        let a = SharedArchivePathTree::for_path(&path);
        let b = SharedArchivePathTree::for_path(&path);
        assert!(Arc::ptr_eq(&a.inner, &b.inner));
        assert!(SharedArchivePathTree::is_registered(&path));
    }

    #[test]
    fn test_views_share_one_mount() {
        let temp_dir = TempDir::new().unwrap();
        let path = jar(&temp_dir);
        let tree = SharedArchivePathTree::for_path(&path);

        let views: Vec<_> = (0..3).map(|_| tree.open_shared().unwrap()).collect();
        assert!(Arc::ptr_eq(&views[0].shared, &views[1].shared));
        assert!(Arc::ptr_eq(&views[1].shared, &views[2].shared));

        views[0].close().unwrap();
        views[1].close().unwrap();
        assert!(!views[0].is_open());
        assert!(views[2].is_open());
        assert!(views[2].contains("readme.txt").unwrap());
        assert!(SharedArchivePathTree::is_registered(&path));

        views[2].close().unwrap();
        assert!(!views[2].is_open());
        assert!(!views[2].shared.mount.is_open());
        assert!(views[2].contains("readme.txt").unwrap_err().is_closed());
        assert!(!SharedArchivePathTree::is_registered(&path));
    }

    #[test]
    fn test_reopen_after_full_close_mounts_fresh() {
        let temp_dir = TempDir::new().unwrap();
        let path = jar(&temp_dir);

        let first = SharedArchivePathTree::for_path(&path).open_shared().unwrap();
        let first_mount = first.shared.clone();
        first.close().unwrap();

        let second = SharedArchivePathTree::for_path(&path).open_shared().unwrap();
        assert!(!Arc::ptr_eq(&first_mount, &second.shared));
        assert!(second.is_open());
        assert!(second.contains("com/acme/App.class").unwrap());
    }

    #[test]
    fn test_close_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let tree = SharedArchivePathTree::for_path(jar(&temp_dir));
        let a = tree.open_shared().unwrap();
        let b = tree.open_shared().unwrap();
        a.close().unwrap();
        a.close().unwrap();
        // A second close of `a` must not release `b`'s share
        assert!(b.is_open());
        assert_eq!(b.shared.users.load(Ordering::Acquire), 1);
    }

    #[test]
    fn test_drop_releases() {
        let temp_dir = TempDir::new().unwrap();
        let tree = SharedArchivePathTree::for_path(jar(&temp_dir));
        let kept = tree.open_shared().unwrap();
        {
            let _dropped = tree.open_shared().unwrap();
            assert_eq!(kept.shared.users.load(Ordering::Acquire), 2);
        }
        assert_eq!(kept.shared.users.load(Ordering::Acquire), 1);
        assert!(kept.is_open());
    }

    #[test]
    fn test_unopened_operations() {
        let temp_dir = TempDir::new().unwrap();
        let path = jar(&temp_dir);
        let tree = SharedArchivePathTree::for_path(&path);
        assert!(tree.is_archive_or_origin());
        assert_eq!(
            tree.relative_paths().unwrap(),
            vec!["", "com", "com/acme", "com/acme/App.class", "readme.txt"]
        );
        assert!(tree.contains("readme.txt").unwrap());
        assert!(tree.contains("../readme.txt").is_err());
        assert_eq!(tree.manifest_attributes().unwrap(), None);
        // Temporary views leave nothing mounted behind
        assert!(!SharedArchivePathTree::is_registered(&path));
    }

    #[test]
    fn test_concurrent_open_close() {
        let temp_dir = TempDir::new().unwrap();
        let path = jar(&temp_dir);

        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    for _ in 0..20 {
                        let view = SharedArchivePathTree::for_path(&path).open_shared().unwrap();
                        assert!(view.contains("readme.txt").unwrap());
                        view.close().unwrap();
                    }
                });
            }
        });

        assert!(!SharedArchivePathTree::is_registered(&path));
    }
}
