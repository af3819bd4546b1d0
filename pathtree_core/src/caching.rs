//! A tree that memoizes one full walk of its delegate.

use crate::error::Result;
use crate::manifest::ManifestAttributes;
use crate::relative;
use crate::resource::ResourcePath;
use crate::tree::{OpenPathTree, PathTree, tree_identity};
use crate::visit::{PathVisit, PathVisitor};
use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use url::Url;

/// A detached copy of one visit.
struct CachedVisit {
    root: Arc<Path>,
    path: ResourcePath,
    relative: String,
    url: Arc<OnceCell<Url>>,
}

impl CachedVisit {
    fn to_visit(&self) -> PathVisit {
        PathVisit::with_shared_url(
            self.root.clone(),
            self.path.clone(),
            self.relative.as_str(),
            self.url.clone(),
        )
    }
}

/// Every visit of one delegate walk, in walk order.
struct Snapshot {
    visits: Vec<CachedVisit>,
    index: HashMap<String, usize>,
}

impl Snapshot {
    fn build(tree: &dyn PathTree) -> Result<Self> {
        let mut visits = Vec::new();
        let mut index = HashMap::new();
        tree.walk(&mut |visit: &PathVisit| {
            index
                .entry(visit.relative_path().to_string())
                .or_insert(visits.len());
            visits.push(CachedVisit {
                root: visit.root_arc().clone(),
                path: visit.path().clone(),
                relative: visit.relative_path().to_string(),
                url: Arc::new(OnceCell::new()),
            });
        })?;
        Ok(Self { visits, index })
    }

    fn get(&self, relative: &str) -> Option<&CachedVisit> {
        self.index.get(relative).map(|&i| &self.visits[i])
    }
}

enum Delegate {
    Tree(Arc<dyn PathTree>),
    Open(Box<dyn OpenPathTree>),
}

impl Delegate {
    fn tree(&self) -> &dyn PathTree {
        match self {
            Delegate::Tree(tree) => tree.as_ref(),
            Delegate::Open(open) => open.as_path_tree(),
        }
    }
}

/// Serves walks and lookups from a snapshot of the delegate's first full walk.
///
/// Content is assumed not to change while the snapshot lives. Entries of an
/// unopened archive delegate are listed from the snapshot but can only be read
/// while a mount is live, so wrap an open archive tree to read through the cache.
pub struct CachingPathTree {
    delegate: Delegate,
    snapshot: RwLock<Option<Arc<Snapshot>>>,
}

impl CachingPathTree {
    pub fn new(delegate: Arc<dyn PathTree>) -> Self {
        Self::with_delegate(Delegate::Tree(delegate))
    }

    /// Cache an open tree; closing the cache closes it.
    pub fn new_open(delegate: Box<dyn OpenPathTree>) -> Self {
        Self::with_delegate(Delegate::Open(delegate))
    }

    fn with_delegate(delegate: Delegate) -> Self {
        Self {
            delegate,
            snapshot: RwLock::new(None),
        }
    }

    pub fn delegate(&self) -> &dyn PathTree {
        self.delegate.tree()
    }

    /// Whether a snapshot is currently held.
    pub fn is_cached(&self) -> bool {
        self.snapshot.read().is_some()
    }

    fn snapshot(&self) -> Result<Arc<Snapshot>> {
        if let Some(snapshot) = self.snapshot.read().as_ref() {
            return Ok(snapshot.clone());
        }
        // Concurrent builders may race here; the last one to publish wins.
        let built = Arc::new(Snapshot::build(self.delegate.tree())?);
        tracing::debug!(entries = built.visits.len(), "built walk snapshot");
        *self.snapshot.write() = Some(built.clone());
        Ok(built)
    }

    fn replay<'a>(
        visits: impl Iterator<Item = &'a CachedVisit>,
        visitor: &mut dyn PathVisitor,
    ) {
        for cached in visits {
            let visit = cached.to_visit();
            visitor.visit_path(&visit);
            if visit.is_stopped() {
                break;
            }
        }
    }
}

impl PathTree for CachingPathTree {
    fn roots(&self) -> Vec<PathBuf> {
        self.delegate.tree().roots()
    }

    fn is_archive_or_origin(&self) -> bool {
        self.delegate.tree().is_archive_or_origin()
    }

    fn manifest_attributes(&self) -> Result<Option<ManifestAttributes>> {
        self.delegate.tree().manifest_attributes()
    }

    fn walk(&self, visitor: &mut dyn PathVisitor) -> Result<()> {
        let snapshot = self.snapshot()?;
        Self::replay(snapshot.visits.iter(), visitor);
        Ok(())
    }

    fn walk_if_contains(&self, relative: &str, visitor: &mut dyn PathVisitor) -> Result<()> {
        let relative = relative::checked(relative)?;
        let snapshot = self.snapshot()?;
        Self::replay(
            snapshot
                .visits
                .iter()
                .filter(|cached| relative::is_under(&cached.relative, &relative)),
            visitor,
        );
        Ok(())
    }

    fn accept(&self, relative: &str, consumer: &mut dyn FnMut(Option<&PathVisit>)) -> Result<()> {
        let relative = relative::checked(relative)?;
        let snapshot = self.snapshot()?;
        match snapshot.get(&relative) {
            Some(cached) => consumer(Some(&cached.to_visit())),
            None => consumer(None),
        }
        Ok(())
    }

    fn contains(&self, relative: &str) -> Result<bool> {
        let relative = relative::checked(relative)?;
        Ok(self.snapshot()?.get(&relative).is_some())
    }

    fn open(&self) -> Result<Box<dyn OpenPathTree>> {
        Ok(Box::new(CachingPathTree::new_open(self.delegate.tree().open()?)))
    }

    tree_identity!();
}

impl OpenPathTree for CachingPathTree {
    fn original_tree(&self) -> &dyn PathTree {
        match &self.delegate {
            Delegate::Tree(tree) => tree.as_ref(),
            Delegate::Open(open) => open.original_tree(),
        }
    }

    fn as_path_tree(&self) -> &dyn PathTree {
        self
    }

    fn is_open(&self) -> bool {
        match &self.delegate {
            Delegate::Tree(_) => true,
            Delegate::Open(open) => open.is_open(),
        }
    }

    fn get_path(&self, relative: &str) -> Result<Option<ResourcePath>> {
        let relative = relative::checked(relative)?;
        Ok(self
            .snapshot()?
            .get(&relative)
            .map(|cached| cached.path.clone()))
    }

    fn close(&self) -> Result<()> {
        self.snapshot.write().take();
        match &self.delegate {
            Delegate::Tree(_) => Ok(()),
            Delegate::Open(open) => open.close(),
        }
    }
}

impl PartialEq for CachingPathTree {
    fn eq(&self, other: &Self) -> bool {
        self.delegate.tree().dyn_eq(other.delegate.tree())
    }
}

impl Eq for CachingPathTree {}

impl Hash for CachingPathTree {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.delegate.tree().hash(state);
    }
}

impl fmt::Debug for CachingPathTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachingPathTree")
            .field("delegate", &self.delegate.tree())
            .field("cached", &self.is_cached())
            .finish()
    }
}
