//! The `PathTree` and `OpenPathTree` contracts.

use crate::error::{Error, Result};
use crate::manifest::ManifestAttributes;
use crate::resource::ResourcePath;
use crate::visit::{PathVisit, PathVisitor};
use std::any::Any;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::PathBuf;

/// A read-only descriptor of a resource hierarchy.
///
/// A tree is cheap to build and holds no live OS resources; operations that
/// need them (an archive mount, for instance) acquire and release them for
/// the duration of the call. Use [`open`](PathTree::open) to keep them alive
/// across many operations.
pub trait PathTree: Send + Sync + fmt::Debug + 'static {
    /// Filesystem locations backing this tree.
    fn roots(&self) -> Vec<PathBuf>;

    /// Whether the content comes from an archive.
    fn is_archive_or_origin(&self) -> bool {
        false
    }

    /// Trimmed manifest attributes, if the tree has a manifest and manifest
    /// handling is enabled for it.
    fn manifest_attributes(&self) -> Result<Option<ManifestAttributes>>;

    /// Visit every visible entry.
    fn walk(&self, visitor: &mut dyn PathVisitor) -> Result<()>;

    /// Visit `relative` and everything below it, if present.
    fn walk_if_contains(&self, relative: &str, visitor: &mut dyn PathVisitor) -> Result<()>;

    /// Call `consumer` exactly once with the visit for `relative`, or `None`
    /// when it is absent or not visible.
    fn accept(&self, relative: &str, consumer: &mut dyn FnMut(Option<&PathVisit>)) -> Result<()>;

    /// Whether `relative` is present and visible.
    fn contains(&self, relative: &str) -> Result<bool> {
        let mut found = false;
        self.accept(relative, &mut |visit| found = visit.is_some())?;
        Ok(found)
    }

    /// Acquire the resources behind this tree.
    fn open(&self) -> Result<Box<dyn OpenPathTree>>;

    fn as_any(&self) -> &dyn Any;

    /// Value equality across tree types.
    fn dyn_eq(&self, other: &dyn PathTree) -> bool;

    /// Value hash consistent with [`dyn_eq`](PathTree::dyn_eq).
    fn dyn_hash(&self, state: &mut dyn Hasher);
}

/// A tree whose backing resources are live until [`close`](OpenPathTree::close).
///
/// Every operation on a closed tree fails with [`Error::Closed`].
pub trait OpenPathTree: PathTree {
    /// The descriptor this handle was opened from.
    fn original_tree(&self) -> &dyn PathTree;

    /// This handle viewed as a plain tree.
    fn as_path_tree(&self) -> &dyn PathTree;

    fn is_open(&self) -> bool;

    /// Resolved location of `relative`, or `None` if absent or not visible.
    fn get_path(&self, relative: &str) -> Result<Option<ResourcePath>>;

    /// Release the backing resources.
    fn close(&self) -> Result<()>;
}

/// Generic helpers available on every tree.
pub trait PathTreeExt: PathTree {
    /// Apply `f` to the visit for `relative` (or `None`) and return its result.
    fn apply<R>(&self, relative: &str, f: impl FnOnce(Option<&PathVisit>) -> R) -> Result<R> {
        let mut f = Some(f);
        let mut out = None;
        self.accept(relative, &mut |visit| {
            if let Some(f) = f.take() {
                out = Some(f(visit));
            }
        })?;
        out.ok_or_else(|| {
            Error::invalid_argument(format!("{:?} did not resolve {}", self, relative))
        })
    }

    /// Relative paths of every visible entry, in walk order.
    fn relative_paths(&self) -> Result<Vec<String>> {
        let mut paths = Vec::new();
        self.walk(&mut |visit: &PathVisit| paths.push(visit.relative_path().to_string()))?;
        Ok(paths)
    }
}

impl<T: PathTree + ?Sized> PathTreeExt for T {}

impl PartialEq for dyn PathTree {
    fn eq(&self, other: &Self) -> bool {
        self.dyn_eq(other)
    }
}

impl Eq for dyn PathTree {}

impl Hash for dyn PathTree {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.dyn_hash(state)
    }
}

/// Implements the `Any`-based identity methods of [`PathTree`] for a type
/// with `PartialEq` and `Hash`.
macro_rules! tree_identity {
    () => {
        fn as_any(&self) -> &dyn std::any::Any {
            self
        }

        fn dyn_eq(&self, other: &dyn $crate::tree::PathTree) -> bool {
            other
                .as_any()
                .downcast_ref::<Self>()
                .is_some_and(|other| self == other)
        }

        fn dyn_hash(&self, mut state: &mut dyn std::hash::Hasher) {
            std::hash::Hash::hash(self, &mut state)
        }
    };
}

pub(crate) use tree_identity;
