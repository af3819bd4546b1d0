//! A filter overlay on top of any tree.

use crate::error::Result;
use crate::filter::PathFilter;
use crate::manifest::ManifestAttributes;
use crate::relative;
use crate::resource::ResourcePath;
use crate::tree::{OpenPathTree, PathTree, tree_identity};
use crate::visit::{PathVisit, PathVisitor};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::PathBuf;
use std::sync::Arc;

fn walk_filtered(
    tree: &dyn PathTree,
    filter: &PathFilter,
    visitor: &mut dyn PathVisitor,
) -> Result<()> {
    tree.walk(&mut |visit: &PathVisit| {
        if filter.is_visible(visit.relative_path()) {
            visitor.visit_path(visit);
        }
    })
}

fn walk_if_contains_filtered(
    tree: &dyn PathTree,
    filter: &PathFilter,
    relative: &str,
    visitor: &mut dyn PathVisitor,
) -> Result<()> {
    tree.walk_if_contains(relative, &mut |visit: &PathVisit| {
        if filter.is_visible(visit.relative_path()) {
            visitor.visit_path(visit);
        }
    })
}

fn accept_filtered(
    tree: &dyn PathTree,
    filter: &PathFilter,
    relative: &str,
    consumer: &mut dyn FnMut(Option<&PathVisit>),
) -> Result<()> {
    let normalized = relative::checked(relative)?;
    if filter.is_visible(&normalized) {
        tree.accept(relative, consumer)
    } else {
        consumer(None);
        Ok(())
    }
}

fn contains_filtered(tree: &dyn PathTree, filter: &PathFilter, relative: &str) -> Result<bool> {
    let normalized = relative::checked(relative)?;
    Ok(filter.is_visible(&normalized) && tree.contains(relative)?)
}

/// A tree showing only the entries of `original` that pass an extra filter.
///
/// Filtering a filtered tree narrows visibility further; both filters apply.
#[derive(Clone)]
pub struct FilteredPathTree {
    original: Arc<dyn PathTree>,
    filter: PathFilter,
}

impl FilteredPathTree {
    pub fn new(original: Arc<dyn PathTree>, filter: PathFilter) -> Self {
        Self { original, filter }
    }

    pub fn filter(&self) -> &PathFilter {
        &self.filter
    }

    /// The innermost tree below any number of filter layers.
    pub fn original_tree(&self) -> &dyn PathTree {
        match self.original.as_any().downcast_ref::<FilteredPathTree>() {
            Some(filtered) => filtered.original_tree(),
            None => self.original.as_ref(),
        }
    }
}

impl PathTree for FilteredPathTree {
    fn roots(&self) -> Vec<PathBuf> {
        self.original.roots()
    }

    fn is_archive_or_origin(&self) -> bool {
        self.original.is_archive_or_origin()
    }

    fn manifest_attributes(&self) -> Result<Option<ManifestAttributes>> {
        self.original.manifest_attributes()
    }

    fn walk(&self, visitor: &mut dyn PathVisitor) -> Result<()> {
        walk_filtered(self.original.as_ref(), &self.filter, visitor)
    }

    fn walk_if_contains(&self, relative: &str, visitor: &mut dyn PathVisitor) -> Result<()> {
        walk_if_contains_filtered(self.original.as_ref(), &self.filter, relative, visitor)
    }

    fn accept(&self, relative: &str, consumer: &mut dyn FnMut(Option<&PathVisit>)) -> Result<()> {
        accept_filtered(self.original.as_ref(), &self.filter, relative, consumer)
    }

    fn contains(&self, relative: &str) -> Result<bool> {
        contains_filtered(self.original.as_ref(), &self.filter, relative)
    }

    fn open(&self) -> Result<Box<dyn OpenPathTree>> {
        Ok(Box::new(FilteredOpenPathTree {
            original: self.original.open()?,
            filter: self.filter.clone(),
        }))
    }

    tree_identity!();
}

impl PartialEq for FilteredPathTree {
    fn eq(&self, other: &Self) -> bool {
        self.filter == other.filter && *self.original == *other.original
    }
}

impl Eq for FilteredPathTree {}

impl Hash for FilteredPathTree {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.original.hash(state);
        self.filter.hash(state);
    }
}

impl fmt::Debug for FilteredPathTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilteredPathTree")
            .field("original", &self.original)
            .field("filter", &self.filter)
            .finish()
    }
}

/// The open counterpart of [`FilteredPathTree`]; closing it closes the
/// wrapped handle.
pub struct FilteredOpenPathTree {
    original: Box<dyn OpenPathTree>,
    filter: PathFilter,
}

impl FilteredOpenPathTree {
    pub fn new(original: Box<dyn OpenPathTree>, filter: PathFilter) -> Self {
        Self { original, filter }
    }
}

impl PathTree for FilteredOpenPathTree {
    fn roots(&self) -> Vec<PathBuf> {
        self.original.roots()
    }

    fn is_archive_or_origin(&self) -> bool {
        self.original.is_archive_or_origin()
    }

    fn manifest_attributes(&self) -> Result<Option<ManifestAttributes>> {
        self.original.manifest_attributes()
    }

    fn walk(&self, visitor: &mut dyn PathVisitor) -> Result<()> {
        walk_filtered(self.original.as_path_tree(), &self.filter, visitor)
    }

    fn walk_if_contains(&self, relative: &str, visitor: &mut dyn PathVisitor) -> Result<()> {
        walk_if_contains_filtered(self.original.as_path_tree(), &self.filter, relative, visitor)
    }

    fn accept(&self, relative: &str, consumer: &mut dyn FnMut(Option<&PathVisit>)) -> Result<()> {
        accept_filtered(self.original.as_path_tree(), &self.filter, relative, consumer)
    }

    fn contains(&self, relative: &str) -> Result<bool> {
        contains_filtered(self.original.as_path_tree(), &self.filter, relative)
    }

    fn open(&self) -> Result<Box<dyn OpenPathTree>> {
        Ok(Box::new(FilteredOpenPathTree {
            original: self.original.open()?,
            filter: self.filter.clone(),
        }))
    }

    tree_identity!();
}

impl OpenPathTree for FilteredOpenPathTree {
    fn original_tree(&self) -> &dyn PathTree {
        self.original.original_tree()
    }

    fn as_path_tree(&self) -> &dyn PathTree {
        self
    }

    fn is_open(&self) -> bool {
        self.original.is_open()
    }

    fn get_path(&self, relative: &str) -> Result<Option<ResourcePath>> {
        let normalized = relative::checked(relative)?;
        if self.filter.is_visible(&normalized) {
            self.original.get_path(relative)
        } else {
            Ok(None)
        }
    }

    fn close(&self) -> Result<()> {
        self.original.close()
    }
}

impl PartialEq for FilteredOpenPathTree {
    fn eq(&self, other: &Self) -> bool {
        self.filter == other.filter
            && self
                .original
                .as_path_tree()
                .dyn_eq(other.original.as_path_tree())
    }
}

impl Eq for FilteredOpenPathTree {}

impl Hash for FilteredOpenPathTree {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.original.as_path_tree().hash(state);
        self.filter.hash(state);
    }
}

impl fmt::Debug for FilteredOpenPathTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilteredOpenPathTree")
            .field("original", &self.original)
            .field("filter", &self.filter)
            .finish()
    }
}
