//! The union of several independently rooted trees.

use crate::error::Result;
use crate::manifest::ManifestAttributes;
use crate::relative;
use crate::resource::ResourcePath;
use crate::tree::{OpenPathTree, PathTree, tree_identity};
use crate::visit::{PathVisit, PathVisitor};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::PathBuf;
use std::sync::Arc;

fn walk_members<'a>(
    members: impl Iterator<Item = &'a dyn PathTree>,
    mut walk: impl FnMut(&'a dyn PathTree, &mut dyn PathVisitor) -> Result<()>,
    visitor: &mut dyn PathVisitor,
) -> Result<()> {
    for member in members {
        let mut stopped = false;
        walk(member, &mut |visit: &PathVisit| {
            visitor.visit_path(visit);
            stopped |= visit.is_stopped();
        })?;
        if stopped {
            break;
        }
    }
    Ok(())
}

fn accept_first<'a>(
    members: impl Iterator<Item = &'a dyn PathTree>,
    relative: &str,
    consumer: &mut dyn FnMut(Option<&PathVisit>),
) -> Result<()> {
    relative::ensure_relative(relative)?;
    for member in members {
        let mut found = false;
        member.accept(relative, &mut |visit| {
            if let Some(visit) = visit {
                found = true;
                consumer(Some(visit));
            }
        })?;
        if found {
            return Ok(());
        }
    }
    consumer(None);
    Ok(())
}

fn contains_any<'a>(members: impl Iterator<Item = &'a dyn PathTree>, relative: &str) -> Result<bool> {
    relative::ensure_relative(relative)?;
    for member in members {
        if member.contains(relative)? {
            return Ok(true);
        }
    }
    Ok(false)
}

fn first_manifest<'a>(
    members: impl Iterator<Item = &'a dyn PathTree>,
) -> Result<Option<ManifestAttributes>> {
    for member in members {
        if let Some(attributes) = member.manifest_attributes()? {
            return Ok(Some(attributes));
        }
    }
    Ok(None)
}

/// Several trees overlaid as one.
///
/// Walks visit every member in order, so a relative path present in two
/// members is visited twice. Point lookups return the first member's result.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MultiRootPathTree {
    trees: Vec<Arc<dyn PathTree>>,
}

impl MultiRootPathTree {
    pub fn new(trees: Vec<Arc<dyn PathTree>>) -> Self {
        Self { trees }
    }

    pub fn trees(&self) -> &[Arc<dyn PathTree>] {
        &self.trees
    }

    fn members(&self) -> impl Iterator<Item = &dyn PathTree> {
        self.trees.iter().map(|tree| tree.as_ref())
    }

    /// Open every member, closing the ones already opened if one fails.
    pub fn open_all(&self) -> Result<OpenMultiRootPathTree> {
        let mut opened: Vec<Box<dyn OpenPathTree>> = Vec::with_capacity(self.trees.len());
        for tree in &self.trees {
            match tree.open() {
                Ok(open) => opened.push(open),
                Err(err) => {
                    for open in &opened {
                        if let Err(close_err) = open.close() {
                            tracing::warn!(error = %close_err, "failed to close member after open failure");
                        }
                    }
                    return Err(err);
                }
            }
        }
        Ok(OpenMultiRootPathTree {
            tree: self.clone(),
            members: opened,
        })
    }
}

impl PathTree for MultiRootPathTree {
    fn roots(&self) -> Vec<PathBuf> {
        self.trees.iter().flat_map(|tree| tree.roots()).collect()
    }

    fn manifest_attributes(&self) -> Result<Option<ManifestAttributes>> {
        first_manifest(self.members())
    }

    fn walk(&self, visitor: &mut dyn PathVisitor) -> Result<()> {
        walk_members(self.members(), |member, v| member.walk(v), visitor)
    }

    fn walk_if_contains(&self, relative: &str, visitor: &mut dyn PathVisitor) -> Result<()> {
        relative::ensure_relative(relative)?;
        walk_members(
            self.members(),
            |member, v| member.walk_if_contains(relative, v),
            visitor,
        )
    }

    fn accept(&self, relative: &str, consumer: &mut dyn FnMut(Option<&PathVisit>)) -> Result<()> {
        accept_first(self.members(), relative, consumer)
    }

    fn contains(&self, relative: &str) -> Result<bool> {
        contains_any(self.members(), relative)
    }

    fn open(&self) -> Result<Box<dyn OpenPathTree>> {
        Ok(Box::new(self.open_all()?))
    }

    tree_identity!();
}

/// Open handles over every member of a [`MultiRootPathTree`].
pub struct OpenMultiRootPathTree {
    tree: MultiRootPathTree,
    members: Vec<Box<dyn OpenPathTree>>,
}

impl OpenMultiRootPathTree {
    fn members(&self) -> impl Iterator<Item = &dyn PathTree> {
        self.members.iter().map(|member| member.as_path_tree())
    }
}

impl PathTree for OpenMultiRootPathTree {
    fn roots(&self) -> Vec<PathBuf> {
        self.members.iter().flat_map(|member| member.roots()).collect()
    }

    fn manifest_attributes(&self) -> Result<Option<ManifestAttributes>> {
        first_manifest(self.members())
    }

    fn walk(&self, visitor: &mut dyn PathVisitor) -> Result<()> {
        walk_members(self.members(), |member, v| member.walk(v), visitor)
    }

    fn walk_if_contains(&self, relative: &str, visitor: &mut dyn PathVisitor) -> Result<()> {
        relative::ensure_relative(relative)?;
        walk_members(
            self.members(),
            |member, v| member.walk_if_contains(relative, v),
            visitor,
        )
    }

    fn accept(&self, relative: &str, consumer: &mut dyn FnMut(Option<&PathVisit>)) -> Result<()> {
        accept_first(self.members(), relative, consumer)
    }

    fn contains(&self, relative: &str) -> Result<bool> {
        contains_any(self.members(), relative)
    }

    fn open(&self) -> Result<Box<dyn OpenPathTree>> {
        self.tree.open()
    }

    tree_identity!();
}

impl OpenPathTree for OpenMultiRootPathTree {
    fn original_tree(&self) -> &dyn PathTree {
        &self.tree
    }

    fn as_path_tree(&self) -> &dyn PathTree {
        self
    }

    fn is_open(&self) -> bool {
        self.members.iter().all(|member| member.is_open())
    }

    fn get_path(&self, relative: &str) -> Result<Option<ResourcePath>> {
        relative::ensure_relative(relative)?;
        for member in &self.members {
            if let Some(path) = member.get_path(relative)? {
                return Ok(Some(path));
            }
        }
        Ok(None)
    }

    fn close(&self) -> Result<()> {
        let mut first_err = None;
        for member in &self.members {
            if let Err(err) = member.close() {
                tracing::warn!(roots = ?member.roots(), error = %err, "failed to close member tree");
                first_err.get_or_insert(err);
            }
        }
        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl PartialEq for OpenMultiRootPathTree {
    fn eq(&self, other: &Self) -> bool {
        self.members.len() == other.members.len()
            && self
                .members()
                .zip(other.members())
                .all(|(a, b)| a.dyn_eq(b))
    }
}

impl Eq for OpenMultiRootPathTree {}

impl Hash for OpenMultiRootPathTree {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for member in self.members() {
            member.hash(state);
        }
    }
}

impl fmt::Debug for OpenMultiRootPathTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenMultiRootPathTree")
            .field("members", &self.members)
            .finish()
    }
}
