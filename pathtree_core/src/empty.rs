//! The tree with no content.

use crate::error::Result;
use crate::manifest::ManifestAttributes;
use crate::relative;
use crate::resource::ResourcePath;
use crate::tree::{OpenPathTree, PathTree, tree_identity};
use crate::visit::{PathVisit, PathVisitor};
use once_cell::sync::Lazy;
use std::path::PathBuf;
use std::sync::Arc;

/// A tree with no roots and no entries. Used when a configured root does not exist.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct EmptyPathTree;

static INSTANCE: Lazy<Arc<EmptyPathTree>> = Lazy::new(|| Arc::new(EmptyPathTree));

impl EmptyPathTree {
    /// The shared instance.
    pub fn instance() -> Arc<dyn PathTree> {
        INSTANCE.clone()
    }
}

impl PathTree for EmptyPathTree {
    fn roots(&self) -> Vec<PathBuf> {
        Vec::new()
    }

    fn manifest_attributes(&self) -> Result<Option<ManifestAttributes>> {
        Ok(None)
    }

    fn walk(&self, _visitor: &mut dyn PathVisitor) -> Result<()> {
        Ok(())
    }

    fn walk_if_contains(&self, relative: &str, _visitor: &mut dyn PathVisitor) -> Result<()> {
        relative::ensure_relative(relative)
    }

    fn accept(&self, relative: &str, consumer: &mut dyn FnMut(Option<&PathVisit>)) -> Result<()> {
        relative::ensure_relative(relative)?;
        consumer(None);
        Ok(())
    }

    fn contains(&self, relative: &str) -> Result<bool> {
        relative::ensure_relative(relative)?;
        Ok(false)
    }

    fn open(&self) -> Result<Box<dyn OpenPathTree>> {
        Ok(Box::new(EmptyPathTree))
    }

    tree_identity!();
}

impl OpenPathTree for EmptyPathTree {
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
        relative::ensure_relative(relative)?;
        Ok(None)
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }
}
