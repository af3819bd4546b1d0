//! A single file seen as a tree with one entry.

use crate::error::{Error, Result};
use crate::filter::PathFilter;
use crate::manifest::ManifestAttributes;
use crate::relative;
use crate::resource::ResourcePath;
use crate::tree::{OpenPathTree, PathTree, tree_identity};
use crate::visit::{PathVisit, PathVisitor};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A tree whose root is a file and whose only entry is that file, addressed by
/// its file name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FilePathTree {
    file: Arc<Path>,
    name: String,
    filter: Option<PathFilter>,
}

impl FilePathTree {
    pub fn new(file: impl AsRef<Path>) -> Result<Self> {
        Self::with_filter(file, None)
    }

    pub fn with_filter(file: impl AsRef<Path>, filter: Option<PathFilter>) -> Result<Self> {
        let file = file.as_ref();
        let name = file
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                Error::invalid_argument(format!("{} has no usable file name", file.display()))
            })?
            .to_string();
        Ok(Self {
            file: Arc::from(file),
            name,
            filter,
        })
    }

    pub fn file(&self) -> &Path {
        &self.file
    }

    pub fn filter(&self) -> Option<&PathFilter> {
        self.filter.as_ref()
    }

    fn visible(&self) -> bool {
        PathFilter::is_visible_opt(self.filter.as_ref(), Some(&self.name)) && self.file.is_file()
    }

    fn visit(&self) -> PathVisit {
        PathVisit::new(
            self.file.clone(),
            ResourcePath::File(self.file.to_path_buf()),
            self.name.as_str(),
        )
    }
}

impl PathTree for FilePathTree {
    fn roots(&self) -> Vec<PathBuf> {
        vec![self.file.to_path_buf()]
    }

    fn manifest_attributes(&self) -> Result<Option<ManifestAttributes>> {
        Ok(None)
    }

    fn walk(&self, visitor: &mut dyn PathVisitor) -> Result<()> {
        if self.visible() {
            visitor.visit_path(&self.visit());
        }
        Ok(())
    }

    fn walk_if_contains(&self, relative: &str, visitor: &mut dyn PathVisitor) -> Result<()> {
        let relative = relative::checked(relative)?;
        if relative.is_empty() || relative == self.name {
            self.walk(visitor)?;
        }
        Ok(())
    }

    fn accept(&self, relative: &str, consumer: &mut dyn FnMut(Option<&PathVisit>)) -> Result<()> {
        let relative = relative::checked(relative)?;
        if relative == self.name && self.visible() {
            consumer(Some(&self.visit()));
        } else {
            consumer(None);
        }
        Ok(())
    }

    fn open(&self) -> Result<Box<dyn OpenPathTree>> {
        Ok(Box::new(self.clone()))
    }

    tree_identity!();
}

impl OpenPathTree for FilePathTree {
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
        let relative = relative::checked(relative)?;
        if relative == self.name && self.visible() {
            Ok(Some(ResourcePath::File(self.file.to_path_buf())))
        } else {
            Ok(None)
        }
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }
}
