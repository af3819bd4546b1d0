//! Ordered collections of root paths.

use crate::error::{Error, Result};
use crate::relative;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// An ordered set of filesystem paths.
///
/// Additions return a new collection and leave the receiver untouched.
pub trait PathCollection {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn is_single_path(&self) -> bool {
        self.len() == 1
    }

    /// The only path of a one-element collection.
    fn single_path(&self) -> Result<&Path>;

    fn contains_path(&self, path: &Path) -> bool;

    /// First `root/relative` that exists on disk, scanning roots in order.
    fn resolve_exists(&self, relative: &str) -> Result<Option<PathBuf>>;

    fn add_first(&self, path: impl Into<PathBuf>) -> Self
    where
        Self: Sized;

    fn add_all_first<I, P>(&self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
        Self: Sized;

    fn add_last(&self, path: impl Into<PathBuf>) -> Self
    where
        Self: Sized;

    fn iter(&self) -> std::slice::Iter<'_, PathBuf>;
}

/// A [`PathCollection`] backed by a vector. Duplicates are dropped, keeping
/// the first occurrence.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "Vec<PathBuf>", into = "Vec<PathBuf>")]
pub struct PathList {
    paths: Vec<PathBuf>,
}

impl PathList {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn of<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        paths.into_iter().map(Into::into).collect()
    }

    pub fn as_slice(&self) -> &[PathBuf] {
        &self.paths
    }

    fn push_unique(&mut self, path: PathBuf) {
        if !self.paths.contains(&path) {
            self.paths.push(path);
        }
    }
}

impl PathCollection for PathList {
    fn len(&self) -> usize {
        self.paths.len()
    }

    fn single_path(&self) -> Result<&Path> {
        match self.paths.as_slice() {
            [only] => Ok(only),
            paths => Err(Error::invalid_argument(format!(
                "expected a single path but the collection holds {}",
                paths.len()
            ))),
        }
    }

    fn contains_path(&self, path: &Path) -> bool {
        self.paths.iter().any(|p| p == path)
    }

    fn resolve_exists(&self, relative: &str) -> Result<Option<PathBuf>> {
        let relative = relative::checked(relative)?;
        Ok(self
            .paths
            .iter()
            .map(|root| root.join(&*relative))
            .find(|candidate| candidate.exists()))
    }

    fn add_first(&self, path: impl Into<PathBuf>) -> Self {
        self.add_all_first([path.into()])
    }

    fn add_all_first<I, P>(&self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        let mut list: PathList = paths.into_iter().map(Into::into).collect();
        for path in &self.paths {
            list.push_unique(path.clone());
        }
        list
    }

    fn add_last(&self, path: impl Into<PathBuf>) -> Self {
        let mut list = self.clone();
        list.push_unique(path.into());
        list
    }

    fn iter(&self) -> std::slice::Iter<'_, PathBuf> {
        self.paths.iter()
    }
}

impl FromIterator<PathBuf> for PathList {
    fn from_iter<T: IntoIterator<Item = PathBuf>>(iter: T) -> Self {
        let mut list = PathList::default();
        for path in iter {
            list.push_unique(path);
        }
        list
    }
}

impl From<Vec<PathBuf>> for PathList {
    fn from(paths: Vec<PathBuf>) -> Self {
        paths.into_iter().collect()
    }
}

impl From<PathList> for Vec<PathBuf> {
    fn from(list: PathList) -> Self {
        list.paths
    }
}

impl<'a> IntoIterator for &'a PathList {
    type Item = &'a PathBuf;
    type IntoIter = std::slice::Iter<'a, PathBuf>;

    fn into_iter(self) -> Self::IntoIter {
        self.paths.iter()
    }
}
