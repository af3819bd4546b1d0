//! Error types for pathtree_core.

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Result type alias using pathtree_core's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while resolving or walking path trees.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error occurred while reading a tree root or one of its entries.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The archive could not be mounted or one of its entries could not be read.
    #[error("Failed to read archive {path}: {source}")]
    Archive {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },

    /// A caller passed an argument that can never be valid.
    #[error("Invalid argument: {reason}")]
    InvalidArgument { reason: String },

    /// A glob pattern could not be compiled.
    #[error("Invalid pattern {pattern}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// An open tree was used after it had been closed.
    #[error("{roots} has been closed")]
    Closed { roots: String },
}

impl Error {
    /// Create an Io error tagged with the offending path.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }

    /// Create an Archive error tagged with the archive path.
    pub fn archive(path: impl Into<PathBuf>, source: zip::result::ZipError) -> Self {
        Error::Archive {
            path: path.into(),
            source,
        }
    }

    /// Create an InvalidArgument error.
    pub fn invalid_argument(reason: impl Into<String>) -> Self {
        Error::InvalidArgument {
            reason: reason.into(),
        }
    }

    /// Create an InvalidPattern error.
    pub fn invalid_pattern(pattern: impl Into<String>, source: regex::Error) -> Self {
        Error::InvalidPattern {
            pattern: pattern.into(),
            source,
        }
    }

    /// Create a Closed error naming every root of the closed tree.
    pub fn closed<P: AsRef<Path>>(roots: &[P]) -> Self {
        let roots = roots
            .iter()
            .map(|p| p.as_ref().display().to_string())
            .collect::<Vec<_>>()
            .join(", ");
        Error::Closed { roots }
    }

    /// Whether this error reports a use-after-close.
    pub fn is_closed(&self) -> bool {
        matches!(self, Error::Closed { .. })
    }
}

impl Error {
    /// Convert an error from the directory walker, keeping the root it was walking.
    pub(crate) fn from_walk(root: &Path, err: ignore::Error) -> Self {
        // ignore::Error can wrap an io::Error or be a path/loop error
        let path = match &err {
            ignore::Error::WithPath { path, .. } => path.clone(),
            _ => root.to_path_buf(),
        };
        match err.io_error() {
            Some(io_err) => Error::Io {
                path,
                source: std::io::Error::new(io_err.kind(), io_err.to_string()),
            },
            None => Error::Io {
                path,
                source: std::io::Error::other(err.to_string()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closed_names_all_roots() {
        let err = Error::closed(&[Path::new("/a.jar"), Path::new("/b")]);
        assert!(err.is_closed());
        assert_eq!(err.to_string(), "/a.jar, /b has been closed");
    }

    #[test]
    fn test_io_error_names_path() {
        let err = Error::io(
            "/missing",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert_eq!(err.to_string(), "I/O error at /missing: gone");
    }
}
