//! Resolved locations of tree entries.

use crate::archive::ArchiveMount;
use crate::error::{Error, Result};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use url::Url;

/// Where the content of a tree entry actually lives.
///
/// Entries of directory and file trees are plain filesystem paths. Entries of
/// archive trees point into a mounted archive and can only be read while the
/// mount that produced them is still open.
#[derive(Clone)]
pub enum ResourcePath {
    /// A path on the local filesystem.
    File(PathBuf),
    /// An entry inside a mounted archive.
    Archive(ArchiveEntry),
}

/// An entry inside a mounted archive.
#[derive(Clone)]
pub struct ArchiveEntry {
    mount: Arc<ArchiveMount>,
    name: String,
}

impl ArchiveEntry {
    pub(crate) fn new(mount: Arc<ArchiveMount>, name: impl Into<String>) -> Self {
        Self {
            mount,
            name: name.into(),
        }
    }

    /// Path of the archive file on disk.
    pub fn archive_path(&self) -> &Path {
        self.mount.archive_path()
    }

    /// Entry name inside the archive, `/`-separated, without a trailing slash.
    /// The archive root is the empty name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl ResourcePath {
    /// The filesystem path, for entries that live directly on disk.
    pub fn as_path(&self) -> Option<&Path> {
        match self {
            ResourcePath::File(path) => Some(path),
            ResourcePath::Archive(_) => None,
        }
    }

    /// The archive entry, for entries that live inside an archive.
    pub fn as_archive_entry(&self) -> Option<&ArchiveEntry> {
        match self {
            ResourcePath::File(_) => None,
            ResourcePath::Archive(entry) => Some(entry),
        }
    }

    /// Last name segment of the entry, if any.
    pub fn file_name(&self) -> Option<&str> {
        match self {
            ResourcePath::File(path) => path.file_name().and_then(|n| n.to_str()),
            ResourcePath::Archive(entry) => {
                if entry.name.is_empty() {
                    None
                } else {
                    entry.name.rsplit('/').next()
                }
            }
        }
    }

    /// Whether the entry is a directory.
    pub fn is_dir(&self) -> bool {
        match self {
            ResourcePath::File(path) => path.is_dir(),
            ResourcePath::Archive(entry) => entry.mount.is_dir(&entry.name),
        }
    }

    /// Read the full content of the entry.
    pub fn read(&self) -> Result<Vec<u8>> {
        match self {
            ResourcePath::File(path) => std::fs::read(path).map_err(|e| Error::io(path, e)),
            ResourcePath::Archive(entry) => entry
                .mount
                .read(&entry.name)?
                .ok_or_else(|| {
                    Error::io(
                        entry.mount.archive_path(),
                        std::io::Error::new(
                            std::io::ErrorKind::NotFound,
                            format!("{} is not a file entry", entry.name),
                        ),
                    )
                }),
        }
    }

    /// Read the entry as UTF-8 text.
    pub fn read_to_string(&self) -> Result<String> {
        let bytes = self.read()?;
        String::from_utf8(bytes).map_err(|e| {
            Error::io(
                self.to_string(),
                std::io::Error::new(std::io::ErrorKind::InvalidData, e),
            )
        })
    }

    /// URL of the entry: `file:` for disk paths, `jar:file:...!/name` for archive entries.
    pub fn to_url(&self) -> Result<Url> {
        match self {
            ResourcePath::File(path) => {
                let abs = absolute(path)?;
                let url = if abs.is_dir() {
                    Url::from_directory_path(&abs)
                } else {
                    Url::from_file_path(&abs)
                };
                url.map_err(|_| {
                    Error::invalid_argument(format!("Cannot express {} as a URL", abs.display()))
                })
            }
            ResourcePath::Archive(entry) => {
                let abs = absolute(entry.archive_path())?;
                let base = Url::from_file_path(&abs).map_err(|_| {
                    Error::invalid_argument(format!("Cannot express {} as a URL", abs.display()))
                })?;
                let mut name = entry.name.clone();
                if !name.is_empty() && entry.mount.is_dir(&name) {
                    name.push('/');
                }
                let raw = format!("jar:{}!/{}", base, name);
                Url::parse(&raw)
                    .map_err(|e| Error::invalid_argument(format!("Invalid URL {}: {}", raw, e)))
            }
        }
    }
}

fn absolute(path: &Path) -> Result<PathBuf> {
    std::path::absolute(path).map_err(|e| Error::io(path, e))
}

impl fmt::Display for ResourcePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourcePath::File(path) => write!(f, "{}", path.display()),
            ResourcePath::Archive(entry) => {
                write!(f, "{}!/{}", entry.archive_path().display(), entry.name)
            }
        }
    }
}

impl fmt::Debug for ResourcePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourcePath::File(path) => f.debug_tuple("File").field(path).finish(),
            ResourcePath::Archive(entry) => f
                .debug_struct("Archive")
                .field("archive", &entry.archive_path())
                .field("name", &entry.name)
                .finish(),
        }
    }
}

impl PartialEq for ResourcePath {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (ResourcePath::File(a), ResourcePath::File(b)) => a == b,
            (ResourcePath::Archive(a), ResourcePath::Archive(b)) => {
                a.name == b.name && a.archive_path() == b.archive_path()
            }
            _ => false,
        }
    }
}

impl Eq for ResourcePath {}

impl Hash for ResourcePath {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            ResourcePath::File(path) => {
                0u8.hash(state);
                path.hash(state);
            }
            ResourcePath::Archive(entry) => {
                1u8.hash(state);
                entry.archive_path().hash(state);
                entry.name.hash(state);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::write_jar;
    use tempfile::TempDir;

    #[test]
    fn test_file_resource() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("hello.txt");
        std::fs::write(&file, b"hello").unwrap();

        let resource = ResourcePath::File(file.clone());
        assert_eq!(resource.as_path(), Some(file.as_path()));
        assert_eq!(resource.file_name(), Some("hello.txt"));
        assert!(!resource.is_dir());
        assert_eq!(resource.read().unwrap(), b"hello");

        let url = resource.to_url().unwrap();
        assert_eq!(url.scheme(), "file");
        assert!(url.path().ends_with("/hello.txt"));
    }

    #[test]
    fn test_directory_url_has_trailing_slash() {
        let temp_dir = TempDir::new().unwrap();
        let url = ResourcePath::File(temp_dir.path().to_path_buf())
            .to_url()
            .unwrap();
        assert!(url.path().ends_with('/'));
    }

    #[test]
    fn test_archive_resource() {
        let temp_dir = TempDir::new().unwrap();
        let jar = temp_dir.path().join("lib.jar");
        write_jar(&jar, &[("com/acme/App.class", "cafebabe")]);

        let mount = ArchiveMount::mount(&jar).unwrap();
        let resource = ResourcePath::Archive(ArchiveEntry::new(mount.clone(), "com/acme/App.class"));
        assert_eq!(resource.file_name(), Some("App.class"));
        assert_eq!(resource.read().unwrap(), b"cafebabe");
        assert_eq!(
            resource.to_string(),
            format!("{}!/com/acme/App.class", jar.display())
        );

        let url = resource.to_url().unwrap();
        assert_eq!(url.scheme(), "jar");
        assert!(url.as_str().ends_with("lib.jar!/com/acme/App.class"));

        let dir = ResourcePath::Archive(ArchiveEntry::new(mount.clone(), "com"));
        assert!(dir.is_dir());
        assert!(dir.to_url().unwrap().as_str().ends_with("!/com/"));

        mount.close();
        assert!(resource.read().unwrap_err().is_closed());
    }
}
