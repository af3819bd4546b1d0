//! Per-entry visit context and the visitor contract.

use crate::error::Result;
use crate::resource::ResourcePath;
use std::borrow::Cow;
use std::cell::Cell;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use url::Url;

/// Lazily computed URL, either private to one visit or shared with a cached snapshot.
enum UrlSlot {
    Local(once_cell::unsync::OnceCell<Url>),
    Shared(Arc<once_cell::sync::OnceCell<Url>>),
}

/// Context for a single entry handed to a [`PathVisitor`] or an `accept` consumer.
///
/// A visit is only meaningful for the duration of the callback that receives it.
pub struct PathVisit {
    root: Arc<Path>,
    path: ResourcePath,
    relative: String,
    url: UrlSlot,
    stopped: Cell<bool>,
}

impl PathVisit {
    pub(crate) fn new(root: Arc<Path>, path: ResourcePath, relative: impl Into<String>) -> Self {
        Self {
            root,
            path,
            relative: relative.into(),
            url: UrlSlot::Local(once_cell::unsync::OnceCell::new()),
            stopped: Cell::new(false),
        }
    }

    pub(crate) fn with_shared_url(
        root: Arc<Path>,
        path: ResourcePath,
        relative: impl Into<String>,
        url: Arc<once_cell::sync::OnceCell<Url>>,
    ) -> Self {
        Self {
            root,
            path,
            relative: relative.into(),
            url: UrlSlot::Shared(url),
            stopped: Cell::new(false),
        }
    }

    /// Root of the tree the entry belongs to: a directory, a single file or an archive file.
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub(crate) fn root_arc(&self) -> &Arc<Path> {
        &self.root
    }

    /// Where the entry's content actually lives. For multi-release archives this
    /// may be a versioned override rather than the base entry.
    pub fn path(&self) -> &ResourcePath {
        &self.path
    }

    /// Path relative to the tree root, `/`-separated. The root itself is `""`.
    pub fn relative_path(&self) -> &str {
        &self.relative
    }

    /// Path relative to the tree root using `separator` between segments.
    pub fn relative_path_with(&self, separator: char) -> Cow<'_, str> {
        if separator == '/' {
            Cow::Borrowed(&self.relative)
        } else {
            Cow::Owned(self.relative.replace('/', &separator.to_string()))
        }
    }

    /// URL of the entry, computed on first use.
    pub fn url(&self) -> Result<&Url> {
        match &self.url {
            UrlSlot::Local(cell) => cell.get_or_try_init(|| self.path.to_url()),
            UrlSlot::Shared(cell) => cell.get_or_try_init(|| self.path.to_url()),
        }
    }

    /// Read the full content of the entry.
    pub fn read(&self) -> Result<Vec<u8>> {
        self.path.read()
    }

    /// Ask the walk in progress to stop after this entry.
    pub fn stop_walking(&self) {
        self.stopped.set(true);
    }

    /// Whether [`stop_walking`](Self::stop_walking) was called on this visit.
    pub fn is_stopped(&self) -> bool {
        self.stopped.get()
    }
}

impl fmt::Debug for PathVisit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PathVisit")
            .field("root", &self.root)
            .field("path", &self.path)
            .field("relative", &self.relative)
            .finish()
    }
}

/// Callback invoked for every visible entry of a walk.
pub trait PathVisitor {
    fn visit_path(&mut self, visit: &PathVisit);
}

impl<F> PathVisitor for F
where
    F: FnMut(&PathVisit),
{
    fn visit_path(&mut self, visit: &PathVisit) {
        self(visit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn visit(relative: &str) -> PathVisit {
        let root: Arc<Path> = Arc::from(Path::new("/tmp/root"));
        let path = ResourcePath::File(PathBuf::from("/tmp/root").join(relative));
        PathVisit::new(root, path, relative)
    }

    #[test]
    fn test_relative_path_separator() {
        let v = visit("com/acme/App.class");
        assert_eq!(v.relative_path(), "com/acme/App.class");
        assert_eq!(v.relative_path_with('/'), "com/acme/App.class");
        assert_eq!(v.relative_path_with('\\'), "com\\acme\\App.class");
        assert_eq!(v.relative_path_with('.'), "com.acme.App.class");
    }

    #[test]
    fn test_stop_walking() {
        let v = visit("a");
        assert!(!v.is_stopped());
        v.stop_walking();
        assert!(v.is_stopped());
    }

    #[test]
    fn test_closure_visitor() {
        let mut seen = Vec::new();
        {
            let mut visitor = |v: &PathVisit| seen.push(v.relative_path().to_string());
            let dyn_visitor: &mut dyn PathVisitor = &mut visitor;
            dyn_visitor.visit_path(&visit("x"));
            dyn_visitor.visit_path(&visit("y"));
        }
        assert_eq!(seen, vec!["x", "y"]);
    }

    #[test]
    #[cfg(unix)]
    fn test_url_is_cached() {
        let v = visit("a.txt");
        let first = v.url().unwrap().clone();
        assert_eq!(v.url().unwrap(), &first);
        assert_eq!(first.as_str(), "file:///tmp/root/a.txt");
    }
}
