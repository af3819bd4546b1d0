//! Traversal and point lookup shared by every concrete container.

use crate::error::Result;
use crate::filter::PathFilter;
use crate::manifest::MultiReleaseMapping;
use crate::relative;
use crate::resource::ResourcePath;
use crate::visit::{PathVisit, PathVisitor};
use std::ops::ControlFlow;
use std::path::Path;
use std::sync::Arc;

/// Entry enumeration callback: receives the `/`-separated path relative to the
/// container root and whether the entry is a directory.
pub(crate) type EntryFn<'a> = dyn FnMut(&str, bool) -> ControlFlow<()> + 'a;

/// Something with a root whose entries can be enumerated, resolved and read.
pub(crate) trait Container {
    /// Root on disk: a directory or an archive file.
    fn root(&self) -> &Arc<Path>;

    /// Enumerate `start` and everything below it, parents before children.
    /// A missing `start` enumerates nothing.
    fn for_each_entry(&self, start: &str, f: &mut EntryFn<'_>) -> Result<ControlFlow<()>>;

    /// Whether an entry exists at `relative`.
    fn exists(&self, relative: &str) -> Result<bool>;

    /// Location of the entry at `relative`, without checking that it exists.
    fn resolve(&self, relative: &str) -> ResourcePath;

    /// Content of the file at `relative`, or `None` when there is no such file.
    fn read(&self, relative: &str) -> Result<Option<Vec<u8>>>;
}

/// Walk `start` (relative to the container root) and everything below it.
///
/// Entries rejected by `filter` are skipped. Entries with a multi-release
/// override are visited once, at their base relative path, with the override
/// as their resolved path. Overrides with no base entry are visited after the
/// primary walk unless the visitor stopped it.
pub(crate) fn walk(
    container: &dyn Container,
    start: &str,
    filter: Option<&PathFilter>,
    mapping: &MultiReleaseMapping,
    visitor: &mut dyn PathVisitor,
) -> Result<()> {
    let root = container.root().clone();
    let mut pending = mapping.entries_under(start);

    let flow = container.for_each_entry(start, &mut |relative, _is_dir| {
        if !PathFilter::is_visible_opt(filter, Some(relative)) {
            return ControlFlow::Continue(());
        }
        let path = match pending.remove(relative) {
            Some(versioned) => container.resolve(&versioned),
            None => container.resolve(relative),
        };
        let visit = PathVisit::new(root.clone(), path, relative);
        visitor.visit_path(&visit);
        if visit.is_stopped() {
            ControlFlow::Break(())
        } else {
            ControlFlow::Continue(())
        }
    })?;

    if flow.is_break() {
        return Ok(());
    }

    for (relative, versioned) in pending {
        if !PathFilter::is_visible_opt(filter, Some(&relative)) {
            continue;
        }
        let visit = PathVisit::new(root.clone(), container.resolve(&versioned), relative);
        visitor.visit_path(&visit);
        if visit.is_stopped() {
            break;
        }
    }
    Ok(())
}

/// Walk the subtree at `relative` if the container has it.
pub(crate) fn walk_if_contains(
    container: &dyn Container,
    relative: &str,
    filter: Option<&PathFilter>,
    mapping: &MultiReleaseMapping,
    visitor: &mut dyn PathVisitor,
) -> Result<()> {
    let relative = relative::checked(relative)?;
    if container.exists(&relative)? || mapping.has_entries_under(&relative) {
        walk(container, &relative, filter, mapping, visitor)?;
    }
    Ok(())
}

/// Resolve one relative path through the filter and the multi-release mapping.
pub(crate) fn lookup(
    container: &dyn Container,
    relative: &str,
    filter: Option<&PathFilter>,
    mapping: &MultiReleaseMapping,
) -> Result<Option<ResourcePath>> {
    let relative = relative::checked(relative)?;
    resolve_checked(container, &relative, filter, mapping)
}

fn resolve_checked(
    container: &dyn Container,
    relative: &str,
    filter: Option<&PathFilter>,
    mapping: &MultiReleaseMapping,
) -> Result<Option<ResourcePath>> {
    if !PathFilter::is_visible_opt(filter, Some(relative)) {
        return Ok(None);
    }
    let target = match mapping.get(relative) {
        Some(versioned) => {
            tracing::trace!(relative, versioned, "multi-release override");
            versioned
        }
        None => relative,
    };
    if container.exists(target)? {
        Ok(Some(container.resolve(target)))
    } else {
        Ok(None)
    }
}

/// Hand the consumer a visit for `relative`, or `None` when it is absent or filtered out.
pub(crate) fn accept(
    container: &dyn Container,
    relative: &str,
    filter: Option<&PathFilter>,
    mapping: &MultiReleaseMapping,
    consumer: &mut dyn FnMut(Option<&PathVisit>),
) -> Result<()> {
    let relative = relative::checked(relative)?;
    match resolve_checked(container, &relative, filter, mapping)? {
        Some(path) => {
            let visit = PathVisit::new(container.root().clone(), path, &*relative);
            consumer(Some(&visit));
        }
        None => consumer(None),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::DirContainer;
    use crate::testing::write_files;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn fixture() -> (TempDir, DirContainer) {
        let temp_dir = TempDir::new().unwrap();
        write_files(
            temp_dir.path(),
            &[
                ("a.txt", "a"),
                ("com/acme/A.class", "base"),
                ("META-INF/versions/11/com/acme/A.class", "v11"),
                ("META-INF/versions/11/com/acme/B.class", "v11-only"),
            ],
        );
        let container = DirContainer::new(temp_dir.path());
        (temp_dir, container)
    }

    fn mapping() -> MultiReleaseMapping {
        let mut entries = BTreeMap::new();
        entries.insert(
            "com/acme/A.class".to_string(),
            "META-INF/versions/11/com/acme/A.class".to_string(),
        );
        entries.insert(
            "com/acme/B.class".to_string(),
            "META-INF/versions/11/com/acme/B.class".to_string(),
        );
        MultiReleaseMapping::from_entries(entries)
    }

    fn collect(
        container: &DirContainer,
        start: &str,
        filter: Option<&PathFilter>,
        mapping: &MultiReleaseMapping,
    ) -> Vec<(String, String)> {
        let mut seen = Vec::new();
        walk(container, start, filter, mapping, &mut |v: &PathVisit| {
            seen.push((
                v.relative_path().to_string(),
                String::from_utf8(v.read().unwrap_or_default()).unwrap(),
            ));
        })
        .unwrap();
        seen
    }

    #[test]
    fn test_walk_without_mapping_visits_root_and_entries() {
        let (_tmp, container) = fixture();
        let seen = collect(&container, "", None, &MultiReleaseMapping::default());
        let relatives: Vec<&str> = seen.iter().map(|(r, _)| r.as_str()).collect();
        assert_eq!(relatives[0], "");
        assert!(relatives.contains(&"a.txt"));
        assert!(relatives.contains(&"com/acme/A.class"));
        assert!(relatives.contains(&"META-INF/versions/11/com/acme/B.class"));
        assert!(!relatives.contains(&"com/acme/B.class"));
    }

    #[test]
    fn test_walk_applies_overrides_once() {
        let (_tmp, container) = fixture();
        let seen = collect(&container, "", None, &mapping());

        let a: Vec<_> = seen.iter().filter(|(r, _)| r == "com/acme/A.class").collect();
        assert_eq!(a.len(), 1);
        assert_eq!(a[0].1, "v11");

        let b: Vec<_> = seen.iter().filter(|(r, _)| r == "com/acme/B.class").collect();
        assert_eq!(b.len(), 1);
        assert_eq!(b[0].1, "v11-only");
    }

    #[test]
    fn test_walk_subtree_keeps_root_relative_paths() {
        let (_tmp, container) = fixture();
        let seen = collect(&container, "com", None, &mapping());
        let relatives: Vec<&str> = seen.iter().map(|(r, _)| r.as_str()).collect();
        assert_eq!(
            relatives,
            vec!["com", "com/acme", "com/acme/A.class", "com/acme/B.class"]
        );
    }

    #[test]
    fn test_walk_filter_applies_to_added_entries() {
        let (_tmp, container) = fixture();
        let filter = PathFilter::excludes(["**/B.class"]).unwrap();
        let seen = collect(&container, "", Some(&filter), &mapping());
        assert!(seen.iter().all(|(r, _)| !r.ends_with("B.class")));
    }

    #[test]
    fn test_walk_stop() {
        let (_tmp, container) = fixture();
        let mut count = 0;
        walk(&container, "", None, &mapping(), &mut |v: &PathVisit| {
            count += 1;
            if count == 3 {
                v.stop_walking();
            }
        })
        .unwrap();
        assert_eq!(count, 3);
    }

    #[test]
    fn test_lookup() {
        let (_tmp, container) = fixture();
        let mapping = mapping();

        let found = lookup(&container, "com/acme/A.class", None, &mapping)
            .unwrap()
            .unwrap();
        assert_eq!(found.read().unwrap(), b"v11");

        let found = lookup(&container, "com/acme/B.class", None, &mapping)
            .unwrap()
            .unwrap();
        assert_eq!(found.read().unwrap(), b"v11-only");

        assert!(lookup(&container, "missing.txt", None, &mapping)
            .unwrap()
            .is_none());

        let filter = PathFilter::includes(["*.txt"]).unwrap();
        assert!(lookup(&container, "com/acme/A.class", Some(&filter), &mapping)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_lookup_rejects_escaping_paths() {
        let (_tmp, container) = fixture();
        let mapping = MultiReleaseMapping::default();
        assert!(lookup(&container, "/etc/passwd", None, &mapping).is_err());
        assert!(lookup(&container, "../../secret", None, &mapping).is_err());
        assert!(lookup(&container, "com/../a.txt", None, &mapping).is_err());
    }

    #[test]
    fn test_accept_passes_requested_relative_path() {
        let (_tmp, container) = fixture();
        let mut seen = None;
        accept(
            &container,
            "com\\acme\\A.class",
            None,
            &mapping(),
            &mut |v| seen = v.map(|v| v.relative_path().to_string()),
        )
        .unwrap();
        assert_eq!(seen.as_deref(), Some("com/acme/A.class"));
    }
}
