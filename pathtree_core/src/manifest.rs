//! Manifest attributes and multi-release override mapping.

use crate::error::Result;
use crate::relative;
use crate::walk::Container;
use once_cell::sync::{Lazy, OnceCell};
use serde::Serialize;
use std::collections::BTreeMap;
use std::ops::ControlFlow;
use std::sync::Arc;

/// Location of the manifest inside a container.
pub const MANIFEST_PATH: &str = "META-INF/MANIFEST.MF";

/// Directory holding per-release override directories.
pub const VERSIONS_DIR: &str = "META-INF/versions";

const META_INF: &str = "META-INF";

/// The few manifest headers kept in memory.
///
/// Full manifests can be large and many trees stay alive at once, so only
/// these attributes are retained.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ManifestAttributes {
    pub specification_title: Option<String>,
    pub specification_version: Option<String>,
    pub specification_vendor: Option<String>,
    pub implementation_title: Option<String>,
    pub implementation_version: Option<String>,
    pub implementation_vendor: Option<String>,
    pub multi_release: bool,
}

impl ManifestAttributes {
    /// Parse the main section of a manifest.
    ///
    /// Header names are matched case-insensitively; lines starting with a
    /// single space continue the previous header value.
    pub fn parse(content: &str) -> Self {
        let mut attributes = ManifestAttributes::default();
        let mut current: Option<(String, String)> = None;

        for line in content.lines() {
            let line = line.strip_suffix('\r').unwrap_or(line);
            if let Some(rest) = line.strip_prefix(' ') {
                if let Some((_, value)) = current.as_mut() {
                    value.push_str(rest);
                }
                continue;
            }
            if let Some((name, value)) = current.take() {
                attributes.set(&name, value);
            }
            // Main section ends at the first blank line
            if line.trim().is_empty() {
                break;
            }
            if let Some((name, value)) = line.split_once(':') {
                current = Some((name.trim().to_string(), value.trim_start().to_string()));
            }
        }
        if let Some((name, value)) = current.take() {
            attributes.set(&name, value);
        }
        attributes
    }

    fn set(&mut self, name: &str, value: String) {
        let slot = match name.to_ascii_lowercase().as_str() {
            "specification-title" => &mut self.specification_title,
            "specification-version" => &mut self.specification_version,
            "specification-vendor" => &mut self.specification_vendor,
            "implementation-title" => &mut self.implementation_title,
            "implementation-version" => &mut self.implementation_version,
            "implementation-vendor" => &mut self.implementation_vendor,
            "multi-release" => {
                self.multi_release = value.trim().eq_ignore_ascii_case("true");
                return;
            }
            _ => return,
        };
        *slot = Some(value.trim_end().to_string());
    }
}

/// Maps base relative paths to the versioned entry that replaces them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MultiReleaseMapping {
    entries: BTreeMap<String, String>,
}

static EMPTY_MAPPING: Lazy<Arc<MultiReleaseMapping>> =
    Lazy::new(|| Arc::new(MultiReleaseMapping::default()));

impl MultiReleaseMapping {
    #[cfg(test)]
    pub(crate) fn from_entries(entries: BTreeMap<String, String>) -> Self {
        Self { entries }
    }

    /// Scan `META-INF/versions/<N>` for every `N <= release`, lowest first, so
    /// higher releases override lower ones. Only files are mapped, and nothing
    /// under `META-INF/` itself is ever remapped.
    pub(crate) fn build(container: &dyn Container, release: u32) -> Result<Self> {
        let mut versions = Vec::new();
        container.for_each_entry(VERSIONS_DIR, &mut |relative, is_dir| {
            if let Some(name) = relative
                .strip_prefix(VERSIONS_DIR)
                .and_then(|rest| rest.strip_prefix('/'))
            {
                if is_dir && !name.contains('/') {
                    if let Ok(version) = name.parse::<u32>() {
                        if version <= release {
                            versions.push(version);
                        }
                    }
                }
            }
            ControlFlow::Continue(())
        })?;
        versions.sort_unstable();

        let mut entries = BTreeMap::new();
        for version in versions {
            let prefix = format!("{}/{}/", VERSIONS_DIR, version);
            container.for_each_entry(prefix.trim_end_matches('/'), &mut |relative, is_dir| {
                if is_dir {
                    return ControlFlow::Continue(());
                }
                if let Some(base) = relative.strip_prefix(prefix.as_str()) {
                    if !relative::is_under(base, META_INF) {
                        entries.insert(base.to_string(), relative.to_string());
                    }
                }
                ControlFlow::Continue(())
            })?;
        }

        tracing::debug!(
            root = %container.root().display(),
            release,
            overrides = entries.len(),
            "built multi-release mapping"
        );
        Ok(Self { entries })
    }

    /// The versioned relative path serving `relative`, if any.
    pub fn get(&self, relative: &str) -> Option<&str> {
        self.entries.get(relative).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Iterate `(base, versioned)` pairs in base path order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Working copy of the overrides at or below `start`.
    pub(crate) fn entries_under(&self, start: &str) -> BTreeMap<String, String> {
        if start.is_empty() {
            return self.entries.clone();
        }
        self.entries
            .iter()
            .filter(|(k, _)| relative::is_under(k, start))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub(crate) fn has_entries_under(&self, start: &str) -> bool {
        self.entries.keys().any(|k| relative::is_under(k, start))
    }
}

/// Lazily computed manifest attributes and override mapping of one tree.
///
/// Both are computed at most once and then shared by every reader.
#[derive(Debug)]
pub(crate) struct ManifestState {
    enabled: bool,
    release: u32,
    attributes: OnceCell<Option<ManifestAttributes>>,
    mapping: OnceCell<Arc<MultiReleaseMapping>>,
}

impl ManifestState {
    pub(crate) fn new(enabled: bool, release: u32) -> Self {
        Self {
            enabled,
            release,
            attributes: OnceCell::new(),
            mapping: OnceCell::new(),
        }
    }

    pub(crate) fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub(crate) fn release(&self) -> u32 {
        self.release
    }

    /// Attributes already computed, without touching the container.
    pub(crate) fn cached_attributes(&self) -> Option<Option<ManifestAttributes>> {
        if !self.enabled {
            return Some(None);
        }
        self.attributes.get().cloned()
    }

    pub(crate) fn attributes(&self, container: &dyn Container) -> Result<Option<ManifestAttributes>> {
        if !self.enabled {
            return Ok(None);
        }
        self.attributes
            .get_or_try_init(|| {
                let content = match container.read(MANIFEST_PATH)? {
                    Some(bytes) => bytes,
                    None => return Ok(None),
                };
                let attributes = ManifestAttributes::parse(&String::from_utf8_lossy(&content));
                tracing::debug!(
                    root = %container.root().display(),
                    multi_release = attributes.multi_release,
                    "read manifest"
                );
                Ok(Some(attributes))
            })
            .cloned()
    }

    pub(crate) fn mapping(&self, container: &dyn Container) -> Result<Arc<MultiReleaseMapping>> {
        if !self.enabled {
            return Ok(EMPTY_MAPPING.clone());
        }
        self.mapping
            .get_or_try_init(|| {
                let multi_release = self
                    .attributes(container)?
                    .is_some_and(|a| a.multi_release);
                if multi_release {
                    Ok(Arc::new(MultiReleaseMapping::build(container, self.release)?))
                } else {
                    Ok(EMPTY_MAPPING.clone())
                }
            })
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::DirContainer;
    use crate::testing::write_files;
    use tempfile::TempDir;

    #[test]
    fn test_parse_main_section() {
        let manifest = "Manifest-Version: 1.0\r\n\
                        Implementation-Title: acme-core\r\n\
                        Implementation-Version: 1.2.3\r\n\
                        implementation-vendor: Acme\r\n\
                        Specification-Title: Acme\r\n\
                        Multi-Release: true\r\n\
                        \r\n\
                        Name: com/acme/\r\n\
                        Implementation-Title: ignored\r\n";
        let attributes = ManifestAttributes::parse(manifest);
        assert_eq!(attributes.implementation_title.as_deref(), Some("acme-core"));
        assert_eq!(attributes.implementation_version.as_deref(), Some("1.2.3"));
        assert_eq!(attributes.implementation_vendor.as_deref(), Some("Acme"));
        assert_eq!(attributes.specification_title.as_deref(), Some("Acme"));
        assert_eq!(attributes.specification_version, None);
        assert!(attributes.multi_release);
    }

    #[test]
    fn test_parse_continuation_lines() {
        let manifest = "Implementation-Title: a-very-long-\n title\nMulti-Release: false\n";
        let attributes = ManifestAttributes::parse(manifest);
        assert_eq!(
            attributes.implementation_title.as_deref(),
            Some("a-very-long-title")
        );
        assert!(!attributes.multi_release);
    }

    fn multi_release_dir() -> TempDir {
        let temp_dir = TempDir::new().unwrap();
        write_files(
            temp_dir.path(),
            &[
                (MANIFEST_PATH, "Manifest-Version: 1.0\nMulti-Release: true\n"),
                ("com/A.class", "base"),
                ("META-INF/versions/9/com/A.class", "v9"),
                ("META-INF/versions/11/com/A.class", "v11"),
                ("META-INF/versions/11/com/C.class", "v11"),
                ("META-INF/versions/17/com/B.class", "v17"),
                ("META-INF/versions/25/com/A.class", "v25"),
                ("META-INF/versions/11/META-INF/services/x", "svc"),
                ("META-INF/versions/notanumber/com/D.class", "d"),
            ],
        );
        temp_dir
    }

    #[test]
    fn test_mapping_precedence() {
        let temp_dir = multi_release_dir();
        let container = DirContainer::new(temp_dir.path());
        let mapping = MultiReleaseMapping::build(&container, 21).unwrap();

        assert_eq!(mapping.get("com/A.class"), Some("META-INF/versions/11/com/A.class"));
        assert_eq!(mapping.get("com/B.class"), Some("META-INF/versions/17/com/B.class"));
        assert_eq!(mapping.get("com/C.class"), Some("META-INF/versions/11/com/C.class"));
        assert_eq!(mapping.get("META-INF/services/x"), None);
        assert_eq!(mapping.get("com/D.class"), None);
        assert_eq!(mapping.len(), 3);
    }

    #[test]
    fn test_mapping_respects_release() {
        let temp_dir = multi_release_dir();
        let container = DirContainer::new(temp_dir.path());
        let mapping = MultiReleaseMapping::build(&container, 10).unwrap();
        assert_eq!(mapping.get("com/A.class"), Some("META-INF/versions/9/com/A.class"));
        assert_eq!(mapping.get("com/B.class"), None);
    }

    #[test]
    fn test_state_disabled() {
        let temp_dir = multi_release_dir();
        let container = DirContainer::new(temp_dir.path());
        let state = ManifestState::new(false, 21);
        assert_eq!(state.attributes(&container).unwrap(), None);
        assert!(state.mapping(&container).unwrap().is_empty());
    }

    #[test]
    fn test_state_computes_once() {
        let temp_dir = multi_release_dir();
        let container = DirContainer::new(temp_dir.path());
        let state = ManifestState::new(true, 21);
        assert!(state.cached_attributes().is_none());

        let mapping = state.mapping(&container).unwrap();
        assert_eq!(mapping.len(), 3);
        assert!(state.cached_attributes().unwrap().unwrap().multi_release);

        // Content changes after the first read are not observed
        std::fs::remove_dir_all(temp_dir.path().join("META-INF")).unwrap();
        assert!(Arc::ptr_eq(&mapping, &state.mapping(&container).unwrap()));
        assert!(state.attributes(&container).unwrap().is_some());
    }

    #[test]
    fn test_state_without_multi_release() {
        let temp_dir = TempDir::new().unwrap();
        write_files(
            temp_dir.path(),
            &[
                (MANIFEST_PATH, "Manifest-Version: 1.0\n"),
                ("META-INF/versions/11/com/A.class", "v11"),
            ],
        );
        let container = DirContainer::new(temp_dir.path());
        let state = ManifestState::new(true, 21);
        assert!(state.mapping(&container).unwrap().is_empty());
    }
}
