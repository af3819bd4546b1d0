//! Process-wide settings.
//!
//! Settings are read from the environment the first time they are needed and
//! stay fixed for the lifetime of the process.

use once_cell::sync::Lazy;

/// Environment variable that turns off sharing of archive mounts.
pub const DISABLE_ARCHIVE_CACHE_VAR: &str = "PATHTREE_DISABLE_ARCHIVE_CACHE";

/// Environment variable holding the platform release used for multi-release lookups.
pub const RELEASE_VAR: &str = "PATHTREE_RELEASE";

/// Release assumed when `PATHTREE_RELEASE` is unset or unparsable.
pub const DEFAULT_RELEASE: u32 = 21;

/// Settings shared by every tree in the process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// When set, every archive open mounts a private filesystem.
    pub disable_archive_cache: bool,
    /// Highest `META-INF/versions/<N>` directory applied to multi-release archives.
    pub release: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            disable_archive_cache: false,
            release: DEFAULT_RELEASE,
        }
    }
}

impl Settings {
    /// Read settings from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let disable_archive_cache = lookup(DISABLE_ARCHIVE_CACHE_VAR)
            .map(|v| parse_flag(&v))
            .unwrap_or(false);

        let release = match lookup(RELEASE_VAR) {
            Some(value) => match value.trim().parse::<u32>() {
                Ok(release) => release,
                Err(_) => {
                    tracing::warn!(value = %value, "ignoring unparsable {}", RELEASE_VAR);
                    DEFAULT_RELEASE
                }
            },
            None => DEFAULT_RELEASE,
        };

        Self {
            disable_archive_cache,
            release,
        }
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

static SETTINGS: Lazy<Settings> = Lazy::new(Settings::from_env);

/// The settings in effect for this process.
pub fn settings() -> &'static Settings {
    &SETTINGS
}
