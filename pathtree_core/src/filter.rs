//! Include/exclude filtering of relative paths.

use crate::error::{Error, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

/// A glob pattern together with the anchored regex it compiles to.
#[derive(Clone)]
struct GlobPattern {
    glob: String,
    regex: Regex,
}

impl GlobPattern {
    fn compile(glob: &str) -> Result<Self> {
        let source = glob_to_regex(glob);
        let regex = Regex::new(&source).map_err(|e| Error::invalid_pattern(glob, e))?;
        Ok(Self {
            glob: glob.to_string(),
            regex,
        })
    }

    fn matches(&self, path: &str) -> bool {
        self.regex.is_match(path)
    }
}

impl fmt::Debug for GlobPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.glob, f)
    }
}

/// Decides which relative paths of a tree are visible.
///
/// A path is visible when there are no includes or it matches at least one
/// include, and it matches none of the excludes.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(try_from = "FilterRepr", into = "FilterRepr")]
pub struct PathFilter {
    includes: Vec<GlobPattern>,
    excludes: Vec<GlobPattern>,
}

/// Serialized form of a [`PathFilter`]: the glob sources only.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct FilterRepr {
    #[serde(default)]
    includes: Vec<String>,
    #[serde(default)]
    excludes: Vec<String>,
}

impl PathFilter {
    /// Compile a filter from include and exclude globs.
    pub fn new<I, E, S, T>(includes: I, excludes: E) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        E: IntoIterator<Item = T>,
        S: AsRef<str>,
        T: AsRef<str>,
    {
        Ok(Self {
            includes: compile_all(includes)?,
            excludes: compile_all(excludes)?,
        })
    }

    /// A filter with includes only.
    pub fn includes<I, S>(includes: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::new(includes, Vec::<String>::new())
    }

    /// A filter with excludes only.
    pub fn excludes<E, T>(excludes: E) -> Result<Self>
    where
        E: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        Self::new(Vec::<String>::new(), excludes)
    }

    /// Combine two optional filters into one whose includes and excludes are
    /// the concatenation of both.
    pub fn merge(a: Option<&PathFilter>, b: Option<&PathFilter>) -> Option<PathFilter> {
        match (a, b) {
            (None, None) => None,
            (Some(f), None) | (None, Some(f)) => Some(f.clone()),
            (Some(a), Some(b)) => {
                let mut merged = a.clone();
                merged.includes.extend(b.includes.iter().cloned());
                merged.excludes.extend(b.excludes.iter().cloned());
                Some(merged)
            }
        }
    }

    /// Whether `path` passes the filter.
    pub fn is_visible(&self, path: &str) -> bool {
        let normalized;
        let path = if path.contains('\\') {
            normalized = path.replace('\\', "/");
            normalized.as_str()
        } else {
            path
        };

        if !self.includes.is_empty() && !self.includes.iter().any(|p| p.matches(path)) {
            return false;
        }
        !self.excludes.iter().any(|p| p.matches(path))
    }

    /// Visibility check for an optional filter and an optional path.
    ///
    /// A missing path is never visible; a missing filter lets everything through.
    pub fn is_visible_opt(filter: Option<&PathFilter>, path: Option<&str>) -> bool {
        match (filter, path) {
            (_, None) => false,
            (None, Some(_)) => true,
            (Some(filter), Some(path)) => filter.is_visible(path),
        }
    }

    /// The include globs, in configuration order.
    pub fn include_globs(&self) -> impl Iterator<Item = &str> {
        self.includes.iter().map(|p| p.glob.as_str())
    }

    /// The exclude globs, in configuration order.
    pub fn exclude_globs(&self) -> impl Iterator<Item = &str> {
        self.excludes.iter().map(|p| p.glob.as_str())
    }

    /// Whether the filter has neither includes nor excludes.
    pub fn is_empty(&self) -> bool {
        self.includes.is_empty() && self.excludes.is_empty()
    }
}

fn compile_all<I, S>(globs: I) -> Result<Vec<GlobPattern>>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    globs
        .into_iter()
        .map(|g| GlobPattern::compile(g.as_ref()))
        .collect()
}

impl fmt::Debug for PathFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PathFilter")
            .field("includes", &self.includes)
            .field("excludes", &self.excludes)
            .finish()
    }
}

impl PartialEq for PathFilter {
    fn eq(&self, other: &Self) -> bool {
        self.include_globs().eq(other.include_globs())
            && self.exclude_globs().eq(other.exclude_globs())
    }
}

impl Eq for PathFilter {}

impl Hash for PathFilter {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for glob in self.include_globs() {
            glob.hash(state);
        }
        0xffu8.hash(state);
        for glob in self.exclude_globs() {
            glob.hash(state);
        }
    }
}

impl TryFrom<FilterRepr> for PathFilter {
    type Error = Error;

    fn try_from(repr: FilterRepr) -> Result<Self> {
        PathFilter::new(repr.includes, repr.excludes)
    }
}

impl From<PathFilter> for FilterRepr {
    fn from(filter: PathFilter) -> Self {
        FilterRepr {
            includes: filter.include_globs().map(String::from).collect(),
            excludes: filter.exclude_globs().map(String::from).collect(),
        }
    }
}

/// Translate a glob into an anchored regular expression.
///
/// - `**/` matches zero or more leading directories, a trailing `**` matches anything
/// - `*` matches within one segment, `?` matches one non-separator character
/// - `[abc]`, `[!abc]` are character classes
/// - `{a,b}` is alternation
/// - `\` escapes the next character
pub fn glob_to_regex(glob: &str) -> String {
    let chars: Vec<char> = glob.chars().collect();
    let mut out = String::with_capacity(glob.len() * 2 + 2);
    out.push('^');

    let mut i = 0;
    let mut brace_depth = 0usize;
    let mut in_class = false;

    while i < chars.len() {
        let c = chars[i];

        if in_class {
            match c {
                ']' => {
                    in_class = false;
                    out.push(']');
                }
                '\\' | '[' | '&' | '~' => {
                    out.push('\\');
                    out.push(c);
                }
                _ => out.push(c),
            }
            i += 1;
            continue;
        }

        match c {
            '*' => {
                if chars.get(i + 1) == Some(&'*') {
                    if chars.get(i + 2) == Some(&'/') {
                        out.push_str("(?:[^/]*/)*");
                        i += 3;
                    } else {
                        out.push_str(".*");
                        i += 2;
                    }
                    continue;
                }
                out.push_str("[^/]*");
            }
            '?' => out.push_str("[^/]"),
            '[' => {
                in_class = true;
                out.push('[');
                match chars.get(i + 1) {
                    Some('!') | Some('^') => {
                        out.push('^');
                        i += 1;
                    }
                    _ => {}
                }
            }
            '{' => {
                brace_depth += 1;
                out.push_str("(?:");
            }
            '}' if brace_depth > 0 => {
                brace_depth -= 1;
                out.push(')');
            }
            ',' if brace_depth > 0 => out.push('|'),
            '\\' => {
                if let Some(next) = chars.get(i + 1) {
                    out.push_str(&regex::escape(&next.to_string()));
                    i += 1;
                } else {
                    out.push_str("\\\\");
                }
            }
            _ => out.push_str(&regex::escape(&c.to_string())),
        }
        i += 1;
    }

    // Unterminated constructs are closed so the pattern still compiles.
    if in_class {
        out.push(']');
    }
    for _ in 0..brace_depth {
        out.push(')');
    }
    out.push('$');
    out
}
