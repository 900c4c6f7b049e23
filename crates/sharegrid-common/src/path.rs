//! Hierarchical identifiers and path resolution.
//!
//! Node, column and row ids are `/`-separated paths such as
//! `/providers/region1` or `/data/cat_A/item1`. Relative paths are resolved
//! against a base id that is treated as a directory, so for base `/cat/a`:
//!
//! - `.`    resolves to `/cat/a`
//! - `../b` resolves to `/cat/b`
//! - `x`    resolves to `/cat/a/x`
//!
//! Ids are not required to be absolute; a relative base yields relative
//! results.

use std::borrow::Borrow;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use globset::{GlobBuilder, GlobMatcher};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

macro_rules! path_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
        #[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(transparent))]
        pub struct $name(Arc<str>);

        impl $name {
            pub fn new(id: impl AsRef<str>) -> Self {
                Self(Arc::from(id.as_ref()))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Resolve `rel` against this id (see module docs).
            pub fn resolve(&self, rel: &str) -> String {
                resolve_path(&self.0, rel)
            }
        }

        impl Deref for $name {
            type Target = str;
            fn deref(&self) -> &str {
                &self.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({:?})", stringify!($name), &*self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self::new(s)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(Arc::from(s))
            }
        }

        impl From<&$name> for $name {
            fn from(id: &$name) -> Self {
                id.clone()
            }
        }

        impl PartialEq<str> for $name {
            fn eq(&self, other: &str) -> bool {
                &*self.0 == other
            }
        }

        impl PartialEq<&str> for $name {
            fn eq(&self, other: &&str) -> bool {
                &*self.0 == *other
            }
        }
    };
}

path_id! {
    /// Id of a participating node.
    NodeId
}

path_id! {
    /// Id of a column (a data owner/provider).
    ColumnId
}

path_id! {
    /// Id of a row (a typed data slot present in every column).
    RowId
}

/// Resolve `rel` against `base`, treating `base` as a directory.
pub fn resolve_path(base: &str, rel: &str) -> String {
    if rel.starts_with('/') {
        return normalize_path(rel);
    }
    if base.is_empty() {
        return normalize_path(rel);
    }
    let mut joined = String::with_capacity(base.len() + rel.len() + 1);
    joined.push_str(base);
    if !base.ends_with('/') {
        joined.push('/');
    }
    joined.push_str(rel);
    normalize_path(&joined)
}

/// Collapse `.`/`..` segments and duplicate separators.
///
/// `..` never climbs above the root. A leading `/` is preserved.
pub fn normalize_path(path: &str) -> String {
    let absolute = path.starts_with('/');
    let mut parts: Vec<&str> = Vec::new();
    for seg in path.split('/') {
        match seg {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            s => parts.push(s),
        }
    }
    let mut out = String::with_capacity(path.len());
    if absolute {
        out.push('/');
    }
    out.push_str(&parts.join("/"));
    if out.is_empty() {
        out.push('.');
    }
    out
}

/// Parent path of `path`, or `None` for a root or single-segment id.
pub fn parent_path(path: &str) -> Option<&str> {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(0) if trimmed.len() > 1 => Some("/"),
        Some(0) | None => None,
        Some(idx) => Some(&trimmed[..idx]),
    }
}

/// Whether `s` contains glob meta characters.
pub fn is_glob(s: &str) -> bool {
    s.contains(['*', '?', '[', '{'])
}

/// A compiled glob over path ids.
///
/// `*` and `?` stay within one path level, `**` crosses levels.
#[derive(Clone)]
pub struct PathPattern {
    src: String,
    matcher: GlobMatcher,
}

impl PathPattern {
    pub fn new(pattern: &str) -> Result<Self, globset::Error> {
        let glob = GlobBuilder::new(pattern)
            .literal_separator(true)
            .backslash_escape(true)
            .build()?;
        Ok(Self {
            src: pattern.to_string(),
            matcher: glob.compile_matcher(),
        })
    }

    /// Compile `pattern` after resolving it relative to `anchor`.
    pub fn resolved(anchor: &str, pattern: &str) -> Result<Self, globset::Error> {
        Self::new(&resolve_path(anchor, pattern))
    }

    pub fn as_str(&self) -> &str {
        &self.src
    }

    pub fn is_match(&self, id: &str) -> bool {
        self.matcher.is_match(id)
    }
}

impl fmt::Debug for PathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PathPattern({:?})", self.src)
    }
}

impl PartialEq for PathPattern {
    fn eq(&self, other: &Self) -> bool {
        self.src == other.src
    }
}

impl fmt::Display for PathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.src)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_relative_paths_against_base_directory() {
        assert_eq!(resolve_path("/cat/a", "."), "/cat/a");
        assert_eq!(resolve_path("/cat/a", "../b"), "/cat/b");
        assert_eq!(resolve_path("/cat/a", "x"), "/cat/a/x");
        assert_eq!(resolve_path("/cat/a", "/other/y"), "/other/y");
        assert_eq!(resolve_path("/cat/a", "../../../z"), "/z");
    }

    #[test]
    fn relative_ids_stay_relative() {
        assert_eq!(resolve_path("a", "../b"), "b");
        assert_eq!(resolve_path("", "b"), "b");
        assert_eq!(normalize_path("a/./b//c"), "a/b/c");
    }

    #[test]
    fn parent_of_paths() {
        assert_eq!(parent_path("/a/b"), Some("/a"));
        assert_eq!(parent_path("/a"), Some("/"));
        assert_eq!(parent_path("/"), None);
        assert_eq!(parent_path("a"), None);
    }

    #[test]
    fn glob_detection_and_matching() {
        assert!(is_glob("/data/*"));
        assert!(is_glob("/data/{a,b}"));
        assert!(!is_glob("/data/a"));

        let p = PathPattern::new("/data/*").unwrap();
        assert!(p.is_match("/data/x"));
        assert!(!p.is_match("/data/x/y"));

        let deep = PathPattern::new("/data/**").unwrap();
        assert!(deep.is_match("/data/x/y"));
    }

    #[test]
    fn anchored_patterns() {
        let p = PathPattern::resolved("/providers/region1", "../region*").unwrap();
        assert_eq!(p.as_str(), "/providers/region*");
        assert!(p.is_match("/providers/region2"));
    }

    #[test]
    fn ids_compare_with_strings() {
        let id = RowId::new("/data/a");
        assert_eq!(id, "/data/a");
        assert_eq!(id.resolve("../b"), "/data/b");
        assert_eq!(format!("{id}"), "/data/a");
    }
}
