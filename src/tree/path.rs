//! Change path syntax.
//!
//! Object keys are joined with `.` and array elements get an `[N]` suffix,
//! so `tools[0].tool_spec.name` addresses one location in a tree.

use std::fmt;

/// A path into a [`ConfigTree`](super::ConfigTree).
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChangePath(String);

impl ChangePath {
    /// The path of the tree root (empty string).
    #[must_use]
    pub const fn root() -> Self {
        Self(String::new())
    }

    /// Returns the path of an object member below this one.
    #[must_use]
    pub fn key(&self, key: &str) -> Self {
        if self.0.is_empty() {
            Self(key.to_string())
        } else {
            Self(format!("{}.{key}", self.0))
        }
    }

    /// Returns the path of an array element below this one.
    #[must_use]
    pub fn index(&self, index: usize) -> Self {
        Self(format!("{}[{index}]", self.0))
    }

    /// Returns true for the root path.
    #[must_use]
    pub const fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the path text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the top-level key this path starts with.
    #[must_use]
    pub fn top_level(&self) -> &str {
        top_level_key(&self.0)
    }
}

impl fmt::Display for ChangePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<ChangePath> for String {
    fn from(path: ChangePath) -> Self {
        path.0
    }
}

/// Returns the substring before the first `.` or `[`.
#[must_use]
pub fn top_level_key(path: &str) -> &str {
    path.find(|c: char| c == '.' || c == '[').map_or(path, |end| &path[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_composition() {
        let path = ChangePath::root().key("a").key("b").index(2).key("c");
        assert_eq!(path.as_str(), "a.b[2].c");
        assert!(!path.is_root());
        assert!(ChangePath::root().is_root());
    }

    #[test]
    fn test_top_level_key() {
        assert_eq!(top_level_key("comment"), "comment");
        assert_eq!(top_level_key("tools[0].tool_spec.name"), "tools");
        assert_eq!(top_level_key("instructions.response"), "instructions");
        assert_eq!(top_level_key(""), "");
    }
}
