//! Paths into the state tree

use serde::{Deserialize, Serialize};
use std::fmt;

/// A path into the state tree
///
/// Each segment is an object key, or a decimal index when the parent is an
/// array. The empty path addresses the root.
///
/// Anything a step would naturally write as a path converts into one:
///
/// ```
/// use signal_state_store::StatePath;
///
/// assert_eq!(StatePath::from("user"), StatePath::new(["user"]));
/// assert_eq!(StatePath::from(["user", "name"]).len(), 2);
/// assert!(StatePath::from(()).is_root());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatePath(Vec<String>);

impl StatePath {
    /// The root path
    pub fn root() -> Self {
        Self(Vec::new())
    }

    /// Build a path from segments
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(segments.into_iter().map(Into::into).collect())
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// Split into the parent path and the last segment
    pub fn split_last(&self) -> Option<(StatePath, &str)> {
        self.0
            .split_last()
            .map(|(last, parent)| (StatePath(parent.to_vec()), last.as_str()))
    }

    /// The first `depth` segments of this path
    pub fn prefix(&self, depth: usize) -> StatePath {
        StatePath(self.0[..depth.min(self.0.len())].to_vec())
    }

    /// A new path with `key` appended
    pub fn child(&self, key: impl Into<String>) -> StatePath {
        let mut segments = self.0.clone();
        segments.push(key.into());
        StatePath(segments)
    }
}

impl fmt::Display for StatePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            f.write_str("<root>")
        } else {
            f.write_str(&self.0.join("."))
        }
    }
}

impl From<()> for StatePath {
    fn from(_: ()) -> Self {
        Self::root()
    }
}

impl From<&str> for StatePath {
    fn from(key: &str) -> Self {
        Self(vec![key.to_string()])
    }
}

impl From<String> for StatePath {
    fn from(key: String) -> Self {
        Self(vec![key])
    }
}

impl From<&String> for StatePath {
    fn from(key: &String) -> Self {
        Self(vec![key.clone()])
    }
}

impl From<Vec<String>> for StatePath {
    fn from(segments: Vec<String>) -> Self {
        Self(segments)
    }
}

impl From<Vec<&str>> for StatePath {
    fn from(segments: Vec<&str>) -> Self {
        Self::new(segments)
    }
}

impl From<&[&str]> for StatePath {
    fn from(segments: &[&str]) -> Self {
        Self::new(segments.iter().copied())
    }
}

impl<const N: usize> From<[&str; N]> for StatePath {
    fn from(segments: [&str; N]) -> Self {
        Self::new(segments)
    }
}

impl From<&StatePath> for StatePath {
    fn from(path: &StatePath) -> Self {
        path.clone()
    }
}
