//! 请求路径清理：把 URL 路径规约为相对于服务根目录的路径。

use std::fmt;

/// A cleaned path relative to the served root.
///
/// Holds only normal segments: no `.`, no `..`, no empty segments. The empty
/// segment list is the root itself.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RelativePath {
    segments: Vec<String>,
}

impl RelativePath {
    /// Cleans `raw` the way a rooted path clean does.
    ///
    /// For a `/`-prefixed path, `..` at the top is dropped (`/../a` is `a`).
    /// For an unrooted path a `..` that would climb above the start cannot be
    /// resolved and the path is rejected. NUL bytes are rejected as well.
    pub fn parse(raw: &str) -> Option<Self> {
        let rooted = raw.starts_with('/');
        let mut segments: Vec<String> = Vec::new();
        for segment in raw.split('/') {
            match segment {
                "" | "." => continue,
                ".." => {
                    if segments.pop().is_none() && !rooted {
                        return None;
                    }
                }
                other if other.contains('\0') => return None,
                other => segments.push(other.to_string()),
            }
        }
        Some(Self { segments })
    }

    /// Like [`RelativePath::parse`], but the root itself is not a file path.
    pub fn file_path(raw: &str) -> Option<Self> {
        Self::parse(raw).filter(|path| !path.is_root())
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Splits into parent segments and the final name. `None` for the root.
    pub fn split_last(&self) -> Option<(&[String], &str)> {
        self.segments
            .split_last()
            .map(|(name, parents)| (parents, name.as_str()))
    }

    pub fn join(&self, name: &str) -> Self {
        let mut segments = self.segments.clone();
        segments.push(name.to_string());
        Self { segments }
    }
}

impl fmt::Display for RelativePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            return f.write_str(".");
        }
        f.write_str(&self.segments.join("/"))
    }
}
