use std::fmt;

use crate::errors::CoreError;

/// Normalized directory path: `/` or `/a/b/`.
///
/// The empty path is [`DirPath::nil_parent()`], the parent of the root,
/// and is distinct from [`DirPath::root()`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct DirPath(String);

impl DirPath {
    /// Coerce `raw` into leading+trailing slash form. Empty segments are
    /// collapsed, so `"a//b"` becomes `"/a/b/"`.
    pub fn new(raw: &str) -> Self {
        if raw.is_empty() {
            return Self::nil_parent();
        }
        let segments: Vec<&str> = raw.split('/').filter(|s| !s.is_empty()).collect();
        if segments.is_empty() {
            return Self::root();
        }
        Self(format!("/{}/", segments.join("/")))
    }

    pub fn root() -> Self {
        Self("/".to_string())
    }

    pub fn nil_parent() -> Self {
        Self(String::new())
    }

    pub fn is_root(&self) -> bool {
        self.0 == "/"
    }

    pub fn is_nil(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Last non-empty segment; `""` for the root and the nil path.
    pub fn directory_name(&self) -> &str {
        self.segments().last().copied().unwrap_or("")
    }

    /// Parent directory, or the nil path for the root and the nil path.
    pub fn parent_path(&self) -> DirPath {
        if self.is_nil() || self.is_root() {
            return Self::nil_parent();
        }
        let segments = self.segments();
        Self::new(&segments[..segments.len() - 1].join("/"))
            .or_root()
    }

    /// Append `name` (which may itself contain slashes) and normalize.
    pub fn new_sub_path(&self, name: &str) -> DirPath {
        Self::new(&format!("{}/{}", self.0, name))
    }

    /// Object-store key prefix: the path without its leading slash, so the
    /// root maps to `""` and `/a/b/` to `a/b/`.
    pub fn key(&self) -> &str {
        self.0.strip_prefix('/').unwrap_or(&self.0)
    }

    /// Path segments from the root down.
    pub fn segments(&self) -> Vec<&str> {
        self.0.split('/').filter(|s| !s.is_empty()).collect()
    }

    /// Whether `self` lies strictly below `ancestor`.
    pub fn is_descendant_of(&self, ancestor: &DirPath) -> bool {
        !ancestor.is_nil() && self != ancestor && self.0.starts_with(&ancestor.0)
    }

    // `new("")` yields the nil path; the parent of a first-level directory is
    // the root, not nil.
    fn or_root(self) -> Self {
        if self.is_nil() {
            Self::root()
        } else {
            self
        }
    }
}

impl fmt::Display for DirPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Validate a file or directory name: non-empty and free of `/`.
pub fn validate_name(name: &str) -> Result<(), CoreError> {
    if name.is_empty() {
        return Err(CoreError::Invalid("name is empty".to_string()));
    }
    if name.contains('/') {
        return Err(CoreError::Invalid(format!("name {name:?} contains '/'")));
    }
    Ok(())
}
