use chrono::{DateTime, Utc};

use super::path::{validate_name, DirPath};
use crate::errors::CoreError;

/// Optional attributes for [`File::new`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOption {
    Size(i64),
    LastModified(DateTime<Utc>),
}

/// A file (object) inside a directory. Identity is
/// `(directory_path, name)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct File {
    name: String,
    directory_path: DirPath,
    size_bytes: i64,
    last_modified: Option<DateTime<Utc>>,
}

impl File {
    pub fn new(
        name: &str,
        directory_path: DirPath,
        options: impl IntoIterator<Item = FileOption>,
    ) -> Result<Self, CoreError> {
        validate_name(name)?;
        if directory_path.is_nil() {
            return Err(CoreError::Invalid(format!(
                "file {name:?} has no directory"
            )));
        }
        let mut file = Self {
            name: name.to_string(),
            directory_path,
            size_bytes: 0,
            last_modified: None,
        };
        for option in options {
            match option {
                FileOption::Size(size) => file.size_bytes = size,
                FileOption::LastModified(ts) => file.last_modified = Some(ts),
            }
        }
        Ok(file)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn directory_path(&self) -> &DirPath {
        &self.directory_path
    }

    pub fn size_bytes(&self) -> i64 {
        self.size_bytes
    }

    pub fn last_modified(&self) -> Option<DateTime<Utc>> {
        self.last_modified
    }

    /// `/dir/name`, used as the editor key and tree node id.
    pub fn full_path(&self) -> String {
        format!("{}{}", self.directory_path, self.name)
    }

    /// Object key: the full path without its leading slash.
    pub fn key(&self) -> String {
        format!("{}{}", self.directory_path.key(), self.name)
    }
}
